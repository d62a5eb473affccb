//! Task argument resolution
//!
//! A task declares its parameters once in a [`TaskSignature`]. At launch the
//! caller's [`TaskArgs`] are merged over the declared defaults:
//! keyword beats positional, positional beats default.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Argument resolution errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("takes {expected} positional arguments but {given} were given")]
    TooManyPositional { expected: usize, given: usize },

    #[error("got an unexpected keyword argument '{0}'")]
    UnexpectedKeyword(String),

    #[error("missing required argument '{0}'")]
    Missing(String),

    #[error("parameter '{0}' declared twice")]
    DuplicateParameter(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Param {
    name: String,
    default: Option<Value>,
}

/// Ordered parameter list of a task body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskSignature {
    params: Vec<Param>,
}

impl TaskSignature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter with no default
    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: None,
        });
        self
    }

    /// Add a parameter with a default value
    pub fn optional(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Merge `args` over the declared defaults.
    ///
    /// Positionals fill parameters in declaration order; a keyword for the
    /// same parameter replaces the positional value.
    pub fn resolve(&self, args: TaskArgs) -> Result<ResolvedArgs, ArgumentError> {
        for (i, param) in self.params.iter().enumerate() {
            if self.params[..i].iter().any(|p| p.name == param.name) {
                return Err(ArgumentError::DuplicateParameter(param.name.clone()));
            }
        }
        if args.positional.len() > self.params.len() {
            return Err(ArgumentError::TooManyPositional {
                expected: self.params.len(),
                given: args.positional.len(),
            });
        }
        if let Some(name) = args
            .keyword
            .keys()
            .find(|name| !self.params.iter().any(|p| &p.name == *name))
        {
            return Err(ArgumentError::UnexpectedKeyword(name.clone()));
        }

        let mut positional = args.positional.into_iter();
        let mut keyword = args.keyword;
        let mut values = Vec::with_capacity(self.params.len());
        for param in &self.params {
            let from_position = positional.next();
            let value = keyword
                .remove(&param.name)
                .or(from_position)
                .or_else(|| param.default.clone())
                .ok_or_else(|| ArgumentError::Missing(param.name.clone()))?;
            values.push((param.name.clone(), value));
        }

        Ok(ResolvedArgs { values })
    }
}

/// Arguments supplied by the caller at launch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskArgs {
    positional: Vec<Value>,
    keyword: BTreeMap<String, Value>,
}

impl TaskArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword argument
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }
}

/// Fully resolved argument set handed to a task body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedArgs {
    values: Vec<(String, Value)>,
}

impl ResolvedArgs {
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Typed getter
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self
            .get_value(name)
            .with_context(|| format!("no argument named '{name}'"))?;
        serde_json::from_value(value.clone())
            .with_context(|| format!("argument '{name}' has the wrong type"))
    }

    /// Arguments in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }
}
