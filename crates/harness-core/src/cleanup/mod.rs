//! Session teardown: destroy strategies and the sweep over a registry

mod dispatcher;
mod strategy;

pub use dispatcher::{
    CleanupDispatcher, CleanupFailure, CleanupResult, PlannedAction, SweepEntry, SweepOptions,
    SweepReport, teardown_order,
};
pub use strategy::{
    CloudControl, DestroyAction, DestroyFn, DestroyStrategy, DestroyTable, destroy_fn,
};
