//! Integration tests for the registry, the cleanup sweep and sessions
//!
//! A [`RecordingCloud`] stands in for the control plane, so every destroy
//! call can be checked in order.

use harness_common::ResourceKind;
use harness_core::cleanup::{CleanupResult, SweepOptions};
use harness_core::registry::ResourceHandle;
use harness_core::{
    CleanupDispatcher, DestroyTable, ResourceRegistry, SharedRegistry, TestSession,
};
use harness_test_utils::{RecordingCloud, init_test_logging, test_session_id};
use std::sync::Arc;

fn cloud_table(cloud: &Arc<RecordingCloud>) -> DestroyTable {
    DestroyTable::for_cloud(cloud.clone())
}

mod registry_tests {
    use super::*;

    #[test]
    fn test_order_preserved_under_string_tag() {
        let kind: ResourceKind = "volumes".parse().unwrap();
        let mut registry = ResourceRegistry::new(test_session_id());
        for id in ["A", "B", "C"] {
            registry.register(kind.clone(), id);
        }

        let ids: Vec<String> = registry
            .entries_of(&kind)
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_alias_tags_share_a_kind() {
        let mut registry = ResourceRegistry::new(test_session_id());
        registry.register("keys".parse().unwrap(), "key-1");
        let duplicate = registry.register("keypairs".parse().unwrap(), "key-1");

        assert!(!duplicate);
        assert_eq!(registry.entries_of(&ResourceKind::KeyPair).len(), 1);
    }
}

mod sweep_tests {
    use super::*;

    #[tokio::test]
    async fn test_sweep_continues_past_failure() {
        init_test_logging();
        let cloud = Arc::new(RecordingCloud::new());
        cloud.fail_on("vol-b", "UnauthorizedOperation: not allowed");

        let mut registry = ResourceRegistry::new(test_session_id());
        for id in ["vol-a", "vol-b", "vol-c"] {
            registry.register(ResourceKind::Volume, id);
        }

        let report = CleanupDispatcher::new(cloud_table(&cloud))
            .sweep(&registry)
            .await;

        assert_eq!(report.len(), 3);
        assert_eq!(report.failed(), 1);
        let failure = report.failures()[0];
        assert_eq!(failure.id, "vol-b");
        assert!(failure.message.contains("UnauthorizedOperation"));

        assert!(cloud.was_deleted("vol-a"));
        assert!(cloud.was_deleted("vol-c"));
        assert_eq!(
            cloud.calls(),
            vec![
                "delete_volume:vol-a",
                "delete_volume:vol-b",
                "delete_volume:vol-c"
            ]
        );
    }

    #[tokio::test]
    async fn test_default_table_teardown_order() {
        let cloud = Arc::new(RecordingCloud::new());
        let mut registry = ResourceRegistry::new(test_session_id());
        registry.register(ResourceKind::SecurityGroup, "sg-1");
        registry.register(ResourceKind::KeyPair, "key-1");
        registry.register(ResourceKind::Instance, "i-1");
        registry.register(ResourceKind::Volume, ResourceHandle::attached("vol-1", "i-1"));
        registry.register(ResourceKind::Volume, "vol-2");
        registry.register(ResourceKind::Snapshot, "snap-1");

        let report = CleanupDispatcher::new(cloud_table(&cloud))
            .sweep(&registry)
            .await;

        assert!(report.is_clean());
        assert_eq!(
            cloud.calls(),
            vec![
                "terminate_instance:i-1",
                "detach_volume:vol-1:i-1",
                "delete_volume:vol-1",
                "delete_volume:vol-2",
                "delete_snapshot:snap-1",
                "delete_key_pair:key-1",
                "delete_security_group:sg-1",
            ]
        );
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let cloud = Arc::new(RecordingCloud::new());
        let dispatcher = CleanupDispatcher::new(cloud_table(&cloud));
        let mut registry = ResourceRegistry::new(test_session_id());
        registry.register(ResourceKind::Instance, "i-1");
        registry.register(ResourceKind::Bucket, "bucket-1");

        let first = dispatcher.sweep(&registry).await;
        assert_eq!(first.deleted(), 2);

        let second = dispatcher.sweep(&registry).await;
        assert!(second.is_clean());
        assert_eq!(second.already_deleted(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_delete_retried_until_success() {
        let cloud = Arc::new(RecordingCloud::new());
        cloud.throttle("sg-1", 2);
        let mut registry = ResourceRegistry::new(test_session_id());
        registry.register(ResourceKind::SecurityGroup, "sg-1");

        let report = CleanupDispatcher::new(cloud_table(&cloud))
            .sweep(&registry)
            .await;

        assert_eq!(report.entries[0].result, CleanupResult::Deleted);
        assert_eq!(cloud.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted() {
        let cloud = Arc::new(RecordingCloud::new());
        cloud.throttle("sg-1", 10);
        let mut registry = ResourceRegistry::new(test_session_id());
        registry.register(ResourceKind::SecurityGroup, "sg-1");

        let dispatcher = CleanupDispatcher::with_options(
            cloud_table(&cloud),
            SweepOptions {
                retry_attempts: 2,
                ..Default::default()
            },
        );
        let report = dispatcher.sweep(&registry).await;

        assert_eq!(report.failed(), 1);
        assert_eq!(cloud.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let cloud = Arc::new(RecordingCloud::new());
        let mut registry = ResourceRegistry::new(test_session_id());
        registry.register(ResourceKind::Instance, "i-1");
        registry.register(ResourceKind::Image, "ami-1");

        let dispatcher = CleanupDispatcher::with_options(
            cloud_table(&cloud),
            SweepOptions {
                dry_run: true,
                ..Default::default()
            },
        );
        let report = dispatcher.sweep(&registry).await;

        assert_eq!(report.skipped(), 2);
        assert!(cloud.calls().is_empty());
    }
}

mod session_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_merged_task_registries_are_swept() {
        init_test_logging();
        let cloud = Arc::new(RecordingCloud::new());
        let mut session = TestSession::new(test_session_id(), cloud_table(&cloud));
        session.register(ResourceKind::SecurityGroup, "sg-1");

        let shared = SharedRegistry::new(session.id());
        let workers: Vec<_> = (0..4)
            .map(|n| {
                let shared = shared.clone();
                tokio::spawn(async move {
                    shared.register(ResourceKind::Instance, format!("i-{n}"));
                })
            })
            .collect();
        for worker in workers {
            worker.await.unwrap();
        }
        session.registry_mut().merge(shared.to_registry());

        let report = session.finish().await;
        assert_eq!(report.len(), 5);
        assert!(report.is_clean());
        // Instances go before the group they use
        assert_eq!(cloud.calls().last().unwrap(), "delete_security_group:sg-1");
    }

    #[tokio::test]
    async fn test_explicit_delete_is_not_repeated() {
        let cloud = Arc::new(RecordingCloud::new());
        let mut session = TestSession::new(test_session_id(), cloud_table(&cloud));
        session.register(ResourceKind::Snapshot, "snap-1");
        session.register(ResourceKind::Snapshot, "snap-2");

        let result = session.delete(&ResourceKind::Snapshot, "snap-1").await;
        assert_eq!(result, Some(CleanupResult::Deleted));

        let report = session.finish().await;
        assert_eq!(report.len(), 1);
        assert_eq!(
            cloud.calls(),
            vec!["delete_snapshot:snap-1", "delete_snapshot:snap-2"]
        );
    }
}
