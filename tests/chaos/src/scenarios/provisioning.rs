//! Provisioning scenarios.
//!
//! Apply is idempotent, drift is reported and never repaired, failed
//! cleanups are retried, and teardown runs in exact reverse creation order.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use stack_core::blueprint::{ALB_DNS_OUTPUT, STOP_ALARM_OUTPUT};
    use stack_core::{chaos_stack, ChaosStackProps};
    use stack_engine::{CloudProvider, DriftKind, EngineError, StateStore, TargetHealthState};
    use stack_types::{Environment, ResourceKind};

    use crate::assertions::{
        assert_listener_routes_to_pool, assert_no_target_in, assert_reverse_order,
        assert_traffic_targets,
    };
    use crate::harness::{ChaosHarness, TEST_ACCOUNT, TEST_REGION};

    // ========================================================================
    // Apply
    // ========================================================================

    /// A fresh apply creates every resource and resolves both outputs.
    #[tokio::test(start_paused = true)]
    async fn apply_creates_stack_and_outputs() {
        let harness = ChaosHarness::default_stack().unwrap();
        let report = harness.apply().await.unwrap();
        assert_eq!(report.created().len(), 6);

        let outputs = harness.provisioner().outputs(&harness.stack().graph).unwrap();
        assert!(outputs[ALB_DNS_OUTPUT].ends_with(".eu-north-1.elb.amazonaws.com"));
        assert!(outputs[STOP_ALARM_OUTPUT].starts_with("arn:aws:cloudwatch:eu-north-1:"));
    }

    /// Applying an unchanged stack changes nothing in the cloud.
    #[tokio::test(start_paused = true)]
    async fn reapply_is_noop() {
        let harness = ChaosHarness::default_stack().unwrap();
        harness.apply().await.unwrap();
        let mutations = harness.cloud().mutation_count().await;

        let report = harness.apply().await.unwrap();
        assert!(report.is_noop());
        assert_eq!(harness.cloud().mutation_count().await, mutations);
    }

    /// State persisted to disk lets a new engine pick up where the last one left off.
    #[tokio::test(start_paused = true)]
    async fn reapply_from_saved_state_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let harness = ChaosHarness::default_stack().unwrap();
        harness.apply().await.unwrap();
        harness.save_state(&path).await.unwrap();
        let mutations = harness.cloud().mutation_count().await;

        let restored = StateStore::load(&path).await.unwrap();
        assert_eq!(restored.len(), 6);
        let report = harness
            .provisioner_with(restored)
            .apply(&harness.stack().graph)
            .await
            .into_result()
            .unwrap();
        assert!(report.is_noop());
        assert_eq!(harness.cloud().mutation_count().await, mutations);
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// A replaced resource whose delete failed is kept in saved state and
    /// torn down by a later destroy.
    #[tokio::test(start_paused = true)]
    async fn failed_cleanup_survives_restart_and_destroy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let harness = ChaosHarness::default_stack().unwrap();
        harness.apply().await.unwrap();
        let old_experiment = harness.physical_id(harness.stack().experiment.id()).unwrap();

        let mut props = ChaosStackProps::default();
        props.alarm.threshold = 3.0;
        let env = Environment::new(TEST_ACCOUNT, TEST_REGION).unwrap();
        let changed = chaos_stack(env, &props).unwrap();
        harness.cloud().fail_next_delete("throttled").await;
        let report = harness.provisioner().apply(&changed.graph).await;
        assert_eq!(report.cleanup_failed, vec![changed.experiment.id().clone()]);
        harness.save_state(&path).await.unwrap();

        let restored = StateStore::load(&path).await.unwrap();
        assert_eq!(restored.retired().len(), 1);
        let destroyed = harness
            .provisioner_with(restored.clone())
            .destroy(&changed.graph)
            .await
            .unwrap();
        assert_eq!(destroyed.len(), 6);
        assert!(restored.is_empty());
        assert!(restored.retired().is_empty());
        assert!(harness
            .cloud()
            .describe(ResourceKind::ExperimentTemplate, &old_experiment)
            .await
            .unwrap()
            .is_none());
    }

    // ========================================================================
    // Drift
    // ========================================================================

    /// Out-of-band changes are reported and left in place.
    #[tokio::test(start_paused = true)]
    async fn drift_is_reported_not_repaired() {
        let harness = ChaosHarness::default_stack().unwrap();
        harness.apply().await.unwrap();
        let alarm = harness.physical_id(harness.stack().alarm.id()).unwrap();
        assert!(harness.cloud().tamper(&alarm).await);
        let mutations = harness.cloud().mutation_count().await;

        let findings = harness
            .provisioner()
            .detect_drift(&harness.stack().graph)
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(&findings[0].logical_id, harness.stack().alarm.id());
        assert!(matches!(findings[0].kind, DriftKind::Modified { .. }));

        let err = harness
            .provisioner()
            .apply(&harness.stack().graph)
            .await
            .into_result()
            .unwrap_err();
        assert!(matches!(err, EngineError::ProvisioningDrift { .. }));
        assert_eq!(harness.cloud().mutation_count().await, mutations);
    }

    // ========================================================================
    // Traffic
    // ========================================================================

    /// The listener forwards to the pool and only healthy instances get traffic.
    #[tokio::test(start_paused = true)]
    async fn listener_routes_to_healthy_pool_members() {
        let harness = ChaosHarness::default_stack().unwrap();
        harness.apply_and_boot().await.unwrap();

        let pool = harness.pool_state().await.unwrap();
        let balancer = harness.load_balancer().await.unwrap();
        assert!(!balancer.dns_name.is_empty());
        assert_eq!(balancer.listeners.len(), 1);
        let result = assert_listener_routes_to_pool(&balancer, &pool.pool, 80);
        assert!(result.passed, "{:?}", result.failure_details);

        // Five passing probes, 30 seconds apart.
        tokio::time::sleep(Duration::from_secs(210)).await;
        let targets = harness.target_health().await.unwrap();
        let result = assert_traffic_targets(&targets, &pool.members());
        assert!(result.passed, "{:?}", result.failure_details);
        assert!(assert_no_target_in(&targets, TargetHealthState::Unhealthy).passed);

        let sick = pool.instances[0].id.clone();
        assert!(harness.cloud().set_instance_serving(&sick, false).await);
        tokio::time::sleep(Duration::from_secs(90)).await;

        let targets = harness.target_health().await.unwrap();
        let mut serving = pool.members();
        serving.remove(&sick);
        let result = assert_traffic_targets(&targets, &serving);
        assert!(result.passed, "{:?}", result.failure_details);
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Destroy deletes in exact reverse creation order.
    #[tokio::test(start_paused = true)]
    async fn destroy_reverses_creation_order() {
        let harness = ChaosHarness::default_stack().unwrap();
        harness.apply_and_boot().await.unwrap();

        let destroyed = harness.destroy().await.unwrap();
        let created = harness.stack().graph.creation_order();
        let result = assert_reverse_order(&created, &destroyed);
        assert!(result.passed, "{:?}", result.failure_details);
        assert!(harness.state().is_empty());
    }

    /// After teardown, a second apply rebuilds the whole stack.
    #[tokio::test(start_paused = true)]
    async fn apply_after_destroy_recreates() {
        let harness = ChaosHarness::default_stack().unwrap();
        harness.apply().await.unwrap();
        harness.destroy().await.unwrap();

        let report = harness.apply().await.unwrap();
        assert_eq!(report.created().len(), 6);
    }
}
