//! Experiment scenarios.
//!
//! Only instances of the targeted pool are terminated, and the pool heals
//! back to its minimum size afterwards.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use stack_core::blueprint::TARGET_TAG_KEY;
    use stack_engine::RunnerConfig;
    use stack_types::InstanceState;

    use crate::assertions::{assert_only_pool_affected, assert_pool_healed, assert_transitions};
    use crate::harness::ChaosHarness;

    // ========================================================================
    // Blast radius
    // ========================================================================

    /// A clean run terminates every pool instance, then the pool heals.
    #[tokio::test(start_paused = true)]
    async fn run_completes_and_pool_heals() {
        let harness = ChaosHarness::default_stack().unwrap();
        harness.apply_and_boot().await.unwrap();
        let before = harness.pool_state().await.unwrap();
        assert!(assert_pool_healed(&before).passed);

        let report = harness.run_experiment().await;
        let result = assert_transitions(&report, &["PENDING", "RUNNING", "COMPLETED"]);
        assert!(result.passed, "{:?}", result.failure_details);
        let result = assert_only_pool_affected(&report, &before.members());
        assert!(result.passed, "{:?}", result.failure_details);
        assert_eq!(report.affected.len(), 2);

        let after = harness.wait_for_heal(Duration::from_secs(120)).await.unwrap();
        assert_eq!(after.in_state(InstanceState::Running).len(), 2);
        assert!(after.members().is_disjoint(&before.members()));
    }

    /// An instance outside the pool is spared even when it carries the target tag.
    #[tokio::test(start_paused = true)]
    async fn bystander_with_target_tag_survives() {
        let harness = ChaosHarness::default_stack().unwrap();
        harness.apply_and_boot().await.unwrap();
        let tags = BTreeMap::from([(TARGET_TAG_KEY.to_string(), "true".to_string())]);
        let bystander = harness.cloud().launch_unmanaged_instance(tags).await;

        let report = harness.run_experiment().await;
        assert!(report.is_completed());
        assert!(!report.matched.contains(&bystander));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(
            harness.cloud().instance_state(&bystander).await,
            Some(InstanceState::Running)
        );
    }

    // ========================================================================
    // Step batching
    // ========================================================================

    /// A batch covering the whole target set runs as a single step.
    #[tokio::test(start_paused = true)]
    async fn whole_target_set_in_one_step() {
        let harness = ChaosHarness::default_stack().unwrap().with_runner(RunnerConfig {
            batch_size: 2,
            seed: Some(7),
            ..RunnerConfig::default()
        });
        harness.apply_and_boot().await.unwrap();

        let report = harness.run_experiment().await;
        assert!(report.is_completed());
        assert_eq!(report.steps_executed, 1);
        assert_eq!(report.affected.len(), 2);
    }

    /// Instances still booting are not targets.
    #[tokio::test(start_paused = true)]
    async fn booting_pool_has_no_targets() {
        let harness = ChaosHarness::default_stack().unwrap();
        harness.apply().await.unwrap();

        let report = harness.run_experiment().await;
        assert!(report.is_completed());
        assert!(report.matched.is_empty());
        assert_eq!(report.steps_executed, 0);

        let pool = harness.pool_state().await.unwrap();
        assert_eq!(pool.in_state(InstanceState::Pending).len(), 2);
    }
}
