//! Stop-condition and authorization scenarios.
//!
//! A breached alarm halts the run before the next step, and a run whose
//! role cannot act fails with a classified error instead of retrying.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use stack_core::{ChaosStackProps, FailureClass};
    use stack_types::{AlarmState, InstanceState};

    use crate::assertions::{
        assert_only_pool_affected, assert_stopped_before_completion, assert_transitions,
    };
    use crate::harness::ChaosHarness;

    // ========================================================================
    // Stop conditions
    // ========================================================================

    /// An alarm already firing stops the run before the first termination.
    #[tokio::test(start_paused = true)]
    async fn breach_before_start_stops_without_steps() {
        let harness = ChaosHarness::default_stack().unwrap();
        harness.apply_and_boot().await.unwrap();
        assert!(harness.breach_stop_condition(2.0).await.unwrap());

        let report = harness.run_experiment().await;
        let result = assert_transitions(&report, &["PENDING", "RUNNING", "STOPPED"]);
        assert!(result.passed, "{:?}", result.failure_details);
        assert_eq!(report.stopped_by(), Some(harness.stack().alarm.id()));
        assert_eq!(report.steps_executed, 0);
        assert!(report.affected.is_empty());

        let pool = harness.pool_state().await.unwrap();
        assert_eq!(pool.in_state(InstanceState::Running).len(), 2);
    }

    /// A larger pool trips the alarm partway through and the rest survive.
    #[tokio::test(start_paused = true)]
    async fn terminations_trip_alarm_midway() {
        let mut props = ChaosStackProps::default();
        props.pool.min_size = 4;
        let harness = ChaosHarness::new(props).unwrap();
        harness.apply_and_boot().await.unwrap();
        let before = harness.pool_state().await.unwrap();

        let report = harness.run_experiment().await;
        let result = assert_stopped_before_completion(&report);
        assert!(result.passed, "{:?}", result.failure_details);
        assert!(assert_only_pool_affected(&report, &before.members()).passed);
        assert!(report.affected.len() >= 2);
        assert!(report.affected.len() < report.matched.len());
    }

    /// Once the pool heals the alarm clears again.
    #[tokio::test(start_paused = true)]
    async fn alarm_clears_after_heal() {
        let mut props = ChaosStackProps::default();
        props.pool.min_size = 4;
        let harness = ChaosHarness::new(props).unwrap();
        harness.apply_and_boot().await.unwrap();

        let report = harness.run_experiment().await;
        assert!(report.stopped_by().is_some());
        assert_eq!(harness.alarm_state().await.unwrap(), AlarmState::Alarm);

        harness.wait_for_heal(Duration::from_secs(180)).await.unwrap();
        let cleared = harness
            .wait_for_alarm(AlarmState::Ok, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cleared);
    }

    /// `INSUFFICIENT_DATA` is not a breach.
    #[tokio::test(start_paused = true)]
    async fn insufficient_data_does_not_stop_run() {
        let harness = ChaosHarness::default_stack().unwrap();
        harness.apply().await.unwrap();
        assert_eq!(
            harness.alarm_state().await.unwrap(),
            AlarmState::InsufficientData
        );

        let report = harness.run_experiment().await;
        assert!(report.stopped_by().is_none());
        assert!(report.is_completed());
    }

    // ========================================================================
    // Authorization
    // ========================================================================

    /// A role stripped of its permissions fails the first step, with no retry.
    #[tokio::test(start_paused = true)]
    async fn revoked_role_fails_first_step() {
        let harness = ChaosHarness::default_stack().unwrap();
        harness.apply_and_boot().await.unwrap();
        let role = harness.state().record(harness.stack().role.id()).unwrap();
        assert!(harness.cloud().revoke_role_permissions(&role.arn).await);

        let report = harness.run_experiment().await;
        let (class, _) = report.failure().unwrap();
        assert_eq!(class, FailureClass::Authorization);
        assert_eq!(report.status_names().last(), Some(&"FAILED"));
        assert_eq!(report.steps_executed, 1);
        assert!(report.affected.is_empty());

        let pool = harness.pool_state().await.unwrap();
        assert_eq!(pool.in_state(InstanceState::Running).len(), 2);
    }

    /// A role missing from state fails the run before it starts.
    #[tokio::test(start_paused = true)]
    async fn unprovisioned_role_fails_validation() {
        let harness = ChaosHarness::default_stack().unwrap();
        harness.apply_and_boot().await.unwrap();
        harness.state().remove(harness.stack().role.id());

        let report = harness.run_experiment().await;
        let result = assert_transitions(&report, &["PENDING", "FAILED"]);
        assert!(result.passed, "{:?}", result.failure_details);
        let (class, _) = report.failure().unwrap();
        assert_eq!(class, FailureClass::GraphResolution);
    }
}
