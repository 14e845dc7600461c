//! Stop-condition monitoring.

use std::sync::Arc;
use std::time::Duration;

use stack_types::{AlarmState, LogicalId, PhysicalId};

use crate::error::Result;
use crate::provider::CloudProvider;

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// No alarm is breaching.
    Clear,
    /// The first alarm found in `ALARM`.
    Breached(LogicalId),
}

/// Reads the state of an experiment's stop-condition alarms.
pub struct StopConditionMonitor<P: CloudProvider> {
    provider: Arc<P>,
    alarms: Vec<(LogicalId, PhysicalId)>,
}

impl<P: CloudProvider> StopConditionMonitor<P> {
    /// Watch `alarms`, given as logical and physical ID pairs.
    pub fn new(provider: Arc<P>, alarms: Vec<(LogicalId, PhysicalId)>) -> Self {
        Self { provider, alarms }
    }

    /// Number of alarms watched.
    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    /// Whether no alarm is watched.
    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    /// Read every alarm once.
    ///
    /// `INSUFFICIENT_DATA` does not stop a run; only `ALARM` does.
    pub async fn poll(&self) -> Result<PollOutcome> {
        for (logical, physical) in &self.alarms {
            let state = self.provider.describe_alarm(physical).await?;
            tracing::debug!("stop condition {} is {}", logical, state);
            if state == AlarmState::Alarm {
                return Ok(PollOutcome::Breached(logical.clone()));
            }
        }
        Ok(PollOutcome::Clear)
    }
}

/// Poll one alarm until it reaches `expected` or `timeout` passes.
///
/// Returns whether the state was reached.
pub async fn wait_for_alarm<P: CloudProvider>(
    provider: &P,
    alarm: &PhysicalId,
    expected: AlarmState,
    timeout: Duration,
    interval: Duration,
) -> Result<bool> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if provider.describe_alarm(alarm).await? == expected {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(interval).await;
    }
}
