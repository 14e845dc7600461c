//! Idempotent provisioning.
//!
//! Apply walks the graph wave by wave. Resources within a wave do not
//! depend on each other and are created concurrently; a wave starts only
//! after the previous one finished. For each resource the effective
//! fingerprint (declaration plus the physical IDs it references) decides
//! what happens:
//!
//! - no state entry: create
//! - same fingerprint: keep, after checking the live resource still matches
//! - different fingerprint: create a replacement, retire the old one
//!
//! Retired and orphaned resources are deleted after the last wave, newest
//! first. A retired resource is kept in the state store's retired list
//! until its delete succeeds, so a failed cleanup is retried by the next
//! apply or destroy. Re-applying an unchanged graph makes no provider
//! mutation.

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use stack_core::StackGraph;
use stack_types::{Attribute, LogicalId, PhysicalId};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::provider::{CloudProvider, CreateRequest, ProviderError, ResourceRecord};
use crate::state::{StateEntry, StateStore};

/// What apply did with one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResourceOutcome {
    /// Newly created.
    Created {
        /// New physical ID.
        physical_id: PhysicalId,
    },
    /// Already up to date.
    Unchanged {
        /// Existing physical ID.
        physical_id: PhysicalId,
    },
    /// Recreated because its declaration or a dependency changed.
    Replaced {
        /// Retired physical ID.
        old: PhysicalId,
        /// Replacement physical ID.
        new: PhysicalId,
    },
    /// Not attempted because a dependency did not apply.
    Skipped {
        /// The dependency that blocked it.
        blocked_by: LogicalId,
    },
    /// Live state no longer matches what was provisioned.
    Drifted {
        /// What differs.
        detail: String,
    },
    /// The provider rejected it.
    Failed {
        /// Error message.
        error: String,
    },
}

impl ResourceOutcome {
    /// Whether dependents must be skipped.
    pub fn blocks_dependents(&self) -> bool {
        matches!(
            self,
            ResourceOutcome::Skipped { .. }
                | ResourceOutcome::Drifted { .. }
                | ResourceOutcome::Failed { .. }
        )
    }
}

/// Result of one apply.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    /// Outcome per resource, in creation order.
    pub resources: Vec<(LogicalId, ResourceOutcome)>,
    /// Retired or orphaned resources deleted after the last wave.
    pub deleted: Vec<PhysicalId>,
    /// Retired or orphaned resources whose delete failed.
    ///
    /// They stay in state, retired ones in the retired list, and the next
    /// apply or destroy deletes them.
    pub cleanup_failed: Vec<LogicalId>,
}

impl ApplyReport {
    /// Outcome for one resource.
    pub fn outcome(&self, id: &LogicalId) -> Option<&ResourceOutcome> {
        self.resources.iter().find(|(i, _)| i == id).map(|(_, o)| o)
    }

    /// Nothing was created, replaced or deleted.
    pub fn is_noop(&self) -> bool {
        self.deleted.is_empty()
            && self.cleanup_failed.is_empty()
            && self
                .resources
                .iter()
                .all(|(_, o)| matches!(o, ResourceOutcome::Unchanged { .. }))
    }

    /// Logical IDs created in this apply.
    pub fn created(&self) -> Vec<&LogicalId> {
        self.resources
            .iter()
            .filter(|(_, o)| matches!(o, ResourceOutcome::Created { .. }))
            .map(|(id, _)| id)
            .collect()
    }

    /// Turn failures into an error.
    ///
    /// Drift takes precedence over other failures.
    pub fn into_result(self) -> Result<ApplyReport> {
        if let Some((id, ResourceOutcome::Drifted { detail })) = self
            .resources
            .iter()
            .find(|(_, o)| matches!(o, ResourceOutcome::Drifted { .. }))
        {
            return Err(EngineError::ProvisioningDrift {
                id: id.clone(),
                detail: detail.clone(),
            });
        }
        let mut failed: Vec<LogicalId> = self
            .resources
            .iter()
            .filter(|(_, o)| o.blocks_dependents())
            .map(|(id, _)| id.clone())
            .collect();
        failed.extend(self.cleanup_failed.iter().cloned());
        if failed.is_empty() {
            Ok(self)
        } else {
            Err(EngineError::ApplyFailed { failed })
        }
    }
}

/// How a live resource differs from state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "drift", rename_all = "snake_case")]
pub enum DriftKind {
    /// Declared but never provisioned.
    NotProvisioned,
    /// Provisioned, then deleted outside the engine.
    Missing,
    /// Live configuration differs.
    Modified {
        /// Fingerprint in state.
        expected: String,
        /// Fingerprint the provider reports.
        actual: String,
    },
}

/// One drifted resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftFinding {
    /// The resource.
    pub logical_id: LogicalId,
    /// What differs.
    pub kind: DriftKind,
}

/// Why a resource is deleted after the last wave.
#[derive(Debug, Clone, Copy)]
enum Cleanup {
    /// Replaced; tracked in the retired list.
    Retired,
    /// No longer declared; still under its logical ID.
    Orphan,
}

/// Hash of a declaration fingerprint and the physical IDs it references.
fn effective_fingerprint(
    declaration: &str,
    references: &BTreeMap<LogicalId, ResourceRecord>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(declaration.as_bytes());
    for (id, record) in references {
        hasher.update(b"\0");
        hasher.update(id.as_str().as_bytes());
        hasher.update(b"=");
        hasher.update(record.physical_id.as_str().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Materializes stack graphs through a cloud provider.
pub struct Provisioner<P: CloudProvider> {
    provider: Arc<P>,
    state: StateStore,
    config: EngineConfig,
}

impl<P: CloudProvider> Provisioner<P> {
    /// Create a provisioner over `state`.
    pub fn new(provider: Arc<P>, state: StateStore, config: EngineConfig) -> Self {
        Self {
            provider,
            state,
            config,
        }
    }

    /// The state store.
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Bring the provider in line with `graph`.
    pub async fn apply(&self, graph: &StackGraph) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut outcomes: HashMap<LogicalId, ResourceOutcome> = HashMap::new();

        for (level, wave) in graph.waves().into_iter().enumerate() {
            tracing::debug!("apply wave {}: {:?}", level, wave);
            let prior = &outcomes;
            let results: Vec<(LogicalId, ResourceOutcome)> =
                stream::iter(wave.into_iter().map(|id| self.apply_one(graph, id, prior)))
                    .buffer_unordered(self.config.max_parallel.max(1))
                    .collect()
                    .await;
            outcomes.extend(results);
        }

        for id in graph.creation_order() {
            if let Some(outcome) = outcomes.remove(id) {
                report.resources.push((id.clone(), outcome));
            }
        }

        // Retired replacements, including ones an earlier apply failed to
        // delete, and resources no longer declared, newest first.
        let declared: HashSet<&LogicalId> = graph.creation_order().into_iter().collect();
        let mut cleanup: Vec<(StateEntry, Cleanup)> = self
            .state
            .retired()
            .into_iter()
            .map(|entry| (entry, Cleanup::Retired))
            .collect();
        cleanup.extend(
            self.state
                .entries()
                .into_iter()
                .filter(|e| !declared.contains(&e.logical_id))
                .map(|e| (e, Cleanup::Orphan)),
        );
        cleanup.sort_by_key(|(entry, _)| std::cmp::Reverse(entry.sequence));

        for (entry, cleanup) in cleanup {
            let id = entry.logical_id.clone();
            let physical_id = entry.record.physical_id.clone();
            match self.provider.delete(entry.record.kind, &physical_id).await {
                Ok(()) => {
                    tracing::info!("deleted {} ({})", id, physical_id);
                    self.forget(&entry, cleanup);
                    report.deleted.push(physical_id);
                }
                Err(ProviderError::NotFound { .. }) => {
                    tracing::warn!("{} ({}) was already gone", id, physical_id);
                    self.forget(&entry, cleanup);
                }
                Err(e) => {
                    tracing::warn!("failed to delete {} ({}): {}", id, physical_id, e);
                    report.cleanup_failed.push(id);
                }
            }
        }

        report
    }

    /// Drop a deleted cleanup candidate from state.
    fn forget(&self, entry: &StateEntry, cleanup: Cleanup) {
        match cleanup {
            Cleanup::Retired => {
                self.state.forget_retired(&entry.record.physical_id);
            }
            Cleanup::Orphan => {
                self.state.remove(&entry.logical_id);
            }
        }
    }

    async fn apply_one(
        &self,
        graph: &StackGraph,
        id: &LogicalId,
        prior: &HashMap<LogicalId, ResourceOutcome>,
    ) -> (LogicalId, ResourceOutcome) {
        let Some(node) = graph.node(id) else {
            let error = format!("{} is not in the graph", id);
            return (id.clone(), ResourceOutcome::Failed { error });
        };

        if let Some(blocker) = node
            .dependencies
            .iter()
            .find(|d| prior.get(*d).is_some_and(|o| o.blocks_dependents()))
        {
            tracing::warn!("skipping {}: {} did not apply", id, blocker);
            let outcome = ResourceOutcome::Skipped {
                blocked_by: blocker.clone(),
            };
            return (id.clone(), outcome);
        }

        let mut references = BTreeMap::new();
        for dependency in &node.dependencies {
            match self.state.record(dependency) {
                Some(record) => {
                    references.insert(dependency.clone(), record);
                }
                None => {
                    let error = EngineError::GraphResolution(format!(
                        "{} depends on {}, which is not provisioned",
                        id, dependency
                    ));
                    let outcome = ResourceOutcome::Failed {
                        error: error.to_string(),
                    };
                    return (id.clone(), outcome);
                }
            }
        }

        let fingerprint = effective_fingerprint(&node.fingerprint, &references);
        let existing = self.state.get(id);

        if let Some(entry) = existing.as_ref().filter(|e| e.fingerprint == fingerprint) {
            let outcome = match self
                .provider
                .describe(entry.record.kind, &entry.record.physical_id)
                .await
            {
                Ok(Some(live)) if live.fingerprint == entry.fingerprint => {
                    ResourceOutcome::Unchanged {
                        physical_id: entry.record.physical_id.clone(),
                    }
                }
                Ok(Some(_)) => ResourceOutcome::Drifted {
                    detail: format!("{} was modified outside the engine", entry.record.physical_id),
                },
                Ok(None) => ResourceOutcome::Drifted {
                    detail: format!("{} no longer exists", entry.record.physical_id),
                },
                Err(e) => ResourceOutcome::Failed {
                    error: e.to_string(),
                },
            };
            if let ResourceOutcome::Drifted { detail } = &outcome {
                tracing::warn!("drift on {}: {}", id, detail);
            }
            return (id.clone(), outcome);
        }

        let request = CreateRequest {
            stack: self.config.stack_name.clone(),
            logical_id: id.clone(),
            declaration: node.declaration.clone(),
            fingerprint: fingerprint.clone(),
            references,
        };
        match self.provider.create(request).await {
            Ok(record) => {
                let new = record.physical_id.clone();
                if let Some(old) = &existing {
                    self.state.retire(old.clone());
                }
                self.state
                    .insert(id.clone(), record, fingerprint, node.dependencies.clone());
                match existing {
                    Some(old) => {
                        tracing::info!("replaced {}: {} -> {}", id, old.record.physical_id, new);
                        let outcome = ResourceOutcome::Replaced {
                            old: old.record.physical_id,
                            new,
                        };
                        (id.clone(), outcome)
                    }
                    None => {
                        tracing::info!("created {}: {}", id, new);
                        (id.clone(), ResourceOutcome::Created { physical_id: new })
                    }
                }
            }
            Err(e) => {
                tracing::warn!("failed to create {}: {}", id, e);
                let outcome = ResourceOutcome::Failed {
                    error: e.to_string(),
                };
                (id.clone(), outcome)
            }
        }
    }

    /// Delete every provisioned resource, dependents first.
    ///
    /// Retired replacements still awaiting deletion go first, then
    /// resources no longer declared, then the graph's teardown order. Only
    /// current logical IDs are returned. Stops at the first failure; what
    /// was deleted so far is gone from state, the rest stays for a retry.
    pub async fn destroy(&self, graph: &StackGraph) -> Result<Vec<LogicalId>> {
        for entry in self.state.retired() {
            let physical_id = &entry.record.physical_id;
            match self.provider.delete(entry.record.kind, physical_id).await {
                Ok(()) => {
                    tracing::info!("destroyed retired {} ({})", entry.logical_id, physical_id)
                }
                Err(ProviderError::NotFound { .. }) => {
                    tracing::warn!("{} ({}) was already gone", entry.logical_id, physical_id)
                }
                Err(e) => return Err(e.into()),
            }
            self.state.forget_retired(physical_id);
        }

        let mut order: Vec<LogicalId> = graph.teardown_order().into_iter().cloned().collect();
        let mut orphans: Vec<StateEntry> = self
            .state
            .entries()
            .into_iter()
            .filter(|e| graph.node(&e.logical_id).is_none())
            .collect();
        orphans.sort_by_key(|e| std::cmp::Reverse(e.sequence));
        let mut all: Vec<LogicalId> = orphans.into_iter().map(|e| e.logical_id).collect();
        all.append(&mut order);

        let mut deleted = Vec::new();
        for id in all {
            let Some(entry) = self.state.get(&id) else {
                continue;
            };
            self.provider
                .delete(entry.record.kind, &entry.record.physical_id)
                .await?;
            self.state.remove(&id);
            tracing::info!("destroyed {} ({})", id, entry.record.physical_id);
            deleted.push(id);
        }
        Ok(deleted)
    }

    /// Compare state with what the provider reports.
    pub async fn detect_drift(&self, graph: &StackGraph) -> Result<Vec<DriftFinding>> {
        let mut findings = Vec::new();
        for id in graph.creation_order() {
            let Some(entry) = self.state.get(id) else {
                findings.push(DriftFinding {
                    logical_id: id.clone(),
                    kind: DriftKind::NotProvisioned,
                });
                continue;
            };
            let live = self
                .provider
                .describe(entry.record.kind, &entry.record.physical_id)
                .await?;
            let kind = match live {
                None => DriftKind::Missing,
                Some(live) if live.fingerprint != entry.fingerprint => DriftKind::Modified {
                    expected: entry.fingerprint.clone(),
                    actual: live.fingerprint,
                },
                Some(_) => continue,
            };
            findings.push(DriftFinding {
                logical_id: id.clone(),
                kind,
            });
        }
        Ok(findings)
    }

    /// Resolve the graph's named outputs against provisioned resources.
    pub fn outputs(&self, graph: &StackGraph) -> Result<BTreeMap<String, String>> {
        let mut outputs = BTreeMap::new();
        for (name, value) in graph.outputs() {
            let record = self.state.record(&value.resource.id).ok_or_else(|| {
                EngineError::GraphResolution(format!(
                    "output {} reads {}, which is not provisioned",
                    name, value.resource.id
                ))
            })?;
            let resolved = match value.attribute {
                Attribute::Ref => record.physical_id.to_string(),
                Attribute::Arn => record.arn.to_string(),
                Attribute::DnsName => record.dns_name.ok_or_else(|| {
                    EngineError::GraphResolution(format!(
                        "{} has no DNS name",
                        value.resource.id
                    ))
                })?,
            };
            outputs.insert(name.clone(), resolved);
        }
        Ok(outputs)
    }
}
