//! Resource state store.
//!
//! Maps each logical ID to the physical resource that currently stands in
//! for it, plus the fingerprint it was created from. Apply consults the
//! store to decide between create, keep and replace; it is persisted as a
//! JSON file between runs.
//!
//! A replaced resource moves to the retired list before its successor
//! takes over the logical ID, and leaves it only once the provider has
//! deleted it.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use stack_types::{LogicalId, PhysicalId};

use crate::error::Result;
use crate::provider::ResourceRecord;

/// Current state file format.
const STATE_VERSION: u32 = 1;

/// One provisioned resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Logical ID.
    pub logical_id: LogicalId,
    /// What the provider returned.
    pub record: ResourceRecord,
    /// Effective fingerprint: declaration plus resolved dependencies.
    pub fingerprint: String,
    /// Logical IDs the resource depended on when created.
    pub depends_on: Vec<LogicalId>,
    /// Creation sequence number; teardown runs in reverse.
    pub sequence: u64,
}

#[derive(Serialize, Deserialize)]
struct StateFile {
    version: u32,
    resources: Vec<StateEntry>,
    #[serde(default)]
    retired: Vec<StateEntry>,
}

/// Concurrent map of provisioned resources.
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    entries: Arc<DashMap<LogicalId, StateEntry>>,
    retired: Arc<DashMap<PhysicalId, StateEntry>>,
    sequence: Arc<AtomicU64>,
}

impl StateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a resource.
    pub fn get(&self, id: &LogicalId) -> Option<StateEntry> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    /// Record of a resource, if provisioned.
    pub fn record(&self, id: &LogicalId) -> Option<ResourceRecord> {
        self.entries.get(id).map(|e| e.record.clone())
    }

    /// Record a newly created resource, replacing any previous entry.
    pub fn insert(
        &self,
        logical_id: LogicalId,
        record: ResourceRecord,
        fingerprint: String,
        depends_on: Vec<LogicalId>,
    ) -> StateEntry {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = StateEntry {
            logical_id: logical_id.clone(),
            record,
            fingerprint,
            depends_on,
            sequence,
        };
        self.entries.insert(logical_id, entry.clone());
        entry
    }

    /// Forget a resource.
    pub fn remove(&self, id: &LogicalId) -> Option<StateEntry> {
        self.entries.remove(id).map(|(_, e)| e)
    }

    /// Number of provisioned resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is provisioned.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry, oldest first.
    pub fn entries(&self) -> Vec<StateEntry> {
        let mut entries: Vec<StateEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.sequence);
        entries
    }

    /// Keep a replaced resource until it is deleted.
    pub fn retire(&self, entry: StateEntry) {
        self.retired.insert(entry.record.physical_id.clone(), entry);
    }

    /// Replaced resources still awaiting deletion, newest first.
    pub fn retired(&self) -> Vec<StateEntry> {
        let mut retired: Vec<StateEntry> =
            self.retired.iter().map(|e| e.value().clone()).collect();
        retired.sort_by_key(|e| std::cmp::Reverse(e.sequence));
        retired
    }

    /// Drop a retired resource once the provider deleted it.
    pub fn forget_retired(&self, id: &PhysicalId) -> Option<StateEntry> {
        self.retired.remove(id).map(|(_, e)| e)
    }

    /// Load a store from a JSON file. A missing file is an empty store.
    pub async fn load(path: &Path) -> Result<Self> {
        let store = Self::new();
        if !path.exists() {
            return Ok(store);
        }
        let contents = tokio::fs::read_to_string(path).await?;
        let file: StateFile = serde_json::from_str(&contents)?;
        let mut highest = 0;
        for entry in file.resources {
            highest = highest.max(entry.sequence);
            store.entries.insert(entry.logical_id.clone(), entry);
        }
        for entry in file.retired {
            highest = highest.max(entry.sequence);
            store.retire(entry);
        }
        store.sequence.store(highest, Ordering::SeqCst);
        tracing::debug!(
            "loaded {} resources ({} retired) from {}",
            store.len(),
            store.retired.len(),
            path.display()
        );
        Ok(store)
    }

    /// Save the store as a JSON file.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let file = StateFile {
            version: STATE_VERSION,
            resources: self.entries(),
            retired: self.retired(),
        };
        let contents = serde_json::to_string_pretty(&file)?;
        tokio::fs::write(path, contents).await?;
        Ok(())
    }
}
