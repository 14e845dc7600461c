//! Target selection.
//!
//! Resolves a [`TargetSelector`] against a snapshot of live instances. Only
//! members of the selector's pool are candidates; among those, an instance
//! matches when its state is in the state filter and it carries every
//! required tag.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;

use stack_types::{InstanceState, PhysicalId, SelectionMode, TargetSelector};

/// What the selector sees of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceSnapshot {
    /// Instance ID.
    pub id: PhysicalId,
    /// Pool the instance belongs to, if any.
    pub pool: Option<PhysicalId>,
    /// Lifecycle state.
    pub state: InstanceState,
    /// Instance tags.
    pub tags: BTreeMap<String, String>,
}

/// Whether `instance` is a candidate for `selector` in `pool`.
pub fn matches(selector: &TargetSelector, pool: &PhysicalId, instance: &InstanceSnapshot) -> bool {
    instance.pool.as_ref() == Some(pool)
        && selector.state_filter.contains(&instance.state)
        && selector
            .resource_tags
            .iter()
            .all(|(k, v)| instance.tags.get(k) == Some(v))
}

/// Pick the instances the action applies to.
///
/// `All` keeps snapshot order. `Count(n)` and `Percent(p)` pick a random
/// subset; percentages round down.
pub fn select<R: Rng + ?Sized>(
    selector: &TargetSelector,
    pool: &PhysicalId,
    instances: &[InstanceSnapshot],
    rng: &mut R,
) -> Vec<InstanceSnapshot> {
    let mut matched: Vec<InstanceSnapshot> = instances
        .iter()
        .filter(|i| matches(selector, pool, i))
        .cloned()
        .collect();

    let keep = match selector.selection_mode {
        SelectionMode::All => return matched,
        SelectionMode::Count(n) => n as usize,
        SelectionMode::Percent(p) => matched.len() * usize::from(p.min(100)) / 100,
    };
    matched.shuffle(rng);
    matched.truncate(keep);
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use stack_types::{ComputePool, GraphId, Handle, LogicalId};

    fn selector() -> TargetSelector {
        let pool: Handle<ComputePool> =
            Handle::issue(GraphId::new(), LogicalId::new("ASG").unwrap());
        TargetSelector::running_instances(&pool, "chaos:target", "true")
    }

    fn instance(
        id: &str,
        pool: Option<&str>,
        state: InstanceState,
        tagged: bool,
    ) -> InstanceSnapshot {
        let mut tags = BTreeMap::new();
        if tagged {
            tags.insert("chaos:target".to_string(), "true".to_string());
        }
        tags.insert("Name".to_string(), id.to_string());
        InstanceSnapshot {
            id: PhysicalId::new(id),
            pool: pool.map(PhysicalId::new),
            state,
            tags,
        }
    }

    fn fleet() -> Vec<InstanceSnapshot> {
        vec![
            instance("i-1", Some("asg-a"), InstanceState::Running, true),
            instance("i-2", Some("asg-a"), InstanceState::Pending, true),
            instance("i-3", Some("asg-a"), InstanceState::Running, false),
            instance("i-4", Some("asg-b"), InstanceState::Running, true),
            instance("i-5", None, InstanceState::Running, true),
            instance("i-6", Some("asg-a"), InstanceState::Running, true),
            instance("i-7", Some("asg-a"), InstanceState::ShuttingDown, true),
        ]
    }

    #[test]
    fn all_matches_running_tagged_pool_members() {
        let mut rng = StdRng::seed_from_u64(7);
        let picked = select(&selector(), &PhysicalId::new("asg-a"), &fleet(), &mut rng);
        let ids: Vec<&str> = picked.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i-1", "i-6"]);
    }

    #[test]
    fn tag_value_must_match() {
        let mut other = instance("i-9", Some("asg-a"), InstanceState::Running, false);
        other.tags.insert("chaos:target".into(), "false".into());
        assert!(!matches(&selector(), &PhysicalId::new("asg-a"), &other));
    }

    #[test]
    fn count_picks_subset_of_matches() {
        let mut rng = StdRng::seed_from_u64(1);
        let sel = selector().selection_mode(SelectionMode::Count(1));
        let picked = select(&sel, &PhysicalId::new("asg-a"), &fleet(), &mut rng);
        assert_eq!(picked.len(), 1);
        assert!(["i-1", "i-6"].contains(&picked[0].id.as_str()));
    }

    #[test]
    fn count_larger_than_matches_takes_all() {
        let mut rng = StdRng::seed_from_u64(1);
        let sel = selector().selection_mode(SelectionMode::Count(10));
        assert_eq!(select(&sel, &PhysicalId::new("asg-a"), &fleet(), &mut rng).len(), 2);
    }

    #[test]
    fn percent_rounds_down() {
        let mut rng = StdRng::seed_from_u64(1);
        let pool = PhysicalId::new("asg-a");
        let half = selector().selection_mode(SelectionMode::Percent(50));
        assert_eq!(select(&half, &pool, &fleet(), &mut rng).len(), 1);
        let third = selector().selection_mode(SelectionMode::Percent(33));
        assert_eq!(select(&third, &pool, &fleet(), &mut rng).len(), 0);
    }

    #[test]
    fn empty_pool_matches_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select(&selector(), &PhysicalId::new("asg-z"), &fleet(), &mut rng).is_empty());
    }
}
