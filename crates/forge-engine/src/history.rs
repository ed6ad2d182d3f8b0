//! Per-match ring buffer of recorded snapshots, plus delta computation
//! between any two of them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::snapshot::MatchSnapshot;

/// A component's changed values between two snapshots, restricted to
/// entities present in both -- an entity that only appears in one snapshot
/// is reported via [`SnapshotDelta::added_entities`] /
/// [`SnapshotDelta::removed_entities`] instead, not folded in here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDelta {
    pub name: String,
    pub changed: Vec<(u64, f32)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDelta {
    pub name: String,
    pub components: Vec<ComponentDelta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDelta {
    pub match_id: String,
    pub from_tick: u64,
    pub to_tick: u64,
    /// Entity ids present in `to` but not `from`, across every module,
    /// ascending.
    pub added_entities: Vec<u64>,
    /// Entity ids present in `from` but not `to`, across every module,
    /// ascending.
    pub removed_entities: Vec<u64>,
    pub modules: Vec<ModuleDelta>,
    pub change_count: usize,
    /// Fraction of the `to` snapshot's values that changed; 0.0 means the
    /// delta is empty and could compress away entirely, 1.0 means nothing
    /// could be elided.
    pub compression_ratio: f64,
}

/// `NaN` compares equal to itself here, unlike `==`: a cell that is "no
/// value" in both snapshots is unchanged, not a perpetual diff.
pub fn values_equal(a: f32, b: f32) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Bounded, per-match history of recorded snapshots. The oldest entry is
/// evicted once `max_snapshots` is exceeded.
pub struct SnapshotHistory {
    max_snapshots: usize,
    buffer: RwLock<VecDeque<MatchSnapshot>>,
}

impl SnapshotHistory {
    pub fn new(max_snapshots: usize) -> Self {
        Self { max_snapshots, buffer: RwLock::new(VecDeque::new()) }
    }

    pub fn record(&self, snapshot: MatchSnapshot) {
        let mut buffer = self.buffer.write().expect("snapshot history lock poisoned");
        buffer.push_back(snapshot);
        while buffer.len() > self.max_snapshots {
            buffer.pop_front();
        }
    }

    pub fn get(&self, tick: u64) -> Option<MatchSnapshot> {
        self.buffer
            .read()
            .expect("snapshot history lock poisoned")
            .iter()
            .find(|s| s.tick == tick)
            .cloned()
    }

    /// Every recorded snapshot with `from_tick <= tick <= to_tick`, in
    /// ascending tick order.
    pub fn range(&self, from_tick: u64, to_tick: u64) -> Vec<MatchSnapshot> {
        self.buffer
            .read()
            .expect("snapshot history lock poisoned")
            .iter()
            .filter(|s| s.tick >= from_tick && s.tick <= to_tick)
            .cloned()
            .collect()
    }

    pub fn latest(&self) -> Option<MatchSnapshot> {
        self.buffer.read().expect("snapshot history lock poisoned").back().cloned()
    }

    pub fn clear(&self) {
        self.buffer.write().expect("snapshot history lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.read().expect("snapshot history lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute the delta between two recorded ticks. Both must still be
    /// present in the ring buffer.
    pub fn delta(&self, from_tick: u64, to_tick: u64) -> Result<SnapshotDelta, EngineError> {
        let from = self
            .get(from_tick)
            .ok_or_else(|| EngineError::NotFound { detail: format!("no snapshot recorded at tick {from_tick}") })?;
        let to = self
            .get(to_tick)
            .ok_or_else(|| EngineError::NotFound { detail: format!("no snapshot recorded at tick {to_tick}") })?;
        Ok(compute_delta(&from, &to))
    }
}

/// Diff two snapshots of the same match. Entity identity is tracked
/// separately from value changes: [`SnapshotDelta::added_entities`] and
/// [`SnapshotDelta::removed_entities`] cover entities that appear in only
/// one snapshot, so per-component `changed` entries only ever compare
/// entities present in both. `NaN`-to-`NaN` is unchanged; `NaN`-to-finite
/// (or back) counts as a change.
pub fn compute_delta(from: &MatchSnapshot, to: &MatchSnapshot) -> SnapshotDelta {
    let from_entities: HashSet<u64> = from.modules.iter().flat_map(|m| m.entity_ids.iter().copied()).collect();
    let to_entities: HashSet<u64> = to.modules.iter().flat_map(|m| m.entity_ids.iter().copied()).collect();

    let mut added_entities: Vec<u64> = to_entities.difference(&from_entities).copied().collect();
    added_entities.sort_unstable();
    let mut removed_entities: Vec<u64> = from_entities.difference(&to_entities).copied().collect();
    removed_entities.sort_unstable();

    let mut modules = Vec::new();
    let mut change_count = 0usize;
    let mut total_to_values = 0usize;

    let from_modules: HashMap<&str, &crate::snapshot::ModuleSnapshot> =
        from.modules.iter().map(|m| (m.name.as_str(), m)).collect();

    for to_module in &to.modules {
        let from_module = from_modules.get(to_module.name.as_str());
        let to_by_id: HashMap<u64, usize> =
            to_module.entity_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let from_by_id: HashMap<u64, usize> = from_module
            .map(|m| m.entity_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect())
            .unwrap_or_default();

        let mut components = Vec::new();
        for to_component in &to_module.components {
            total_to_values += to_component.values.len();
            let from_component = from_module.and_then(|m| m.components.iter().find(|c| c.name == to_component.name));

            let mut changed = Vec::new();
            for (&id, &to_idx) in &to_by_id {
                let Some(&from_idx) = from_by_id.get(&id) else { continue };
                let Some(from_component) = from_component else { continue };
                let to_v = to_component.values[to_idx];
                let from_v = from_component.values[from_idx];
                if !values_equal(from_v, to_v) {
                    changed.push((id, to_v));
                }
            }
            changed.sort_by_key(|(id, _)| *id);
            change_count += changed.len();
            components.push(ComponentDelta { name: to_component.name.clone(), changed });
        }
        modules.push(ModuleDelta { name: to_module.name.clone(), components });
    }

    let compression_ratio = if total_to_values == 0 {
        0.0
    } else {
        change_count as f64 / total_to_values as f64
    };

    SnapshotDelta {
        match_id: to.match_id.clone(),
        from_tick: from.tick,
        to_tick: to.tick,
        added_entities,
        removed_entities,
        modules,
        change_count,
        compression_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ComponentSnapshot, ModuleSnapshot};

    fn snap(tick: u64, values: Vec<(u64, f32)>) -> MatchSnapshot {
        let entity_ids: Vec<u64> = values.iter().map(|(id, _)| *id).collect();
        let values: Vec<f32> = values.iter().map(|(_, v)| *v).collect();
        MatchSnapshot {
            match_id: "m1".to_owned(),
            tick,
            modules: vec![ModuleSnapshot {
                name: "physics".to_owned(),
                entity_ids,
                components: vec![ComponentSnapshot { name: "x".to_owned(), values }],
            }],
        }
    }

    #[test]
    fn record_evicts_oldest_past_capacity() {
        let history = SnapshotHistory::new(2);
        history.record(snap(1, vec![]));
        history.record(snap(2, vec![]));
        history.record(snap(3, vec![]));
        assert_eq!(history.len(), 2);
        assert!(history.get(1).is_none());
        assert!(history.get(3).is_some());
    }

    #[test]
    fn range_is_inclusive_and_ascending() {
        let history = SnapshotHistory::new(10);
        for t in 1..=5 {
            history.record(snap(t, vec![]));
        }
        let ticks: Vec<u64> = history.range(2, 4).iter().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
    }

    #[test]
    fn delta_tracks_added_removed_entities_separately_from_value_changes() {
        let from = snap(1, vec![(1, 1.0), (2, 2.0)]);
        let to = snap(2, vec![(1, 1.0), (2, 9.0), (3, 3.0)]);
        let delta = compute_delta(&from, &to);

        // Entity 3 is new -- it shows up as an added entity, not a component change.
        assert_eq!(delta.added_entities, vec![3]);
        assert!(delta.removed_entities.is_empty());

        let component = &delta.modules[0].components[0];
        assert_eq!(component.changed, vec![(2, 9.0)]);
        assert_eq!(delta.change_count, 1);
    }

    #[test]
    fn delta_reports_removed_entities() {
        let from = snap(1, vec![(1, 1.0), (2, 2.0)]);
        let to = snap(2, vec![(1, 1.0)]);
        let delta = compute_delta(&from, &to);

        assert_eq!(delta.removed_entities, vec![2]);
        assert!(delta.added_entities.is_empty());
        assert_eq!(delta.modules[0].components[0].changed, Vec::new());
    }

    #[test]
    fn nan_to_nan_is_not_a_change_but_nan_to_finite_is() {
        let from = snap(1, vec![(1, f32::NAN), (2, 1.0)]);
        let to = snap(2, vec![(1, f32::NAN), (2, f32::NAN)]);
        let delta = compute_delta(&from, &to);

        assert_eq!(delta.modules[0].components[0].changed.len(), 1);
        assert_eq!(delta.modules[0].components[0].changed[0].0, 2);
        assert!(delta.modules[0].components[0].changed[0].1.is_nan());
    }

    #[test]
    fn unchanged_snapshot_has_zero_delta() {
        let from = snap(1, vec![(1, 1.0)]);
        let to = snap(2, vec![(1, 1.0)]);
        let delta = compute_delta(&from, &to);
        assert_eq!(delta.change_count, 0);
        assert_eq!(delta.compression_ratio, 0.0);
    }

    #[test]
    fn history_delta_rejects_missing_tick() {
        let history = SnapshotHistory::new(10);
        history.record(snap(1, vec![]));
        let err = history.delta(1, 2).unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }
}
