use std::collections::HashMap;

use crate::error::UrningsError;
use crate::rules::{Draw, Proposal};

/// How `Session::play` schedules matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum PlayMode {
    /// One match per iteration with a random player.
    #[default]
    Random,
    /// Every player plays once per iteration, in roster order.
    Test,
}

/// What happened in a single match transaction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchOutcome {
    /// Caller ID of the player.
    pub player: i64,
    /// Caller ID of the item.
    pub item: i64,
    pub draw: Draw,
    pub proposal: Proposal,
    /// `min(1, metropolis * adaptivity)`.
    pub acceptance: f64,
    pub accepted: bool,
    /// Player score change clamped to {-1, 0, 1}.
    pub player_delta: i8,
    /// Item score change clamped to {-1, 0, 1}, before any paired update.
    pub item_delta: i8,
}

/// Maps between caller-provided i64 IDs and internal 0..N positions.
#[derive(Debug, Clone)]
pub(crate) struct IdMap {
    ids: Vec<i64>,
    id_to_idx: HashMap<i64, usize>,
}

impl IdMap {
    pub fn from_ids(kind: &'static str, ids: impl IntoIterator<Item = i64>) -> Result<Self, UrningsError> {
        let ids: Vec<i64> = ids.into_iter().collect();
        let mut id_to_idx = HashMap::with_capacity(ids.len());
        for (idx, &id) in ids.iter().enumerate() {
            if id_to_idx.insert(id, idx).is_some() {
                return Err(UrningsError::DuplicateId { kind, id });
            }
        }
        Ok(IdMap { ids, id_to_idx })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn to_idx(&self, id: i64) -> Option<usize> {
        self.id_to_idx.get(&id).copied()
    }

    pub fn to_id(&self, idx: usize) -> i64 {
        self.ids[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_map_round_trip() {
        let map = IdMap::from_ids("item", [100, -5, 42]).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.to_idx(-5), Some(1));
        assert_eq!(map.to_id(2), 42);
        assert_eq!(map.to_idx(7), None);
    }

    #[test]
    fn test_id_map_rejects_duplicates() {
        let err = IdMap::from_ids("player", [1, 2, 1]).unwrap_err();
        assert_eq!(err, UrningsError::DuplicateId { kind: "player", id: 1 });
    }
}
