//! Heuristic estimates keyed by `(kind, position, depth rank)`.
//!
//! The table is data, not code: ranks beyond those listed fall back to the
//! position's default, and anything else has no estimate.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::domain::{DataKind, Entity, Position};

#[derive(Debug, Clone, Default)]
pub struct EstimateTable {
    by_rank: HashMap<(DataKind, Position, u8), Value>,
    position_default: HashMap<(DataKind, Position), Value>,
}

impl EstimateTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Typical offensive snap share by depth-chart slot.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        let snap_shares: [(Position, &[f64]); 4] = [
            (Position::Qb, &[98.0, 2.0]),
            (Position::Rb, &[70.0, 35.0, 15.0]),
            (Position::Wr, &[88.0, 80.0, 65.0, 30.0]),
            (Position::Te, &[78.0, 35.0, 12.0]),
        ];
        for (position, shares) in snap_shares {
            for (index, share) in shares.iter().enumerate() {
                table = table.with_entry(DataKind::SnapPct, position, index as u8 + 1, json!(share));
            }
        }

        table
            .with_default(DataKind::SnapPct, Position::Qb, json!(0.0))
            .with_default(DataKind::SnapPct, Position::Rb, json!(5.0))
            .with_default(DataKind::SnapPct, Position::Wr, json!(10.0))
            .with_default(DataKind::SnapPct, Position::Te, json!(5.0))
    }

    pub fn with_entry(mut self, kind: DataKind, position: Position, rank: u8, value: Value) -> Self {
        self.by_rank.insert((kind, position, rank), value);
        self
    }

    pub fn with_default(mut self, kind: DataKind, position: Position, value: Value) -> Self {
        self.position_default.insert((kind, position), value);
        self
    }

    /// Entities without a depth rank have no estimate.
    pub fn lookup(&self, kind: DataKind, entity: &Entity) -> Option<Value> {
        let rank = entity.depth_rank?;
        self.by_rank
            .get(&(kind, entity.position, rank))
            .or_else(|| self.position_default.get(&(kind, entity.position)))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.by_rank.len() + self.position_default.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityId;

    fn entity(position: Position, rank: Option<u8>) -> Entity {
        let entity = Entity::new(EntityId::parse("x1").expect("valid id"), position);
        match rank {
            Some(rank) => entity.with_depth_rank(rank),
            None => entity,
        }
    }

    #[test]
    fn ranked_lookup_and_position_default() {
        let table = EstimateTable::standard();
        assert_eq!(table.lookup(DataKind::SnapPct, &entity(Position::Rb, Some(1))), Some(json!(70.0)));
        assert_eq!(table.lookup(DataKind::SnapPct, &entity(Position::Rb, Some(6))), Some(json!(5.0)));
    }

    #[test]
    fn missing_rank_or_kind_has_no_estimate() {
        let table = EstimateTable::standard();
        assert_eq!(table.lookup(DataKind::SnapPct, &entity(Position::Wr, None)), None);
        assert_eq!(table.lookup(DataKind::SnapPct, &entity(Position::K, Some(1))), None);
        assert_eq!(table.lookup(DataKind::PracticeStatus, &entity(Position::Rb, Some(1))), None);
    }
}
