//! # Domain Keys
//!
//! Identifiers shared by the cache, the fallback resolver and the validators.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`EntityId`] | Validated player or team identifier |
//! | [`Entity`] | Entity plus position and depth rank |
//! | [`Period`] | Season/week pair with a prior-week step |
//! | [`DataKind`] | Kind tag of a cached fact |
//! | [`CacheKey`] | Composite `(entity, period, kind)` key |

mod entity;
mod kind;
mod period;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub use entity::{Entity, EntityId, Position};
pub use kind::DataKind;
pub use period::Period;

/// Identifies one cacheable fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub entity: EntityId,
    pub period: Period,
    pub kind: DataKind,
}

impl CacheKey {
    pub fn new(entity: EntityId, period: Period, kind: DataKind) -> Self {
        Self {
            entity,
            period,
            kind,
        }
    }

    /// Same entity and kind, different period.
    pub fn at_period(&self, period: Period) -> Self {
        Self {
            entity: self.entity.clone(),
            period,
            kind: self.kind,
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.entity, self.period)
    }
}
