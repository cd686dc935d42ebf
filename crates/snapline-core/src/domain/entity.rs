use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KeyError;

const MAX_ENTITY_ID_LEN: usize = 64;

/// Opaque identifier of a player or team as the upstreams report it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Parse an entity identifier, trimming surrounding whitespace.
    pub fn parse(input: &str) -> Result<Self, KeyError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(KeyError::EmptyEntityId);
        }

        let len = trimmed.chars().count();
        if len > MAX_ENTITY_ID_LEN {
            return Err(KeyError::EntityIdTooLong {
                len,
                max: MAX_ENTITY_ID_LEN,
            });
        }

        for (index, ch) in trimmed.chars().enumerate() {
            let valid = ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.');
            if !valid {
                return Err(KeyError::EntityIdInvalidChar { ch, index });
            }
        }

        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for EntityId {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for EntityId {
    type Error = KeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EntityId> for String {
    fn from(value: EntityId) -> Self {
        value.0
    }
}

/// Roster category of an entity. Drives which data kinds apply and which
/// estimate row is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Position {
    Qb,
    Rb,
    Wr,
    Te,
    K,
    Def,
    Other,
}

impl Position {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Qb => "QB",
            Self::Rb => "RB",
            Self::Wr => "WR",
            Self::Te => "TE",
            Self::K => "K",
            Self::Def => "DEF",
            Self::Other => "OTHER",
        }
    }

    /// Offensive skill positions, the only ones snap share and usage are tracked for.
    pub const fn is_skill(self) -> bool {
        matches!(self, Self::Qb | Self::Rb | Self::Wr | Self::Te)
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = KeyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "QB" => Ok(Self::Qb),
            "RB" | "FB" => Ok(Self::Rb),
            "WR" => Ok(Self::Wr),
            "TE" => Ok(Self::Te),
            "K" | "PK" => Ok(Self::K),
            "DEF" | "DST" | "D/ST" => Ok(Self::Def),
            "OTHER" => Ok(Self::Other),
            other => Err(KeyError::InvalidPosition {
                value: other.to_owned(),
            }),
        }
    }
}

/// An entity together with the structural attributes the estimate tier needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub position: Position,
    /// 1-based depth-chart rank, when known.
    pub depth_rank: Option<u8>,
}

impl Entity {
    pub fn new(id: EntityId, position: Position) -> Self {
        Self {
            id,
            position,
            depth_rank: None,
        }
    }

    pub fn with_depth_rank(mut self, rank: u8) -> Self {
        self.depth_rank = Some(rank);
        self
    }
}
