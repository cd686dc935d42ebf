use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::Position;
use crate::error::KeyError;

/// Kind of cached fact. Each kind has its own validator, staleness budget
/// and record cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Schedule,
    SnapPct,
    PracticeStatus,
    Usage,
}

impl DataKind {
    pub const ALL: [Self; 4] = [
        Self::Schedule,
        Self::SnapPct,
        Self::PracticeStatus,
        Self::Usage,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::SnapPct => "snap_pct",
            Self::PracticeStatus => "practice_status",
            Self::Usage => "usage",
        }
    }

    /// Whether last week's value is a meaningful stand-in for this week's.
    pub const fn supports_prior_period(self) -> bool {
        matches!(self, Self::SnapPct | Self::Usage)
    }

    /// Whether facts of this kind exist at all for the given roster category.
    pub const fn applies_to(self, position: Position) -> bool {
        match self {
            Self::Schedule | Self::PracticeStatus => true,
            Self::SnapPct | Self::Usage => position.is_skill(),
        }
    }
}

impl Display for DataKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = KeyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "schedule" => Ok(Self::Schedule),
            "snap_pct" | "snap_counts" => Ok(Self::SnapPct),
            "practice_status" | "practice_report" | "injuries" => Ok(Self::PracticeStatus),
            "usage" | "usage_stats" => Ok(Self::Usage),
            other => Err(KeyError::InvalidKind {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_share_does_not_apply_to_kickers() {
        assert!(!DataKind::SnapPct.applies_to(Position::K));
        assert!(DataKind::SnapPct.applies_to(Position::Te));
        assert!(DataKind::PracticeStatus.applies_to(Position::K));
    }

    #[test]
    fn parses_endpoint_style_aliases() {
        assert_eq!("snap-counts".parse::<DataKind>().expect("alias"), DataKind::SnapPct);
        assert_eq!("injuries".parse::<DataKind>().expect("alias"), DataKind::PracticeStatus);
    }
}
