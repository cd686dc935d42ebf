use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::KeyError;

const MIN_SEASON: u16 = 1920;
const MAX_WEEK: u8 = 23;

/// A season/week pair. Every cached fact belongs to exactly one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawPeriod", into = "RawPeriod")]
pub struct Period {
    season: u16,
    week: u8,
}

impl Period {
    pub fn new(season: u16, week: u8) -> Result<Self, KeyError> {
        if season < MIN_SEASON {
            return Err(KeyError::InvalidSeason { season });
        }
        if week == 0 || week > MAX_WEEK {
            return Err(KeyError::InvalidWeek {
                week,
                max: MAX_WEEK,
            });
        }
        Ok(Self { season, week })
    }

    pub const fn season(self) -> u16 {
        self.season
    }

    pub const fn week(self) -> u8 {
        self.week
    }

    /// The preceding week of the same season. Week 1 has no predecessor:
    /// the prior season's final week describes a different roster.
    pub fn prior(self) -> Option<Self> {
        if self.week > 1 {
            Some(Self {
                season: self.season,
                week: self.week - 1,
            })
        } else {
            None
        }
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:w{:02}", self.season, self.week)
    }
}

#[derive(Serialize, Deserialize)]
struct RawPeriod {
    season: u16,
    week: u8,
}

impl TryFrom<RawPeriod> for Period {
    type Error = KeyError;

    fn try_from(value: RawPeriod) -> Result<Self, Self::Error> {
        Self::new(value.season, value.week)
    }
}

impl From<Period> for RawPeriod {
    fn from(value: Period) -> Self {
        Self {
            season: value.season,
            week: value.week,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prior_steps_back_one_week() {
        let period = Period::new(2024, 8).expect("valid period");
        assert_eq!(period.prior(), Some(Period::new(2024, 7).expect("valid")));
    }

    #[test]
    fn week_one_has_no_prior() {
        let period = Period::new(2024, 1).expect("valid period");
        assert_eq!(period.prior(), None);
    }

    #[test]
    fn rejects_week_zero() {
        let err = Period::new(2024, 0).expect_err("must fail");
        assert!(matches!(err, KeyError::InvalidWeek { week: 0, .. }));
    }

    #[test]
    fn deserialization_validates() {
        let err = serde_json::from_str::<Period>(r#"{"season":2024,"week":40}"#);
        assert!(err.is_err());
    }
}
