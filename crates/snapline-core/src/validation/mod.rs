//! # Response Validation
//!
//! Every upstream payload passes through the validator for its
//! [`DataKind`] before anything is written to the cache.
//!
//! | Check | Failure effect |
//! |-------|----------------|
//! | Container type (list vs keyed map) | `invalid` |
//! | Identity fields (entity, period) | record dropped; all dropped is `invalid` |
//! | Primary-metric coverage below threshold | `valid_with_warning` |
//! | Unknown status/enum values | message only |
//!
//! `invalid` payloads are never cached. `valid_with_warning` payloads are
//! cached with `quality = partial`.

mod extract;
mod kinds;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::Quality;
use crate::domain::{DataKind, EntityId, Period};

pub use extract::{
    first_present, number_field, text_field, u16_field, u8_field, Derivation, Extracted,
    Extractor, RecordView,
};

use kinds::{profile_for, Container};

/// Validator verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Valid,
    ValidWithWarning,
    Invalid,
}

impl ValidationOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::ValidWithWarning => "valid_with_warning",
            Self::Invalid => "invalid",
        }
    }
}

/// Outcome plus diagnostics for one payload. Computed per call, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub outcome: ValidationOutcome,
    pub messages: Vec<String>,
    /// Fraction of sampled records that carry the kind's primary metric.
    pub coverage: Option<f64>,
}

impl ValidationResult {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            outcome: ValidationOutcome::Invalid,
            messages: vec![message.into()],
            coverage: None,
        }
    }

    pub const fn is_cacheable(&self) -> bool {
        !matches!(self.outcome, ValidationOutcome::Invalid)
    }

    /// Quality marker for records cached from this payload.
    pub const fn quality(&self) -> Option<Quality> {
        match self.outcome {
            ValidationOutcome::Valid => Some(Quality::Full),
            ValidationOutcome::ValidWithWarning => Some(Quality::Partial),
            ValidationOutcome::Invalid => None,
        }
    }
}

/// One record that passed identity checks and carries the primary metric.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub entity: EntityId,
    pub period: Period,
    pub value: Value,
    pub derivation: Derivation,
}

/// Validator output: the verdict and the records worth caching.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBatch {
    pub result: ValidationResult,
    pub records: Vec<NormalizedRecord>,
}

impl ValidatedBatch {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            result: ValidationResult::invalid(message),
            records: Vec::new(),
        }
    }
}

/// Thresholds for one kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationRules {
    pub coverage_threshold: f64,
    /// Records inspected for the coverage ratio.
    pub sample_size: usize,
}

impl ValidationRules {
    pub const DEFAULT_SAMPLE_SIZE: usize = 200;

    pub const fn default_for(kind: DataKind) -> Self {
        let coverage_threshold = match kind {
            DataKind::Schedule | DataKind::Usage => 0.5,
            DataKind::SnapPct | DataKind::PracticeStatus => 0.3,
        };
        Self {
            coverage_threshold,
            sample_size: Self::DEFAULT_SAMPLE_SIZE,
        }
    }
}

/// Validate a decoded payload for `kind`.
///
/// `requested` is the period the payload was fetched for; kinds whose
/// records do not carry their own period (keyed-map stat lines) inherit it.
pub fn validate(
    kind: DataKind,
    payload: &Value,
    requested: Period,
    rules: &ValidationRules,
) -> ValidatedBatch {
    let profile = profile_for(kind);

    let items: Vec<(Option<&str>, &Value)> = match (profile.container, payload) {
        (Container::List, Value::Array(items)) => items.iter().map(|item| (None, item)).collect(),
        (Container::KeyedMap, Value::Object(map)) => map
            .iter()
            .map(|(key, item)| (Some(key.as_str()), item))
            .collect(),
        (container, other) => {
            return ValidatedBatch::rejected(format!(
                "{kind} payload must be a JSON {}, got {}",
                container.label(),
                json_type(other)
            ));
        }
    };

    if items.is_empty() {
        return ValidatedBatch::rejected(format!("{kind} payload contains no records"));
    }

    let total = items.len();
    let mut dropped = 0_usize;
    let mut unknown_values = BTreeSet::new();
    let mut kept = Vec::with_capacity(total);

    for (key, item) in items {
        let Value::Object(fields) = item else {
            dropped += 1;
            continue;
        };
        let record = RecordView::new(key, fields);

        let entity = match (profile.entity_from_key, record.key) {
            (true, Some(key)) => EntityId::parse(key).ok(),
            _ => text_field(&record, profile.entity_fields).and_then(|raw| EntityId::parse(&raw).ok()),
        };
        let period = if profile.period_from_request {
            Some(requested)
        } else {
            match (
                u16_field(&record, &["season", "season_year"]),
                u8_field(&record, &["week", "week_num"]),
            ) {
                (Some(season), Some(week)) => Period::new(season, week).ok(),
                _ => None,
            }
        };

        let (Some(entity), Some(period)) = (entity, period) else {
            dropped += 1;
            continue;
        };

        if let Some(check) = profile.enum_check {
            if let Some(raw) = text_field(&record, check.fields) {
                let normalized = raw.to_ascii_uppercase();
                if !check.known.contains(&normalized.as_str()) {
                    unknown_values.insert(raw);
                }
            }
        }

        let primary = first_present(&record, profile.primary);
        kept.push((entity, period, primary));
    }

    if kept.is_empty() {
        return ValidatedBatch::rejected(format!(
            "all {total} {kind} records were missing identity fields"
        ));
    }

    let mut messages = Vec::new();
    if dropped > 0 {
        messages.push(format!(
            "dropped {dropped} of {total} {kind} records missing identity fields"
        ));
    }
    if let Some(check) = profile.enum_check {
        if !unknown_values.is_empty() {
            let listed = unknown_values.into_iter().collect::<Vec<_>>().join(", ");
            messages.push(format!("unknown {} values: {listed}", check.label));
        }
    }

    let sample_len = kept.len().min(rules.sample_size.max(1));
    let with_primary = kept
        .iter()
        .take(sample_len)
        .filter(|(_, _, primary)| primary.is_some())
        .count();
    let coverage = with_primary as f64 / sample_len as f64;

    let outcome = if coverage < rules.coverage_threshold {
        messages.push(format!(
            "{kind} primary metric coverage {:.0}% is below the {:.0}% threshold",
            coverage * 100.0,
            rules.coverage_threshold * 100.0
        ));
        ValidationOutcome::ValidWithWarning
    } else {
        ValidationOutcome::Valid
    };

    let records = kept
        .into_iter()
        .filter_map(|(entity, period, primary)| {
            primary.map(|extracted| NormalizedRecord {
                entity,
                period,
                value: extracted.value,
                derivation: extracted.derivation,
            })
        })
        .collect();

    ValidatedBatch {
        result: ValidationResult {
            outcome,
            messages,
            coverage: Some(coverage),
        },
        records,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
