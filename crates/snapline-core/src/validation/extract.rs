//! Ordered field extractors.
//!
//! Upstreams name the same field differently (`player_id` vs `gsis_id`,
//! `offense_pct` vs `snap_pct`). Each logical field is read through a list
//! of extractors tried in priority order; the first non-absent value wins.

use serde_json::{Map, Value};

/// One record as the validators see it: the map key (for keyed-map
/// payloads) and the record's own fields.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    pub key: Option<&'a str>,
    pub fields: &'a Map<String, Value>,
}

impl<'a> RecordView<'a> {
    pub fn new(key: Option<&'a str>, fields: &'a Map<String, Value>) -> Self {
        Self { key, fields }
    }

    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.fields.get(name).filter(|value| !value.is_null())
    }

    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_owned())
            }
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        let value = match self.get(name)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        value.is_finite().then_some(value)
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            Value::Bool(flag) => Some(*flag),
            Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" | "home" => Some(true),
                "false" | "no" | "n" | "0" | "away" => Some(false),
                _ => None,
            },
            Value::Number(number) => number.as_u64().map(|n| n != 0),
            _ => None,
        }
    }
}

/// Where an extracted value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// Read directly from an upstream field.
    Reported,
    /// Derived from other upstream fields.
    Computed,
}

/// An extracted value plus its derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    pub value: T,
    pub derivation: Derivation,
}

impl<T> Extracted<T> {
    pub fn reported(value: T) -> Self {
        Self {
            value,
            derivation: Derivation::Reported,
        }
    }

    pub fn computed(value: T) -> Self {
        Self {
            value,
            derivation: Derivation::Computed,
        }
    }
}

pub type Extractor<T> = fn(&RecordView<'_>) -> Option<Extracted<T>>;

/// Evaluate extractors in order and stop at the first hit.
pub fn first_present<T>(record: &RecordView<'_>, extractors: &[Extractor<T>]) -> Option<Extracted<T>> {
    extractors.iter().find_map(|extract| extract(record))
}

/// Text from the first of `names` that is present.
pub fn text_field(record: &RecordView<'_>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| record.text(name))
}

/// Number from the first of `names` that is present.
pub fn number_field(record: &RecordView<'_>, names: &[&str]) -> Option<f64> {
    names.iter().find_map(|name| record.number(name))
}

/// Integral number within `u16` from the first of `names`.
pub fn u16_field(record: &RecordView<'_>, names: &[&str]) -> Option<u16> {
    number_field(record, names)
        .filter(|value| value.fract() == 0.0 && *value >= 0.0 && *value <= f64::from(u16::MAX))
        .map(|value| value as u16)
}

/// Integral number within `u8` from the first of `names`.
pub fn u8_field(record: &RecordView<'_>, names: &[&str]) -> Option<u8> {
    number_field(record, names)
        .filter(|value| value.fract() == 0.0 && *value >= 0.0 && *value <= f64::from(u8::MAX))
        .map(|value| value as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test fixture must be an object"),
        }
    }

    #[test]
    fn first_present_respects_priority() {
        let fields = as_map(json!({ "snap_pct": 55.0, "offense_pct": 0.61 }));
        let record = RecordView::new(None, &fields);
        let extractors: [Extractor<f64>; 2] = [
            |r| r.number("offense_pct").map(|v| Extracted::reported(v * 100.0)),
            |r| r.number("snap_pct").map(Extracted::reported),
        ];

        let hit = first_present(&record, &extractors).expect("present");
        assert!((hit.value - 61.0).abs() < 1e-9);
    }

    #[test]
    fn numbers_parse_from_strings_and_nulls_are_absent() {
        let fields = as_map(json!({ "season": "2024", "week": null, "bad": "NaN" }));
        let record = RecordView::new(None, &fields);

        assert_eq!(u16_field(&record, &["season"]), Some(2024));
        assert_eq!(u8_field(&record, &["week"]), None);
        assert_eq!(record.number("bad"), None);
    }
}
