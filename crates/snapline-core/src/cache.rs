//! In-memory record cache keyed by `(entity, period, kind)`.
//!
//! Records are never deleted; staleness is judged by the reader through
//! [`CacheStore::age`]. The only write rule is that an estimated record
//! never replaces an upstream or computed one.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::domain::{CacheKey, EntityId};

/// Origin of a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Upstream,
    Computed,
    Estimated,
}

impl RecordSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Computed => "computed",
            Self::Estimated => "estimated",
        }
    }

    /// Upstream and computed records are backed by real data.
    pub const fn is_observed(self) -> bool {
        !matches!(self, Self::Estimated)
    }
}

/// Completeness marker carried over from validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Full,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub value: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,
    pub source: RecordSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
}

impl CacheRecord {
    pub fn new(value: Value, source: RecordSource, quality: Option<Quality>) -> Self {
        Self {
            value,
            fetched_at: OffsetDateTime::now_utc(),
            source,
            quality,
        }
    }

    pub fn upstream(value: Value, quality: Quality) -> Self {
        Self::new(value, RecordSource::Upstream, Some(quality))
    }

    pub fn computed(value: Value, quality: Quality) -> Self {
        Self::new(value, RecordSource::Computed, Some(quality))
    }

    pub fn estimated(value: Value) -> Self {
        Self::new(value, RecordSource::Estimated, None)
    }

    pub fn with_fetched_at(mut self, fetched_at: OffsetDateTime) -> Self {
        self.fetched_at = fetched_at;
        self
    }

    /// Age relative to `now`. Clock skew that puts `fetched_at` in the
    /// future reads as zero.
    pub fn age_at(&self, now: OffsetDateTime) -> Duration {
        Duration::try_from(now - self.fetched_at).unwrap_or(Duration::ZERO)
    }
}

/// Result of a [`CacheStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Replaced,
    /// Estimated write over an observed record.
    Skipped,
}

/// One exported row, for handing the cache to an external store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRow {
    pub key: CacheKey,
    #[serde(flatten)]
    pub record: CacheRecord,
}

/// Concurrent record store.
///
/// Backed by a sharded map, so a write only locks its own shard and the
/// estimate check runs under the same entry lock as the write.
#[derive(Debug, Default)]
pub struct CacheStore {
    records: DashMap<CacheKey, CacheRecord>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheRecord> {
        self.records.get(key).map(|entry| entry.value().clone())
    }

    pub fn put(&self, key: CacheKey, record: CacheRecord) -> PutOutcome {
        match self.records.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                PutOutcome::Inserted
            }
            Entry::Occupied(mut occupied) => {
                if record.source == RecordSource::Estimated && occupied.get().source.is_observed() {
                    return PutOutcome::Skipped;
                }
                occupied.insert(record);
                PutOutcome::Replaced
            }
        }
    }

    /// Time since the record for `key` was fetched.
    pub fn age(&self, key: &CacheKey) -> Option<Duration> {
        self.age_at(key, OffsetDateTime::now_utc())
    }

    pub fn age_at(&self, key: &CacheKey, now: OffsetDateTime) -> Option<Duration> {
        self.records.get(key).map(|entry| entry.value().age_at(now))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every key cached for `entity`, sorted.
    pub fn keys_for_entity(&self, entity: &EntityId) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .records
            .iter()
            .filter(|entry| &entry.key().entity == entity)
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Snapshot of every record, sorted by key.
    pub fn export(&self) -> Vec<CacheRow> {
        let mut rows: Vec<CacheRow> = self
            .records
            .iter()
            .map(|entry| CacheRow {
                key: entry.key().clone(),
                record: entry.value().clone(),
            })
            .collect();
        rows.sort_by(|left, right| left.key.cmp(&right.key));
        rows
    }

    /// Load rows through [`CacheStore::put`], so imported estimates still
    /// yield to observed records already present.
    pub fn import(&self, rows: impl IntoIterator<Item = CacheRow>) -> usize {
        rows.into_iter()
            .map(|row| self.put(row.key, row.record))
            .filter(|outcome| *outcome != PutOutcome::Skipped)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataKind, Period};
    use serde_json::json;

    fn key(entity: &str, week: u8) -> CacheKey {
        CacheKey::new(
            EntityId::parse(entity).expect("valid entity"),
            Period::new(2024, week).expect("valid period"),
            DataKind::SnapPct,
        )
    }

    #[test]
    fn estimate_never_overwrites_upstream() {
        let store = CacheStore::new();
        let k = key("p1", 8);

        assert_eq!(store.put(k.clone(), CacheRecord::upstream(json!(64.0), Quality::Full)), PutOutcome::Inserted);
        assert_eq!(store.put(k.clone(), CacheRecord::estimated(json!(70.0))), PutOutcome::Skipped);

        let record = store.get(&k).expect("cached");
        assert_eq!(record.value, json!(64.0));
        assert_eq!(record.source, RecordSource::Upstream);
    }

    #[test]
    fn estimate_does_not_overwrite_computed_but_upstream_replaces_estimate() {
        let store = CacheStore::new();
        let computed = key("p1", 8);
        store.put(computed.clone(), CacheRecord::computed(json!(40.0), Quality::Full));
        assert_eq!(store.put(computed, CacheRecord::estimated(json!(1.0))), PutOutcome::Skipped);

        let estimated = key("p2", 8);
        store.put(estimated.clone(), CacheRecord::estimated(json!(35.0)));
        assert_eq!(
            store.put(estimated.clone(), CacheRecord::upstream(json!(38.5), Quality::Partial)),
            PutOutcome::Replaced
        );
        assert_eq!(store.get(&estimated).expect("cached").quality, Some(Quality::Partial));
    }

    #[test]
    fn age_is_measured_from_fetched_at() {
        let store = CacheStore::new();
        let k = key("p1", 8);
        let fetched = OffsetDateTime::now_utc() - time::Duration::hours(2);
        store.put(k.clone(), CacheRecord::upstream(json!(1), Quality::Full).with_fetched_at(fetched));

        let age = store
            .age_at(&k, fetched + time::Duration::minutes(90))
            .expect("cached");
        assert_eq!(age, Duration::from_secs(90 * 60));

        let skewed = store.age_at(&k, fetched - time::Duration::minutes(1)).expect("cached");
        assert_eq!(skewed, Duration::ZERO);
        assert!(store.age(&key("p9", 8)).is_none());
    }

    #[test]
    fn export_then_import_preserves_rows() {
        let store = CacheStore::new();
        store.put(key("b", 8), CacheRecord::upstream(json!(50.0), Quality::Full));
        store.put(key("a", 8), CacheRecord::estimated(json!(12.0)));
        store.put(key("a", 7), CacheRecord::upstream(json!(10.0), Quality::Full));

        let rows = store.export();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].key, key("a", 7));

        let encoded = serde_json::to_string(&rows).expect("serialize rows");
        let decoded: Vec<CacheRow> = serde_json::from_str(&encoded).expect("deserialize rows");

        let restored = CacheStore::new();
        assert_eq!(restored.import(decoded), 3);
        assert_eq!(restored.keys_for_entity(&EntityId::parse("a").expect("entity")).len(), 2);
    }
}
