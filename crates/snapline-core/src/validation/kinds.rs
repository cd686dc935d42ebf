//! Per-kind validation rules.

use serde_json::{json, Value};

use super::extract::{number_field, text_field, Extracted, Extractor, RecordView};
use crate::domain::DataKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Container {
    List,
    KeyedMap,
}

impl Container {
    pub(crate) const fn label(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::KeyedMap => "object keyed by entity",
        }
    }
}

/// Closed value set for one field. Values outside it are reported, not rejected.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnumCheck {
    pub(crate) label: &'static str,
    pub(crate) fields: &'static [&'static str],
    /// Upper-cased accepted values.
    pub(crate) known: &'static [&'static str],
}

pub(crate) struct KindProfile {
    pub(crate) container: Container,
    pub(crate) entity_from_key: bool,
    pub(crate) entity_fields: &'static [&'static str],
    pub(crate) period_from_request: bool,
    pub(crate) primary: &'static [Extractor<Value>],
    pub(crate) enum_check: Option<EnumCheck>,
}

const PLAYER_ID_FIELDS: &[&str] = &["player_id", "gsis_id", "pfr_player_id", "sleeper_id"];

const GAME_TYPES: &[&str] = &["REG", "POST", "PRE", "WC", "DIV", "CON", "SB"];

const PRACTICE_FIELDS: &[&str] = &["practice_status", "report_status", "status"];

const PRACTICE_STATUSES: &[&str] = &[
    "FULL",
    "LIMITED",
    "DNP",
    "OUT",
    "QUESTIONABLE",
    "DOUBTFUL",
    "FULL PARTICIPATION IN PRACTICE",
    "LIMITED PARTICIPATION IN PRACTICE",
    "DID NOT PARTICIPATE IN PRACTICE",
];

static SCHEDULE: KindProfile = KindProfile {
    container: Container::List,
    entity_from_key: false,
    entity_fields: &["team", "team_abbr", "club_code"],
    period_from_request: false,
    primary: &[schedule_matchup],
    enum_check: Some(EnumCheck {
        label: "game_type",
        fields: &["game_type", "season_type"],
        known: GAME_TYPES,
    }),
};

static SNAP_PCT: KindProfile = KindProfile {
    container: Container::List,
    entity_from_key: false,
    entity_fields: PLAYER_ID_FIELDS,
    period_from_request: false,
    primary: &[snap_from_fraction, snap_from_percent, snap_from_counts],
    enum_check: None,
};

static PRACTICE_STATUS: KindProfile = KindProfile {
    container: Container::List,
    entity_from_key: false,
    entity_fields: PLAYER_ID_FIELDS,
    period_from_request: false,
    primary: &[practice_report],
    enum_check: Some(EnumCheck {
        label: "practice status",
        fields: PRACTICE_FIELDS,
        known: PRACTICE_STATUSES,
    }),
};

static USAGE: KindProfile = KindProfile {
    container: Container::KeyedMap,
    entity_from_key: true,
    entity_fields: PLAYER_ID_FIELDS,
    period_from_request: true,
    primary: &[usage_line],
    enum_check: None,
};

pub(crate) fn profile_for(kind: DataKind) -> &'static KindProfile {
    match kind {
        DataKind::Schedule => &SCHEDULE,
        DataKind::SnapPct => &SNAP_PCT,
        DataKind::PracticeStatus => &PRACTICE_STATUS,
        DataKind::Usage => &USAGE,
    }
}

fn schedule_matchup(record: &RecordView<'_>) -> Option<Extracted<Value>> {
    let opponent = text_field(record, &["opponent", "opponent_team", "opp"])?;
    let is_home = record.boolean("is_home").or_else(|| record.boolean("location"));
    let kickoff = text_field(record, &["kickoff", "gametime", "game_time", "gameday"]);
    let game_type = text_field(record, &["game_type", "season_type"]).map(|t| t.to_ascii_uppercase());

    Some(Extracted::reported(json!({
        "opponent": opponent.to_ascii_uppercase(),
        "is_home": is_home,
        "kickoff": kickoff,
        "game_type": game_type,
    })))
}

fn round_pct(value: f64) -> Option<f64> {
    (0.0..=100.0)
        .contains(&value)
        .then(|| (value * 10.0).round() / 10.0)
}

/// `offense_pct` is always a 0..1 fraction; percent-scaled feeds use
/// `snap_pct` and friends. The field name fixes the scale, so a fraction
/// above 1 is out of range rather than reinterpreted.
fn snap_from_fraction(record: &RecordView<'_>) -> Option<Extracted<Value>> {
    let fraction = record.number("offense_pct")?;
    round_pct(fraction * 100.0).map(|pct| Extracted::reported(json!(pct)))
}

fn snap_from_percent(record: &RecordView<'_>) -> Option<Extracted<Value>> {
    let pct = number_field(record, &["snap_pct", "snap_share", "off_snp_pct"])?;
    round_pct(pct).map(|pct| Extracted::reported(json!(pct)))
}

fn snap_from_counts(record: &RecordView<'_>) -> Option<Extracted<Value>> {
    let snaps = number_field(record, &["offense_snaps", "off_snp"])?;
    let team = number_field(record, &["team_offense_snaps", "tm_off_snp"])?;
    if team <= 0.0 {
        return None;
    }
    round_pct(snaps / team * 100.0).map(|pct| Extracted::computed(json!(pct)))
}

fn canonical_practice_status(raw: &str) -> String {
    let upper = raw.to_ascii_uppercase();
    match upper.as_str() {
        "FULL PARTICIPATION IN PRACTICE" => "FULL".to_owned(),
        "LIMITED PARTICIPATION IN PRACTICE" => "LIMITED".to_owned(),
        "DID NOT PARTICIPATE IN PRACTICE" => "DNP".to_owned(),
        _ => upper,
    }
}

fn practice_report(record: &RecordView<'_>) -> Option<Extracted<Value>> {
    let status = text_field(record, PRACTICE_FIELDS)?;
    let injury = text_field(record, &["injury", "report_primary_injury", "practice_primary_injury"]);

    Some(Extracted::reported(json!({
        "status": canonical_practice_status(&status),
        "injury": injury,
    })))
}

/// Stat lines count as usage when they carry targets or carries.
fn usage_line(record: &RecordView<'_>) -> Option<Extracted<Value>> {
    let targets = number_field(record, &["rec_tgt", "targets"]);
    let carries = number_field(record, &["rush_att", "carries"]);
    if targets.is_none() && carries.is_none() {
        return None;
    }

    Some(Extracted::reported(json!({
        "targets": targets,
        "carries": carries,
        "receptions": number_field(record, &["rec", "receptions"]),
        "offense_snaps": number_field(record, &["off_snp", "offense_snaps"]),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::extract::Derivation;
    use serde_json::Map;

    fn view(value: &Value) -> RecordView<'_> {
        match value {
            Value::Object(map) => RecordView::new(None, map),
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn snap_fraction_beats_percent_and_counts() {
        let record = json!({ "offense_pct": 0.64, "snap_pct": 10.0, "offense_snaps": 1, "team_offense_snaps": 2 });
        let hit = super::super::first_present(&view(&record), SNAP_PCT.primary).expect("present");
        assert_eq!(hit.value, json!(64.0));
        assert_eq!(hit.derivation, Derivation::Reported);
    }

    #[test]
    fn snap_scale_comes_from_the_field_name() {
        let fraction = json!({ "offense_pct": 0.008 });
        let hit = snap_from_fraction(&view(&fraction)).expect("fraction");
        assert_eq!(hit.value, json!(0.8));

        let percent = json!({ "snap_pct": 0.8 });
        let hit = snap_from_percent(&view(&percent)).expect("percent");
        assert_eq!(hit.value, json!(0.8));

        let mislabelled = json!({ "offense_pct": 64.0, "snap_pct": 64.0 });
        assert!(snap_from_fraction(&view(&mislabelled)).is_none());
        let hit = super::super::first_present(&view(&mislabelled), SNAP_PCT.primary).expect("percent wins");
        assert_eq!(hit.value, json!(64.0));
    }

    #[test]
    fn out_of_range_snap_share_is_absent() {
        let record = json!({ "snap_pct": 140.0 });
        assert!(snap_from_percent(&view(&record)).is_none());

        let record = json!({ "offense_snaps": 10, "team_offense_snaps": 0 });
        assert!(snap_from_counts(&view(&record)).is_none());
    }

    #[test]
    fn schedule_row_normalizes_opponent() {
        let record = json!({ "team": "KC", "opponent": "lv", "is_home": true, "game_type": "reg" });
        let hit = schedule_matchup(&view(&record)).expect("matchup");
        assert_eq!(hit.value["opponent"], json!("LV"));
        assert_eq!(hit.value["game_type"], json!("REG"));
        assert_eq!(hit.value["is_home"], json!(true));
    }

    #[test]
    fn usage_requires_targets_or_carries() {
        let empty = Map::new();
        assert!(usage_line(&RecordView::new(Some("1"), &empty)).is_none());

        let record = json!({ "rush_att": 14 });
        let hit = usage_line(&view(&record)).expect("usage");
        assert_eq!(hit.value["carries"], json!(14.0));
        assert_eq!(hit.value["targets"], Value::Null);
    }

    #[test]
    fn practice_long_forms_collapse() {
        assert_eq!(canonical_practice_status("Did Not Participate In Practice"), "DNP");
        assert_eq!(canonical_practice_status("questionable"), "QUESTIONABLE");
    }
}
