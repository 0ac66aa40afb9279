//! Rows returned by the store or the remote aggregator, and the merged view.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Rank value meaning "no qualifying rank".
pub const SENTINEL_RANK: u32 = 4096;

/// Per-league ranking candidates.
pub type Rankings = BTreeMap<String, Vec<RankingEntry>>;

/// One positioned entity row.
///
/// Known columns are typed; every other column is carried in `extra` and
/// serialised back unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEntityRecord {
    /// Identity; numeric ids are normalised to strings.
    #[serde(deserialize_with = "identity")]
    pub id: String,
    /// Species id.
    pub pokemon_id: u32,
    /// Visible form id.
    #[serde(default, deserialize_with = "loose_u32")]
    pub form: Option<u32>,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
    /// Combat power.
    #[serde(
        default,
        deserialize_with = "loose_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub cp: Option<u32>,
    /// IV percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<f64>,
    /// Attack sub-score.
    #[serde(
        default,
        deserialize_with = "loose_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub atk_iv: Option<u32>,
    /// Defense sub-score.
    #[serde(
        default,
        deserialize_with = "loose_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub def_iv: Option<u32>,
    /// Stamina sub-score.
    #[serde(
        default,
        deserialize_with = "loose_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub sta_iv: Option<u32>,
    /// Level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    /// True form of a disguised entity.
    #[serde(
        default,
        deserialize_with = "loose_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub ditto_form: Option<u32>,
    /// How the entity was seen (`encounter`, `nearby_stop`, `nearby_cell`).
    #[serde(
        default,
        deserialize_with = "loose_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub seen_type: Option<String>,
    /// Spawn point; `Some(Null)` when the column exists but is empty.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub spawn_id: Option<Value>,
    /// Nearby stop for lured/nearby sightings.
    #[serde(
        default,
        deserialize_with = "loose_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub pokestop_id: Option<String>,
    /// Inline ranking payload, as a JSON string or an object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvp: Option<Value>,
    /// Legacy great league ranking column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvp_rankings_great_league: Option<String>,
    /// Legacy ultra league ranking column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvp_rankings_ultra_league: Option<String>,
    /// Expiry, epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_timestamp: Option<i64>,
    /// Last update, epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<i64>,
    /// Entity changed since first seen.
    #[serde(default, deserialize_with = "truthy")]
    pub changed: bool,
    /// Expiry is confirmed rather than estimated.
    #[serde(default, deserialize_with = "truthy")]
    pub expire_timestamp_verified: bool,
    /// Row came from the ranking follow-up query.
    #[serde(default, deserialize_with = "truthy", skip_serializing)]
    pub pvp_check: bool,
    /// Remaining columns.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawEntityRecord {
    /// Form used for selector lookups.
    pub fn form_id(&self) -> u32 {
        self.form.unwrap_or(0)
    }

    /// Whether the row carries any inline ranking payload.
    pub fn has_inline_rankings(&self) -> bool {
        self.pvp.as_ref().is_some_and(|pvp| !pvp.is_null())
            || self.pvp_rankings_great_league.is_some()
            || self.pvp_rankings_ultra_league.is_some()
    }

    /// Drops inline ranking payloads.
    pub fn strip_rankings(&mut self) {
        self.pvp = None;
        self.pvp_rankings_great_league = None;
        self.pvp_rankings_ultra_league = None;
    }
}

/// One ranking candidate within a league.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    /// Rank within the league (1 is best).
    pub rank: u32,
    /// CP at the ranked level.
    #[serde(default)]
    pub cp: u32,
    /// The rank was computed at the level cap.
    #[serde(default)]
    pub capped: bool,
    /// Level cap tier this rank belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap: Option<u32>,
    /// Species of the evolution this rank describes, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pokemon: Option<u32>,
    /// Form of the ranked evolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<u32>,
    /// Mega/temporary evolution marker; non-zero means excluded by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evolution: Option<u32>,
    /// Level at which the rank is reached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    /// Remaining fields (percentage, stat product, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RankingEntry {
    /// Whether this candidate describes a mega/temporary evolution.
    pub fn is_evolution(&self) -> bool {
        self.evolution.is_some_and(|evo| evo != 0)
    }
}

/// Which pipeline emitted an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MatchSource {
    /// Matched the stat predicates of the primary query.
    #[default]
    Stat,
    /// Passed through ranking evaluation.
    Ranking,
}

/// Entity as returned to callers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EntityView {
    /// Normalised row.
    #[serde(flatten)]
    pub record: RawEntityRecord,
    /// Qualifying ranking candidates per league.
    #[serde(rename = "cleanRankings", skip_serializing_if = "Option::is_none")]
    pub clean_rankings: Option<Rankings>,
    /// Best qualifying rank, or the sentinel.
    #[serde(rename = "bestRank", skip_serializing_if = "Option::is_none")]
    pub best_rank: Option<u32>,
    /// Pipeline that emitted this entity.
    #[serde(skip)]
    pub source: MatchSource,
}

impl EntityView {
    /// Wraps a stat-matched record.
    pub fn stat(record: RawEntityRecord) -> Self {
        Self {
            record,
            clean_rankings: None,
            best_rank: None,
            source: MatchSource::Stat,
        }
    }
}

fn identity<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdentityVisitor;

    impl<'de> Visitor<'de> for IdentityVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a string or integer identity")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_owned())
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(IdentityVisitor)
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(flag) => flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        _ => false,
    })
}

/// Integer column that some stores keep as REAL or TEXT.
fn loose_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let number = match &value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() && (0.0..=f64::from(u32::MAX)).contains(&n) => {
            Ok(Some(n.round() as u32))
        }
        _ => Err(de::Error::invalid_value(
            de::Unexpected::Other(&value.to_string()),
            &"a non-negative integer",
        )),
    }
}

fn loose_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
