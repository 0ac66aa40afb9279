//! Column strategies for the two supported store layouts.

use super::ast::{Column, Comparison, SqlValue};
use super::BackendMode;
use crate::schema::Stat;

const IV_EXPR: &str =
    "((pokemon.individual_attack + pokemon.individual_defense + pokemon.individual_stamina) / 0.45)";
const LEVEL_EXPR: &str = "(CASE WHEN pokemon.cp_multiplier < 0.734 \
     THEN ROUND(58.35178527 * pokemon.cp_multiplier * pokemon.cp_multiplier \
     - 2.838007664 * pokemon.cp_multiplier + 0.8539209906) \
     ELSE ROUND(171.0112688 * pokemon.cp_multiplier - 95.20425243) END)";

/// Maps logical columns onto a store layout.
pub trait ColumnMapper: Send + Sync {
    /// `FROM` clause including joins.
    fn from_clause(&self) -> &'static str;
    /// Select list producing [`RawEntityRecord`](crate::model::RawEntityRecord) columns.
    fn projection(&self, mode: &BackendMode) -> String;
    /// Entity identity column.
    fn identity(&self) -> Column;
    /// Species column.
    fn species(&self) -> Column;
    /// Form column.
    fn form(&self) -> Column;
    /// Gender column.
    fn gender(&self) -> Column;
    /// Size bucket column.
    fn size(&self) -> Column;
    /// Latitude column.
    fn latitude(&self) -> Column;
    /// Longitude column.
    fn longitude(&self) -> Column;
    /// Stored column or computed expression for a stat.
    fn stat(&self, stat: Stat) -> Column;
    /// Entity has not expired at `ts` (epoch seconds).
    fn active_at(&self, ts: i64) -> Comparison;
}

/// Returns the mapper for a backend.
pub fn mapper_for(mode: &BackendMode) -> &'static dyn ColumnMapper {
    if mode.alternate_schema {
        &ComputedColumns
    } else {
        &NativeColumns
    }
}

/// Native layout: every stat is a stored column.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeColumns;

impl ColumnMapper for NativeColumns {
    fn from_clause(&self) -> &'static str {
        "pokemon"
    }

    fn projection(&self, mode: &BackendMode) -> String {
        if mode.has_size && !mode.has_height {
            "*, size AS height".to_owned()
        } else {
            "*".to_owned()
        }
    }

    fn identity(&self) -> Column {
        "id".into()
    }

    fn species(&self) -> Column {
        "pokemon_id".into()
    }

    fn form(&self) -> Column {
        "form".into()
    }

    fn gender(&self) -> Column {
        "gender".into()
    }

    fn size(&self) -> Column {
        "size".into()
    }

    fn latitude(&self) -> Column {
        "lat".into()
    }

    fn longitude(&self) -> Column {
        "lon".into()
    }

    fn stat(&self, stat: Stat) -> Column {
        stat.name().into()
    }

    fn active_at(&self, ts: i64) -> Comparison {
        Comparison::Ge {
            column: "expire_timestamp".into(),
            value: SqlValue::Int(ts),
        }
    }
}

/// Alternate vendor layout: IVs stored per component, level derived from the
/// CP multiplier, datetimes instead of epoch seconds, display data joined in.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComputedColumns;

impl ColumnMapper for ComputedColumns {
    fn from_clause(&self) -> &'static str {
        "pokemon \
         LEFT JOIN trs_spawn ON pokemon.spawnpoint_id = trs_spawn.spawnpoint \
         LEFT JOIN pokemon_display ON pokemon.encounter_id = pokemon_display.encounter_id"
    }

    fn projection(&self, _mode: &BackendMode) -> String {
        let columns = [
            "pokemon.*",
            "CAST(pokemon.encounter_id AS TEXT) AS id",
            "pokemon.latitude AS lat",
            "pokemon.longitude AS lon",
            "pokemon.individual_attack AS atk_iv",
            "pokemon.individual_defense AS def_iv",
            "pokemon.individual_stamina AS sta_iv",
            "pokemon_display.pokemon AS display_pokemon_id",
            "pokemon_display.form AS ditto_form",
            "pokemon.weather_boosted_condition AS weather",
            "CASE WHEN trs_spawn.calc_endminsec IS NOT NULL THEN 1 END AS expire_timestamp_verified",
            "CAST(strftime('%s', pokemon.disappear_time) AS INTEGER) AS expire_timestamp",
            "CAST(strftime('%s', pokemon.last_modified) AS INTEGER) AS updated",
        ]
        .join(", ");
        format!("{columns}, {IV_EXPR} AS iv, {LEVEL_EXPR} AS level")
    }

    fn identity(&self) -> Column {
        "pokemon.encounter_id".into()
    }

    fn species(&self) -> Column {
        "pokemon.pokemon_id".into()
    }

    fn form(&self) -> Column {
        "pokemon.form".into()
    }

    fn gender(&self) -> Column {
        "pokemon.gender".into()
    }

    fn size(&self) -> Column {
        "pokemon.size".into()
    }

    fn latitude(&self) -> Column {
        "pokemon.latitude".into()
    }

    fn longitude(&self) -> Column {
        "pokemon.longitude".into()
    }

    fn stat(&self, stat: Stat) -> Column {
        match stat {
            Stat::Iv => IV_EXPR.into(),
            Stat::Level => LEVEL_EXPR.into(),
            Stat::Cp => "pokemon.cp".into(),
            Stat::AtkIv => "pokemon.individual_attack".into(),
            Stat::DefIv => "pokemon.individual_defense".into(),
            Stat::StaIv => "pokemon.individual_stamina".into(),
        }
    }

    fn active_at(&self, ts: i64) -> Comparison {
        Comparison::Custom {
            sql: "pokemon.disappear_time >= datetime(?, 'unixepoch')".to_owned(),
            params: vec![SqlValue::Int(ts)],
        }
    }
}
