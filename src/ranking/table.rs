use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::config::ConfigError;
use crate::model::{Rankings, RawEntityRecord, SelectorKey};

type IvKey = [u32; 3];

/// Precomputed rankings keyed by species/form and the IV triple.
///
/// Stored as JSON: `{"<species>-<form>": {"<atk>-<def>-<sta>": {"great": [...]}}}`.
#[derive(Clone, Debug, Default)]
pub struct RankingTable {
    entries: HashMap<SelectorKey, HashMap<IvKey, Rankings>>,
}

#[derive(Deserialize)]
#[serde(transparent)]
struct RawTable(HashMap<String, HashMap<String, Rankings>>);

impl RankingTable {
    /// Loads the table from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data_error = |reason: String| ConfigError::Data {
            what: "ranking table",
            path: path.to_path_buf(),
            reason,
        };
        let contents = fs::read_to_string(path).map_err(|err| data_error(err.to_string()))?;
        Self::from_json(&contents).map_err(data_error)
    }

    /// Parses the table from JSON text.
    pub fn from_json(contents: &str) -> Result<Self, String> {
        let RawTable(raw) = serde_json::from_str(contents).map_err(|err| err.to_string())?;
        let mut entries = HashMap::with_capacity(raw.len());
        for (key, by_iv) in raw {
            let selector: SelectorKey = key.parse().map_err(|err| format!("{err}"))?;
            let mut ivs = HashMap::with_capacity(by_iv.len());
            for (iv_key, rankings) in by_iv {
                ivs.insert(parse_ivs(&iv_key)?, rankings);
            }
            entries.insert(selector, ivs);
        }
        Ok(Self { entries })
    }

    /// Number of species/form entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rankings for a record; empty when its IVs are unknown or the species
    /// is not in the table.
    pub fn lookup(&self, record: &RawEntityRecord) -> Rankings {
        let (Some(atk), Some(def), Some(sta)) = (record.atk_iv, record.def_iv, record.sta_iv)
        else {
            return Rankings::new();
        };
        self.entries
            .get(&SelectorKey::new(record.pokemon_id, record.form_id()))
            .and_then(|by_iv| by_iv.get(&[atk, def, sta]))
            .cloned()
            .unwrap_or_default()
    }
}

fn parse_ivs(key: &str) -> Result<IvKey, String> {
    let mut parts = key.split('-').map(str::parse::<u32>);
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(Ok(atk)), Some(Ok(def)), Some(Ok(sta)), None) => Ok([atk, def, sta]),
        _ => Err(format!("IV key '{key}' is not <atk>-<def>-<sta>")),
    }
}
