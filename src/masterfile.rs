//! Species reference data.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::config::ConfigError;

/// Reference data for one species.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesInfo {
    /// Form shown when the entity reports none.
    #[serde(default)]
    pub default_form_id: Option<u32>,
}

/// Master reference: `{"pokemon": {"<id>": {"defaultFormId": ...}}}`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Masterfile {
    #[serde(default)]
    pokemon: HashMap<u32, SpeciesInfo>,
}

impl Masterfile {
    /// Loads the reference from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data_error = |reason: String| ConfigError::Data {
            what: "masterfile",
            path: path.to_path_buf(),
            reason,
        };
        let contents = fs::read_to_string(path).map_err(|err| data_error(err.to_string()))?;
        serde_json::from_str(&contents).map_err(|err| data_error(err.to_string()))
    }

    /// Default form of a species, if known.
    pub fn default_form(&self, species: u32) -> Option<u32> {
        self.pokemon
            .get(&species)
            .and_then(|info| info.default_form_id)
    }
}
