//! Per-request filter tree.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::QueryError;
use crate::schema::{Dimension, FilterValue};

/// Key of the catch-all selector.
pub const GLOBAL_SELECTOR: &str = "onlyIvOr";

/// Identity of a species selector, written `"<species>-<form>"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SelectorKey {
    /// Species id.
    pub species: u32,
    /// Form id.
    pub form: u32,
}

impl SelectorKey {
    /// Creates a selector key.
    pub fn new(species: u32, form: u32) -> Self {
        Self { species, form }
    }
}

impl fmt::Display for SelectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.species, self.form)
    }
}

impl FromStr for SelectorKey {
    type Err = QueryError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || QueryError::InvalidFilter(format!("selector '{raw}' is not <id>-<form>"));
        let (species, form) = raw.split_once('-').ok_or_else(invalid)?;
        Ok(Self {
            species: species.trim().parse().map_err(|_| invalid())?,
            form: form.trim().parse().map_err(|_| invalid())?,
        })
    }
}

/// Concrete filter object for one selector. Dimensions it omits fall back to
/// the standard default through [`FilterObject::effective`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterObject {
    values: BTreeMap<String, FilterValue>,
}

impl FilterObject {
    /// Creates an empty filter object (all defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter used by callers and tests.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Value explicitly present for `name`.
    pub fn get(&self, name: &str) -> Option<&FilterValue> {
        self.values.get(name)
    }

    /// Value for `dimension`, or its default when absent.
    pub fn effective<'a>(&'a self, dimension: &'a Dimension) -> &'a FilterValue {
        self.values.get(&dimension.name).unwrap_or(&dimension.default)
    }
}

/// Boolean switches carried next to the selectors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterFlags {
    /// `onlyZeroIv`: always include 0% IV entities.
    pub zero_iv: bool,
    /// `onlyHundoIv`: always include 100% IV entities.
    pub hundo_iv: bool,
    /// `onlyPvpMega`: evolution candidates count as ranking matches.
    pub pvp_mega: bool,
    /// `onlyLinkGlobal`: only emit entities with an explicit selector.
    pub link_global: bool,
    /// `onlyPvp<cap>` flags that are switched on.
    pub caps: BTreeSet<u32>,
}

/// Full filter tree of one request.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct FilterSpec {
    /// Catch-all selector (`onlyIvOr`).
    pub global: FilterObject,
    /// Species selectors keyed by identity.
    pub selectors: BTreeMap<SelectorKey, FilterObject>,
    /// Boolean switches.
    pub flags: FilterFlags,
    /// Areas the user narrowed the view to.
    pub only_areas: Vec<String>,
    /// Reference timestamp (epoch seconds) for expiry checks.
    pub ts: Option<i64>,
}

impl FilterSpec {
    /// Selector filter for a species/form pair, if the user set one.
    pub fn selector(&self, species: u32, form: u32) -> Option<&FilterObject> {
        self.selectors.get(&SelectorKey::new(species, form))
    }
}

impl TryFrom<Map<String, Value>> for FilterSpec {
    type Error = QueryError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut spec = FilterSpec::default();
        for (key, value) in map {
            match key.as_str() {
                GLOBAL_SELECTOR => spec.global = decode(&key, value)?,
                "onlyZeroIv" => spec.flags.zero_iv = truthy(&value),
                "onlyHundoIv" => spec.flags.hundo_iv = truthy(&value),
                "onlyPvpMega" => spec.flags.pvp_mega = truthy(&value),
                "onlyLinkGlobal" => spec.flags.link_global = truthy(&value),
                "onlyAreas" => spec.only_areas = decode(&key, value)?,
                "ts" => spec.ts = decode(&key, value)?,
                _ if key.contains('-') => {
                    let selector: SelectorKey = key.parse()?;
                    spec.selectors.insert(selector, decode(&key, value)?);
                }
                _ => {
                    if let Some(cap) = key
                        .strip_prefix("onlyPvp")
                        .and_then(|cap| cap.parse::<u32>().ok())
                    {
                        if truthy(&value) {
                            spec.flags.caps.insert(cap);
                        }
                    }
                }
            }
        }
        Ok(spec)
    }
}

fn decode<T: serde::de::DeserializeOwned>(key: &str, value: Value) -> Result<T, QueryError> {
    serde_json::from_value(value)
        .map_err(|err| QueryError::InvalidFilter(format!("'{key}': {err}")))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}
