use serde::{Deserialize, Serialize};

/// Capabilities of the requesting user, resolved by the auth layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    /// Stat filters and stat values may be used.
    #[serde(default)]
    pub iv: bool,
    /// Ranking filters and ranking payloads may be used.
    #[serde(default)]
    pub pvp: bool,
    /// Area keys or names the user is limited to; empty means unrestricted.
    #[serde(default)]
    pub area_restrictions: Vec<String>,
}

impl Permissions {
    /// Permissions with every capability and no area restriction.
    pub fn all() -> Self {
        Self {
            iv: true,
            pvp: true,
            area_restrictions: Vec::new(),
        }
    }
}
