use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};

/// Closed latitude/longitude rectangle constraining a scan.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    /// Southern edge.
    pub min_lat: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Western edge.
    pub min_lon: f64,
    /// Eastern edge.
    pub max_lon: f64,
}

impl BoundingBox {
    /// Creates a box and validates it.
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Result<Self> {
        let bbox = Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Rejects non-finite or inverted corners.
    pub fn validate(&self) -> Result<()> {
        let corners = [self.min_lat, self.max_lat, self.min_lon, self.max_lon];
        if corners.iter().any(|c| !c.is_finite()) {
            return Err(QueryError::InvalidBounds("corners must be finite".into()));
        }
        if self.min_lat > self.max_lat || self.min_lon > self.max_lon {
            return Err(QueryError::InvalidBounds(format!(
                "min corner ({}, {}) exceeds max corner ({}, {})",
                self.min_lat, self.min_lon, self.max_lat, self.max_lon
            )));
        }
        Ok(())
    }

    /// Whether the point lies inside the closed box.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}
