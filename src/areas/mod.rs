//! Scan area polygons and area scoping.
//!
//! Areas come from a GeoJSON feature collection. Bounding rectangles live in
//! an R-tree; the exact point-in-polygon test runs only on the candidates the
//! tree returns. A feature is addressed by its key (`<parent>-<name>` or the
//! bare name) or by its name, which may cover several keys.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

use geo::{BoundingRect, Contains, Coord, LineString, MultiPolygon, Point, Polygon, Rect};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::AreaConfig;

type AreaRect = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// One named scan area.
#[derive(Clone, Debug)]
pub struct Area {
    /// Unique key, `<parent>-<name>` or the name.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Parent group, if any.
    pub parent: Option<String>,
    shape: MultiPolygon<f64>,
    bounds: Option<Rect<f64>>,
}

impl Area {
    fn new(key: String, name: String, parent: Option<String>, shape: MultiPolygon<f64>) -> Self {
        let bounds = shape.bounding_rect();
        Self { key, name, parent, shape, bounds }
    }

    /// Whether the point lies strictly inside the area.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.shape.contains(&Point::new(lon, lat))
    }

    /// Bounding rectangle, `x` is longitude and `y` latitude.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.bounds
    }
}

/// Spatial index over every loaded area.
pub struct AreaIndex {
    areas: Vec<Area>,
    tree: RTree<AreaRect>,
    by_key: HashMap<String, usize>,
    by_name: HashMap<String, Vec<usize>>,
}

impl fmt::Debug for AreaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AreaIndex")
            .field("areas", &self.areas.len())
            .finish_non_exhaustive()
    }
}

impl Default for AreaIndex {
    fn default() -> Self {
        Self::from_areas(Vec::new())
    }
}

/// Which areas a request may see.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AreaScope {
    /// No area constraint.
    Unrestricted,
    /// Only points inside one of these areas (indices into the index).
    Within(BTreeSet<usize>),
    /// The constraint cannot be satisfied; nothing is visible.
    Nothing,
}

impl AreaIndex {
    /// Loads the configured GeoJSON. Any failure leaves the index empty,
    /// which disables area filtering.
    pub fn load(config: &AreaConfig) -> Self {
        let Some(path) = config.geojson.as_deref() else {
            return Self::default();
        };
        match read_geojson(path) {
            Ok(index) => {
                info!(path = %path.display(), areas = index.len(), "areas loaded");
                index
            }
            Err(reason) => {
                warn!(path = %path.display(), %reason, "failed to load areas, area filtering disabled");
                if config.restrictions.iter().any(|rule| !rule.roles.is_empty()) {
                    warn!("area restrictions are configured but cannot be enforced");
                }
                Self::default()
            }
        }
    }

    /// Parses a GeoJSON feature collection.
    pub fn from_geojson(contents: &str) -> Result<Self, String> {
        let collection: FeatureCollection =
            serde_json::from_str(contents).map_err(|err| err.to_string())?;
        let mut areas = Vec::new();
        for feature in collection.features {
            let props = feature.properties;
            let Some(name) = props.name.filter(|name| !name.is_empty()) else {
                continue;
            };
            if props.manual {
                continue;
            }
            let Some(shape) = feature.geometry.as_ref().and_then(|g| g.to_shape(&name)) else {
                debug!(area = %name, "skipping feature without polygon geometry");
                continue;
            };
            let key = match &props.parent {
                Some(parent) => format!("{parent}-{name}"),
                None => name.clone(),
            };
            areas.push(Area::new(key, name, props.parent, shape));
        }
        Ok(Self::from_areas(areas))
    }

    fn from_areas(areas: Vec<Area>) -> Self {
        let mut by_key = HashMap::new();
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        let mut rects = Vec::with_capacity(areas.len());
        for (idx, area) in areas.iter().enumerate() {
            by_key.insert(area.key.clone(), idx);
            by_name.entry(area.name.clone()).or_default().push(idx);
            if let Some(rect) = area.bounds {
                let (min, max) = (rect.min(), rect.max());
                rects.push(GeomWithData::new(
                    Rectangle::from_corners([min.x, min.y], [max.x, max.y]),
                    idx,
                ));
            }
        }
        Self {
            areas,
            tree: RTree::bulk_load(rects),
            by_key,
            by_name,
        }
    }

    /// Number of areas.
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    /// Whether no area is loaded.
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Area by index.
    pub fn get(&self, idx: usize) -> Option<&Area> {
        self.areas.get(idx)
    }

    /// Indices of the areas containing the point.
    pub fn areas_at(&self, lat: f64, lon: f64) -> impl Iterator<Item = usize> + '_ {
        self.tree
            .locate_all_at_point(&[lon, lat])
            .map(|rect| rect.data)
            .filter(move |idx| self.areas[*idx].contains(lat, lon))
    }

    /// Indices addressed by keys or names; unknown entries are ignored.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            if let Some(idx) = self.by_key.get(name) {
                out.insert(*idx);
            }
            if let Some(indices) = self.by_name.get(name) {
                out.extend(indices.iter().copied());
            }
        }
        out
    }

    /// Combines the caller's restrictions with the areas they asked for.
    ///
    /// Requested areas outside the restrictions are dropped; if none remain
    /// the restrictions apply as a whole. An empty index never restricts.
    pub fn scope(&self, restrictions: &[String], only_areas: &[String]) -> AreaScope {
        if self.is_empty() || (restrictions.is_empty() && only_areas.is_empty()) {
            return AreaScope::Unrestricted;
        }
        let allowed = self.resolve(restrictions);
        let requested = self.resolve(only_areas);
        let effective = if restrictions.is_empty() {
            requested
        } else {
            let narrowed: BTreeSet<usize> = requested.intersection(&allowed).copied().collect();
            if narrowed.is_empty() {
                allowed
            } else {
                narrowed
            }
        };
        if effective.is_empty() {
            AreaScope::Nothing
        } else {
            AreaScope::Within(effective)
        }
    }

    /// Binds a scope to this index for point tests.
    pub fn filter(&self, scope: AreaScope) -> AreaFilter<'_> {
        AreaFilter { index: self, scope }
    }
}

/// A resolved scope bound to its index.
#[derive(Clone, Debug)]
pub struct AreaFilter<'a> {
    index: &'a AreaIndex,
    scope: AreaScope,
}

impl AreaFilter<'_> {
    /// Whether nothing can pass.
    pub fn is_nothing(&self) -> bool {
        self.scope == AreaScope::Nothing
    }

    /// Bounding rectangles of the permitted areas; empty when unrestricted.
    pub fn bounds(&self) -> Vec<Rect<f64>> {
        match &self.scope {
            AreaScope::Within(allowed) => allowed
                .iter()
                .filter_map(|idx| self.index.get(*idx).and_then(Area::bounds))
                .collect(),
            AreaScope::Unrestricted | AreaScope::Nothing => Vec::new(),
        }
    }

    /// Whether a point is visible under the scope.
    pub fn admits(&self, lat: f64, lon: f64) -> bool {
        match &self.scope {
            AreaScope::Unrestricted => true,
            AreaScope::Nothing => false,
            AreaScope::Within(allowed) => self
                .index
                .areas_at(lat, lon)
                .any(|idx| allowed.contains(&idx)),
        }
    }
}

fn read_geojson(path: &Path) -> Result<AreaIndex, String> {
    let contents = fs::read_to_string(path).map_err(|err| err.to_string())?;
    AreaIndex::from_geojson(&contents)
}

#[derive(Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Properties,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Default, Deserialize)]
struct Properties {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    manual: bool,
}

#[derive(Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

type Ring = Vec<[f64; 2]>;

impl Geometry {
    fn to_shape(&self, name: &str) -> Option<MultiPolygon<f64>> {
        match self.kind.as_str() {
            "Polygon" => {
                let rings: Vec<Ring> = serde_json::from_value(self.coordinates.clone()).ok()?;
                Some(MultiPolygon::new(vec![polygon(name, rings)?]))
            }
            "MultiPolygon" => {
                let polygons: Vec<Vec<Ring>> =
                    serde_json::from_value(self.coordinates.clone()).ok()?;
                let polygons: Vec<Polygon<f64>> = polygons
                    .into_iter()
                    .filter_map(|rings| polygon(name, rings))
                    .collect();
                (!polygons.is_empty()).then(|| MultiPolygon::new(polygons))
            }
            _ => None,
        }
    }
}

fn polygon(name: &str, rings: Vec<Ring>) -> Option<Polygon<f64>> {
    let mut rings = rings.into_iter().filter(|ring| !ring.is_empty()).map(|mut ring| {
        if ring.first() != ring.last() {
            warn!(area = %name, "polygon ring not closed, closing it");
            if let Some(first) = ring.first().copied() {
                ring.push(first);
            }
        }
        LineString::new(ring.into_iter().map(|[x, y]| Coord { x, y }).collect())
    });
    let exterior = rings.next()?;
    Some(Polygon::new(exterior, rings.collect()))
}
