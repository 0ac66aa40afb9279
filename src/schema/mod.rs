//! Canonical filter shape for creature search.
//!
//! The [`StandardFilter`] lists every dimension the compiler understands, in
//! declaration order, with the default value a user filter is compared
//! against. Dimension names map onto a closed set of [`DimensionKind`]s so the
//! predicate generator dispatches on kind rather than on raw strings.

mod value;

pub use value::FilterValue;

use crate::config::{FilterDefaults, PvpConfig};

/// Numeric stat dimensions translated into inclusive range predicates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Stat {
    /// IV percentage (0-100).
    Iv,
    /// Combat power.
    Cp,
    /// Trainer-visible level.
    Level,
    /// Attack sub-score.
    AtkIv,
    /// Defense sub-score.
    DefIv,
    /// Stamina sub-score.
    StaIv,
}

impl Stat {
    /// Every stat in declaration order.
    pub const ALL: [Stat; 6] = [
        Stat::Iv,
        Stat::Cp,
        Stat::Level,
        Stat::AtkIv,
        Stat::DefIv,
        Stat::StaIv,
    ];

    /// Dimension name used in filter objects and remote payloads.
    pub fn name(self) -> &'static str {
        match self {
            Stat::Iv => "iv",
            Stat::Cp => "cp",
            Stat::Level => "level",
            Stat::AtkIv => "atk_iv",
            Stat::DefIv => "def_iv",
            Stat::StaIv => "sta_iv",
        }
    }
}

/// Size buckets backed by the categorical `size` column.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SizeClass {
    /// Smallest bucket.
    Xxs,
    /// Largest bucket.
    Xxl,
}

impl SizeClass {
    /// Dimension name used in filter objects.
    pub fn name(self) -> &'static str {
        match self {
            SizeClass::Xxs => "xxs",
            SizeClass::Xxl => "xxl",
        }
    }

    /// Value stored in the `size` column for this bucket.
    pub fn column_value(self) -> i64 {
        match self {
            SizeClass::Xxs => 1,
            SizeClass::Xxl => 5,
        }
    }
}

/// Kind of a filter dimension, which decides how it is compiled.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DimensionKind {
    /// Inclusive range over a stat column or computed expression.
    Range(Stat),
    /// Plain equality on the gender column.
    Gender,
    /// Equality-OR against the size column.
    SizeClass(SizeClass),
    /// Competitive league rank window, evaluated after the query.
    LeagueRank,
}

impl DimensionKind {
    /// Looks up the kind for a dimension name. Names that are not stats,
    /// gender or size buckets are league rank windows.
    pub fn of(name: &str) -> Self {
        match name {
            "gender" => DimensionKind::Gender,
            "xxs" => DimensionKind::SizeClass(SizeClass::Xxs),
            "xxl" => DimensionKind::SizeClass(SizeClass::Xxl),
            other => Stat::ALL
                .into_iter()
                .find(|stat| stat.name() == other)
                .map(DimensionKind::Range)
                .unwrap_or(DimensionKind::LeagueRank),
        }
    }

    /// Whether this dimension filters on the row itself (stats and sizes),
    /// as opposed to the ranking path or a plain attribute.
    pub fn is_stat_like(self) -> bool {
        matches!(self, DimensionKind::Range(_) | DimensionKind::SizeClass(_))
    }
}

/// One named dimension and its default.
#[derive(Clone, Debug, PartialEq)]
pub struct Dimension {
    /// Name used as the key in filter objects.
    pub name: String,
    /// Compilation kind.
    pub kind: DimensionKind,
    /// Value a filter must differ from to become relevant.
    pub default: FilterValue,
}

/// Ordered set of dimensions with defaults.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StandardFilter {
    dimensions: Vec<Dimension>,
}

impl StandardFilter {
    /// Builds the standard filter from explicit dimensions.
    pub fn new(dimensions: Vec<Dimension>) -> Self {
        Self { dimensions }
    }

    /// Builds the creature standard filter from configuration: the stat
    /// defaults, gender, both size buckets and one rank window per league.
    pub fn from_config(defaults: &FilterDefaults, pvp: &PvpConfig) -> Self {
        let mut dimensions = Vec::with_capacity(9 + pvp.leagues.len());
        for stat in Stat::ALL {
            dimensions.push(Dimension {
                name: stat.name().to_owned(),
                kind: DimensionKind::Range(stat),
                default: FilterValue::Range(defaults.range(stat)),
            });
        }
        dimensions.push(Dimension {
            name: "gender".to_owned(),
            kind: DimensionKind::Gender,
            default: FilterValue::Int(defaults.gender),
        });
        for size in [SizeClass::Xxs, SizeClass::Xxl] {
            dimensions.push(Dimension {
                name: size.name().to_owned(),
                kind: DimensionKind::SizeClass(size),
                default: FilterValue::Bool(false),
            });
        }
        for league in &pvp.leagues {
            dimensions.push(Dimension {
                name: league.name.clone(),
                kind: DimensionKind::LeagueRank,
                default: FilterValue::Range(pvp.rank_window(league)),
            });
        }
        Self { dimensions }
    }

    /// Dimensions in declaration order.
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Looks up a dimension by name.
    pub fn get(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|dim| dim.name == name)
    }

    /// Default value for a dimension, if declared.
    pub fn default_of(&self, name: &str) -> Option<&FilterValue> {
        self.get(name).map(|dim| &dim.default)
    }

    /// League dimensions in declaration order.
    pub fn leagues(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions
            .iter()
            .filter(|dim| dim.kind == DimensionKind::LeagueRank)
    }
}
