//! Request and row types shared by the compiler, executor and merge stages.

mod bbox;
mod filter;
mod permissions;
mod record;

pub use bbox::BoundingBox;
pub use filter::{FilterFlags, FilterObject, FilterSpec, SelectorKey, GLOBAL_SELECTOR};
pub use permissions::Permissions;
pub use record::{
    EntityView, MatchSource, RankingEntry, Rankings, RawEntityRecord, SENTINEL_RANK,
};

/// Species that disguises itself as another species; selectors for it match
/// on species only.
pub const DISGUISE_SPECIES: u32 = 132;
