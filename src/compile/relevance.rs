use crate::model::FilterObject;
use crate::schema::{Dimension, StandardFilter};

/// Dimensions of `filter` that differ from the standard, in declaration
/// order. Omitted dimensions take the default and are never relevant.
pub fn relevant_dimensions<'s>(
    filter: &FilterObject,
    standard: &'s StandardFilter,
) -> Vec<&'s Dimension> {
    standard
        .dimensions()
        .iter()
        .filter(|dimension| is_active(filter, dimension))
        .collect()
}

/// Whether a single dimension of `filter` differs from its default.
pub fn is_active(filter: &FilterObject, dimension: &Dimension) -> bool {
    filter
        .get(&dimension.name)
        .is_some_and(|value| value.differs_from(&dimension.default))
}
