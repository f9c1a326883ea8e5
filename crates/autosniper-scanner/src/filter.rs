//! Matching stored listings against saved searches.
//!
//! A criterion only constrains listings that carry the corresponding field:
//! a listing without a year, for example, is not excluded by a year bound.

use crate::normalize::fold_case;
use autosniper_core::{RawListing, SearchCriteria};
use autosniper_db::SavedFilter;

fn contains_folded(haystack: Option<&str>, needle: Option<&str>) -> bool {
    match (haystack, needle) {
        (Some(value), Some(wanted)) => fold_case(value).contains(&fold_case(wanted)),
        _ => true,
    }
}

fn equals_folded(value: Option<&str>, wanted: Option<&str>) -> bool {
    match (value, wanted) {
        (Some(value), Some(wanted)) => fold_case(value.trim()) == fold_case(wanted),
        _ => true,
    }
}

fn within<T: PartialOrd + Copy>(value: Option<T>, min: Option<T>, max: Option<T>) -> bool {
    let Some(value) = value else {
        return true;
    };
    min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
}

/// Whether `listing` satisfies every criterion set in `criteria`.
#[must_use]
pub fn matches(listing: &RawListing, criteria: &SearchCriteria) -> bool {
    let criteria = criteria.clone().normalized();
    let price = Some(listing.price).filter(|p| *p > 0.0);

    contains_folded(listing.brand.as_deref(), criteria.brand.as_deref())
        && contains_folded(listing.model.as_deref(), criteria.model.as_deref())
        && contains_folded(listing.city.as_deref(), criteria.city.as_deref())
        && within(listing.year, criteria.min_year, criteria.max_year)
        && within(price, criteria.min_price, criteria.max_price)
        && equals_folded(listing.fuel_type.as_deref(), criteria.fuel_type.as_deref())
        && equals_folded(listing.transmission.as_deref(), criteria.transmission.as_deref())
}

/// Active filters that `listing` satisfies, in input order.
#[must_use]
pub fn find_matching_filters<'a>(
    listing: &RawListing,
    filters: &'a [SavedFilter],
) -> Vec<&'a SavedFilter> {
    filters
        .iter()
        .filter(|filter| filter.is_active && matches(listing, &filter.criteria))
        .collect()
}
