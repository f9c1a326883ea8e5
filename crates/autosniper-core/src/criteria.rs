//! Typed search criteria shared by query construction and filter matching.

use serde::{Deserialize, Serialize};

/// Optional criteria of a search. Every unset field places no constraint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchCriteria {
    /// Manufacturer, e.g. `Audi`
    pub brand: Option<String>,
    /// Model, e.g. `A4`
    pub model: Option<String>,
    /// Inclusive lower bound on model year
    pub min_year: Option<i32>,
    /// Inclusive upper bound on model year
    pub max_year: Option<i32>,
    /// Inclusive lower bound on price (TL)
    pub min_price: Option<f64>,
    /// Inclusive upper bound on price (TL)
    pub max_price: Option<f64>,
    /// City name
    pub city: Option<String>,
    /// Fuel type, e.g. `dizel`
    pub fuel_type: Option<String>,
    /// Transmission, e.g. `otomatik`
    pub transmission: Option<String>,
}

impl SearchCriteria {
    /// True when no criterion is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.brand.is_none()
            && self.model.is_none()
            && self.min_year.is_none()
            && self.max_year.is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
            && self.city.is_none()
            && self.fuel_type.is_none()
            && self.transmission.is_none()
    }

    /// Treat blank strings as unset.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        fn clean(value: &mut Option<String>) {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *value = None;
            } else if let Some(v) = value {
                *v = v.trim().to_string();
            }
        }
        clean(&mut self.brand);
        clean(&mut self.model);
        clean(&mut self.city);
        clean(&mut self.fuel_type);
        clean(&mut self.transmission);
        self
    }
}
