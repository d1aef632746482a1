//! Brand and category classification

use super::brands::profiles;
use super::{Brand, Category, ExtractionProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub brand: Option<Brand>,
    pub category: Category,
}

/// First brand in priority order whose signature matches wins. Category is
/// battery only when that brand's battery indicators match.
pub fn classify(text: &str, profile: &ExtractionProfile) -> Classification {
    match profiles().iter().find(|p| p.matches(text)) {
        Some(brand_profile) => Classification {
            brand: Some(brand_profile.brand),
            category: if brand_profile.is_battery(text, profile.strict) {
                Category::Battery
            } else {
                Category::Inverter
            },
        },
        None => Classification {
            brand: None,
            category: Category::Inverter,
        },
    }
}
