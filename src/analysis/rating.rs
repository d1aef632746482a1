//! Power and capacity rating extraction

use once_cell::sync::Lazy;
use regex::Regex;

use super::brands::profile_for;
use super::{Brand, Category};

static NOMINAL_ENERGY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)NOMINAL\s*ENERGY\s*[:.\-]?\s*(\d+[.,]?\d*)\s*K?WH").unwrap());

/// Battery capacity in kWh from the text, or power in kW from the model code
/// when no capacity is printed.
pub fn extract_rating(brand: Brand, model: Option<&str>, text: &str, category: Category) -> Option<f64> {
    if category == Category::Battery {
        let capacity = NOMINAL_ENERGY
            .captures(text)
            .and_then(|caps| parse_decimal(&caps[1]));
        if capacity.is_some() {
            return capacity;
        }
    }

    let rule = profile_for(brand).rating_rule.as_ref()?;
    let model = model?.to_ascii_uppercase();
    rule.captures(&model).and_then(|caps| parse_decimal(&caps[1]))
}

/// Decimal comma is read as a decimal point
fn parse_decimal(s: &str) -> Option<f64> {
    s.replace(',', ".").parse().ok()
}
