//! Nameplate Analysis Layer
//!
//! Turns recognized label text into a structured [`NameplateRecord`]:
//! normalization, brand/category classification, then model, serial and
//! rating extraction parameterized by the classified brand.

pub mod brands;
pub mod classify;
pub mod model;
pub mod normalize;
pub mod rating;
pub mod scoring;
pub mod serial;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub use brands::{profile_for, BrandProfile};
pub use classify::{classify, Classification};
pub use model::extract_model;
pub use normalize::normalize;
pub use rating::extract_rating;
pub use scoring::ScoringPolicy;
pub use serial::{extract_serial, rank_candidates, CandidateSource, ExtractionCandidate};

/// Equipment manufacturer, in classification priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Brand {
    Deye,
    Solis,
    Solax,
}

impl Brand {
    /// All brands, highest priority first
    pub const PRIORITY: [Brand; 3] = [Brand::Deye, Brand::Solis, Brand::Solax];

    pub fn as_str(self) -> &'static str {
        match self {
            Brand::Deye => "DEYE",
            Brand::Solis => "SOLIS",
            Brand::Solax => "SOLAX",
        }
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse device category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Inverter,
    Battery,
}

/// Which extraction variant a brand rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Both,
    StrictOnly,
    QuickOnly,
}

impl Scope {
    pub fn applies(self, strict: bool) -> bool {
        match self {
            Scope::Both => true,
            Scope::StrictOnly => strict,
            Scope::QuickOnly => !strict,
        }
    }
}

/// Extraction variant and its confidence policy.
///
/// `strict` is the authoritative assignment path; the quick variant is the
/// capture-time pre-check and accepts lower-confidence serials.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionProfile {
    pub strict: bool,
    /// Serial candidates scoring below this are discarded
    pub min_serial_score: i32,
    pub scoring: ScoringPolicy,
}

impl ExtractionProfile {
    pub fn strict() -> Self {
        Self {
            strict: true,
            min_serial_score: 30,
            scoring: ScoringPolicy::default(),
        }
    }

    pub fn quick() -> Self {
        Self {
            strict: false,
            min_serial_score: 1,
            scoring: ScoringPolicy::default(),
        }
    }

    pub fn from_strict(strict: bool) -> Self {
        if strict {
            Self::strict()
        } else {
            Self::quick()
        }
    }
}

impl Default for ExtractionProfile {
    fn default() -> Self {
        Self::strict()
    }
}

/// Structured result of one nameplate scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameplateRecord {
    pub brand: Option<Brand>,
    pub category: Category,
    pub model: Option<String>,
    pub serial: Option<String>,
    /// kW for inverters, kWh for batteries
    pub rating: Option<f64>,
    /// Normalized text the fields were extracted from
    pub source_text: String,
}

impl NameplateRecord {
    /// Enough was resolved to assign the device to an inventory entry
    pub fn is_assignable(&self) -> bool {
        self.brand.is_some() && self.model.is_some()
    }

    /// Inventory display name, e.g. "DEYE SUN-10K-G"
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.brand.map(Brand::as_str).unwrap_or("Unknown"),
            self.model.as_deref().unwrap_or("Device")
        )
    }
}

/// Run the text stages of the pipeline over raw recognized text
pub fn extract(raw_text: &str, profile: &ExtractionProfile) -> NameplateRecord {
    let text = normalize(raw_text, profile.strict);
    let Classification { brand, category } = classify(&text, profile);

    let Some(brand) = brand else {
        debug!("No brand signature matched");
        // Quick scans still surface a serial for unrecognized labels
        let serial = if profile.strict {
            None
        } else {
            extract_serial(&text, None, Category::default(), profile)
        };
        return NameplateRecord {
            brand: None,
            category: Category::default(),
            model: None,
            serial,
            rating: None,
            source_text: text,
        };
    };

    let model = extract_model(&text, brand);
    let serial = extract_serial(&text, Some(brand), category, profile);
    let rating = extract_rating(brand, model.as_deref(), &text, category);

    debug!(
        brand = %brand,
        ?category,
        model = model.as_deref().unwrap_or("-"),
        serial = serial.as_deref().unwrap_or("-"),
        "Extracted nameplate fields"
    );

    NameplateRecord {
        brand: Some(brand),
        category,
        model,
        serial,
        rating,
        source_text: text,
    }
}
