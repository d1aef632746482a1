//! Brand profiles
//!
//! Each supported manufacturer is one [`BrandProfile`] record: detection
//! signatures, battery indicators, model rules, serial format bonuses and
//! the rating rule. Adding a brand means adding a record here.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Brand, Category, Scope};

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

/// "Model No.", "Model N0", "Model Number"
pub(crate) static MODEL_NO_LABEL: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\bMODEL\s*(?:NO|N0|NUMBER)\b\.?\s*[:#]?\s*"));
/// Bare "Model:" with an explicit separator
pub(crate) static MODEL_LABEL: Lazy<Regex> = Lazy::new(|| re(r"(?i)\bMODEL\b\s*[:#]\s*"));
pub(crate) static MODEL_NAME_LABEL: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)\bMODEL\s*NAME\b\s*[:#]?\s*"));

/// A brand-specific model rule
#[derive(Debug)]
pub enum ModelRule {
    /// Label pattern; the model is read from the rest of the line
    Labeled(&'static Lazy<Regex>),
    /// Model code pattern matched anywhere in the text
    Code(Regex),
}

/// Pattern that marks a label as a battery for this brand
#[derive(Debug)]
pub struct BatteryIndicator {
    pub pattern: Regex,
    pub scope: Scope,
}

/// Brand-specific serial format bonus
#[derive(Debug, Clone, PartialEq)]
pub enum BonusKind {
    /// Fixed-length battery serials, graded by letter/digit layout
    BatteryLayout {
        length: usize,
        length_bonus: i32,
        /// (letters, digits) layout that earns `exact_bonus`
        exact: (usize, usize),
        exact_bonus: i32,
        max_letters: usize,
        min_digits: usize,
        near_bonus: i32,
        all_digits_bonus: i32,
        lead: char,
        lead_bonus: i32,
    },
    /// All-digit value of exactly `length`
    NumericLength { length: usize, bonus: i32 },
    /// Raw value starts with `prefix` and is longer than `min_length`
    Prefix {
        prefix: &'static str,
        min_length: usize,
        bonus: i32,
    },
    MinLength { length: usize, bonus: i32 },
    /// Raw value was written with '/' or '-' separators
    Separator { bonus: i32 },
}

impl BonusKind {
    /// `value` is the normalized candidate, `raw` the token as read
    pub fn score(&self, value: &str, raw: &str) -> i32 {
        let letters = value.chars().filter(|c| c.is_ascii_alphabetic()).count();
        let digits = value.chars().filter(|c| c.is_ascii_digit()).count();

        match *self {
            BonusKind::BatteryLayout {
                length,
                length_bonus,
                exact,
                exact_bonus,
                max_letters,
                min_digits,
                near_bonus,
                all_digits_bonus,
                lead,
                lead_bonus,
            } => {
                if value.len() != length {
                    return 0;
                }
                let mut bonus = length_bonus;
                if (letters, digits) == exact {
                    bonus += exact_bonus;
                } else if (1..=max_letters).contains(&letters) && digits >= min_digits {
                    bonus += near_bonus;
                } else if digits == length {
                    bonus += all_digits_bonus;
                }
                if value.starts_with(lead) {
                    bonus += lead_bonus;
                }
                bonus
            }
            BonusKind::NumericLength { length, bonus } => {
                if value.len() == length && digits == length {
                    bonus
                } else {
                    0
                }
            }
            BonusKind::Prefix {
                prefix,
                min_length,
                bonus,
            } => {
                if raw.to_ascii_uppercase().starts_with(prefix) && value.len() > min_length {
                    bonus
                } else {
                    0
                }
            }
            BonusKind::MinLength { length, bonus } => {
                if value.len() >= length {
                    bonus
                } else {
                    0
                }
            }
            BonusKind::Separator { bonus } => {
                if raw.contains('/') || raw.contains('-') {
                    bonus
                } else {
                    0
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SerialBonus {
    pub kind: BonusKind,
    pub scope: Scope,
    /// Restrict to one category
    pub category: Option<Category>,
}

impl SerialBonus {
    fn new(kind: BonusKind, scope: Scope, category: Option<Category>) -> Self {
        Self {
            kind,
            scope,
            category,
        }
    }

    pub fn applies(&self, strict: bool, category: Category) -> bool {
        self.scope.applies(strict) && self.category.map_or(true, |c| c == category)
    }
}

/// Everything brand-specific the extractors need
#[derive(Debug)]
pub struct BrandProfile {
    pub brand: Brand,
    /// Any match identifies the brand
    pub signatures: Vec<Regex>,
    pub battery_indicators: Vec<BatteryIndicator>,
    /// Tried in order; first hit wins
    pub model_rules: Vec<ModelRule>,
    pub serial_bonuses: Vec<SerialBonus>,
    /// Rating from the model code, capture group 1 in kW
    pub rating_rule: Option<Regex>,
    /// Brand words that are never serials
    pub name_tokens: &'static [&'static str],
}

impl BrandProfile {
    pub fn matches(&self, text: &str) -> bool {
        self.signatures.iter().any(|s| s.is_match(text))
    }

    pub fn is_battery(&self, text: &str, strict: bool) -> bool {
        self.battery_indicators
            .iter()
            .any(|i| i.scope.applies(strict) && i.pattern.is_match(text))
    }

    /// Total brand bonus for a candidate
    pub fn serial_bonus(&self, value: &str, raw: &str, category: Category, strict: bool) -> i32 {
        self.serial_bonuses
            .iter()
            .filter(|b| b.applies(strict, category))
            .map(|b| b.kind.score(value, raw))
            .sum()
    }
}

fn deye() -> BrandProfile {
    BrandProfile {
        brand: Brand::Deye,
        signatures: vec![
            re(r"(?i)\bDEYE"),
            re(r"(?i)\bSUN-[A-Z0-9]"),
            re(r"(?i)\b(?:SE|RW)-[A-Z0-9]"),
        ],
        battery_indicators: vec![
            BatteryIndicator {
                pattern: re(r"(?i)NOMINAL\s*ENERGY"),
                scope: Scope::Both,
            },
            BatteryIndicator {
                pattern: re(r"(?i)\b(?:SE|RW|AI|BOS)-[A-Z0-9]"),
                scope: Scope::Both,
            },
            BatteryIndicator {
                pattern: re(r"(?i)\bBATTERY\b"),
                scope: Scope::StrictOnly,
            },
        ],
        model_rules: vec![
            ModelRule::Labeled(&MODEL_NO_LABEL),
            ModelRule::Labeled(&MODEL_LABEL),
            ModelRule::Code(re(r"(?i)\b(?:SE|RW|AI|BOS)-[A-Z0-9./-]{2,}(?:[ \t]+(?:PRO|PLUS|MAX))?\b")),
            ModelRule::Code(re(r"(?i)\bSUN-[A-Z0-9./-]{4,}")),
        ],
        serial_bonuses: vec![
            SerialBonus::new(
                BonusKind::BatteryLayout {
                    length: 16,
                    length_bonus: 60,
                    exact: (2, 14),
                    exact_bonus: 100,
                    max_letters: 4,
                    min_digits: 12,
                    near_bonus: 80,
                    all_digits_bonus: 40,
                    lead: '2',
                    lead_bonus: 20,
                },
                Scope::StrictOnly,
                Some(Category::Battery),
            ),
            SerialBonus::new(
                BonusKind::NumericLength { length: 10, bonus: 80 },
                Scope::StrictOnly,
                Some(Category::Inverter),
            ),
            SerialBonus::new(BonusKind::MinLength { length: 12, bonus: 4 }, Scope::QuickOnly, None),
        ],
        rating_rule: Some(re(r"\bSUN-(\d{1,2}(?:\.\d+)?)(?:KW|K)\b")),
        name_tokens: &["DEYE", "DEYEPOWER", "NINGBODEYE"],
    }
}

fn solis() -> BrandProfile {
    BrandProfile {
        brand: Brand::Solis,
        signatures: vec![re(r"(?i)\bSOLIS"), re(r"(?i)\bGINLONG")],
        battery_indicators: Vec::new(),
        model_rules: vec![
            ModelRule::Labeled(&MODEL_LABEL),
            ModelRule::Labeled(&MODEL_NO_LABEL),
            ModelRule::Code(re(r"(?i)\bS[56]-[A-Z0-9./-]{3,}")),
        ],
        serial_bonuses: vec![
            SerialBonus::new(
                BonusKind::NumericLength { length: 16, bonus: 80 },
                Scope::StrictOnly,
                None,
            ),
            SerialBonus::new(BonusKind::Separator { bonus: 2 }, Scope::QuickOnly, None),
        ],
        rating_rule: Some(re(r"(\d{1,3}(?:\.\d+)?)\s*K\b")),
        name_tokens: &["SOLIS", "GINLONG", "SOLISINVERTERS", "GINLONGSOLIS"],
    }
}

fn solax() -> BrandProfile {
    BrandProfile {
        brand: Brand::Solax,
        signatures: vec![re(r"(?i)\bSOLAX"), re(r"(?i)\bSOLUX"), re(r"(?i)\bX[13]-")],
        battery_indicators: Vec::new(),
        model_rules: vec![
            ModelRule::Labeled(&MODEL_NO_LABEL),
            ModelRule::Labeled(&MODEL_LABEL),
            ModelRule::Labeled(&MODEL_NAME_LABEL),
            ModelRule::Code(re(r"(?i)\bX[13]-[A-Z0-9./-]{3,}")),
        ],
        serial_bonuses: vec![
            SerialBonus::new(
                BonusKind::Prefix {
                    prefix: "H",
                    min_length: 10,
                    bonus: 60,
                },
                Scope::StrictOnly,
                None,
            ),
            SerialBonus::new(BonusKind::Separator { bonus: 3 }, Scope::QuickOnly, None),
        ],
        rating_rule: None,
        name_tokens: &["SOLAX", "SOLAXPOWER", "SOLUX"],
    }
}

static PROFILES: Lazy<Vec<BrandProfile>> = Lazy::new(|| {
    Brand::PRIORITY
        .iter()
        .map(|brand| match brand {
            Brand::Deye => deye(),
            Brand::Solis => solis(),
            Brand::Solax => solax(),
        })
        .collect()
});

/// All profiles in classification priority order
pub fn profiles() -> &'static [BrandProfile] {
    &PROFILES
}

pub fn profile_for(brand: Brand) -> &'static BrandProfile {
    // PROFILES is built from PRIORITY, so the index always exists
    let index = Brand::PRIORITY.iter().position(|b| *b == brand).unwrap_or(0);
    &PROFILES[index]
}
