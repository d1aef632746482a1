//! Serial number candidate generation and ranking
//!
//! Candidates come from two places: values written after a serial label
//! ("S/N:", "SN", "Serial No.") and free-standing long alphanumeric tokens.
//! Each is scored by [`ScoringPolicy`](super::ScoringPolicy) plus the brand's
//! format bonuses, and the best one above the profile threshold wins.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::brands::{profile_for, BrandProfile};
use super::{Brand, Category, ExtractionProfile};

static SERIAL_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:S\s*/\s*N(?:\s*NO)?|SN|SERIAL(?:\s*(?:NO|NUMBER))?)\b\.?\s*[:#]?\s*([^\n]*)").unwrap()
});
static ALNUM_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9]{8,}").unwrap());
static PLAUSIBLE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[A-Z0-9][A-Z0-9_/\-]{6,}$").unwrap());
static REGULATORY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:IP\d+|UKCA|CE|ROHS|FCC|HZ|VAC|VDC|AC|DC|KW|KVA|W|V|A)$").unwrap());
static UNIT_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,6}(?:V|W|A|HZ|KW|KVA|VA|VAC|VDC|WH|KWH)$").unwrap());

/// Label words and boilerplate that are never serials
const GENERIC_WORDS: &[&str] = &[
    "MODEL",
    "BATTERY",
    "VERSION",
    "LIION",
    "LITHIUM",
    "CHINA",
    "INVERTER",
    "MANUFACTURER",
    "CERTIFICATE",
];

/// Short tokens of a labelled value that are joined when both are below this
const SPLIT_TOKEN_LEN: usize = 10;
const MIN_LABELED_LEN: usize = 4;
const MIN_GENERIC_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Labeled,
    Generic,
}

/// A scored serial candidate
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionCandidate {
    /// Uppercase alphanumeric value
    pub value: String,
    /// Token as it appeared in the text
    pub raw: String,
    pub source: CandidateSource,
    pub score: i32,
}

/// Best serial above the profile threshold, if any
pub fn extract_serial(
    text: &str,
    brand: Option<Brand>,
    category: Category,
    profile: &ExtractionProfile,
) -> Option<String> {
    rank_candidates(text, brand, category, profile)
        .into_iter()
        .find(|c| c.score >= profile.min_serial_score)
        .map(|c| c.value)
}

/// Every distinct candidate, best first. Ties keep text order.
pub fn rank_candidates(
    text: &str,
    brand: Option<Brand>,
    category: Category,
    profile: &ExtractionProfile,
) -> Vec<ExtractionCandidate> {
    let brand_profile = brand.map(profile_for);
    let upper = text.to_ascii_uppercase();
    let serial_context = upper.contains("SN") || upper.contains("SERIAL");

    let mut found: Vec<(usize, String, CandidateSource)> = Vec::new();
    for caps in SERIAL_LABEL.captures_iter(text) {
        if let Some(tail) = caps.get(1) {
            if let Some(raw) = take_token(tail.as_str()) {
                found.push((tail.start(), raw, CandidateSource::Labeled));
            }
        }
    }
    for m in ALNUM_RUN.find_iter(text) {
        found.push((m.start(), m.as_str().to_string(), CandidateSource::Generic));
    }
    found.sort_by_key(|(position, _, _)| *position);

    let mut ranked: Vec<ExtractionCandidate> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (_, raw, source) in found {
        let value = normalize_serial(&raw);
        let min_len = match source {
            CandidateSource::Labeled => MIN_LABELED_LEN,
            CandidateSource::Generic => MIN_GENERIC_LEN,
        };
        if value.len() < min_len {
            continue;
        }
        let denied = is_denylisted(&value, brand_profile);
        if denied && source == CandidateSource::Generic {
            continue;
        }

        let score = if denied {
            profile.scoring.disqualified
        } else {
            let base = profile.scoring.base_score(&value, source, serial_context);
            let bonus = brand_profile
                .map(|p| p.serial_bonus(&value, &raw, category, profile.strict))
                .unwrap_or(0);
            base + bonus
        };

        match index.get(&value) {
            Some(&i) => {
                if score > ranked[i].score {
                    ranked[i].score = score;
                    ranked[i].source = source;
                    ranked[i].raw = raw;
                }
            }
            None => {
                index.insert(value.clone(), ranked.len());
                ranked.push(ExtractionCandidate {
                    value,
                    raw,
                    source,
                    score,
                });
            }
        }
    }

    // Stable sort: equal scores keep first-seen order
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}

/// Pick the value out of the text following a serial label
fn take_token(tail: &str) -> Option<String> {
    let cut = tail.split(['\r', '\n', ',', ';', '(', ')']).next()?;
    let parts: Vec<&str> = cut.split_whitespace().collect();

    match parts.as_slice() {
        [] => None,
        [first, second, ..]
            if first.len() < SPLIT_TOKEN_LEN
                && second.len() < SPLIT_TOKEN_LEN
                && second.chars().any(|c| c.is_ascii_digit()) =>
        {
            let joined = format!("{first}{second}");
            if PLAUSIBLE_CODE.is_match(&joined) {
                Some(joined)
            } else {
                Some(first.to_string())
            }
        }
        [first, ..] => Some(first.to_string()),
    }
}

/// Uppercase and strip everything but ASCII letters and digits
pub fn normalize_serial(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn is_denylisted(value: &str, brand: Option<&BrandProfile>) -> bool {
    REGULATORY.is_match(value)
        || UNIT_VALUE.is_match(value)
        || GENERIC_WORDS.contains(&value)
        || brand.is_some_and(|b| b.name_tokens.contains(&value))
}
