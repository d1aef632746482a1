//! Model designation extraction

use once_cell::sync::Lazy;
use regex::Regex;

use super::brands::{profile_for, ModelRule, MODEL_NO_LABEL};
use super::Brand;

/// Words that start the next field on the same line
static NEXT_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:SERIAL|S/N|SN|INPUT|OUTPUT|AC|DC|POWER|RATED|MPPT|VOLT|CURRENT|FREQ|HZ)\b").unwrap()
});
static CODE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 ./_-]*").unwrap());
static SPLIT_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9][A-Za-z0-9./_-]*) ([A-Za-z0-9][A-Za-z0-9./_-]*)$").unwrap());
static GENERIC_MODEL_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bMODEL(?:\s*NAME)?\b\.?\s*[:#]?\s*").unwrap());
static TYPE_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bTYPE\b\s*[:#]?\s*").unwrap());

const MIN_MODEL_LEN: usize = 3;

/// Find the model designation using the brand's rules, then the generic
/// MODEL/TYPE labels.
pub fn extract_model(text: &str, brand: Brand) -> Option<String> {
    let profile = profile_for(brand);

    for rule in &profile.model_rules {
        let found = match rule {
            ModelRule::Labeled(label) => from_label(text, label),
            ModelRule::Code(pattern) => pattern.find(text).and_then(|m| clean_model(m.as_str())),
        };
        if found.is_some() {
            return found;
        }
    }

    from_label(text, &MODEL_NO_LABEL)
        .or_else(|| from_label(text, &GENERIC_MODEL_LABEL))
        .or_else(|| from_label(text, &TYPE_LABEL))
}

/// First usable value following any occurrence of `label`
fn from_label(text: &str, label: &Regex) -> Option<String> {
    label.find_iter(text).find_map(|m| {
        let rest = &text[m.end()..];
        let line = rest.split(['\n', '\r']).next().unwrap_or_default();
        clean_model(line)
    })
}

/// Trim a captured tail down to the model code
fn clean_model(tail: &str) -> Option<String> {
    let tail = match NEXT_FIELD.find(tail) {
        Some(m) => &tail[..m.start()],
        None => tail,
    };

    let code = CODE_PREFIX.find(tail.trim_start())?.as_str();
    let collapsed = code.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '#' | '.' | '-' | '/' | '_'))
        .to_string();

    let joined = match SPLIT_CODE.captures(&trimmed) {
        // "X1-HYB 5.0" style split: both halves carry digits
        Some(caps) if has_digit(&caps[1]) && has_digit(&caps[2]) => format!("{}{}", &caps[1], &caps[2]),
        _ => trimmed,
    };

    (joined.len() >= MIN_MODEL_LEN).then_some(joined)
}

fn has_digit(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit())
}
