//! Recognized-text normalization
//!
//! Canonicalizes OCR output before any field extraction. All transforms are
//! idempotent so normalized text can be normalized again safely.

use once_cell::sync::Lazy;
use regex::Regex;

static MODEL_PREFIX_MISREAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bXL-").unwrap());
static SERIAL_PREFIX_MISREAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bHU(\d)").unwrap());

/// Canonicalize whitespace and typography, then apply the domain repairs
/// when `repair` is set.
pub fn normalize(text: &str, repair: bool) -> String {
    let folded: String = text.chars().map(fold_char).collect();

    let mut lines: Vec<&str> = Vec::new();
    let mut previous_blank = false;
    for line in folded.lines() {
        let line = line.trim_end();
        let blank = line.is_empty();
        if blank && previous_blank {
            continue;
        }
        lines.push(line);
        previous_blank = blank;
    }

    let collapsed = lines.join("\n").trim().to_string();

    if repair {
        repair_misreads(&collapsed)
    } else {
        collapsed
    }
}

/// Fold look-alike typography to ASCII
fn fold_char(c: char) -> char {
    match c {
        '\u{00A0}' | '\u{2007}' | '\u{202F}' => ' ',
        '\u{201C}' | '\u{201D}' | '\u{201E}' => '"',
        '\u{2018}' | '\u{2019}' | '\u{201A}' => '\'',
        '\u{2010}'..='\u{2015}' | '\u{2212}' => '-',
        '|' => ' ',
        _ => c,
    }
}

/// Known OCR confusions on inverter and battery labels.
///
/// `XL-` is a misread of the `X1-` model prefix; `HU` before a digit is a
/// misread of the `HL` serial prefix.
fn repair_misreads(text: &str) -> String {
    let text = MODEL_PREFIX_MISREAD.replace_all(text, "X1-");
    SERIAL_PREFIX_MISREAD.replace_all(&text, "HL${1}").into_owned()
}
