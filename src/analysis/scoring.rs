//! Serial candidate scoring policy
//!
//! Brand-independent part of the serial confidence score. Brand-specific
//! format bonuses live with each [`BrandProfile`](super::BrandProfile).

use super::serial::CandidateSource;

/// Named weights for serial candidate scoring
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringPolicy {
    /// Base score for a value found after a serial label
    pub labeled_base: i32,
    /// Base score for a free-standing token
    pub generic_base: i32,
    pub long_length: usize,
    pub long_bonus: i32,
    pub longer_length: usize,
    pub longer_bonus: i32,
    /// Lengths above this are penalized
    pub overlong_length: usize,
    pub overlong_penalty: i32,
    /// Value mixes letters and digits
    pub mixed_bonus: i32,
    pub digits_only_bonus: i32,
    /// Source text mentions SN or SERIAL
    pub context_bonus: i32,
    pub all_zero_penalty: i32,
    pub letters_only_penalty: i32,
    /// Score forced onto denylisted tokens
    pub disqualified: i32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            labeled_base: 60,
            generic_base: 10,
            long_length: 10,
            long_bonus: 15,
            longer_length: 14,
            longer_bonus: 10,
            overlong_length: 24,
            overlong_penalty: -10,
            mixed_bonus: 12,
            digits_only_bonus: 6,
            context_bonus: 5,
            all_zero_penalty: -50,
            letters_only_penalty: -10,
            disqualified: -999,
        }
    }
}

impl ScoringPolicy {
    /// Score a normalized candidate value without brand bonuses.
    ///
    /// `value` is expected uppercase alphanumeric.
    pub fn base_score(&self, value: &str, source: CandidateSource, serial_context: bool) -> i32 {
        let mut score = match source {
            CandidateSource::Labeled => self.labeled_base,
            CandidateSource::Generic => self.generic_base,
        };

        let len = value.len();
        if len >= self.long_length {
            score += self.long_bonus;
        }
        if len >= self.longer_length {
            score += self.longer_bonus;
        }
        if len > self.overlong_length {
            score += self.overlong_penalty;
        }

        let has_digit = value.chars().any(|c| c.is_ascii_digit());
        let has_letter = value.chars().any(|c| c.is_ascii_alphabetic());
        if has_digit && has_letter {
            score += self.mixed_bonus;
        } else if has_digit {
            score += self.digits_only_bonus;
        }

        if serial_context {
            score += self.context_bonus;
        }

        if !value.is_empty() && value.chars().all(|c| c == '0') {
            score += self.all_zero_penalty;
        }
        if has_letter && !has_digit {
            score += self.letters_only_penalty;
        }

        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labeled_mixed_long_value() {
        let policy = ScoringPolicy::default();
        // 60 + 15 + 10 + 12 + 5
        assert_eq!(policy.base_score("2201A00123456789", CandidateSource::Labeled, true), 102);
    }

    #[test]
    fn test_generic_short_numeric_value() {
        let policy = ScoringPolicy::default();
        // 10 + 6
        assert_eq!(policy.base_score("12345678", CandidateSource::Generic, false), 16);
    }

    #[test]
    fn test_penalties() {
        let policy = ScoringPolicy::default();
        // 10 + 15 + 6 - 50
        assert_eq!(policy.base_score("0000000000", CandidateSource::Generic, false), -19);
        // 10 + 15 - 10
        assert_eq!(policy.base_score("ABCDEFGHIJ", CandidateSource::Generic, false), 15);
        // 10 + 15 + 10 - 10 + 12
        let overlong = "A1".repeat(13);
        assert_eq!(policy.base_score(&overlong, CandidateSource::Generic, false), 37);
    }

    #[test]
    fn test_context_bonus_only_with_context() {
        let policy = ScoringPolicy::default();
        let with = policy.base_score("AB123456", CandidateSource::Labeled, true);
        let without = policy.base_score("AB123456", CandidateSource::Labeled, false);
        assert_eq!(with - without, policy.context_bonus);
    }
}
