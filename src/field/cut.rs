//! Cut-number normalization and the generic callsign grammar.

use std::borrow::Cow;

/// Field names that always receive cut-number normalization.
pub const DEFAULT_NUMERIC_FIELDS: &[&str] = &[
    "SERNO", "CQZONE", "ITUZONE", "AGE", "CHECK", "FOC", "10MNUM", "ZONE",
];

/// Rewrites Morse cut numbers (`T`, `N`, `A`) to `0`, `9`, `1`.
///
/// Tokens that contain anything other than digits and cut letters are
/// returned untouched, so `TEN` or `ENY` never become numbers. Callers apply
/// this only to numeric fields.
pub fn normalize_cut_numbers(token: &str) -> Cow<'_, str> {
    let is_cut_letter = |c: char| matches!(c, 'T' | 'N' | 'A');
    if !token.chars().any(is_cut_letter) {
        return Cow::Borrowed(token);
    }
    if !token.chars().all(|c| c.is_ascii_digit() || is_cut_letter(c)) {
        return Cow::Borrowed(token);
    }

    Cow::Owned(
        token
            .chars()
            .map(|c| match c {
                'T' => '0',
                'N' => '9',
                'A' => '1',
                other => other,
            })
            .collect(),
    )
}

/// Returns true when `token` could plausibly be a callsign: at least three
/// characters, at least one letter and one digit, and nothing but
/// letters, digits and `/`.
pub fn looks_like_callsign(token: &str) -> bool {
    token.len() >= 3
        && token.chars().any(|c| c.is_ascii_alphabetic())
        && token.chars().any(|c| c.is_ascii_digit())
        && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cut_letters_become_digits() {
        assert_eq!(normalize_cut_numbers("1T"), "10");
        assert_eq!(normalize_cut_numbers("5NN"), "599");
        assert_eq!(normalize_cut_numbers("A4"), "14");
        assert_eq!(normalize_cut_numbers("TTA"), "001");
    }

    #[test]
    fn non_numeric_tokens_are_untouched() {
        assert!(matches!(normalize_cut_numbers("14"), Cow::Borrowed("14")));
        assert_eq!(normalize_cut_numbers("NA"), "91");
        assert_eq!(normalize_cut_numbers("ENY"), "ENY");
        assert_eq!(normalize_cut_numbers("HQ"), "HQ");
    }

    #[test]
    fn callsign_grammar() {
        assert!(looks_like_callsign("W4AMJ"));
        assert!(looks_like_callsign("VE3/G4ABC"));
        assert!(!looks_like_callsign("599"));
        assert!(!looks_like_callsign("HQ"));
        assert!(!looks_like_callsign("K1"));
        assert!(!looks_like_callsign("K1-AB"));
    }
}
