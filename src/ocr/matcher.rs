use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// `M`, one or two digits, `-T`, then `D` (tutorial) or `P` (lab).
static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^M[0-9]{1,2}-T[DP]$").expect("token pattern is valid"));

/// A room code read off a frame, already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecognizedToken(String);

impl RecognizedToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lab sessions end in `-TP`.
    pub fn is_lab(&self) -> bool {
        self.0.ends_with("-TP")
    }
}

impl fmt::Display for RecognizedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// OCR routinely reads `0` as a letter O; room codes never contain an O.
pub fn preprocess(line: &str) -> String {
    line.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == 'o' || c == 'O' { '0' } else { c })
        .collect()
}

pub fn is_valid_format(candidate: &str) -> bool {
    TOKEN_PATTERN.is_match(candidate)
}

/// Scans `text` line by line and returns the first line that normalizes to a token.
pub fn find_token(text: &str) -> Option<RecognizedToken> {
    text.lines()
        .map(preprocess)
        .find(|line| is_valid_format(line))
        .map(RecognizedToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepts(raw: &str) -> bool {
        is_valid_format(&preprocess(raw))
    }

    #[test]
    fn test_format_examples() {
        assert!(!accepts("m01-TP"));
        assert!(accepts("M0O-TP"));
        assert!(!accepts("M123-TD"));
        assert!(accepts(" M5-TP "));
        assert!(accepts("M13-TD"));
        assert!(accepts("M 1 3 - T P"));
        assert!(accepts("Mo1-TD"));
    }

    #[test]
    fn test_format_rejects() {
        assert!(!accepts(""));
        assert!(!accepts("M-TD"));
        assert!(!accepts("M01-TX"));
        assert!(!accepts("M01TD"));
        assert!(!accepts("XM01-TD"));
        assert!(!accepts("M01-TDX"));
        assert!(!accepts("M01-td"));
    }

    #[test]
    fn test_preprocess_only_touches_o_and_whitespace() {
        assert_eq!(preprocess(" M0O-TP "), "M00-TP");
        assert_eq!(preprocess("o O\t0\n"), "000");
        assert_eq!(preprocess("m01-tp"), "m01-tp");
    }

    #[test]
    fn test_first_matching_line_wins() {
        let token = find_token("noise\nM03-TP\nmore noise").unwrap();
        assert_eq!(token.as_str(), "M03-TP");
        assert!(token.is_lab());

        let token = find_token("M11-TD\nM03-TP").unwrap();
        assert_eq!(token.as_str(), "M11-TD");
        assert!(!token.is_lab());
    }

    #[test]
    fn test_token_is_normalized() {
        let token = find_token("header\r\n  MO3 - TP \r\n").unwrap();
        assert_eq!(token.as_str(), "M03-TP");
    }

    #[test]
    fn test_no_token() {
        assert!(find_token("").is_none());
        assert!(find_token("hello\nworld\nM123-TD").is_none());
    }
}
