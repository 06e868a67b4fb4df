/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Node score arithmetic.
//!
//! Scores are signed integers clamped to `[-INFINITY, +INFINITY]`.  The two
//! extremes are sentinels rather than numbers:
//!
//! | Score | Meaning |
//! |---|---|
//! | `+INFINITY` | resource must run here if it runs at all |
//! | `-INFINITY` | resource may never run here |
//!
//! When both sentinels meet, `-INFINITY` wins: a ban is never overridden by a
//! mandatory preference.

/// Score sentinel meaning "always" (negated: "never").
pub const INFINITY: i32 = 1_000_000;

/// Add two scores, saturating at the sentinels.
///
/// * `-INFINITY` on either side yields `-INFINITY`.
/// * Otherwise `+INFINITY` on either side yields `+INFINITY`.
/// * Otherwise the sum is clamped into the open range.
pub fn add_scores(a: i32, b: i32) -> i32 {
    if a <= -INFINITY || b <= -INFINITY {
        return -INFINITY;
    }
    if a >= INFINITY || b >= INFINITY {
        return INFINITY;
    }
    let sum = i64::from(a) + i64::from(b);
    sum.clamp(i64::from(-INFINITY), i64::from(INFINITY)) as i32
}

/// Clamp an arbitrary value into the score range.
pub fn clamp_score(value: i64) -> i32 {
    value.clamp(i64::from(-INFINITY), i64::from(INFINITY)) as i32
}

/// Parse a textual score: an integer, or `INFINITY` / `+INFINITY` /
/// `-INFINITY` (case-insensitive).  Out-of-range integers are clamped.
///
/// Returns `None` for anything else.
pub fn parse_score(text: &str) -> Option<i32> {
    let trimmed = text.trim();
    match trimmed.to_ascii_uppercase().as_str() {
        "INFINITY" | "+INFINITY" => Some(INFINITY),
        "-INFINITY" => Some(-INFINITY),
        _ => trimmed.parse::<i64>().ok().map(clamp_score),
    }
}

/// Human-readable form of a score (`+INFINITY`, `-INFINITY`, or the number).
pub fn readable_score(score: i32) -> String {
    if score >= INFINITY {
        "+INFINITY".to_string()
    } else if score <= -INFINITY {
        "-INFINITY".to_string()
    } else {
        score.to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_infinity_beats_positive_infinity() {
        assert_eq!(add_scores(INFINITY, -INFINITY), -INFINITY);
        assert_eq!(add_scores(-INFINITY, INFINITY), -INFINITY);
    }

    #[test]
    fn finite_sums_saturate() {
        assert_eq!(add_scores(600_000, 600_000), INFINITY);
        assert_eq!(add_scores(-600_000, -600_000), -INFINITY);
        assert_eq!(add_scores(10, -3), 7);
    }

    #[test]
    fn parse_accepts_sentinels_and_integers() {
        assert_eq!(parse_score("INFINITY"), Some(INFINITY));
        assert_eq!(parse_score("+infinity"), Some(INFINITY));
        assert_eq!(parse_score("-INFINITY"), Some(-INFINITY));
        assert_eq!(parse_score(" 42 "), Some(42));
        assert_eq!(parse_score("99999999999"), Some(INFINITY));
        assert_eq!(parse_score("lots"), None);
    }

    #[test]
    fn readable_score_uses_sentinel_names() {
        assert_eq!(readable_score(INFINITY), "+INFINITY");
        assert_eq!(readable_score(-INFINITY), "-INFINITY");
        assert_eq!(readable_score(5), "5");
    }
}
