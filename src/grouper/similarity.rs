//! Booking reference similarity.
//!
//! A 95% ratio cannot be met by any one-character difference in a
//! six-character code (5/6 ≈ 83%), so the threshold is turned into an edit
//! budget instead: `max(1, floor(len × (1 − threshold)))`. Short codes
//! tolerate exactly one typo; codes of 40+ characters tolerate two.

/// Levenshtein distance over characters.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 − distance / longer_length`, in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// A threshold of 1.0 demands identical references, which is the exact
/// match; fuzzy matching is off.
pub fn fuzzy_enabled(threshold: f64) -> bool {
    threshold < 1.0
}

/// Edits a reference of `len` characters may differ by at `threshold`.
/// At least one edit for any threshold below 1.0.
pub fn edit_budget(len: usize, threshold: f64) -> usize {
    let allowed = (len as f64 * (1.0 - threshold) + 1e-9).floor() as usize;
    allowed.max(1)
}

/// Similarity of two distinct references when they are within the edit
/// budget, `None` otherwise.
///
/// Identical references are not a fuzzy match (they are an exact one), and
/// references shorter than `min_length` are never compared. Nothing
/// matches once [`fuzzy_enabled`] is false.
pub fn fuzzy_match(a: &str, b: &str, threshold: f64, min_length: usize) -> Option<f64> {
    if a == b || !fuzzy_enabled(threshold) {
        return None;
    }
    let (len_a, len_b) = (a.chars().count(), b.chars().count());
    if len_a < min_length || len_b < min_length {
        return None;
    }
    let budget = edit_budget(len_a.max(len_b), threshold);
    if len_a.abs_diff(len_b) > budget {
        return None;
    }
    if levenshtein(a, b) <= budget {
        Some(similarity(a, b))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", "ABC"), 3);
        assert_eq!(levenshtein("ABCD12", "ABCD12"), 0);
        assert_eq!(levenshtein("ABCD12", "ABCD1Z"), 1);
        assert_eq!(levenshtein("ABCD12", "ABCD12X"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn test_edit_budget() {
        assert_eq!(edit_budget(6, 0.95), 1);
        assert_eq!(edit_budget(20, 0.95), 1);
        assert_eq!(edit_budget(40, 0.95), 2);
        assert_eq!(edit_budget(10, 0.8), 2);
    }

    #[test]
    fn test_fuzzy_boundary() {
        let sim = fuzzy_match("ABCD12", "ABCD1Z", 0.95, 5).unwrap();
        assert!((sim - 5.0 / 6.0).abs() < 1e-9);
        assert_eq!(fuzzy_match("ABCD12", "ABCDZZ", 0.95, 5), None);
    }

    #[test]
    fn test_fuzzy_ignores_identical_and_short() {
        assert_eq!(fuzzy_match("ABCD12", "ABCD12", 0.95, 5), None);
        assert_eq!(fuzzy_match("AB12", "AB13", 0.95, 5), None);
    }

    #[test]
    fn test_threshold_one_disables_fuzzy() {
        assert!(fuzzy_enabled(0.99));
        assert!(!fuzzy_enabled(1.0));
        assert_eq!(fuzzy_match("ABCD12", "ABCD1Z", 1.0, 5), None);
        assert!(fuzzy_match("ABCD12", "ABCD1Z", 0.99, 5).is_some());
    }
}
