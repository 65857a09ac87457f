/// A string-similarity score in the range [0.0, 1.0], where 1.0 means identical.
///
/// The normalizer only relies on the ordering of scores and a threshold, so any metric
/// with that range can be swapped in.
pub trait Similarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f32;
}

/// `1 - levenshtein / max_len`, computed over chars.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenshteinRatio;

impl Similarity for LevenshteinRatio {
    fn score(&self, a: &str, b: &str) -> f32 {
        let max_len = a.chars().count().max(b.chars().count());
        if max_len == 0 {
            return 1.0;
        }
        1.0 - (levenshtein_distance(a, b) as f32 / max_len as f32)
    }
}

/// Char-level edit distance, holding only two rows of the DP table at a time.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    let (m, n) = (a.len(), b.len());

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Rows are sized by the longer string; the shorter one drives the outer loop.
    let (a, b, m, n) = if m <= n { (a, b, m, n) } else { (b, a, n, m) };

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_are_zero() {
        assert_eq!(levenshtein_distance("SALEM", "SALEM"), 0);
        assert_eq!(levenshtein_distance("", ""), 0);
    }

    #[test]
    fn empty_string_is_length_of_other() {
        assert_eq!(levenshtein_distance("", "ERODE"), 5);
        assert_eq!(levenshtein_distance("ERODE", ""), 5);
    }

    #[test]
    fn single_edits() {
        assert_eq!(levenshtein_distance("MADURAI", "MADURA"), 1);
        assert_eq!(levenshtein_distance("KARUR", "KARUT"), 1);
        assert_eq!(levenshtein_distance("TRICHY", "TRICHYY"), 1);
    }

    #[test]
    fn counts_chars_not_bytes() {
        assert_eq!(levenshtein_distance("café", "cafe"), 1);
    }

    #[test]
    fn ratio_bounds() {
        let m = LevenshteinRatio;
        assert_eq!(m.score("", ""), 1.0);
        assert_eq!(m.score("VELLORE", "VELLORE"), 1.0);
        assert_eq!(m.score("ABC", "XYZ"), 0.0);
    }

    #[test]
    fn ratio_is_commutative() {
        let m = LevenshteinRatio;
        assert_eq!(m.score("COIMBATORE", "COIMBATOR"), m.score("COIMBATOR", "COIMBATORE"));
        assert!(m.score("COIMBATORE", "COIMBATOR") > 0.85);
    }
}
