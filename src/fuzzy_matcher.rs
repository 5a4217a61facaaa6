use strsim::normalized_levenshtein;

/// Fuzzy matcher for short free-text questions.
///
/// Scores are on a 0-100 scale and combine a plain edit-distance ratio with
/// partial (best window) and token-order-insensitive variants, keeping the best.
pub struct FuzzyMatcher {
    /// Minimum score (exclusive) for two strings to count as a match
    pub threshold: u8,
    /// Whether to normalize strings before comparison
    pub normalize: bool,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self {
            threshold: 50,
            normalize: true,
        }
    }
}

impl FuzzyMatcher {
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold,
            normalize: true,
        }
    }

    /// Normalize a string for fuzzy matching
    /// - Converts to lowercase
    /// - Replaces punctuation with spaces
    /// - Collapses whitespace
    pub fn normalize_string(&self, s: &str) -> String {
        if !self.normalize {
            return s.to_lowercase();
        }

        let cleaned: String = s
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();

        cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Similarity between two strings, 0-100 (higher = more similar)
    pub fn similarity(&self, s1: &str, s2: &str) -> u8 {
        let p1 = self.normalize_string(s1);
        let p2 = self.normalize_string(s2);
        if p1.is_empty() || p2.is_empty() {
            return 0;
        }

        let base = ratio(&p1, &p2);
        let (len1, len2) = (p1.chars().count() as f64, p2.chars().count() as f64);
        let len_ratio = len1.max(len2) / len1.min(len2);

        // Token variants are slightly discounted so an exact ratio always wins ties
        let token_scale = 0.95;

        let best = if len_ratio < 1.5 {
            base.max(token_sort_ratio(&p1, &p2) * token_scale)
                .max(token_set_ratio(&p1, &p2) * token_scale)
        } else {
            let partial_scale = if len_ratio < 8.0 { 0.9 } else { 0.6 };
            base.max(partial_ratio(&p1, &p2) * partial_scale)
                .max(partial_token_sort_ratio(&p1, &p2) * token_scale * partial_scale)
                .max(partial_token_set_ratio(&p1, &p2) * token_scale * partial_scale)
        };

        best.round().clamp(0.0, 100.0) as u8
    }

    /// Check if two strings are similar enough to be considered a match
    pub fn is_match(&self, s1: &str, s2: &str) -> bool {
        self.similarity(s1, s2) > self.threshold
    }
}

fn ratio(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b) * 100.0
}

/// Best ratio between the shorter string and every equal-length window of the longer one.
fn partial_ratio(a: &str, b: &str) -> f64 {
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let short_len = short.chars().count();
    let long_chars: Vec<char> = long.chars().collect();
    if short_len == 0 || long_chars.len() == short_len {
        return ratio(short, long);
    }

    (0..=long_chars.len() - short_len)
        .map(|start| {
            let window: String = long_chars[start..start + short_len].iter().collect();
            ratio(short, &window)
        })
        .fold(0.0, f64::max)
}

fn sorted_tokens(s: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens
}

fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a).join(" "), &sorted_tokens(b).join(" "))
}

fn partial_token_sort_ratio(a: &str, b: &str) -> f64 {
    partial_ratio(&sorted_tokens(a).join(" "), &sorted_tokens(b).join(" "))
}

/// Compare the shared tokens against each side's shared+remaining tokens.
fn token_set_parts(a: &str, b: &str) -> (String, String, String) {
    let mut ta = sorted_tokens(a);
    let mut tb = sorted_tokens(b);
    ta.dedup();
    tb.dedup();

    let common: Vec<&str> = ta.iter().filter(|t| tb.contains(t)).copied().collect();
    let only_a: Vec<&str> = ta.iter().filter(|t| !tb.contains(t)).copied().collect();
    let only_b: Vec<&str> = tb.iter().filter(|t| !ta.contains(t)).copied().collect();

    let joined = |rest: &[&str]| {
        common
            .iter()
            .chain(rest.iter())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    };
    (common.join(" "), joined(&only_a), joined(&only_b))
}

fn token_set_ratio(a: &str, b: &str) -> f64 {
    let (common, with_a, with_b) = token_set_parts(a, b);
    let mut best = ratio(&with_a, &with_b);
    if !common.is_empty() {
        best = best.max(ratio(&common, &with_a)).max(ratio(&common, &with_b));
    }
    best
}

fn partial_token_set_ratio(a: &str, b: &str) -> f64 {
    let (common, with_a, with_b) = token_set_parts(a, b);
    if !common.is_empty() {
        // Any shared token is a full partial match of the common part
        return 100.0;
    }
    partial_ratio(&with_a, &with_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_string() {
        let matcher = FuzzyMatcher::default();

        assert_eq!(
            matcher.normalize_string("How many  non-billable people?"),
            "how many non billable people"
        );
        assert_eq!(matcher.normalize_string("Count of INTERNS"), "count of interns");
    }

    #[test]
    fn test_similarity() {
        let matcher = FuzzyMatcher::default();

        assert_eq!(matcher.similarity("Count of interns", "count of interns?"), 100);
        let s1 = "How many non-billable people are in Delhi?";
        let s2 = "how many non billable people in delhi";
        let similarity = matcher.similarity(s1, s2);
        assert!(similarity > 85, "got {}", similarity);
        assert_eq!(matcher.similarity("", "anything"), 0);
    }

    #[test]
    fn test_word_order_insensitive() {
        let matcher = FuzzyMatcher::default();
        assert!(matcher.similarity("interns count", "count interns") >= 95);
    }

    #[test]
    fn test_is_match() {
        let matcher = FuzzyMatcher::new(50);

        assert!(matcher.is_match("What is the bench strength?", "bench strength"));
        assert!(!matcher.is_match("zzz qqq", "List all people in Mumbai office"));
    }
}
