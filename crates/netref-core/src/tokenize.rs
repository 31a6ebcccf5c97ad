//! Query and section tokenization.
//!
//! One tokenizer is shared by indexing and querying so that term tables
//! and query terms always agree: lowercase, split on anything that is not
//! alphanumeric, drop single characters and common English stop words.
//! Digits are kept so RFC numbers and names like `ipv6` survive.

const STOP_WORDS: &[&str] = &[
    "the", "be", "to", "of", "and", "in", "that", "have", "it", "for", "not", "on", "with", "he",
    "as", "you", "do", "at", "this", "but", "his", "by", "from", "they", "we", "say", "her", "she",
    "or", "an", "will", "my", "one", "all", "would", "there", "their", "what", "so", "up", "out",
    "if", "about", "who", "get", "which", "go", "me", "when", "make", "can", "like", "no", "just",
    "him", "know", "take", "into", "your", "some", "could", "them", "see", "other", "than", "then",
    "now", "look", "only", "its", "over", "think", "also", "back", "after", "how", "our", "well",
    "way", "even", "want", "because", "any", "these", "give", "most", "us", "is", "was", "are",
    "been", "being", "were", "am", "does", "define", "explain", "meaning", "mean",
];

/// Returns true if `word` (already lowercase) is a stop word.
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Tokenize text into lowercase index terms.
///
/// ```rust
/// use netref_core::tokenize::tokenize;
///
/// assert_eq!(tokenize("What is ARP?"), vec!["arp"]);
/// assert_eq!(tokenize("OSPFv2 / RFC 2328"), vec!["ospfv2", "rfc", "2328"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() >= 2)
        .filter(|s| !is_stop_word(s))
        .map(str::to_string)
        .collect()
}

/// Tokenize and drop repeated terms, keeping first-occurrence order.
pub fn unique_terms(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
