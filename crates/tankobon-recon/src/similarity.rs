/// String similarity used by the fuzzy title signal.
///
/// Implementations must be symmetric, bounded in `[0, 1]`, and return `1.0`
/// exactly when the two inputs are identical.
pub trait TitleSimilarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Normalized Levenshtein similarity from `strsim`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedLevenshtein;

impl TitleSimilarity for NormalizedLevenshtein {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        strsim::normalized_levenshtein(a, b).clamp(0.0, 1.0)
    }
}

/// Jaro-Winkler, friendlier to shared prefixes ("Naruto" / "Naruto Gaiden").
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinkler;

impl TitleSimilarity for JaroWinkler {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        strsim::jaro_winkler(a, b).clamp(0.0, 1.0)
    }
}
