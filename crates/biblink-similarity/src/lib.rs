//! BibLink Similarity - Set-based string similarity over shingles
//!
//! Strings are cut into shingles (sliding windows of words or characters)
//! and compared as sets with one of four coefficients:
//! - Cosine: |A∩B| / sqrt(|A|·|B|)
//! - Dice: 2|A∩B| / (|A|+|B|)
//! - Jaccard: |A∩B| / |A∪B|
//! - Overlap: |A∩B| / min(|A|,|B|)
//!
//! A coefficient whose denominator would be zero is reported as 0.0.

use std::collections::HashSet;

use biblink_core::{ShingleUnit, SimilarityMeasure, SimilaritySelector};

// ============================================================================
// Shingling
// ============================================================================

/// Shingle set of `input`
///
/// Words are separated by single spaces and joined back with one space.
/// The set is empty when `size` is zero or exceeds the number of units.
pub fn shingles(input: &str, size: usize, unit: ShingleUnit) -> HashSet<String> {
    if size == 0 {
        return HashSet::new();
    }

    match unit {
        ShingleUnit::Word => {
            let words = words(input);
            words.windows(size).map(|w| w.join(" ")).collect()
        }
        ShingleUnit::Char => {
            let chars: Vec<char> = input.chars().collect();
            chars.windows(size).map(|w| w.iter().collect()).collect()
        }
    }
}

/// Split on single spaces; trailing empty words are dropped
fn words(input: &str) -> Vec<&str> {
    if input.is_empty() {
        return vec![""];
    }
    let mut words: Vec<&str> = input.split(' ').collect();
    while words.last().is_some_and(|w| w.is_empty()) {
        words.pop();
    }
    words
}

// ============================================================================
// Coefficients
// ============================================================================

/// Similarity of two precomputed shingle sets
pub fn set_coefficient(
    a: &HashSet<String>,
    b: &HashSet<String>,
    measure: SimilarityMeasure,
) -> f64 {
    let intersection = a.intersection(b).count() as f64;
    let (len_a, len_b) = (a.len() as f64, b.len() as f64);

    let denominator = match measure {
        SimilarityMeasure::Cosine => (len_a * len_b).sqrt(),
        SimilarityMeasure::Dice => len_a + len_b,
        SimilarityMeasure::Jaccard => a.union(b).count() as f64,
        SimilarityMeasure::Overlap => len_a.min(len_b),
    };
    if denominator == 0.0 {
        return 0.0;
    }

    let numerator = match measure {
        SimilarityMeasure::Dice => 2.0 * intersection,
        _ => intersection,
    };
    numerator / denominator
}

/// Similarity of two strings under `selector`, in [0, 1]
pub fn coefficient(a: &str, b: &str, selector: &SimilaritySelector) -> f64 {
    let shingles_a = shingles(a, selector.size, selector.unit);
    let shingles_b = shingles(b, selector.size, selector.unit);
    set_coefficient(&shingles_a, &shingles_b, selector.measure)
}

// ============================================================================
// Tests
// ============================================================================
