//! Distance thresholds shared by the dynamic-collection and static RAG
//! matchers.
//!
//! A retrieval source is judged by the minimum distance among its top hits:
//!
//! ```text
//!   0 ───────── threshold ───────── fallback_threshold ─────────▶ distance
//!   │ Immediate │        Candidate          │        Reject
//!   (exclusive)            (inclusive)
//! ```

use std::cmp::Ordering;

use crate::models::RagHit;

/// Immediate-match bound used when neither config nor metadata sets one.
pub const DEFAULT_THRESHOLD: f64 = 0.25;
/// Candidate bound used when neither config nor metadata sets one.
pub const DEFAULT_FALLBACK_THRESHOLD: f64 = 0.5;
/// Number of nearest neighbors fetched per collection or strategy.
pub const CANDIDATE_TOP_K: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub threshold: f64,
    pub fallback_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            fallback_threshold: DEFAULT_FALLBACK_THRESHOLD,
        }
    }
}

/// Outcome of comparing a minimum distance against [`Thresholds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Immediate,
    Candidate,
    Reject,
}

impl Thresholds {
    /// Fill unset bounds with the defaults.
    pub fn resolve(threshold: Option<f64>, fallback_threshold: Option<f64>) -> Self {
        Self {
            threshold: threshold.unwrap_or(DEFAULT_THRESHOLD),
            fallback_threshold: fallback_threshold.unwrap_or(DEFAULT_FALLBACK_THRESHOLD),
        }
    }

    pub fn verdict(&self, min_distance: f64) -> Verdict {
        if min_distance < self.threshold {
            Verdict::Immediate
        } else if min_distance <= self.fallback_threshold {
            Verdict::Candidate
        } else {
            Verdict::Reject
        }
    }
}

/// Sort hits ascending by distance. Stable; NaN distances go last.
pub fn sort_hits(hits: &mut [RagHit]) {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or_else(|| a.distance.is_nan().cmp(&b.distance.is_nan()))
    });
}

/// Minimum non-NaN distance, or `None` if there is nothing to compare.
pub fn min_distance(hits: &[RagHit]) -> Option<f64> {
    hits.iter()
        .map(|h| h.distance)
        .filter(|d| !d.is_nan())
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let t = Thresholds::resolve(None, None);
        assert_eq!(t, Thresholds::default());
        let t = Thresholds::resolve(Some(0.1), None);
        assert_eq!(t.threshold, 0.1);
        assert_eq!(t.fallback_threshold, DEFAULT_FALLBACK_THRESHOLD);
    }

    #[test]
    fn test_verdict_bounds() {
        let t = Thresholds::default();
        assert_eq!(t.verdict(0.10), Verdict::Immediate);
        // threshold is exclusive
        assert_eq!(t.verdict(0.25), Verdict::Candidate);
        assert_eq!(t.verdict(0.28), Verdict::Candidate);
        // fallback is inclusive
        assert_eq!(t.verdict(0.50), Verdict::Candidate);
        assert_eq!(t.verdict(0.75), Verdict::Reject);
    }

    #[test]
    fn test_sort_hits_puts_nan_last() {
        let mut hits = vec![
            RagHit::new("c", 0.4),
            RagHit::new("nan", f64::NAN),
            RagHit::new("a", 0.1),
            RagHit::new("b", 0.2),
        ];
        sort_hits(&mut hits);
        let order: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "nan"]);
    }

    #[test]
    fn test_sort_hits_is_stable() {
        let mut hits = vec![RagHit::new("first", 0.3), RagHit::new("second", 0.3)];
        sort_hits(&mut hits);
        assert_eq!(hits[0].text, "first");
        assert_eq!(hits[1].text, "second");
    }

    #[test]
    fn test_min_distance() {
        assert_eq!(min_distance(&[]), None);
        assert_eq!(min_distance(&[RagHit::new("x", f64::NAN)]), None);
        let hits = vec![RagHit::new("a", 0.4), RagHit::new("b", 0.28)];
        assert_eq!(min_distance(&hits), Some(0.28));
    }
}
