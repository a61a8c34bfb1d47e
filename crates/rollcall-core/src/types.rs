use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// An aligned face crop taken from one source image.
///
/// Lives for a single matching call; never stored in the gallery.
#[derive(Debug, Clone)]
pub struct FaceCrop {
    /// Image the face was detected in.
    pub source: PathBuf,
    /// Position of this face in the detector's confidence ordering (0 = most confident).
    pub index: usize,
    /// Interleaved RGB pixels, `size * size * 3` bytes.
    pub pixels: Vec<u8>,
    pub size: u32,
    pub confidence: f32,
}

/// Face embedding vector (typically 512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Callers must ensure both embeddings have the same dimension; extra
    /// components of the longer vector are ignored.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A registered identity and its reference embeddings, in sample order.
#[derive(Debug, Clone)]
pub struct Identity {
    pub label: String,
    pub embeddings: Vec<Embedding>,
}

/// Result of matching a query embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Euclidean distance to the nearest gallery embedding (`f32::INFINITY` for an empty gallery).
    pub distance: f32,
    /// Label of the nearest identity, set only when `matched`.
    pub label: Option<String>,
}

impl MatchResult {
    fn unknown(distance: f32) -> Self {
        Self { matched: false, distance, label: None }
    }
}

/// Strategy for comparing a query embedding against a gallery of identities.
pub trait Matcher {
    fn compare(&self, query: &Embedding, gallery: &[Identity], threshold: f32) -> MatchResult;
}

/// Nearest-neighbour matcher over Euclidean distance.
///
/// Accepts when the minimum distance is strictly below the threshold. Ties
/// resolve to the entry visited first, i.e. gallery order: identities in the
/// order given, embeddings in sample order.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, query: &Embedding, gallery: &[Identity], threshold: f32) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_label: Option<&str> = None;

        for identity in gallery {
            for embedding in &identity.embeddings {
                let dist = query.euclidean_distance(embedding);
                // Strict: an equal distance later in the gallery never displaces the first.
                if dist < best_dist {
                    best_dist = dist;
                    best_label = Some(&identity.label);
                }
            }
        }

        tracing::debug!(nearest = ?best_label, distance = best_dist, "closest gallery match");

        match best_label {
            Some(label) if best_dist < threshold => MatchResult {
                matched: true,
                distance: best_dist,
                label: Some(label.to_string()),
            },
            _ => MatchResult::unknown(best_dist),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(label: &str, vectors: &[&[f32]]) -> Identity {
        Identity {
            label: label.into(),
            embeddings: vectors.iter().map(|v| Embedding::new(v.to_vec())).collect(),
        }
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.3, 0.4]);
        assert!(a.euclidean_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_known_value() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_matcher_scans_whole_gallery() {
        // Best match is the last entry
        let query = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            identity("decoy1", &[&[0.0, 1.0, 0.0]]),
            identity("decoy2", &[&[0.0, 0.0, 1.0]]),
            identity("match", &[&[0.9, 0.1, 0.0]]),
        ];

        let result = EuclideanMatcher.compare(&query, &gallery, 1.0);
        assert!(result.matched);
        assert_eq!(result.label.as_deref(), Some("match"));
        assert!(result.distance < 0.2);
    }

    #[test]
    fn test_matcher_uses_any_sample_of_identity() {
        let query = Embedding::new(vec![0.0, 1.0]);
        let gallery = vec![
            identity("alice", &[&[1.0, 0.0], &[0.0, 0.95]]),
            identity("bob", &[&[0.5, 0.5]]),
        ];
        let result = EuclideanMatcher.compare(&query, &gallery, 1.0);
        assert_eq!(result.label.as_deref(), Some("alice"));
    }

    #[test]
    fn test_matcher_beyond_threshold_is_unknown() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![identity("other", &[&[-1.0, 0.0]])];

        let result = EuclideanMatcher.compare(&query, &gallery, 1.0);
        assert!(!result.matched);
        assert!(result.label.is_none());
        assert!((result.distance - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_matcher_threshold_is_exclusive() {
        let query = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![identity("edge", &[&[1.0, 0.0]])];
        assert!(!EuclideanMatcher.compare(&query, &gallery, 1.0).matched);
        assert!(EuclideanMatcher.compare(&query, &gallery, 1.0001).matched);
    }

    #[test]
    fn test_matcher_tie_goes_to_first_identity() {
        let query = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![
            identity("amy", &[&[0.5, 0.0]]),
            identity("zed", &[&[0.0, 0.5]]),
        ];
        let result = EuclideanMatcher.compare(&query, &gallery, 1.0);
        assert_eq!(result.label.as_deref(), Some("amy"));
    }

    #[test]
    fn test_matcher_empty_gallery() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let result = EuclideanMatcher.compare(&query, &[], 1.0);
        assert!(!result.matched);
        assert_eq!(result.distance, f32::INFINITY);
    }
}
