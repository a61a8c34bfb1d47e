//! One attendance run: match every face in a batch of images against the gallery.

use crate::engine::FaceEngine;
use crate::frame::Frame;
use crate::gallery::Gallery;
use crate::types::Matcher;
use std::path::Path;

/// Outcome of one run over an image batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceRun {
    /// Distinct matched labels in first-seen order. Never contains "Unknown".
    pub present: Vec<String>,
    pub images_processed: usize,
    pub images_skipped: usize,
    pub faces_detected: usize,
    pub faces_unknown: usize,
    pub faces_skipped: usize,
}

impl AttendanceRun {
    fn mark(&mut self, label: String) {
        if !self.present.contains(&label) {
            self.present.push(label);
        }
    }
}

/// Run the matcher over `paths` in order.
///
/// An empty gallery short-circuits: no image is decoded and nobody is
/// present. Images that cannot be decoded, and faces whose embedding fails
/// or does not fit the gallery's dimension, are skipped and counted.
pub fn run_batch<E, M, P>(
    engine: &E,
    gallery: &Gallery,
    matcher: &M,
    threshold: f32,
    paths: &[P],
) -> AttendanceRun
where
    E: FaceEngine + ?Sized,
    M: Matcher + ?Sized,
    P: AsRef<Path>,
{
    let mut run = AttendanceRun::default();

    let Some(dim) = gallery.dim() else {
        tracing::warn!(images = paths.len(), "no known embeddings loaded, nobody can be matched");
        return run;
    };

    for path in paths {
        let path = path.as_ref();
        let frame = match Frame::open(path) {
            Ok(f) => f,
            Err(err) => {
                tracing::warn!(error = %err, "cannot read input image, skipping");
                run.images_skipped += 1;
                continue;
            }
        };

        let faces = match engine.detect_faces(&frame) {
            Ok(faces) => faces,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "face detection failed, skipping image");
                run.images_skipped += 1;
                continue;
            }
        };
        run.images_processed += 1;
        run.faces_detected += faces.len();
        if faces.is_empty() {
            tracing::info!(path = %path.display(), "no faces detected");
        }

        for face in &faces {
            let query = match engine.embed(face) {
                Ok(e) if e.dim() == dim => e,
                Ok(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        face = face.index,
                        expected = dim,
                        got = e.dim(),
                        "face embedding dimension mismatch, skipping face"
                    );
                    run.faces_skipped += 1;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), face = face.index, error = %err, "embedding failed, skipping face");
                    run.faces_skipped += 1;
                    continue;
                }
            };

            let result = matcher.compare(&query, gallery.identities(), threshold);
            match result.label {
                Some(label) if result.matched => {
                    tracing::info!(
                        path = %path.display(),
                        face = face.index,
                        label = %label,
                        distance = result.distance,
                        "face matched"
                    );
                    run.mark(label);
                }
                _ => {
                    tracing::info!(
                        path = %path.display(),
                        face = face.index,
                        nearest_distance = result.distance,
                        "face unknown"
                    );
                    run.faces_unknown += 1;
                }
            }
        }
    }

    tracing::info!(
        present = run.present.len(),
        processed = run.images_processed,
        skipped = run.images_skipped,
        faces = run.faces_detected,
        unknown = run.faces_unknown,
        "attendance run finished"
    );
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_png, StubEngine};
    use crate::types::{Embedding, EuclideanMatcher, Identity};
    use std::path::PathBuf;

    fn gallery(entries: &[(&str, &[f32])]) -> Gallery {
        Gallery::from_identities(entries.iter().map(|(label, v)| Identity {
            label: label.to_string(),
            embeddings: vec![Embedding::new(v.to_vec())],
        }))
    }

    fn photos(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|n| {
                let p = dir.join(n);
                write_png(&p);
                p
            })
            .collect()
    }

    #[test]
    fn test_single_registered_face_matches() {
        let dir = tempfile::tempdir().unwrap();
        let paths = photos(dir.path(), &["class.png"]);
        let engine = StubEngine::default().with_faces("class.png", &[&[0.98, 0.2]]);
        let g = gallery(&[("21BCS001_Alice", &[1.0, 0.0]), ("21BCS002_Bob", &[-1.0, 0.0])]);

        let run = run_batch(&engine, &g, &EuclideanMatcher, 1.0, &paths);
        assert_eq!(run.present, vec!["21BCS001_Alice".to_string()]);
        assert_eq!(run.faces_detected, 1);
        assert_eq!(run.faces_unknown, 0);
    }

    #[test]
    fn test_far_faces_are_unknown_and_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let paths = photos(dir.path(), &["a.png", "b.png", "c.png"]);
        let engine = StubEngine::default()
            .with_faces("a.png", &[&[0.0, 5.0]])
            .with_faces("b.png", &[&[0.0, -5.0], &[9.0, 9.0]]);
        let g = gallery(&[("alice", &[1.0, 0.0])]);

        let run = run_batch(&engine, &g, &EuclideanMatcher, 1.0, &paths);
        assert!(run.present.is_empty());
        assert_eq!(run.images_processed, 3);
        assert_eq!(run.faces_detected, 3);
        assert_eq!(run.faces_unknown, 3);
    }

    #[test]
    fn test_duplicates_collapse_in_first_seen_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths = photos(dir.path(), &["1.png", "2.png"]);
        let engine = StubEngine::default()
            .with_faces("1.png", &[&[0.0, 1.0], &[1.0, 0.0]])
            .with_faces("2.png", &[&[1.0, 0.05], &[0.0, 0.95]]);
        let g = gallery(&[("alice", &[1.0, 0.0]), ("bob", &[0.0, 1.0])]);

        let run = run_batch(&engine, &g, &EuclideanMatcher, 1.0, &paths);
        assert_eq!(run.present, vec!["bob".to_string(), "alice".to_string()]);
        assert_eq!(run.faces_detected, 4);
    }

    #[test]
    fn test_empty_gallery_matches_nobody() {
        let dir = tempfile::tempdir().unwrap();
        let paths = photos(dir.path(), &["x.png", "y.png"]);
        let engine = StubEngine::default()
            .with_faces("x.png", &[&[1.0, 0.0]])
            .with_faces("y.png", &[&[0.0, 1.0]]);

        let run = run_batch(&engine, &Gallery::default(), &EuclideanMatcher, 1.0, &paths);
        assert_eq!(run, AttendanceRun::default());
    }

    #[test]
    fn test_unreadable_images_and_bad_faces_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = photos(dir.path(), &["ok.png", "broken.png", "wrongdim.png"]);
        let garbage = dir.path().join("garbage.jpg");
        std::fs::write(&garbage, b"\xff\xd8 truncated").unwrap();
        paths.insert(0, garbage);
        paths.push(dir.path().join("missing.png"));

        let engine = StubEngine::default()
            .with_faces("ok.png", &[&[1.0, 0.0]])
            .with_broken_face("broken.png")
            .with_faces("wrongdim.png", &[&[1.0, 0.0, 0.0]]);
        let g = gallery(&[("alice", &[1.0, 0.0])]);

        let run = run_batch(&engine, &g, &EuclideanMatcher, 1.0, &paths);
        assert_eq!(run.present, vec!["alice".to_string()]);
        assert_eq!(run.images_skipped, 2);
        assert_eq!(run.images_processed, 3);
        assert_eq!(run.faces_skipped, 2);
    }

    #[test]
    fn test_tie_resolves_to_label_sorting_first() {
        let dir = tempfile::tempdir().unwrap();
        let paths = photos(dir.path(), &["tie.png"]);
        let engine = StubEngine::default().with_faces("tie.png", &[&[0.0, 0.0]]);
        // inserted out of order; gallery sorts by label
        let g = gallery(&[("zed", &[0.0, 0.5]), ("amy", &[0.5, 0.0])]);

        let run = run_batch(&engine, &g, &EuclideanMatcher, 1.0, &paths);
        assert_eq!(run.present, vec!["amy".to_string()]);
    }
}
