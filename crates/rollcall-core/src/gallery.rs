//! Gallery loading: `<root>/<identity>/<sample image>` → identity embeddings.

use crate::engine::FaceEngine;
use crate::frame::Frame;
use crate::types::{Embedding, Identity};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery directory not found: {0}")]
    RootNotFound(PathBuf),
    #[error("gallery path is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Counters from one gallery load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub samples_seen: usize,
    pub samples_used: usize,
    pub unreadable: usize,
    pub no_face: usize,
    pub failed_embedding: usize,
}

/// Known identities, sorted by label. Each identity's embeddings are in
/// sample file-name order, so nearest-neighbour ties break deterministically.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    identities: Vec<Identity>,
}

impl Gallery {
    /// Build from explicit identities. Sorts by label (stable), merges
    /// duplicate labels and drops identities without embeddings.
    pub fn from_identities(identities: impl IntoIterator<Item = Identity>) -> Self {
        let mut sorted: Vec<Identity> = identities.into_iter().filter(|i| !i.embeddings.is_empty()).collect();
        sorted.sort_by(|a, b| a.label.cmp(&b.label));

        let mut merged: Vec<Identity> = Vec::with_capacity(sorted.len());
        for identity in sorted {
            match merged.last_mut() {
                Some(last) if last.label == identity.label => last.embeddings.extend(identity.embeddings),
                _ => merged.push(identity),
            }
        }
        Self { identities: merged }
    }

    /// Walk `root` and embed the most confident face of every sample image.
    ///
    /// Only a missing root is an error; unreadable, faceless or unembeddable
    /// samples are logged and skipped.
    pub fn load<E: FaceEngine + ?Sized>(root: &Path, engine: &E) -> Result<(Self, LoadStats), GalleryError> {
        if !root.exists() {
            return Err(GalleryError::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(GalleryError::NotADirectory(root.to_path_buf()));
        }

        let mut stats = LoadStats::default();
        let mut identities: Vec<Identity> = Vec::new();
        let mut dim: Option<usize> = None;

        let walker = WalkDir::new(root)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!(error = %err, "cannot read gallery entry, skipping");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(label) = identity_label(path) else {
                continue;
            };
            stats.samples_seen += 1;

            let Some(embedding) = embed_sample(engine, path, &mut stats) else {
                continue;
            };

            match dim {
                Some(d) if d != embedding.dim() => {
                    tracing::warn!(
                        path = %path.display(),
                        expected = d,
                        got = embedding.dim(),
                        "embedding dimension mismatch, skipping"
                    );
                    stats.failed_embedding += 1;
                    continue;
                }
                _ => dim = Some(embedding.dim()),
            }

            tracing::info!(label = %label, path = %path.display(), "registered sample");
            stats.samples_used += 1;
            match identities.last_mut() {
                Some(last) if last.label == label => last.embeddings.push(embedding),
                _ => identities.push(Identity { label, embeddings: vec![embedding] }),
            }
        }

        let gallery = Self::from_identities(identities);
        if gallery.is_empty() {
            tracing::warn!(root = %root.display(), ?stats, "gallery is empty, every attendance run will match nobody");
        } else {
            tracing::info!(
                root = %root.display(),
                identities = gallery.len(),
                embeddings = gallery.embedding_count(),
                ?stats,
                "gallery loaded"
            );
        }
        Ok((gallery, stats))
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    /// Number of identities.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn embedding_count(&self) -> usize {
        self.identities.iter().map(|i| i.embeddings.len()).sum()
    }

    /// Embedding dimension shared by every entry, `None` when empty.
    pub fn dim(&self) -> Option<usize> {
        self.identities.first()?.embeddings.first().map(Embedding::dim)
    }
}

/// Name of the directory directly containing `path`.
fn identity_label(path: &Path) -> Option<String> {
    let name = path.parent()?.file_name()?.to_str()?;
    Some(name.to_string())
}

fn embed_sample<E: FaceEngine + ?Sized>(engine: &E, path: &Path, stats: &mut LoadStats) -> Option<Embedding> {
    let frame = match Frame::open(path) {
        Ok(f) => f,
        Err(err) => {
            tracing::warn!(error = %err, "cannot read gallery image, skipping");
            stats.unreadable += 1;
            return None;
        }
    };

    let faces = match engine.detect_faces(&frame) {
        Ok(faces) => faces,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "face detection failed, skipping");
            stats.failed_embedding += 1;
            return None;
        }
    };
    let Some(face) = faces.first() else {
        tracing::warn!(path = %path.display(), "face not detected, skipping");
        stats.no_face += 1;
        return None;
    };

    match engine.embed(face) {
        Ok(embedding) if embedding.dim() > 0 => Some(embedding),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "empty embedding, skipping");
            stats.failed_embedding += 1;
            None
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "embedding failed, skipping");
            stats.failed_embedding += 1;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_png, StubEngine};

    fn identity(label: &str, v: &[f32]) -> Identity {
        Identity { label: label.into(), embeddings: vec![Embedding::new(v.to_vec())] }
    }

    #[test]
    fn test_load_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = Gallery::load(&dir.path().join("missing"), &StubEngine::default()).unwrap_err();
        assert!(matches!(err, GalleryError::RootNotFound(_)));
    }

    #[test]
    fn test_load_root_is_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("faces.png");
        write_png(&file);
        let err = Gallery::load(&file, &StubEngine::default()).unwrap_err();
        assert!(matches!(err, GalleryError::NotADirectory(_)));
    }

    #[test]
    fn test_load_groups_by_directory_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_png(&root.join("21BCS002_Bob/b1.png"));
        write_png(&root.join("21BCS001_Alice/a2.png"));
        write_png(&root.join("21BCS001_Alice/a1.png"));

        let engine = StubEngine::default()
            .with_faces("a1.png", &[&[1.0, 0.0]])
            .with_faces("a2.png", &[&[0.9, 0.1]])
            .with_faces("b1.png", &[&[0.0, 1.0]]);

        let (gallery, stats) = Gallery::load(root, &engine).unwrap();
        assert_eq!(gallery.len(), 2);
        assert_eq!(gallery.identities()[0].label, "21BCS001_Alice");
        assert_eq!(gallery.identities()[1].label, "21BCS002_Bob");

        // samples in file-name order
        let alice = &gallery.identities()[0].embeddings;
        assert_eq!(alice[0].values, vec![1.0, 0.0]);
        assert_eq!(alice[1].values, vec![0.9, 0.1]);

        assert_eq!(stats.samples_seen, 3);
        assert_eq!(stats.samples_used, 3);
        assert_eq!(gallery.dim(), Some(2));
    }

    #[test]
    fn test_load_skips_bad_samples() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_png(&root.join("alice/good.png"));
        write_png(&root.join("alice/noface.png"));
        write_png(&root.join("bob/broken_embed.png"));
        std::fs::write(root.join("bob/corrupt.jpg"), b"not an image").unwrap();
        // loose files at the root are not samples
        write_png(&root.join("stray.png"));

        let engine = StubEngine::default()
            .with_faces("good.png", &[&[1.0, 0.0]])
            .with_faces("stray.png", &[&[0.0, 1.0]])
            .with_broken_face("broken_embed.png");

        let (gallery, stats) = Gallery::load(root, &engine).unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.identities()[0].label, "alice");
        assert_eq!(
            stats,
            LoadStats { samples_seen: 4, samples_used: 1, unreadable: 1, no_face: 1, failed_embedding: 1 }
        );
    }

    #[test]
    fn test_load_uses_most_confident_face_only() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("carol/group.png"));
        let engine = StubEngine::default().with_faces("group.png", &[&[1.0, 0.0], &[0.0, 1.0]]);

        let (gallery, _) = Gallery::load(dir.path(), &engine).unwrap();
        assert_eq!(gallery.embedding_count(), 1);
        assert_eq!(gallery.identities()[0].embeddings[0].values, vec![1.0, 0.0]);
    }

    #[test]
    fn test_load_skips_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("alice/a.png"));
        write_png(&dir.path().join("bob/b.png"));
        let engine = StubEngine::default()
            .with_faces("a.png", &[&[1.0, 0.0]])
            .with_faces("b.png", &[&[1.0, 0.0, 0.0]]);

        let (gallery, stats) = Gallery::load(dir.path(), &engine).unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(stats.failed_embedding, 1);
    }

    #[test]
    fn test_load_empty_root_gives_empty_gallery() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nobody")).unwrap();
        let (gallery, stats) = Gallery::load(dir.path(), &StubEngine::default()).unwrap();
        assert!(gallery.is_empty());
        assert_eq!(gallery.dim(), None);
        assert_eq!(stats, LoadStats::default());
    }

    #[test]
    fn test_from_identities_sorts_and_merges() {
        let gallery = Gallery::from_identities(vec![
            identity("zed", &[0.0, 1.0]),
            identity("amy", &[1.0, 0.0]),
            identity("zed", &[0.5, 0.5]),
            Identity { label: "ghost".into(), embeddings: vec![] },
        ]);
        let labels: Vec<&str> = gallery.identities().iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["amy", "zed"]);
        assert_eq!(gallery.identities()[1].embeddings.len(), 2);
        assert_eq!(gallery.embedding_count(), 3);
    }
}
