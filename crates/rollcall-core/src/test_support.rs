//! Model-free `FaceEngine` for tests.

use crate::engine::{EngineError, FaceEngine};
use crate::frame::Frame;
use crate::recognizer::RecognizerError;
use crate::types::{Embedding, FaceCrop};
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::path::Path;

/// Faces are scripted per file name: each entry is one detected face, and
/// `None` makes that face's embedding fail.
#[derive(Default)]
pub struct StubEngine {
    faces: HashMap<String, Vec<Option<Vec<f32>>>>,
}

impl StubEngine {
    pub fn with_faces(mut self, file_name: &str, faces: &[&[f32]]) -> Self {
        self.faces
            .insert(file_name.to_string(), faces.iter().map(|f| Some(f.to_vec())).collect());
        self
    }

    pub fn with_broken_face(mut self, file_name: &str) -> Self {
        self.faces.entry(file_name.to_string()).or_default().push(None);
        self
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl FaceEngine for StubEngine {
    fn detect_faces(&self, frame: &Frame) -> Result<Vec<FaceCrop>, EngineError> {
        let count = self.faces.get(&file_name(&frame.source)).map_or(0, Vec::len);
        Ok((0..count)
            .map(|index| FaceCrop {
                source: frame.source.clone(),
                index,
                pixels: Vec::new(),
                size: 0,
                confidence: 0.9,
            })
            .collect())
    }

    fn embed(&self, crop: &FaceCrop) -> Result<Embedding, EngineError> {
        self.faces
            .get(&file_name(&crop.source))
            .and_then(|faces| faces.get(crop.index).cloned().flatten())
            .map(Embedding::new)
            .ok_or_else(|| RecognizerError::InferenceFailed("stub face has no embedding".into()).into())
    }
}

/// Write a small decodable PNG at `path`, creating parent directories.
pub fn write_png(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    RgbImage::from_pixel(8, 8, Rgb([90, 120, 150])).save(path).unwrap();
}
