//! ArcFace face recognizer via ONNX Runtime.
//!
//! Turns aligned RGB face crops into L2-normalised embeddings.

use crate::types::{Embedding, FaceCrop};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // not 128.0, ArcFace normalizes symmetrically
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

/// Edge length of the square crop w600k_r50 accepts (fixed 1x3x112x112 input).
pub const INPUT_SIZE: u32 = 112;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}; download w600k_r50.onnx from insightface and place it in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("crop is {actual} bytes, expected {expected} for a {size}x{size} RGB face")]
    BadCrop { size: u32, expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face recognizer.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Extract an embedding from an aligned face crop.
    pub fn extract(&mut self, crop: &FaceCrop) -> Result<Embedding, RecognizerError> {
        let input = preprocess(crop)?;

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let values = l2_normalize(raw)?;

        Ok(Embedding {
            values,
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        })
    }
}

/// Convert an interleaved RGB crop into a normalised NCHW tensor.
fn preprocess(crop: &FaceCrop) -> Result<Array4<f32>, RecognizerError> {
    let size = crop.size as usize;
    let expected = size * size * 3;
    if crop.pixels.len() != expected {
        return Err(RecognizerError::BadCrop {
            size: crop.size,
            expected,
            actual: crop.pixels.len(),
        });
    }

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (i, rgb) in crop.pixels.chunks_exact(3).enumerate() {
        let (y, x) = (i / size, i % size);
        for c in 0..3 {
            tensor[[0, c, y, x]] = (rgb[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }
    Ok(tensor)
}

/// Normalise raw model output to unit length, rejecting empty or non-finite vectors.
fn l2_normalize(raw: &[f32]) -> Result<Vec<f32>, RecognizerError> {
    if raw.is_empty() {
        return Err(RecognizerError::InferenceFailed("model produced an empty embedding".into()));
    }
    if raw.iter().any(|v| !v.is_finite()) {
        return Err(RecognizerError::InferenceFailed("embedding contains non-finite values".into()));
    }

    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        Ok(raw.iter().map(|x| x / norm).collect())
    } else {
        Ok(raw.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crop(size: u32, fill: [u8; 3]) -> FaceCrop {
        FaceCrop {
            source: "face.png".into(),
            index: 0,
            pixels: fill.repeat((size * size) as usize),
            size,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_preprocess_output_shape() {
        let tensor = preprocess(&crop(112, [128, 128, 128])).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);

        let tensor = preprocess(&crop(160, [128, 128, 128])).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 160, 160]);
    }

    #[test]
    fn test_preprocess_normalization_per_channel() {
        let tensor = preprocess(&crop(4, [255, 0, 128])).unwrap();
        assert!((tensor[[0, 0, 3, 3]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0]] + 1.0).abs() < 1e-6);
        let expected = (128.0 - ARCFACE_MEAN) / ARCFACE_STD;
        assert!((tensor[[0, 2, 1, 2]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_rejects_wrong_length() {
        let mut bad = crop(8, [0, 0, 0]);
        bad.pixels.pop();
        assert!(matches!(
            preprocess(&bad),
            Err(RecognizerError::BadCrop { size: 8, expected: 192, actual: 191 })
        ));
    }

    #[test]
    fn test_l2_normalize_unit_length() {
        let v = l2_normalize(&[3.0, 4.0]).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_rejects_invalid() {
        assert!(l2_normalize(&[]).is_err());
        assert!(l2_normalize(&[1.0, f32::NAN]).is_err());
        assert_eq!(l2_normalize(&[0.0, 0.0]).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceRecognizer::load(Path::new("/nonexistent/w600k_r50.onnx"));
        assert!(matches!(err, Err(RecognizerError::ModelNotFound(_))));
    }
}
