//! Face engine: the detector/recognizer pair behind one immutable service object.

use crate::alignment;
use crate::config::Config;
use crate::detector::{DetectorError, FaceDetector};
use crate::frame::Frame;
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{Embedding, FaceCrop};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("{0} session lock poisoned by an earlier panic")]
    Poisoned(&'static str),
}

/// Image → face crops, face crop → embedding.
///
/// Implementations are constructed once by the entry point and shared by
/// reference with the gallery loader and the attendance pipeline.
pub trait FaceEngine {
    /// Detect and align every face in `frame`, most confident first.
    fn detect_faces(&self, frame: &Frame) -> Result<Vec<FaceCrop>, EngineError>;

    /// Compute the embedding of one aligned crop.
    fn embed(&self, crop: &FaceCrop) -> Result<Embedding, EngineError>;
}

/// SCRFD + ArcFace over ONNX Runtime.
pub struct OnnxFaceEngine {
    detector: Mutex<FaceDetector>,
    recognizer: Mutex<FaceRecognizer>,
    face_size: u32,
}

impl OnnxFaceEngine {
    /// Load both models from the configured model directory. Fails fast if either is missing.
    pub fn load(config: &Config) -> Result<Self, EngineError> {
        let detector = FaceDetector::load(&config.detector_model_path(), config.data.detection_confidence)?;
        let recognizer = FaceRecognizer::load(&config.recognizer_model_path())?;

        tracing::info!(
            model_dir = %config.model.dir.display(),
            face_size = config.data.face_size,
            "face engine ready"
        );

        Ok(Self {
            detector: Mutex::new(detector),
            recognizer: Mutex::new(recognizer),
            face_size: config.data.face_size,
        })
    }
}

impl FaceEngine for OnnxFaceEngine {
    fn detect_faces(&self, frame: &Frame) -> Result<Vec<FaceCrop>, EngineError> {
        let boxes = {
            let mut detector = self.detector.lock().map_err(|_| EngineError::Poisoned("detector"))?;
            detector.detect(frame)?
        };

        let crops = boxes
            .iter()
            .filter_map(|face| {
                let Some(landmarks) = face.landmarks.as_ref() else {
                    tracing::debug!(source = %frame.source.display(), "face without landmarks dropped");
                    return None;
                };
                let pixels = alignment::align_face(
                    &frame.data,
                    frame.width,
                    frame.height,
                    landmarks,
                    self.face_size as usize,
                );
                Some((pixels, face.confidence))
            })
            .enumerate()
            .map(|(index, (pixels, confidence))| FaceCrop {
                source: frame.source.clone(),
                index,
                pixels,
                size: self.face_size,
                confidence,
            })
            .collect();

        Ok(crops)
    }

    fn embed(&self, crop: &FaceCrop) -> Result<Embedding, EngineError> {
        let mut recognizer = self.recognizer.lock().map_err(|_| EngineError::Poisoned("recognizer"))?;
        Ok(recognizer.extract(crop)?)
    }
}
