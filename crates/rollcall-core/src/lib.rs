//! rollcall-core: face matching engine for attendance.
//!
//! SCRFD detection and ArcFace embeddings via ONNX Runtime, a gallery of
//! registered identities loaded from disk, and a nearest-neighbour matcher
//! that turns a batch of photos into the set of people present.

pub mod alignment;
pub mod config;
pub mod detector;
pub mod engine;
pub mod frame;
pub mod gallery;
pub mod pipeline;
pub mod recognizer;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use engine::{EngineError, FaceEngine, OnnxFaceEngine};
pub use frame::Frame;
pub use gallery::{Gallery, GalleryError, LoadStats};
pub use pipeline::{run_batch, AttendanceRun};
pub use types::{BoundingBox, Embedding, EuclideanMatcher, FaceCrop, Identity, MatchResult, Matcher};
