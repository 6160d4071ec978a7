//! Object detection.
//!
//! The detector is an external collaborator: given a frame it returns unordered
//! `Detection`s, each carrying a class label from the backend's fixed vocabulary.
//! Backends are owned values; see [`DetectorBackend`] for the threading contract.

mod backend;
mod backends;
mod result;
pub mod vocabulary;
pub mod yolo;

pub use backend::DetectorBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use backends::{build_backend, StubBackend};
pub use result::{BoundingBox, Detection};
