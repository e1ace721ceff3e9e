//! Object detection backends.
//!
//! The pipeline talks to the model only through [`InferenceBackend`].
//! `stub` replays scripted detections; `tract` (feature `backend-tract`)
//! runs a YOLOv8 ONNX export.

mod backend;
mod backends;
pub mod coco;
mod result;
pub mod yolo;

pub use backend::{InferenceBackend, Thresholds};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, Detection};

use crate::config::{ModelBackend, ModelSettings};
use crate::error::InferenceError;

/// Construct the backend named in the model settings.
pub fn open_backend(model: &ModelSettings) -> Result<Box<dyn InferenceBackend>, InferenceError> {
    let mut backend: Box<dyn InferenceBackend> = match model.backend {
        ModelBackend::Stub => Box::new(StubBackend::new()),
        ModelBackend::Tract => open_tract(model)?,
    };
    if model.warm_up {
        backend.warm_up().map_err(|err| InferenceError::Load {
            model: model.name.clone(),
            reason: format!("warm-up failed: {}", err),
        })?;
    }
    log::info!(
        "model {} ready on backend {}",
        model.name,
        backend.name()
    );
    Ok(backend)
}

#[cfg(feature = "backend-tract")]
fn open_tract(model: &ModelSettings) -> Result<Box<dyn InferenceBackend>, InferenceError> {
    TractBackend::new(&model.path, model.input_size)
        .map(|backend| Box::new(backend) as Box<dyn InferenceBackend>)
        .map_err(|err| InferenceError::Load {
            model: model.path.display().to_string(),
            reason: format!("{:#}", err),
        })
}

#[cfg(not(feature = "backend-tract"))]
fn open_tract(model: &ModelSettings) -> Result<Box<dyn InferenceBackend>, InferenceError> {
    Err(InferenceError::Load {
        model: model.path.display().to_string(),
        reason: "tract backend not compiled in (rebuild with --features backend-tract)".into(),
    })
}
