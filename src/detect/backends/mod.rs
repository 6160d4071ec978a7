pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;
use crate::detect::backend::DetectorBackend;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

/// Construct the backend named in the settings.
///
/// `tract` is the default and fails when the feature or the model is missing.
/// `stub` must be asked for by name; it reports synthetic traffic.
pub fn build_backend(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend.as_str() {
        "stub" => {
            log::warn!("stub detector selected: counts are synthetic, not from the video");
            Ok(Box::new(StubBackend::synthetic_traffic()))
        }
        "tract" => build_tract(settings),
        other => Err(anyhow!("unknown detector backend '{}'", other)),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let backend = TractBackend::new(&settings.model_path, settings.input_size)?
        .with_thresholds(settings.confidence, settings.iou);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "the tract backend requires the backend-tract feature (use --backend stub for synthetic counts)"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrafficConfig;

    #[test]
    fn default_settings_never_fall_back_to_stub() {
        let mut settings = TrafficConfig::default().detector;
        settings.model_path = "/nonexistent/model.onnx".into();
        assert!(build_backend(&settings).is_err());
    }

    #[test]
    fn stub_and_unknown_backends() {
        let mut settings = TrafficConfig::default().detector;
        settings.backend = "stub".to_string();
        assert_eq!(build_backend(&settings).map(|b| b.name()).ok(), Some("stub"));

        settings.backend = "opencv".to_string();
        assert!(build_backend(&settings).is_err());
    }
}
