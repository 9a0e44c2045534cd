//! Object detection: data model, backend trait and the bundled backends.

mod backend;
mod backends;
mod nms;
mod result;

use anyhow::{anyhow, Result};

pub use backend::DetectorBackend;
pub use backends::{ScriptStep, ScriptedBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use nms::non_max_suppression;
pub use result::{BoundingBox, Detection, DetectionSet, ObjectClass};

use crate::config::DetectorSettings;

/// Build the detector backend named in the configuration.
pub fn build_detector(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend.as_str() {
        "stub" => Ok(Box::new(StubBackend::new())),
        "tract" => {
            #[cfg(feature = "backend-tract")]
            {
                let path = settings
                    .model_path
                    .as_ref()
                    .ok_or_else(|| anyhow!("tract detector requires a model path"))?;
                Ok(Box::new(TractBackend::new(path, settings.input_size)?))
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                Err(anyhow!("tract detector requires the backend-tract feature"))
            }
        }
        other => Err(anyhow!(
            "unknown detector backend '{}': expected 'stub' or 'tract'",
            other
        )),
    }
}
