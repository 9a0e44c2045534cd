//! Failures that end a detection run.
//!
//! Sink failures live in [`crate::sink::SinkError`] and never surface here:
//! the publisher loop absorbs them.

/// Fatal detection-loop failure. Any of these stops both loops.
#[derive(Debug)]
pub enum PipelineError {
    /// The frame source reported end of stream.
    FrameSourceExhausted,
    /// The frame source could not produce a frame (device error, lost stream).
    FrameSourceFailed(anyhow::Error),
    /// The detector raised an error on a frame.
    DetectorFailure(anyhow::Error),
}

impl PipelineError {
    /// Short machine-friendly code for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FrameSourceExhausted => "frame_source_exhausted",
            Self::FrameSourceFailed(_) => "frame_source_failed",
            Self::DetectorFailure(_) => "detector_failure",
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FrameSourceExhausted => write!(f, "frame source exhausted"),
            Self::FrameSourceFailed(e) => write!(f, "frame source failed: {:#}", e),
            Self::DetectorFailure(e) => write!(f, "detector failed: {:#}", e),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FrameSourceExhausted => None,
            Self::FrameSourceFailed(e) | Self::DetectorFailure(e) => Some(&**e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn display_includes_cause_chain() {
        let err = PipelineError::DetectorFailure(anyhow!("tensor shape").context("inference"));
        let msg = err.to_string();
        assert!(msg.contains("detector failed"));
        assert!(msg.contains("inference"));
        assert!(msg.contains("tensor shape"));
        assert_eq!(err.code(), "detector_failure");
    }
}
