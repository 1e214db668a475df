// src/error.rs
use std::fmt;
use thiserror::Error;

/// Stage of session start-up, in the order the scheduler runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    DetectorLoad,
    RendererSetup,
    CameraStream,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InitStage::DetectorLoad => "loading the hand landmark model",
            InitStage::RendererSetup => "setting up the renderer",
            InitStage::CameraStream => "opening the camera stream",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum TryOnError {
    #[error("initialization failed while {stage}: {source}")]
    Initialization {
        stage: InitStage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("session stopped while {stage}")]
    Cancelled { stage: InitStage },

    #[error("landmark {index} missing from detection ({available} landmarks returned)")]
    MissingLandmark { index: usize, available: usize },

    #[error("degenerate hand geometry: {0}")]
    DegenerateBasis(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TryOnError {
    pub fn initialization(stage: InitStage, source: anyhow::Error) -> Self {
        TryOnError::Initialization {
            stage,
            source: source.into(),
        }
    }

    /// Per-frame errors are contained by the scheduler; everything else ends the session.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            TryOnError::MissingLandmark { .. } | TryOnError::DegenerateBasis(_)
        )
    }
}
