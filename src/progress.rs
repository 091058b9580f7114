//! Step notifications for the conversion pipeline.
//!
//! The pipeline is strictly sequential and each step blocks on a single
//! external tool invocation, so progress is reported at step granularity
//! rather than per frame. Implement [`StepCallback`] to surface the current
//! step in a UI; the CLI renders a spinner per step.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// One stage of the mutation phase of a conversion run.
///
/// Steps are announced in pipeline order; a step that is never announced was
/// never reached (earlier failure or, for audio, no audio supplied).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PipelineStep {
    /// Extracting one camera's video into an image sequence.
    ProcessVideo {
        /// The camera user id being processed (`bot` or `top`).
        user_id: String,
    },
    /// Copying the supplied audio file into the output directory.
    CopyAudio,
    /// Rendering the take thumbnail.
    CreateThumbnail,
    /// Writing the take manifest.
    WriteManifest,
}

impl Display for PipelineStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PipelineStep::ProcessVideo { user_id } => {
                write!(f, "Extracting frames for '{user_id}'")
            }
            PipelineStep::CopyAudio => write!(f, "Copying audio"),
            PipelineStep::CreateThumbnail => write!(f, "Creating thumbnail"),
            PipelineStep::WriteManifest => write!(f, "Writing take manifest"),
        }
    }
}

/// Trait for receiving step announcements during a conversion run.
///
/// Callbacks are infallible — they observe but cannot halt the pipeline.
pub trait StepCallback {
    /// Called once when the pipeline enters a step, before any work for
    /// that step begins.
    fn on_step(&self, step: &PipelineStep);
}

/// A no-op implementation that discards all step notifications.
pub struct NoOpSteps;

impl StepCallback for NoOpSteps {
    fn on_step(&self, _step: &PipelineStep) {}
}
