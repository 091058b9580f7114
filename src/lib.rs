//! # hmc-ingest
//!
//! Convert stereo HMC (head-mounted camera) captures into a normalized,
//! self-describing directory tree suitable for the downstream ingest
//! process: per-camera image sequences, a copied audio file, a thumbnail,
//! and a JSON take manifest.
//!
//! All frame-level media work is delegated to the FFmpeg command-line
//! tools, invoked as opaque subprocesses behind the injectable
//! [`MediaEngine`] boundary — the pipeline logic itself never decodes a
//! frame.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hmc_ingest::{
//!     ConversionOptions, ConversionRequest, ExtractionMethod, FfmpegTool, NoOpSteps,
//! };
//!
//! let engine = FfmpegTool::new();
//!
//! let request = ConversionRequest {
//!     video1_user_id: "bot".to_string(),
//!     video1_path: "takes/slate_01/cam_bot/bot.mov".into(),
//!     video1_timecode: None,
//!     video2_user_id: "top".to_string(),
//!     video2_path: "takes/slate_01/cam_top/top.mov".into(),
//!     video2_timecode: None,
//!     extraction_method: ExtractionMethod::JpgCopy,
//!     output_path: "converted/slate_01".into(),
//!     take_number: 1,
//!     slate_name: None,
//!     take_uuid: None,
//!     calibration_path: None,
//!     audio_path: None,
//!     audio_timecode: None,
//!     audio_timecode_rate: None,
//!     overwrite: false,
//! };
//!
//! // Read-only phase: every check and metadata read happens here.
//! let opts = ConversionOptions::resolve(&engine, request)?;
//!
//! // Mutation phase: extract, copy, thumbnail, manifest.
//! hmc_ingest::convert(&engine, &opts, &NoOpSteps)?;
//! # Ok::<(), hmc_ingest::IngestError>(())
//! ```
//!
//! ## Pipeline
//!
//! - **Validation** — pure precondition checks over the CLI-level inputs,
//!   before anything else happens.
//! - **Metadata reading** — frame rate, frame count, creation time, and
//!   start timecode per source, resolved through ordered fallback chains.
//! - **Extraction** — one of four strategies (`png_gray`, `png_rgb24`,
//!   `jpg_copy`, `jpg_lossy`) turns each camera into a numbered image
//!   sequence, verified against the declared frame count.
//! - **Manifest** — the `take.json` descriptor, with paths inside the
//!   output directory stored relative so the tree is relocatable.
//!
//! No directory is created and no file is written until all validation and
//! all metadata reads have succeeded.
//!
//! ## Requirements
//!
//! The `ffmpeg` and `ffprobe` executables must be installed and on the
//! `PATH` (or supplied explicitly via [`FfmpegTool::with_binaries`]).

pub mod conversion;
pub mod error;
pub mod extraction;
pub mod ffmpeg;
pub mod manifest;
pub mod metadata;
pub mod progress;
pub mod timecode;
pub mod validation;

pub use conversion::{
    AUDIO_USER_ID, ConversionOptions, ConversionRequest, THUMBNAIL_FILE_NAME,
    VIDEO1_TIMECODE_FLAG, VIDEO2_TIMECODE_FLAG, convert,
};
pub use error::IngestError;
pub use extraction::{
    ExtractionMethod, NATIVE_FRAME_CODEC, ProcessedAudio, ProcessedVideo, process_videos,
};
pub use ffmpeg::{FfmpegTool, FormatInfo, MediaEngine, ProbeReport, StreamInfo};
pub use manifest::{
    AudioEntry, CameraEntry, DeviceInfo, MANIFEST_FILE_NAME, MANIFEST_VERSION, TakeManifest,
    sanitize_path,
};
pub use metadata::{
    AudioInfo, FallbackChain, VideoInfo, VideoInput, read_audio_info, read_video_info,
};
pub use progress::{NoOpSteps, PipelineStep, StepCallback};
pub use validation::{BOTTOM_CAMERA_ID, TIMECODE_RATE_LIMITS, TOP_CAMERA_ID};
