//! Frame extraction.
//!
//! Turns each camera's video into a numbered image sequence on disk, using
//! one of four strategies selected per run. The strategy set is closed — a
//! tagged enum with one handler per variant — so exhaustiveness is checked
//! at build time.
//!
//! After every extraction the declared frame count is verified against the
//! files actually written. That post-condition is the primary correctness
//! gate protecting against silent frame drops and decoder sync artifacts.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;

use crate::conversion::ConversionOptions;
use crate::error::IngestError;
use crate::ffmpeg::MediaEngine;
use crate::metadata::{AudioInfo, VideoInfo};
use crate::progress::{PipelineStep, StepCallback};

/// Codec name required by the verbatim-copy strategy.
pub const NATIVE_FRAME_CODEC: &str = "mjpeg";

/// Image extraction strategy, selected per run (not per video).
///
/// `JpgCopy` requires natively jpeg-encoded (mjpeg) sources and copies the
/// encoded frames verbatim — optimal size and quality when available. The
/// other strategies decode, correct any non-square pixel aspect ratio by
/// scaling, and re-encode: `PngGray` and `PngRgb24` losslessly, `JpgLossy`
/// at the highest jpeg quality (least compression) on offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Lossless single-channel frames.
    PngGray,
    /// Lossless 3-channel frames.
    PngRgb24,
    /// Verbatim copy of natively jpeg-encoded frames.
    JpgCopy,
    /// Re-encoded jpeg frames at the least-compression setting.
    JpgLossy,
}

impl ExtractionMethod {
    /// File extension of the frames this strategy writes.
    pub fn file_extension(self) -> &'static str {
        match self {
            ExtractionMethod::PngGray | ExtractionMethod::PngRgb24 => "png",
            ExtractionMethod::JpgCopy | ExtractionMethod::JpgLossy => "jpg",
        }
    }

    /// Whether the thumbnail should be desaturated to match the frames.
    pub fn desaturates(self) -> bool {
        matches!(self, ExtractionMethod::PngGray)
    }
}

/// Evidence that one camera's video was extracted and verified.
#[derive(Debug, Clone)]
pub struct ProcessedVideo {
    /// The metadata the extraction was verified against.
    pub info: VideoInfo,
    /// The per-camera directory holding the image sequence.
    pub output_dir: PathBuf,
}

/// Evidence that the audio file was copied into the output tree.
#[derive(Debug, Clone)]
pub struct ProcessedAudio {
    /// The metadata of the copied audio.
    pub info: AudioInfo,
    /// The copied file inside the output directory.
    pub output_path: PathBuf,
}

/// Extract every camera of the take, sequentially and in declared order.
pub fn process_videos(
    engine: &dyn MediaEngine,
    opts: &ConversionOptions,
    callback: &dyn StepCallback,
) -> Result<Vec<ProcessedVideo>, IngestError> {
    let mut processed = Vec::with_capacity(opts.video_infos.len());

    for info in &opts.video_infos {
        callback.on_step(&PipelineStep::ProcessVideo {
            user_id: info.user_id.clone(),
        });
        log::info!("Processing {}...", info.file_path.display());
        processed.push(process_video(engine, info, opts)?);
    }

    Ok(processed)
}

/// Extract one camera's video into `<output>/<user_id>/` and verify the
/// frame count.
///
/// For the verbatim-copy strategy the source codec is probed first, before
/// the camera subdirectory is created, so a codec mismatch leaves no trace
/// on disk.
pub fn process_video(
    engine: &dyn MediaEngine,
    info: &VideoInfo,
    opts: &ConversionOptions,
) -> Result<ProcessedVideo, IngestError> {
    if opts.extraction_method == ExtractionMethod::JpgCopy {
        ensure_native_codec(engine, &info.file_path)?;
    }

    let output_dir = opts.output_dir.join(&info.user_id);
    fs::create_dir_all(&output_dir)?;

    engine.extract_frames(&info.file_path, opts.extraction_method, &output_dir)?;

    let processed = ProcessedVideo {
        info: info.clone(),
        output_dir,
    };
    check_frame_count(&processed, opts.extraction_method.file_extension())?;

    Ok(processed)
}

/// Probe a source and require a single video stream carrying the native
/// frame codec.
///
/// Any violation is a hard failure — the verbatim-copy strategy never
/// silently falls back to re-encoding.
fn ensure_native_codec(engine: &dyn MediaEngine, path: &Path) -> Result<(), IngestError> {
    let report = engine.probe(path)?;
    let video_streams = report.video_streams();

    if video_streams.is_empty() {
        return Err(IngestError::conversion(format!(
            "No video streams found for {}",
            path.display()
        )));
    }

    if video_streams.len() > 1 {
        return Err(IngestError::conversion(format!(
            "Multiple video streams, the appropriate encoding cannot be determined for {}",
            path.display()
        )));
    }

    let codec = video_streams[0].codec_name.as_deref().ok_or_else(|| {
        IngestError::conversion(format!(
            "Failed to determine video codec name for {}",
            path.display()
        ))
    })?;

    if codec != NATIVE_FRAME_CODEC {
        return Err(IngestError::conversion(format!(
            "Jpg copy extraction was requested but the video is not {NATIVE_FRAME_CODEC} encoded: {}",
            path.display()
        )));
    }

    Ok(())
}

/// Verify that the number of written frame files matches the declared
/// frame count.
fn check_frame_count(processed: &ProcessedVideo, extension: &str) -> Result<(), IngestError> {
    let mut file_count: u64 = 0;

    for entry in fs::read_dir(&processed.output_dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file()
            && path.extension().and_then(OsStr::to_str) == Some(extension)
        {
            file_count += 1;
        }
    }

    if file_count != processed.info.frame_count {
        return Err(IngestError::conversion(format!(
            "Number of images extracted from the video ({file_count}) does not match \
             the metadata frame count ({}): {}",
            processed.info.frame_count,
            processed.info.file_path.display()
        )));
    }

    Ok(())
}
