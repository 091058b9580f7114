//! Conversion orchestration.
//!
//! A conversion runs in two phases. [`ConversionOptions::resolve`] is the
//! read-only phase: every validator check and every metadata read happens
//! here, and the result is frozen into an immutable [`ConversionOptions`].
//! [`convert`] is the mutation phase: output directory, per-camera image
//! sequences, audio copy, thumbnail, manifest — strictly in that order,
//! aborting on the first failure.
//!
//! The invariant the split enforces: no directory is created and no file is
//! written until all validation and all metadata reads have succeeded, so a
//! late-discovered input error causes zero filesystem mutation. Once the
//! mutation phase has started, a failure leaves the partial output in place
//! for the caller to inspect or discard.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::IngestError;
use crate::extraction::{ExtractionMethod, ProcessedAudio, process_videos};
use crate::ffmpeg::MediaEngine;
use crate::manifest::{DeviceInfo, TakeManifest};
use crate::metadata::{AudioInfo, VideoInfo, VideoInput, read_audio_info, read_video_info};
use crate::progress::{PipelineStep, StepCallback};
use crate::validation;

/// User id assigned to the supplied audio file.
pub const AUDIO_USER_ID: &str = "primary";

/// File name of the thumbnail inside the output directory.
pub const THUMBNAIL_FILE_NAME: &str = "thumbnail.jpg";

/// Command-line flag that overrides the first video's timecode; named in
/// reader errors so they are directly actionable.
pub const VIDEO1_TIMECODE_FLAG: &str = "--video1-timecode";

/// Command-line flag that overrides the second video's timecode.
pub const VIDEO2_TIMECODE_FLAG: &str = "--video2-timecode";

/// The raw, CLI-level description of a conversion — unvalidated paths,
/// optional overrides, defaults not yet resolved.
///
/// Frozen into a [`ConversionOptions`] by
/// [`ConversionOptions::resolve`]; nothing else in the pipeline accepts
/// this type.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// User id for the first (bottom) camera; must be `bot`.
    pub video1_user_id: String,
    /// Path to the first camera's video.
    pub video1_path: PathBuf,
    /// Start timecode override for the first camera.
    pub video1_timecode: Option<String>,
    /// User id for the second (top) camera; must be `top`.
    pub video2_user_id: String,
    /// Path to the second camera's video.
    pub video2_path: PathBuf,
    /// Start timecode override for the second camera.
    pub video2_timecode: Option<String>,
    /// Image extraction strategy for this run.
    pub extraction_method: ExtractionMethod,
    /// Output directory for the converted take.
    pub output_path: PathBuf,
    /// Take number; must be at least 1.
    pub take_number: u32,
    /// Slate name override.
    pub slate_name: Option<String>,
    /// Take id override; must be a UUID4 string.
    pub take_uuid: Option<String>,
    /// Calibration file path override.
    pub calibration_path: Option<PathBuf>,
    /// Optional audio file to copy into the take.
    pub audio_path: Option<PathBuf>,
    /// Audio start timecode override.
    pub audio_timecode: Option<String>,
    /// Audio timecode rate override.
    pub audio_timecode_rate: Option<f64>,
    /// Allow writing into an existing output directory.
    pub overwrite: bool,
}

/// The immutable, fully-validated description of a conversion.
///
/// Built once, after every check has passed; never mutated afterwards. The
/// orchestrator owns this value and hands read-only views to every other
/// component.
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    /// Capture device identity written into the manifest.
    pub device_info: DeviceInfo,
    /// The two cameras' metadata, bot then top.
    pub video_infos: Vec<VideoInfo>,
    /// Output directory for the converted take.
    pub output_dir: PathBuf,
    /// Calibration file path (referenced, never copied).
    pub calibration_path: PathBuf,
    /// Take id (UUID4).
    pub take_id: String,
    /// Human-readable slate name.
    pub slate: String,
    /// Take number.
    pub take_number: u32,
    /// Take creation time, ISO-8601, taken from the first camera.
    pub take_local_date_time: String,
    /// Image extraction strategy for this run.
    pub extraction_method: ExtractionMethod,
    /// Audio metadata, when audio was supplied.
    pub audio_info: Option<AudioInfo>,
}

impl ConversionOptions {
    /// Validate a [`ConversionRequest`] and freeze it.
    ///
    /// Runs every pure check first, then the metadata reads, in an order
    /// that guarantees zero filesystem mutation on any failure. Errors are
    /// specific and actionable; see the validation and metadata modules
    /// for the individual causes.
    pub fn resolve(
        engine: &dyn MediaEngine,
        request: ConversionRequest,
    ) -> Result<Self, IngestError> {
        validation::check_output_path(&request.output_path, request.overwrite)?;

        validation::check_source_file(&request.video1_path)?;
        validation::check_source_file(&request.video2_path)?;
        if let Some(audio_path) = &request.audio_path {
            validation::check_source_file(audio_path)?;
        }
        validation::check_distinct_sources(
            &request.video1_path,
            &request.video2_path,
            request.audio_path.as_deref(),
        )?;

        validation::check_camera_ids(&request.video1_user_id, &request.video2_user_id)?;

        if let Some(timecode) = &request.video1_timecode {
            validation::check_timecode(timecode, "First video")?;
        }
        if let Some(timecode) = &request.video2_timecode {
            validation::check_timecode(timecode, "Second video")?;
        }
        if let Some(timecode) = &request.audio_timecode {
            validation::check_timecode(timecode, "Audio")?;
        }

        let take_id = validation::resolve_take_id(request.take_uuid.as_deref())?;
        validation::check_take_number(request.take_number)?;
        let slate = validation::resolve_slate_name(request.slate_name.clone(), &request.video1_path)?;

        let calibration_path =
            validation::resolve_calibration_path(request.calibration_path.clone(), &request.output_path);
        validation::check_calibration_file(&calibration_path)?;

        // Everything below reads container metadata; everything above was
        // pure. Neither phase touches the output directory.
        let timecode_flags = HashMap::from([
            (
                request.video1_user_id.clone(),
                VIDEO1_TIMECODE_FLAG.to_string(),
            ),
            (
                request.video2_user_id.clone(),
                VIDEO2_TIMECODE_FLAG.to_string(),
            ),
        ]);

        let inputs = [
            VideoInput {
                file_path: request.video1_path.clone(),
                user_id: request.video1_user_id.clone(),
                timecode: request.video1_timecode.clone(),
            },
            VideoInput {
                file_path: request.video2_path.clone(),
                user_id: request.video2_user_id.clone(),
                timecode: request.video2_timecode.clone(),
            },
        ];

        let video_infos = inputs
            .iter()
            .map(|input| read_video_info(engine, input, &timecode_flags))
            .collect::<Result<Vec<_>, IngestError>>()?;

        let timecode_rate =
            validation::resolve_timecode_rate(request.audio_timecode_rate, &video_infos)?;

        let audio_info = match &request.audio_path {
            Some(audio_path) => Some(read_audio_info(
                engine,
                AUDIO_USER_ID,
                audio_path,
                timecode_rate,
                request.audio_timecode.clone(),
            )?),
            None => None,
        };

        let take_local_date_time = video_infos[0].local_date_time.clone();

        let opts = Self {
            device_info: DeviceInfo::stereo_hmc(),
            video_infos,
            output_dir: request.output_path,
            calibration_path,
            take_id,
            slate,
            take_number: request.take_number,
            take_local_date_time,
            extraction_method: request.extraction_method,
            audio_info,
        };

        log::info!("Take id: {}", opts.take_id);
        log::info!("Take number: {}", opts.take_number);
        log::info!("Slate: {}", opts.slate);
        log::info!("Calibration path: {}", opts.calibration_path.display());
        log::info!("Take local date time: {}", opts.take_local_date_time);

        Ok(opts)
    }
}

/// Run the mutation phase of a conversion.
///
/// Creates the output directory, extracts both cameras, copies the audio
/// file when present, renders the thumbnail, and writes the manifest. Any
/// failure aborts immediately; already-written files are left in place —
/// cleanup of partial output is the caller's responsibility.
pub fn convert(
    engine: &dyn MediaEngine,
    opts: &ConversionOptions,
    callback: &dyn StepCallback,
) -> Result<(), IngestError> {
    fs::create_dir_all(&opts.output_dir)?;

    let processed_videos = process_videos(engine, opts, callback)?;

    let mut processed_audios = Vec::new();
    if let Some(audio) = &opts.audio_info {
        callback.on_step(&PipelineStep::CopyAudio);
        log::info!("Copying audio...");
        processed_audios.push(copy_audio(audio, &opts.output_dir)?);
    }

    callback.on_step(&PipelineStep::CreateThumbnail);
    log::info!("Creating thumbnail...");
    let thumbnail_path = create_thumbnail(engine, opts)?;

    callback.on_step(&PipelineStep::WriteManifest);
    log::info!("Creating take manifest...");
    let manifest = TakeManifest::build(opts, &processed_videos, &processed_audios, &thumbnail_path)?;
    manifest.write(&opts.output_dir)?;

    Ok(())
}

/// Copy the audio file into the output directory as `<user_id>.wav`.
fn copy_audio(audio: &AudioInfo, output_dir: &Path) -> Result<ProcessedAudio, IngestError> {
    let output_path = output_dir.join(format!("{}.wav", audio.user_id));
    fs::copy(&audio.file_path, &output_path)?;

    Ok(ProcessedAudio {
        info: audio.clone(),
        output_path,
    })
}

/// Render the take thumbnail from the first camera's video.
fn create_thumbnail(
    engine: &dyn MediaEngine,
    opts: &ConversionOptions,
) -> Result<PathBuf, IngestError> {
    let first = opts.video_infos.first().ok_or_else(|| {
        IngestError::conversion("No video metadata available for the thumbnail")
    })?;

    let thumbnail_path = opts.output_dir.join(THUMBNAIL_FILE_NAME);
    engine.make_thumbnail(
        &first.file_path,
        opts.extraction_method.desaturates(),
        &thumbnail_path,
    )?;

    Ok(thumbnail_path)
}
