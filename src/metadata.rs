//! Metadata reading for video and audio sources.
//!
//! The reader extracts per-stream facts (frame rate, frame count, creation
//! time, start timecode) from a media container via the external probe tool.
//! It has no side effects — nothing here touches the output directory.
//!
//! Both the timecode and the frame-count lookups are ordered chains of
//! fallible attempts, expressed with [`FallbackChain`]; each fallback step
//! emits an informational notice so operators can tell which (less
//! authoritative) path produced the value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::IngestError;
use crate::ffmpeg::{FormatInfo, MediaEngine};
use crate::timecode;

/// Raw, user-supplied reference to one camera's source file.
#[derive(Debug, Clone)]
pub struct VideoInput {
    /// Path to the camera's video file.
    pub file_path: PathBuf,
    /// Camera user id (`bot` or `top`).
    pub user_id: String,
    /// Caller-supplied start timecode override, if any.
    pub timecode: Option<String>,
}

/// Immutable result of reading one [`VideoInput`].
///
/// Either every field is populated or the reader fails — no
/// partially-populated value ever exists.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    /// Camera user id (`bot` or `top`).
    pub user_id: String,
    /// Path to the camera's video file.
    pub file_path: PathBuf,
    /// Frame rate in frames per second.
    pub frame_rate: f64,
    /// Total frame count; always greater than zero.
    pub frame_count: u64,
    /// Start timecode in `HH:MM:SS:FRAMES` form.
    pub start_timecode: String,
    /// Container creation time, normalized to ISO-8601.
    pub local_date_time: String,
}

/// Immutable result of reading an audio source.
#[derive(Debug, Clone)]
pub struct AudioInfo {
    /// Audio user id (`primary`).
    pub user_id: String,
    /// Path to the audio file.
    pub file_path: PathBuf,
    /// Frame rate used to express the start timecode.
    pub timecode_frame_rate: f64,
    /// Start timecode in `HH:MM:SS:FF` form. The empty string means it
    /// could not be derived and none was supplied — the single permitted
    /// "unknown" sentinel in the model.
    pub start_timecode: String,
}

/// An ordered chain of fallible lookups.
///
/// Each attempt either yields a value (stopping the chain), yields nothing
/// (falling through to the next attempt), or fails the whole chain. A
/// fallback attempt carries a notice that is logged when the chain reaches
/// it, so the operator knows a less authoritative path was taken.
///
/// # Example
///
/// ```
/// use hmc_ingest::metadata::FallbackChain;
/// use hmc_ingest::IngestError;
///
/// let value: Option<u32> = FallbackChain::new()
///     .attempt(|| Ok(None))
///     .fallback("primary lookup failed, trying secondary", || Ok(Some(7)))
///     .resolve()?;
/// assert_eq!(value, Some(7));
/// # Ok::<(), IngestError>(())
/// ```
pub struct FallbackChain<'a, T> {
    attempts: Vec<Attempt<'a, T>>,
}

struct Attempt<'a, T> {
    notice: Option<String>,
    run: Box<dyn FnOnce() -> Result<Option<T>, IngestError> + 'a>,
}

impl<'a, T> FallbackChain<'a, T> {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    /// Append an attempt.
    pub fn attempt(
        mut self,
        run: impl FnOnce() -> Result<Option<T>, IngestError> + 'a,
    ) -> Self {
        self.attempts.push(Attempt {
            notice: None,
            run: Box::new(run),
        });
        self
    }

    /// Append an attempt whose notice is logged when the chain falls
    /// through to it.
    pub fn fallback(
        mut self,
        notice: impl Into<String>,
        run: impl FnOnce() -> Result<Option<T>, IngestError> + 'a,
    ) -> Self {
        self.attempts.push(Attempt {
            notice: Some(notice.into()),
            run: Box::new(run),
        });
        self
    }

    /// Run the attempts in order, returning the first value produced.
    ///
    /// Returns `Ok(None)` when every attempt fell through; the caller
    /// decides whether that is an error.
    pub fn resolve(self) -> Result<Option<T>, IngestError> {
        for attempt in self.attempts {
            if let Some(notice) = &attempt.notice {
                log::info!("{notice}");
            }
            if let Some(value) = (attempt.run)()? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

impl<T> Default for FallbackChain<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the metadata of one camera's video file.
///
/// Resolution order for the start timecode, first match wins: the
/// caller-supplied override, the timecode of an ancillary data stream, the
/// timecode of the video stream itself. If none matches, the error names
/// the exact command-line flag (looked up by the camera's user id in
/// `timecode_flags`) that supplies the value manually.
///
/// Resolution order for the frame count: the pass-through decode count
/// (authoritative but slower), the container's source-frame-count
/// statistics tag (not inflated by duplicate-frame padding), then the
/// plain container frame count.
///
/// # Errors
///
/// Fails when the container has no video stream or no container-level
/// metadata, when the frame rate or creation time attribute is missing,
/// when no timecode can be resolved, or when no frame count can be
/// extracted. All failures are non-retryable.
pub fn read_video_info(
    engine: &dyn MediaEngine,
    input: &VideoInput,
    timecode_flags: &HashMap<String, String>,
) -> Result<VideoInfo, IngestError> {
    let path = &input.file_path;
    let report = engine.probe(path)?;

    let video = *report.video_streams().first().ok_or_else(|| {
        IngestError::conversion(format!(
            "Expected at least one 'video' stream: {}",
            path.display()
        ))
    })?;

    let format = report.format.as_ref().ok_or_else(|| {
        IngestError::conversion(format!(
            "Expected container-level 'format' metadata: {}",
            path.display()
        ))
    })?;

    let frame_rate = video.frame_rate().ok_or_else(|| {
        IngestError::conversion(format!(
            "Missing 'video' stream attribute 'avg_frame_rate': {}",
            path.display()
        ))
    })?;

    let creation_time = format.creation_time().ok_or_else(|| {
        IngestError::conversion(format!(
            "Missing 'format' attribute 'creation_time': {}",
            path.display()
        ))
    })?;
    let local_date_time = normalize_creation_time(creation_time)?;

    let start_timecode = FallbackChain::new()
        .attempt(|| Ok(input.timecode.clone()))
        .attempt(|| {
            Ok(report
                .data_streams()
                .first()
                .and_then(|stream| stream.timecode())
                .map(str::to_string))
        })
        .attempt(|| Ok(video.timecode().map(str::to_string)))
        .resolve()?
        .ok_or_else(|| {
            // Name the exact override flag for this camera, so the error is
            // directly actionable.
            let flag = timecode_flags
                .get(&input.user_id)
                .map(String::as_str)
                .unwrap_or("a timecode override flag");
            IngestError::conversion(format!(
                "Failed to extract video timecode (you can use {flag} to provide this manually): {}",
                path.display()
            ))
        })?;

    let frame_count = FallbackChain::new()
        .attempt(|| engine.count_frames(path))
        .fallback(
            "Could not determine a truly reliable frame count, falling back to inspecting container metadata",
            || {
                let count = video.source_frame_count();
                if let Some(count) = count {
                    log::info!("Found source frame count tag: {count}");
                }
                Ok(count)
            },
        )
        .fallback(
            "No source frame count tag, falling back to the container frame count",
            || Ok(video.frame_count()),
        )
        .resolve()?
        .filter(|count| *count > 0)
        .ok_or_else(|| {
            IngestError::conversion(format!(
                "Could not extract frame count from video: {}",
                path.display()
            ))
        })?;

    Ok(VideoInfo {
        user_id: input.user_id.clone(),
        file_path: path.clone(),
        frame_rate,
        frame_count,
        start_timecode,
        local_date_time,
    })
}

/// Read the metadata of an audio file.
///
/// When no `start_timecode` override is given, the broadcast-wave
/// time-reference sample offset and the track's sample rate are converted
/// into a timecode at `timecode_frame_rate`. Absent broadcast-wave
/// metadata leaves the start timecode as the empty-string sentinel rather
/// than failing — audio timecode is advisory, video timecode is not.
///
/// # Errors
///
/// Fails only when the file has no audio stream. This also guards against
/// a non-audio file passed in by mistake.
pub fn read_audio_info(
    engine: &dyn MediaEngine,
    user_id: &str,
    file_path: &Path,
    timecode_frame_rate: f64,
    start_timecode: Option<String>,
) -> Result<AudioInfo, IngestError> {
    let report = engine.probe(file_path)?;

    let audio = *report.audio_streams().first().ok_or_else(|| {
        IngestError::conversion(format!(
            "Expected at least one 'audio' stream: {}",
            file_path.display()
        ))
    })?;

    let mut resolved = start_timecode;
    if resolved.is_none() {
        let time_reference = report.format.as_ref().and_then(FormatInfo::time_reference);
        if let (Some(time_reference), Some(sample_rate)) = (time_reference, audio.sample_rate()) {
            if time_reference > 0 && sample_rate > 0 {
                resolved = Some(timecode::from_sample_offset(
                    time_reference,
                    sample_rate,
                    timecode_frame_rate,
                ));
            }
        }
    }

    Ok(AudioInfo {
        user_id: user_id.to_string(),
        file_path: file_path.to_path_buf(),
        timecode_frame_rate,
        start_timecode: resolved.unwrap_or_default(),
    })
}

/// Normalize a container creation timestamp to an ISO-8601 local string.
fn normalize_creation_time(raw: &str) -> Result<String, IngestError> {
    const OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    if let Ok(with_offset) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.naive_local().format(OUTPUT_FORMAT).to_string());
    }

    let trimmed = raw.trim().trim_end_matches(" UTC");
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.format(OUTPUT_FORMAT).to_string());
        }
    }

    Err(IngestError::conversion(format!(
        "Unrecognized creation time format: {raw}"
    )))
}
