//! Pre-flight validation.
//!
//! Pure precondition checks over CLI-level inputs and reader output, run
//! strictly before any directory is created or file written. Each check is
//! an independent failure cause with a specific, actionable message; none
//! of them mutate the filesystem.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::IngestError;
use crate::metadata::VideoInfo;
use crate::timecode;

/// Mandatory user id for the first (bottom) camera of the stereo pair.
///
/// The ordering is a contract with the calibration format, not an internal
/// choice.
pub const BOTTOM_CAMERA_ID: &str = "bot";

/// Mandatory user id for the second (top) camera of the stereo pair.
pub const TOP_CAMERA_ID: &str = "top";

/// Default calibration file name inside the output directory.
pub const DEFAULT_CALIBRATION_FILE: &str = "calib.json";

/// Accepted range for the audio timecode rate.
///
/// Arbitrary bounds that catch typos such as 240 for 24, not a hard format
/// limit.
pub const TIMECODE_RATE_LIMITS: (f64, f64) = (1.0, 220.0);

/// Relative tolerance used when comparing camera frame rates.
const RATE_TOLERANCE: f64 = 1e-9;

/// Check that a source path exists and is a regular file.
pub fn check_source_file(path: &Path) -> Result<(), IngestError> {
    if !path.is_file() {
        return Err(IngestError::conversion(format!(
            "File does not exist or is not a regular file: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Guard against common copy-paste errors: the two video paths must differ
/// and an optional audio path must differ from both.
pub fn check_distinct_sources(
    video1: &Path,
    video2: &Path,
    audio: Option<&Path>,
) -> Result<(), IngestError> {
    if video1 == video2 {
        return Err(IngestError::conversion("Video paths are the same"));
    }

    if let Some(audio) = audio {
        if audio == video1 || audio == video2 {
            return Err(IngestError::conversion(
                "Audio path is the same as one of the videos",
            ));
        }
    }

    Ok(())
}

/// Check the positional camera user ids: first `bot`, second `top`.
pub fn check_camera_ids(first: &str, second: &str) -> Result<(), IngestError> {
    if first != BOTTOM_CAMERA_ID {
        return Err(IngestError::conversion(format!(
            "First video user id must be '{BOTTOM_CAMERA_ID}', it was set to '{first}'"
        )));
    }
    if second != TOP_CAMERA_ID {
        return Err(IngestError::conversion(format!(
            "Second video user id must be '{TOP_CAMERA_ID}', it was set to '{second}'"
        )));
    }
    Ok(())
}

/// Check that a supplied timecode string is well formed.
///
/// `asset_name` names the offending input in the error message ("First
/// video", "Audio", ...).
pub fn check_timecode(timecode: &str, asset_name: &str) -> Result<(), IngestError> {
    if !timecode::is_well_formed(timecode) {
        return Err(IngestError::conversion(format!(
            "{asset_name} timecode doesn't have the expected format (HH:MM:SS:FRAMES): {timecode}"
        )));
    }
    Ok(())
}

/// Check the output path.
///
/// An existing non-directory fails regardless of the overwrite flag; an
/// existing directory requires the overwrite flag.
pub fn check_output_path(path: &Path, overwrite: bool) -> Result<(), IngestError> {
    if !path.exists() {
        return Ok(());
    }

    if !path.is_dir() {
        return Err(IngestError::conversion(format!(
            "Output path exists but is not a directory: {}",
            path.display()
        )));
    }

    if !overwrite {
        return Err(IngestError::conversion(format!(
            "Output path already exists, use --overwrite to replace the existing data: {}",
            path.display()
        )));
    }

    Ok(())
}

/// Resolve the audio timecode rate.
///
/// When no explicit rate is supplied it is inferred as the shared frame
/// rate of the cameras, but only if every camera reports the same rate to
/// within relative tolerance. The resolved rate must lie within
/// [`TIMECODE_RATE_LIMITS`].
pub fn resolve_timecode_rate(
    explicit: Option<f64>,
    video_infos: &[VideoInfo],
) -> Result<f64, IngestError> {
    let rate = match explicit {
        Some(rate) => rate,
        None => {
            let first = video_infos.first().ok_or_else(|| {
                IngestError::conversion(
                    "No video metadata available to infer the audio timecode rate",
                )
            })?;
            let inferred = first.frame_rate;

            let rates_match = video_infos
                .iter()
                .all(|info| approx_eq(info.frame_rate, inferred));
            if !rates_match {
                return Err(IngestError::conversion(
                    "Videos have different frame rates, the audio timecode rate cannot be inferred",
                ));
            }

            inferred
        }
    };

    let (low, high) = TIMECODE_RATE_LIMITS;
    if !(low..=high).contains(&rate) {
        return Err(IngestError::conversion(format!(
            "Audio timecode rate is out of range [{low}, {high}]: {rate}"
        )));
    }

    Ok(rate)
}

/// Resolve the take id: parse a supplied string as a version-4 UUID, or
/// generate a fresh one.
pub fn resolve_take_id(explicit: Option<&str>) -> Result<String, IngestError> {
    match explicit {
        Some(raw) => {
            let is_uuid4 = Uuid::parse_str(raw)
                .ok()
                .is_some_and(|parsed| parsed.get_version() == Some(uuid::Version::Random));
            if !is_uuid4 {
                return Err(IngestError::conversion("Take UUID must be a UUID4 string"));
            }
            Ok(raw.to_string())
        }
        None => Ok(Uuid::new_v4().to_string()),
    }
}

/// Check that the take number is at least one.
pub fn check_take_number(take_number: u32) -> Result<(), IngestError> {
    if take_number < 1 {
        return Err(IngestError::conversion(
            "Take number must be greater than zero",
        ));
    }
    Ok(())
}

/// Resolve the slate name.
///
/// When not supplied it is derived from the grandparent directory of the
/// first video's path — the folder conventionally named after the slate.
pub fn resolve_slate_name(
    explicit: Option<String>,
    first_video: &Path,
) -> Result<String, IngestError> {
    if let Some(slate) = explicit {
        return Ok(slate);
    }

    first_video
        .parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            IngestError::conversion(
                "Could not automatically determine the slate name from the video path, \
                 not enough parent directories, use --slate-name instead",
            )
        })
}

/// Resolve the calibration path, defaulting to `calib.json` inside the
/// output directory.
pub fn resolve_calibration_path(explicit: Option<PathBuf>, output_dir: &Path) -> PathBuf {
    explicit.unwrap_or_else(|| output_dir.join(DEFAULT_CALIBRATION_FILE))
}

/// Check an existing calibration file for syntactic well-formedness.
///
/// A missing file is fine — there is no requirement that the calibration
/// exists at conversion time. An existing file must be a regular file,
/// UTF-8 text, and valid JSON; the contents are not semantically
/// validated, formal validation is left to the ingest process.
pub fn check_calibration_file(path: &Path) -> Result<(), IngestError> {
    if !path.exists() {
        return Ok(());
    }

    if !path.is_file() {
        return Err(IngestError::conversion(
            "Calibration path exists but it is not a regular file",
        ));
    }

    let text = fs::read_to_string(path).map_err(|err| {
        if err.kind() == ErrorKind::InvalidData {
            IngestError::conversion(
                "Failed to read calibration file, it doesn't look like a text file",
            )
        } else {
            IngestError::from(err)
        }
    })?;

    serde_json::from_str::<serde_json::Value>(&text).map_err(|err| {
        IngestError::conversion(format!(
            "Failed to read calibration file, invalid JSON: {err}"
        ))
    })?;

    Ok(())
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= RATE_TOLERANCE * a.abs().max(b.abs())
}
