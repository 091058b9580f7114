//! Take manifest building and writing.
//!
//! The manifest (`take.json`) is the self-describing JSON projection of a
//! finished conversion, consumed by the downstream ingest process. It is
//! created once, at the very end of a successful run, and written through a
//! temporary file so the final name never holds a partial document.

use std::fs;
use std::path::{Path, PathBuf, absolute};

use serde::Serialize;

use crate::conversion::ConversionOptions;
use crate::error::IngestError;
use crate::extraction::{ProcessedAudio, ProcessedVideo};

/// File name of the manifest inside the output directory.
pub const MANIFEST_FILE_NAME: &str = "take.json";

/// Schema version written into every manifest.
pub const MANIFEST_VERSION: u32 = 1;

/// Identity of the capture device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Device model name.
    #[serde(rename = "Model")]
    pub model: String,
    /// Device category.
    #[serde(rename = "Type")]
    pub device_type: String,
    /// Device serial or identifier; may be empty.
    #[serde(rename = "Id")]
    pub device_id: String,
}

impl DeviceInfo {
    /// The stereo head-mounted camera rig this tool converts for.
    pub fn stereo_hmc() -> Self {
        Self {
            model: "StereoHMC".to_string(),
            device_type: "HMC".to_string(),
            device_id: String::new(),
        }
    }
}

/// One camera entry of the manifest.
#[derive(Debug, Clone, Serialize)]
pub struct CameraEntry {
    /// Camera user id; must have a matching entry in the calibration file.
    #[serde(rename = "UserID")]
    pub user_id: String,
    /// Inclusive frame range, always starting at 1.
    #[serde(rename = "FrameRange")]
    pub frame_range: [u64; 2],
    /// Frame rate in frames per second.
    #[serde(rename = "FrameRate")]
    pub frame_rate: f64,
    /// Sanitized path of the image-sequence directory.
    #[serde(rename = "FramesPath")]
    pub frames_path: String,
    /// Start timecode of the camera stream.
    #[serde(rename = "StartTimecode")]
    pub start_timecode: String,
}

/// One audio entry of the manifest.
#[derive(Debug, Clone, Serialize)]
pub struct AudioEntry {
    /// Audio user id.
    #[serde(rename = "UserID")]
    pub user_id: String,
    /// Sanitized path of the copied audio file.
    #[serde(rename = "StreamPath")]
    pub stream_path: String,
    /// Frame rate the start timecode is expressed in.
    #[serde(rename = "TimecodeRate")]
    pub timecode_rate: f64,
    /// Start timecode; empty when unknown.
    #[serde(rename = "StartTimecode")]
    pub start_timecode: String,
}

/// The JSON take descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct TakeManifest {
    /// Manifest schema version.
    #[serde(rename = "Version")]
    pub version: u32,
    /// Take id (UUID4).
    #[serde(rename = "Id")]
    pub id: String,
    /// Take number.
    #[serde(rename = "Take")]
    pub take: u32,
    /// Human-readable slate name.
    #[serde(rename = "Slate")]
    pub slate: String,
    /// Sanitized thumbnail path.
    #[serde(rename = "Thumbnail")]
    pub thumbnail: String,
    /// Take creation time, ISO-8601.
    #[serde(rename = "LocalDateTime")]
    pub local_date_time: String,
    /// Capture device identity.
    #[serde(rename = "DeviceInfo")]
    pub device_info: DeviceInfo,
    /// Sanitized calibration file path.
    #[serde(rename = "CalibrationInfo")]
    pub calibration_info: String,
    /// Per-camera entries, in capture order (bot then top).
    #[serde(rename = "Cameras")]
    pub cameras: Vec<CameraEntry>,
    /// Audio entries; empty when no audio was supplied.
    #[serde(rename = "Audio")]
    pub audio: Vec<AudioEntry>,
}

impl TakeManifest {
    /// Assemble the manifest from the frozen options and the processing
    /// evidence.
    ///
    /// User ids in the manifest must have a corresponding value in the
    /// calibration file. That cannot be enforced here — the calibration
    /// file is not required to exist when this tool runs.
    pub fn build(
        opts: &ConversionOptions,
        processed_videos: &[ProcessedVideo],
        processed_audios: &[ProcessedAudio],
        thumbnail_path: &Path,
    ) -> Result<Self, IngestError> {
        let cameras = processed_videos
            .iter()
            .map(|video| {
                Ok(CameraEntry {
                    user_id: video.info.user_id.clone(),
                    frame_range: [1, video.info.frame_count],
                    frame_rate: video.info.frame_rate,
                    frames_path: sanitize_path(&opts.output_dir, &video.output_dir)?,
                    start_timecode: video.info.start_timecode.clone(),
                })
            })
            .collect::<Result<Vec<_>, IngestError>>()?;

        let audio = processed_audios
            .iter()
            .map(|audio| {
                Ok(AudioEntry {
                    user_id: audio.info.user_id.clone(),
                    stream_path: sanitize_path(&opts.output_dir, &audio.output_path)?,
                    timecode_rate: audio.info.timecode_frame_rate,
                    start_timecode: audio.info.start_timecode.clone(),
                })
            })
            .collect::<Result<Vec<_>, IngestError>>()?;

        Ok(Self {
            version: MANIFEST_VERSION,
            id: opts.take_id.clone(),
            take: opts.take_number,
            slate: opts.slate.clone(),
            thumbnail: sanitize_path(&opts.output_dir, thumbnail_path)?,
            local_date_time: opts.take_local_date_time.clone(),
            device_info: opts.device_info.clone(),
            calibration_info: sanitize_path(&opts.output_dir, &opts.calibration_path)?,
            cameras,
            audio,
        })
    }

    /// Write the manifest, pretty-printed, to `take.json` inside the
    /// output directory.
    ///
    /// The document is written to a temporary sibling first and renamed
    /// into place, so `take.json` never exists half-written.
    pub fn write(&self, output_dir: &Path) -> Result<PathBuf, IngestError> {
        let output_path = output_dir.join(MANIFEST_FILE_NAME);
        let staging_path = output_dir.join(format!("{MANIFEST_FILE_NAME}.tmp"));

        let document = serde_json::to_string_pretty(self).map_err(|err| {
            IngestError::conversion(format!("Failed to serialize take manifest: {err}"))
        })?;

        fs::write(&staging_path, document)?;
        fs::rename(&staging_path, &output_path)?;

        Ok(output_path)
    }
}

/// Sanitize a path for storage in the manifest.
///
/// Paths inside the output directory are stored relative to it, so the
/// whole tree can be relocated. Anything else is stored absolute —
/// portability is sacrificed for paths intentionally kept outside the
/// output tree, such as a calibration file supplied from elsewhere.
pub fn sanitize_path(output_dir: &Path, path: &Path) -> Result<String, IngestError> {
    let absolute_output = absolute(output_dir)?;
    let absolute_path = absolute(path)?;

    let sanitized = match absolute_path.strip_prefix(&absolute_output) {
        Ok(relative) => relative.display().to_string(),
        Err(_) => absolute_path.display().to_string(),
    };

    Ok(sanitized)
}
