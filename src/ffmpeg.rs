//! External media tool boundary.
//!
//! All frame-level and container-level media work is delegated to the FFmpeg
//! family of command-line tools (`ffmpeg` and `ffprobe`), invoked as opaque
//! subprocesses. The boundary is modeled as the [`MediaEngine`] trait so the
//! pipeline can be driven by a fake implementation in tests; [`FfmpegTool`]
//! is the production implementation.
//!
//! Subprocess failures are reported as [`IngestError::Tool`] with the full
//! command line and the captured output, never as plain conversion errors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;

use crate::error::IngestError;
use crate::extraction::ExtractionMethod;

/// The numbered-sequence pattern used for extracted frames; frame one is
/// written as `00001.<ext>`.
const FRAME_SEQUENCE_PATTERN: &str = "%05d";

/// Thumbnail target width in pixels; height follows the aspect ratio.
const THUMBNAIL_WIDTH: u32 = 90;

/// One stream entry from the probe tool's JSON output.
///
/// All fields are optional — containers routinely omit attributes, and the
/// metadata reader decides which absences are fatal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamInfo {
    /// Stream index within the container.
    #[serde(default)]
    pub index: u32,
    /// Stream kind as reported by the tool (`video`, `audio`, `data`, ...).
    pub codec_type: Option<String>,
    /// Codec name (e.g. `mjpeg`, `h264`, `pcm_s16le`).
    pub codec_name: Option<String>,
    /// Average frame rate as a rational string (e.g. `24/1`, `30000/1001`).
    pub avg_frame_rate: Option<String>,
    /// Container-declared frame count, if the container carries one.
    pub nb_frames: Option<String>,
    /// Sample rate for audio streams, as a decimal string.
    pub sample_rate: Option<String>,
    /// Free-form stream tags (timecode, statistics, ...).
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl StreamInfo {
    /// Whether the stream reports itself as a video stream.
    pub fn is_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video")
    }

    /// Whether the stream reports itself as an audio stream.
    pub fn is_audio(&self) -> bool {
        self.codec_type.as_deref() == Some("audio")
    }

    /// Whether the stream is an ancillary data stream (e.g. a `tmcd`
    /// timecode track).
    pub fn is_data(&self) -> bool {
        self.codec_type.as_deref() == Some("data")
    }

    /// Look up a tag, ignoring case.
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The stream's average frame rate, parsed from its rational form.
    ///
    /// Returns `None` for absent, malformed, or zero rates.
    pub fn frame_rate(&self) -> Option<f64> {
        let raw = self.avg_frame_rate.as_deref()?;
        let rate = match raw.split_once('/') {
            Some((numerator, denominator)) => {
                let numerator: f64 = numerator.trim().parse().ok()?;
                let denominator: f64 = denominator.trim().parse().ok()?;
                if denominator == 0.0 {
                    return None;
                }
                numerator / denominator
            }
            None => raw.trim().parse().ok()?,
        };
        (rate > 0.0).then_some(rate)
    }

    /// The container-declared frame count.
    pub fn frame_count(&self) -> Option<u64> {
        self.nb_frames.as_deref()?.trim().parse().ok()
    }

    /// The source frame count carried as a container statistics tag.
    ///
    /// Unlike [`frame_count`](StreamInfo::frame_count), this value is not
    /// inflated by duplicate-frame padding that pass-through decoding
    /// strips out again.
    pub fn source_frame_count(&self) -> Option<u64> {
        self.tag("NUMBER_OF_FRAMES")?.trim().parse().ok()
    }

    /// The timecode of the first frame, if the stream carries one.
    pub fn timecode(&self) -> Option<&str> {
        self.tag("timecode")
    }

    /// The audio sample rate in hertz.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate.as_deref()?.trim().parse().ok()
    }
}

/// Container-level ("general") metadata from the probe tool.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatInfo {
    /// Total duration in seconds, as a decimal string.
    pub duration: Option<String>,
    /// Free-form container tags (creation time, broadcast-wave fields, ...).
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl FormatInfo {
    /// Look up a tag, ignoring case.
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The container's creation timestamp, verbatim.
    pub fn creation_time(&self) -> Option<&str> {
        self.tag("creation_time")
    }

    /// The broadcast-wave time-reference sample offset, if present.
    pub fn time_reference(&self) -> Option<u64> {
        self.tag("time_reference")?.trim().parse().ok()
    }
}

/// The parsed result of probing one media file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeReport {
    /// All streams found in the container, in container order.
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
    /// Container-level metadata.
    pub format: Option<FormatInfo>,
}

impl ProbeReport {
    /// All video streams, in container order.
    pub fn video_streams(&self) -> Vec<&StreamInfo> {
        self.streams.iter().filter(|s| s.is_video()).collect()
    }

    /// All audio streams, in container order.
    pub fn audio_streams(&self) -> Vec<&StreamInfo> {
        self.streams.iter().filter(|s| s.is_audio()).collect()
    }

    /// All ancillary data streams, in container order.
    pub fn data_streams(&self) -> Vec<&StreamInfo> {
        self.streams.iter().filter(|s| s.is_data()).collect()
    }
}

/// The external media tool, as seen by the pipeline.
///
/// The production implementation is [`FfmpegTool`]; tests substitute a fake
/// so the pipeline logic can be exercised without any media files or tools
/// installed.
pub trait MediaEngine {
    /// Report the tool's version string.
    ///
    /// Used by the pre-flight sanity check; an error means the tool is not
    /// installed or not runnable.
    fn version(&self) -> Result<String, IngestError>;

    /// Probe a media file and return its stream and container metadata.
    fn probe(&self, path: &Path) -> Result<ProbeReport, IngestError>;

    /// Count the frames of the first video stream by decoding it
    /// end-to-end in pass-through sync mode.
    ///
    /// Returns `Ok(None)` when the tool ran cleanly but no count could be
    /// read from its output; the metadata reader then falls back to
    /// container-declared counts.
    fn count_frames(&self, path: &Path) -> Result<Option<u64>, IngestError>;

    /// Extract every frame of a video into `out_dir` as a numbered image
    /// sequence starting at index 1.
    fn extract_frames(
        &self,
        path: &Path,
        method: ExtractionMethod,
        out_dir: &Path,
    ) -> Result<(), IngestError>;

    /// Render a small thumbnail of the video's first frame.
    ///
    /// `desaturate` converts the thumbnail to grayscale so it matches
    /// gray-extracted image sequences.
    fn make_thumbnail(
        &self,
        path: &Path,
        desaturate: bool,
        out_path: &Path,
    ) -> Result<(), IngestError>;
}

/// Production [`MediaEngine`] backed by the `ffmpeg` and `ffprobe`
/// executables found on the `PATH`.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegTool {
    /// Create a tool that resolves `ffmpeg` and `ffprobe` via the `PATH`.
    pub fn new() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }

    /// Create a tool with explicit executable locations.
    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Run a tool and return its output, mapping launch failures and
    /// non-zero exits to [`IngestError::Tool`].
    fn run_checked(
        &self,
        program: &Path,
        args: &[String],
    ) -> Result<std::process::Output, IngestError> {
        let command_line = format!("{} {}", program.display(), args.join(" "));
        log::debug!("running: {command_line}");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| IngestError::Tool {
                command: command_line.clone(),
                stdout: String::new(),
                stderr: err.to_string(),
            })?;

        if !output.status.success() {
            return Err(IngestError::Tool {
                command: command_line,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(output)
    }
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEngine for FfmpegTool {
    fn version(&self) -> Result<String, IngestError> {
        let output = self.run_checked(&self.ffmpeg, &["-version".to_string()])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }

    fn probe(&self, path: &Path) -> Result<ProbeReport, IngestError> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_streams".to_string(),
            "-show_format".to_string(),
            path.display().to_string(),
        ];

        let output = self.run_checked(&self.ffprobe, &args)?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        serde_json::from_str(&stdout).map_err(|err| {
            IngestError::conversion(format!(
                "Failed to parse probe output for {}: {err}",
                path.display()
            ))
        })
    }

    fn count_frames(&self, path: &Path) -> Result<Option<u64>, IngestError> {
        // Spool through the whole stream with duplicate-frame suppression
        // and read the frame counter off the tool's status output.
        let args = vec![
            "-nostdin".to_string(),
            "-i".to_string(),
            path.display().to_string(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-vsync".to_string(),
            "passthrough".to_string(),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];

        let output = self.run_checked(&self.ffmpeg, &args)?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(parse_frame_counter(&stderr))
    }

    fn extract_frames(
        &self,
        path: &Path,
        method: ExtractionMethod,
        out_dir: &Path,
    ) -> Result<(), IngestError> {
        let pattern = out_dir.join(format!("{FRAME_SEQUENCE_PATTERN}.{}", method.file_extension()));

        let mut args = vec![
            "-nostdin".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            path.display().to_string(),
        ];

        // The scale filter corrects any non-square pixel aspect ratio. It
        // is omitted for the verbatim copy, which never decodes.
        match method {
            ExtractionMethod::JpgCopy => {
                args.extend(["-c:v".to_string(), "copy".to_string()]);
            }
            ExtractionMethod::JpgLossy => {
                args.extend([
                    "-vf".to_string(),
                    "scale=iw*sar:ih".to_string(),
                    "-c:v".to_string(),
                    "mjpeg".to_string(),
                    "-q:v".to_string(),
                    "1".to_string(),
                    "-qmin".to_string(),
                    "1".to_string(),
                    "-qmax".to_string(),
                    "1".to_string(),
                ]);
            }
            ExtractionMethod::PngRgb24 => {
                args.extend([
                    "-vf".to_string(),
                    "scale=iw*sar:ih".to_string(),
                    "-c:v".to_string(),
                    "png".to_string(),
                    "-pix_fmt".to_string(),
                    "rgb24".to_string(),
                ]);
            }
            ExtractionMethod::PngGray => {
                args.extend([
                    "-vf".to_string(),
                    "scale=iw*sar:ih".to_string(),
                    "-c:v".to_string(),
                    "png".to_string(),
                    "-pix_fmt".to_string(),
                    "gray".to_string(),
                ]);
            }
        }

        args.extend([
            "-vsync".to_string(),
            "passthrough".to_string(),
            "-start_number".to_string(),
            "1".to_string(),
            pattern.display().to_string(),
        ]);

        self.run_checked(&self.ffmpeg, &args)?;
        Ok(())
    }

    fn make_thumbnail(
        &self,
        path: &Path,
        desaturate: bool,
        out_path: &Path,
    ) -> Result<(), IngestError> {
        let mut filters = vec!["scale=iw*sar:ih".to_string()];
        if desaturate {
            filters.push("hue=s=0".to_string());
        }
        filters.push(format!("scale={THUMBNAIL_WIDTH}:-1"));

        let args = vec![
            "-nostdin".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            path.display().to_string(),
            "-vf".to_string(),
            filters.join(","),
            "-frames:v".to_string(),
            "1".to_string(),
            "-q:v".to_string(),
            "2".to_string(),
            out_path.display().to_string(),
        ];

        self.run_checked(&self.ffmpeg, &args)?;
        Ok(())
    }
}

/// Parse the last `frame=N` counter from the tool's status output.
///
/// The tool rewrites its status line with carriage returns, so the text is
/// split on both kinds of line ending. Only the final counter matters.
fn parse_frame_counter(stderr: &str) -> Option<u64> {
    let mut last = None;

    for line in stderr.split(['\n', '\r']) {
        if let Some(rest) = line.trim_start().strip_prefix("frame=") {
            let digits: String = rest
                .trim_start()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(count) = digits.parse() {
                last = Some(count);
            }
        }
    }

    last
}

#[cfg(test)]
mod tests {
    use super::{StreamInfo, parse_frame_counter};

    #[test]
    fn frame_counter_takes_last_match() {
        let stderr = "frame=  120 fps=240 q=-1.0\rframe=  240 fps=240 q=-1.0\nvideo:0kB";
        assert_eq!(parse_frame_counter(stderr), Some(240));
    }

    #[test]
    fn frame_counter_absent() {
        assert_eq!(parse_frame_counter("video:0kB audio:0kB"), None);
    }

    #[test]
    fn frame_rate_parses_rational() {
        let stream = StreamInfo {
            avg_frame_rate: Some("30000/1001".to_string()),
            ..StreamInfo::default()
        };
        let rate = stream.frame_rate().unwrap();
        assert!((rate - 29.97).abs() < 0.01);
    }

    #[test]
    fn frame_rate_rejects_zero_denominator() {
        let stream = StreamInfo {
            avg_frame_rate: Some("0/0".to_string()),
            ..StreamInfo::default()
        };
        assert!(stream.frame_rate().is_none());
    }

    #[test]
    fn tags_are_case_insensitive() {
        let mut stream = StreamInfo::default();
        stream
            .tags
            .insert("TIMECODE".to_string(), "01:00:00:00".to_string());
        assert_eq!(stream.timecode(), Some("01:00:00:00"));
    }
}
