//! Shared test support: a fake media engine and probe-report builders.
//!
//! The fake engine lets the pipeline run end-to-end without any media files
//! or external tools installed. It writes exactly the number of frame files
//! it was told to, which makes the frame-count gate easy to exercise from
//! both sides.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use hmc_ingest::{
    ExtractionMethod, FormatInfo, IngestError, MediaEngine, ProbeReport, StreamInfo,
};

/// A controllable [`MediaEngine`] for tests.
#[derive(Default)]
pub struct FakeEngine {
    /// Probe report per source path; probing an unregistered path fails.
    pub reports: HashMap<PathBuf, ProbeReport>,
    /// Pass-through frame counts; absent entries make the counter
    /// unavailable so the metadata fallback chain engages.
    pub passthrough_counts: HashMap<PathBuf, u64>,
    /// How many frame files to actually write per source path.
    pub emitted_frames: HashMap<PathBuf, u64>,
    /// Force the thumbnail step to fail with a tool error.
    pub fail_thumbnail: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a well-behaved mjpeg camera source: probe report,
    /// pass-through count, and emitted frames all agree.
    pub fn add_mjpeg_video(&mut self, path: &Path, frames: u64) {
        self.reports.insert(
            path.to_path_buf(),
            report(
                vec![video_stream_with_timecode("mjpeg", "24/1", "01:00:00:00")],
                Some(format_with(&[(
                    "creation_time",
                    "2024-05-14T10:30:00.000000Z",
                )])),
            ),
        );
        self.passthrough_counts.insert(path.to_path_buf(), frames);
        self.emitted_frames.insert(path.to_path_buf(), frames);
    }

    /// Register a broadcast-wave audio source carrying a time reference.
    pub fn add_bwf_audio(&mut self, path: &Path, sample_rate: &str, time_reference: &str) {
        self.reports.insert(
            path.to_path_buf(),
            report(
                vec![audio_stream(sample_rate)],
                Some(format_with(&[("time_reference", time_reference)])),
            ),
        );
    }
}

impl MediaEngine for FakeEngine {
    fn version(&self) -> Result<String, IngestError> {
        Ok("fake-ffmpeg 0.0".to_string())
    }

    fn probe(&self, path: &Path) -> Result<ProbeReport, IngestError> {
        self.reports.get(path).cloned().ok_or_else(|| {
            IngestError::conversion(format!(
                "no probe report registered for {}",
                path.display()
            ))
        })
    }

    fn count_frames(&self, path: &Path) -> Result<Option<u64>, IngestError> {
        Ok(self.passthrough_counts.get(path).copied())
    }

    fn extract_frames(
        &self,
        path: &Path,
        method: ExtractionMethod,
        out_dir: &Path,
    ) -> Result<(), IngestError> {
        let count = self.emitted_frames.get(path).copied().unwrap_or(0);
        for index in 1..=count {
            let name = format!("{index:05}.{}", method.file_extension());
            fs::write(out_dir.join(name), b"frame")?;
        }
        Ok(())
    }

    fn make_thumbnail(
        &self,
        _path: &Path,
        _desaturate: bool,
        out_path: &Path,
    ) -> Result<(), IngestError> {
        if self.fail_thumbnail {
            return Err(IngestError::Tool {
                command: "ffmpeg -i ... thumbnail.jpg".to_string(),
                stdout: String::new(),
                stderr: "forced thumbnail failure".to_string(),
            });
        }
        fs::write(out_path, b"thumbnail")?;
        Ok(())
    }
}

/// A video stream entry with the given codec and frame rate.
pub fn video_stream(codec: &str, frame_rate: &str) -> StreamInfo {
    StreamInfo {
        codec_type: Some("video".to_string()),
        codec_name: Some(codec.to_string()),
        avg_frame_rate: Some(frame_rate.to_string()),
        ..StreamInfo::default()
    }
}

/// A video stream entry that also carries a first-frame timecode tag.
pub fn video_stream_with_timecode(codec: &str, frame_rate: &str, timecode: &str) -> StreamInfo {
    let mut stream = video_stream(codec, frame_rate);
    stream
        .tags
        .insert("timecode".to_string(), timecode.to_string());
    stream
}

/// An ancillary (tmcd) data stream carrying a first-frame timecode tag.
pub fn data_stream_with_timecode(timecode: &str) -> StreamInfo {
    let mut stream = StreamInfo {
        codec_type: Some("data".to_string()),
        ..StreamInfo::default()
    };
    stream
        .tags
        .insert("timecode".to_string(), timecode.to_string());
    stream
}

/// An audio stream entry with the given sample rate.
pub fn audio_stream(sample_rate: &str) -> StreamInfo {
    StreamInfo {
        codec_type: Some("audio".to_string()),
        codec_name: Some("pcm_s24le".to_string()),
        sample_rate: Some(sample_rate.to_string()),
        ..StreamInfo::default()
    }
}

/// A format block with the given tags.
pub fn format_with(tags: &[(&str, &str)]) -> FormatInfo {
    let mut format = FormatInfo::default();
    for (key, value) in tags {
        format.tags.insert((*key).to_string(), (*value).to_string());
    }
    format
}

/// Assemble a probe report.
pub fn report(streams: Vec<StreamInfo>, format: Option<FormatInfo>) -> ProbeReport {
    ProbeReport { streams, format }
}

/// Create a stub file, creating parent directories as needed.
pub fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"stub").unwrap();
}

/// Parse the written take manifest.
pub fn read_manifest(output_dir: &Path) -> serde_json::Value {
    let text = fs::read_to_string(output_dir.join("take.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}
