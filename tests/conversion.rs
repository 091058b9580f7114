//! Conversion pipeline integration tests.
//!
//! End-to-end runs against the fake engine: the happy paths, the
//! frame-count gate from both sides, and the no-mutation-before-validation
//! invariant.

mod common;

use std::fs;
use std::path::{Path, PathBuf};

use common::{FakeEngine, format_with, read_manifest, report, touch, video_stream_with_timecode};
use hmc_ingest::{
    ConversionOptions, ConversionRequest, ExtractionMethod, IngestError, NoOpSteps, convert,
};
use tempfile::TempDir;

struct Fixture {
    _root: TempDir,
    bot: PathBuf,
    top: PathBuf,
    output: PathBuf,
    engine: FakeEngine,
}

/// Two well-behaved 24 fps mjpeg cameras under a slate directory, plus an
/// unused output location.
fn fixture(frames: u64) -> Fixture {
    let root = TempDir::new().unwrap();
    let bot = root.path().join("slate_01").join("cam_bot").join("bot.mov");
    let top = root.path().join("slate_01").join("cam_top").join("top.mov");
    touch(&bot);
    touch(&top);

    let mut engine = FakeEngine::new();
    engine.add_mjpeg_video(&bot, frames);
    engine.add_mjpeg_video(&top, frames);

    let output = root.path().join("out");
    Fixture {
        _root: root,
        bot,
        top,
        output,
        engine,
    }
}

fn request(fixture: &Fixture, method: ExtractionMethod) -> ConversionRequest {
    ConversionRequest {
        video1_user_id: "bot".to_string(),
        video1_path: fixture.bot.clone(),
        video1_timecode: None,
        video2_user_id: "top".to_string(),
        video2_path: fixture.top.clone(),
        video2_timecode: None,
        extraction_method: method,
        output_path: fixture.output.clone(),
        take_number: 1,
        slate_name: None,
        take_uuid: None,
        calibration_path: None,
        audio_path: None,
        audio_timecode: None,
        audio_timecode_rate: None,
        overwrite: false,
    }
}

fn frame_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == extension))
        .collect();
    files.sort();
    files
}

// ── Happy path ───────────────────────────────────────────────────

#[test]
fn jpg_copy_of_two_mjpeg_cameras_produces_the_full_tree() {
    let fixture = fixture(24);
    let opts = ConversionOptions::resolve(&fixture.engine, request(&fixture, ExtractionMethod::JpgCopy))
        .unwrap();
    convert(&fixture.engine, &opts, &NoOpSteps).unwrap();

    for camera in ["bot", "top"] {
        let files = frame_files(&fixture.output.join(camera), "jpg");
        assert_eq!(files.len(), 24, "{camera} should have 24 frames");
        assert_eq!(files[0].file_name().unwrap(), "00001.jpg");
        assert_eq!(files[23].file_name().unwrap(), "00024.jpg");
    }

    assert!(fixture.output.join("thumbnail.jpg").exists());

    let manifest = read_manifest(&fixture.output);
    let cameras = manifest["Cameras"].as_array().unwrap();
    assert_eq!(cameras.len(), 2);
    assert_eq!(cameras[0]["UserID"], "bot");
    assert_eq!(cameras[1]["UserID"], "top");
    for camera in cameras {
        assert_eq!(camera["FrameRange"], serde_json::json!([1, 24]));
        assert_eq!(camera["FrameRate"], 24.0);
    }
    assert_eq!(manifest["Audio"], serde_json::json!([]));
    assert_eq!(manifest["Slate"], "slate_01");
    assert_eq!(manifest["LocalDateTime"], "2024-05-14T10:30:00");
}

#[test]
fn resolved_options_carry_the_first_cameras_creation_time() {
    let fixture = fixture(24);
    let opts = ConversionOptions::resolve(&fixture.engine, request(&fixture, ExtractionMethod::JpgCopy))
        .unwrap();

    assert_eq!(opts.take_local_date_time, "2024-05-14T10:30:00");
    assert_eq!(opts.video_infos.len(), 2);
    assert_eq!(opts.video_infos[0].user_id, "bot");
    assert_eq!(opts.video_infos[1].user_id, "top");
    assert_eq!(opts.calibration_path, fixture.output.join("calib.json"));
}

#[test]
fn audio_is_copied_and_described_in_the_manifest() {
    let mut fixture = fixture(24);
    let audio = fixture.bot.parent().unwrap().join("audio.wav");
    touch(&audio);
    // One hour, two minutes, three seconds and four frames at 24 fps.
    fixture.engine.add_bwf_audio(&audio, "48000", "178712000");

    let mut request = request(&fixture, ExtractionMethod::JpgCopy);
    request.audio_path = Some(audio.clone());

    let opts = ConversionOptions::resolve(&fixture.engine, request).unwrap();
    convert(&fixture.engine, &opts, &NoOpSteps).unwrap();

    let copied = fixture.output.join("primary.wav");
    assert!(copied.exists());
    assert_eq!(fs::read(&copied).unwrap(), fs::read(&audio).unwrap());

    let manifest = read_manifest(&fixture.output);
    let entries = manifest["Audio"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["UserID"], "primary");
    assert_eq!(entries[0]["StreamPath"], "primary.wav");
    assert_eq!(entries[0]["TimecodeRate"], 24.0);
    assert_eq!(entries[0]["StartTimecode"], "01:02:03:04");
}

// ── Frame-count gate ─────────────────────────────────────────────

#[test]
fn frame_count_mismatch_is_fatal_and_names_both_counts() {
    let mut fixture = fixture(24);
    // The engine drops one frame on the floor.
    fixture.engine.emitted_frames.insert(fixture.bot.clone(), 23);

    let opts = ConversionOptions::resolve(&fixture.engine, request(&fixture, ExtractionMethod::JpgCopy))
        .unwrap();
    let error = convert(&fixture.engine, &opts, &NoOpSteps).unwrap_err();

    let message = error.to_string();
    assert!(message.contains("23"), "missing extracted count: {message}");
    assert!(message.contains("24"), "missing declared count: {message}");
    assert!(message.contains("bot.mov"), "missing source path: {message}");
}

#[test]
fn frame_count_gate_holds_for_reencoding_methods_too() {
    let mut fixture = fixture(24);
    fixture.engine.emitted_frames.insert(fixture.top.clone(), 25);

    let opts = ConversionOptions::resolve(&fixture.engine, request(&fixture, ExtractionMethod::PngGray))
        .unwrap();
    assert!(convert(&fixture.engine, &opts, &NoOpSteps).is_err());
}

// ── Copy-native precondition ─────────────────────────────────────

#[test]
fn jpg_copy_on_a_non_mjpeg_codec_fails_without_creating_subdirectories() {
    let fixture = fixture(24);

    let mut engine = FakeEngine::new();
    for path in [&fixture.bot, &fixture.top] {
        engine.reports.insert(
            path.clone(),
            report(
                vec![video_stream_with_timecode("h264", "24/1", "01:00:00:00")],
                Some(format_with(&[(
                    "creation_time",
                    "2024-05-14T10:30:00.000000Z",
                )])),
            ),
        );
        engine.passthrough_counts.insert(path.clone(), 24);
        engine.emitted_frames.insert(path.clone(), 24);
    }

    let opts = ConversionOptions::resolve(&engine, request(&fixture, ExtractionMethod::JpgCopy))
        .unwrap();
    let error = convert(&engine, &opts, &NoOpSteps).unwrap_err();

    assert!(error.to_string().contains("not mjpeg encoded"));
    assert!(!fixture.output.join("bot").exists());
    assert!(!fixture.output.join("top").exists());
}

#[test]
fn non_mjpeg_sources_still_work_with_reencoding_methods() {
    let fixture = fixture(24);

    let mut engine = FakeEngine::new();
    for path in [&fixture.bot, &fixture.top] {
        engine.reports.insert(
            path.clone(),
            report(
                vec![video_stream_with_timecode("h264", "24/1", "01:00:00:00")],
                Some(format_with(&[(
                    "creation_time",
                    "2024-05-14T10:30:00.000000Z",
                )])),
            ),
        );
        engine.passthrough_counts.insert(path.clone(), 24);
        engine.emitted_frames.insert(path.clone(), 24);
    }

    let opts = ConversionOptions::resolve(&engine, request(&fixture, ExtractionMethod::PngRgb24))
        .unwrap();
    convert(&engine, &opts, &NoOpSteps).unwrap();

    assert_eq!(frame_files(&fixture.output.join("bot"), "png").len(), 24);
}

// ── No mutation before validation ────────────────────────────────

#[test]
fn bad_take_uuid_fails_before_any_metadata_read() {
    let fixture = fixture(24);

    // An engine with no registered reports: any probe would error with a
    // message of its own, so the UUID error proves no read happened.
    let empty_engine = FakeEngine::new();
    let mut bad_request = request(&fixture, ExtractionMethod::JpgCopy);
    bad_request.take_uuid = Some("not-a-uuid".to_string());

    let error = ConversionOptions::resolve(&empty_engine, bad_request).unwrap_err();
    assert!(error.to_string().contains("UUID4"));
    assert!(!fixture.output.exists());
}

#[test]
fn metadata_failure_leaves_the_filesystem_untouched() {
    let fixture = fixture(24);

    let mut engine = FakeEngine::new();
    // Only the first camera is probe-able.
    engine.add_mjpeg_video(&fixture.bot, 24);

    let error = ConversionOptions::resolve(&engine, request(&fixture, ExtractionMethod::JpgCopy))
        .unwrap_err();
    assert!(error.to_string().contains("top.mov"));
    assert!(!fixture.output.exists());
}

#[test]
fn mismatched_frame_rates_fail_before_any_file_io() {
    let fixture = fixture(24);

    let mut engine = FakeEngine::new();
    engine.add_mjpeg_video(&fixture.bot, 24);
    engine.reports.insert(
        fixture.top.clone(),
        report(
            vec![video_stream_with_timecode("mjpeg", "25/1", "01:00:00:00")],
            Some(format_with(&[(
                "creation_time",
                "2024-05-14T10:30:00.000000Z",
            )])),
        ),
    );
    engine.passthrough_counts.insert(fixture.top.clone(), 24);

    let error = ConversionOptions::resolve(&engine, request(&fixture, ExtractionMethod::JpgCopy))
        .unwrap_err();
    assert!(error.to_string().contains("different frame rates"));
    assert!(!fixture.output.exists());
}

#[test]
fn existing_output_file_fails_regardless_of_overwrite() {
    let fixture = fixture(24);
    touch(&fixture.output);

    for overwrite in [false, true] {
        let mut blocked = request(&fixture, ExtractionMethod::JpgCopy);
        blocked.overwrite = overwrite;
        let error = ConversionOptions::resolve(&fixture.engine, blocked).unwrap_err();
        assert!(error.to_string().contains("not a directory"));
    }
}

// ── Partial output on late failure ───────────────────────────────

#[test]
fn late_thumbnail_failure_leaves_extracted_frames_in_place() {
    // Pinned behavior: there is no rollback. A failure after extraction
    // leaves the camera directories on disk and no manifest.
    let mut fixture = fixture(24);
    fixture.engine.fail_thumbnail = true;

    let opts = ConversionOptions::resolve(&fixture.engine, request(&fixture, ExtractionMethod::JpgCopy))
        .unwrap();
    let error = convert(&fixture.engine, &opts, &NoOpSteps).unwrap_err();

    assert!(matches!(error, IngestError::Tool { .. }));
    assert_eq!(frame_files(&fixture.output.join("bot"), "jpg").len(), 24);
    assert_eq!(frame_files(&fixture.output.join("top"), "jpg").len(), 24);
    assert!(!fixture.output.join("take.json").exists());
}

#[test]
fn tool_errors_carry_the_captured_output() {
    let mut fixture = fixture(24);
    fixture.engine.fail_thumbnail = true;

    let opts = ConversionOptions::resolve(&fixture.engine, request(&fixture, ExtractionMethod::JpgCopy))
        .unwrap();
    let error = convert(&fixture.engine, &opts, &NoOpSteps).unwrap_err();

    match error {
        IngestError::Tool { stderr, .. } => {
            assert!(stderr.contains("forced thumbnail failure"));
        }
        other => panic!("expected a tool error, got: {other}"),
    }
}
