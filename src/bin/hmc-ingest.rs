use std::cell::RefCell;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use hmc_ingest::{
    ConversionOptions, ConversionRequest, ExtractionMethod, FfmpegTool, IngestError,
    MediaEngine, PipelineStep, StepCallback, convert,
};
use indicatif::ProgressBar;

const CLI_LONG_ABOUT: &str = "\
Convert stereo HMC data into a format suitable for the ingest process: the
frames of the two camera videos are extracted into a pair of image
sequences, alongside the audio and some other required data.

Choosing an image extraction method:

  If a video is mjpeg encoded, 'jpg_copy' copies the already-jpeg-encoded
  frames to disk verbatim — optimal file size and quality.

  Otherwise the frames must be re-encoded. For the best quality use
  'png_gray' or 'png_rgb24', depending on whether the video contains gray
  or color data ('png_gray' uses the least disk space of the two). To
  trade some quality for disk space, 'jpg_lossy' encodes the frames as
  jpeg at the highest quality (least compression) available.

Note: the calibration file named on the command line is not copied into
the output directory automatically; copy it manually if you want that.";

const CLI_AFTER_HELP: &str = "\
Examples:
  hmc-ingest bot camera1.mov top camera2.mov jpg_copy output_dir
  hmc-ingest bot camera1.mp4 top camera2.mp4 png_gray output_dir
  hmc-ingest bot bot.mov top top.mov jpg_copy output_dir \\
      --audio-path audio.wav --audio-timecode 12:34:56:78 \\
      --slate-name \"My Slate Name\" --overwrite";

#[derive(Debug, Parser)]
#[command(
    name = "hmc-ingest",
    version,
    about = "Convert stereo HMC captures into ingest-ready image sequences",
    long_about = CLI_LONG_ABOUT,
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    /// User id for the bottom video of the stereo pair (must be 'bot').
    video1_user_id: String,

    /// Path to the bottom video of the stereo pair.
    video1_path: PathBuf,

    /// User id for the top video of the stereo pair (must be 'top').
    video2_user_id: String,

    /// Path to the top video of the stereo pair.
    video2_path: PathBuf,

    /// Image extraction method (see the long help for guidance).
    #[arg(value_enum)]
    extraction_method: ExtractionMethod,

    /// Output directory for the converted data.
    output_path: PathBuf,

    /// Override the default take number.
    #[arg(long, default_value_t = 1)]
    take_number: u32,

    /// Override the default slate name (default: name of the root folder
    /// of the first video file).
    #[arg(long)]
    slate_name: Option<String>,

    /// Override the auto-generated take id (must be a UUID4 string).
    #[arg(long)]
    take_uuid: Option<String>,

    /// Override the default calibration path (default:
    /// <OUTPUT_PATH>/calib.json).
    #[arg(long)]
    calibration_path: Option<PathBuf>,

    /// Audio file path.
    #[arg(long)]
    audio_path: Option<PathBuf>,

    /// Override the audio start timecode (default: try to read it from
    /// the audio file).
    #[arg(long)]
    audio_timecode: Option<String>,

    /// Override the audio timecode rate (default: use the frame rate of
    /// the first video).
    #[arg(long)]
    audio_timecode_rate: Option<f64>,

    /// Override the first video's start timecode (default: try to read it
    /// from the video file).
    #[arg(long)]
    video1_timecode: Option<String>,

    /// Override the second video's start timecode (default: try to read
    /// it from the video file).
    #[arg(long)]
    video2_timecode: Option<String>,

    /// Skip the external tool sanity check.
    #[arg(long, short = 's')]
    skip_sanity_check: bool,

    /// Overwrite data in the output directory.
    #[arg(long)]
    overwrite: bool,
}

impl Cli {
    fn into_request(self) -> ConversionRequest {
        ConversionRequest {
            video1_user_id: self.video1_user_id,
            video1_path: self.video1_path,
            video1_timecode: self.video1_timecode,
            video2_user_id: self.video2_user_id,
            video2_path: self.video2_path,
            video2_timecode: self.video2_timecode,
            extraction_method: self.extraction_method,
            output_path: self.output_path,
            take_number: self.take_number,
            slate_name: self.slate_name,
            take_uuid: self.take_uuid,
            calibration_path: self.calibration_path,
            audio_path: self.audio_path,
            audio_timecode: self.audio_timecode,
            audio_timecode_rate: self.audio_timecode_rate,
            overwrite: self.overwrite,
        }
    }
}

/// Renders one spinner per pipeline step.
struct TerminalSteps {
    current: RefCell<Option<ProgressBar>>,
}

impl TerminalSteps {
    fn new() -> Self {
        Self {
            current: RefCell::new(None),
        }
    }

    fn finish(&self) {
        if let Some(bar) = self.current.borrow_mut().take() {
            bar.finish_and_clear();
        }
    }
}

impl StepCallback for TerminalSteps {
    fn on_step(&self, step: &PipelineStep) {
        let mut current = self.current.borrow_mut();
        if let Some(bar) = current.take() {
            bar.finish_and_clear();
        }

        let bar = ProgressBar::new_spinner();
        bar.set_message(step.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        *current = Some(bar);
    }
}

/// Verify the external media tool is installed and runnable before any
/// other work begins.
fn sanity_check(engine: &FfmpegTool) -> Result<(), IngestError> {
    // Tool discovery can take a second; show that we're not hanging.
    eprint!("{} ", "sanity check...".cyan().bold());
    let _ = io::stderr().flush();

    match engine.version() {
        Ok(version) => {
            eprintln!("{}", format!("passed ({version})").green());
            Ok(())
        }
        Err(_) => {
            eprintln!("{}", "FAILED".red().bold());
            Err(IngestError::conversion(
                "ffmpeg not found, please install it and make sure it's on the PATH",
            ))
        }
    }
}

fn run() -> Result<(), IngestError> {
    let cli = Cli::parse();

    // Always log the version, so console output from users carries it.
    log::info!("hmc-ingest version {}", env!("CARGO_PKG_VERSION"));

    let engine = FfmpegTool::new();

    if !cli.skip_sanity_check {
        sanity_check(&engine)?;
    }

    let opts = ConversionOptions::resolve(&engine, cli.into_request())?;

    let steps = TerminalSteps::new();
    let result = convert(&engine, &opts, &steps);
    steps.finish();
    result?;

    println!(
        "{} {}",
        "success:".green().bold(),
        format!("take written to {}", opts.output_dir.display()).green()
    );

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Don't print a stack trace on ctrl-c; the signal also reaches the
    // running subprocess, and partial output stays in place.
    if ctrlc::set_handler(|| {
        eprintln!();
        eprintln!("{}", "interrupted".red().bold());
        process::exit(1);
    })
    .is_err()
    {
        log::debug!("could not install the interrupt handler");
    }

    if let Err(error) = run() {
        match &error {
            IngestError::Tool { .. } => {
                eprintln!("{} {error}", "error (external tool):".red().bold());
            }
            _ => eprintln!("{} {error}", "error:".red().bold()),
        }
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::Cli;
    use clap::Parser;
    use hmc_ingest::ExtractionMethod;

    fn base_args() -> Vec<&'static str> {
        vec![
            "hmc-ingest",
            "bot",
            "cam1.mov",
            "top",
            "cam2.mov",
            "jpg_copy",
            "out",
        ]
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_positional_surface() {
        let cli = Cli::try_parse_from(base_args()).unwrap();
        assert_eq!(cli.video1_user_id, "bot");
        assert_eq!(cli.video2_user_id, "top");
        assert_eq!(cli.extraction_method, ExtractionMethod::JpgCopy);
        assert_eq!(cli.take_number, 1);
        assert!(!cli.overwrite);
        assert!(!cli.skip_sanity_check);
    }

    #[test]
    fn parses_every_extraction_method_name() {
        for (name, expected) in [
            ("png_gray", ExtractionMethod::PngGray),
            ("png_rgb24", ExtractionMethod::PngRgb24),
            ("jpg_copy", ExtractionMethod::JpgCopy),
            ("jpg_lossy", ExtractionMethod::JpgLossy),
        ] {
            let mut args = base_args();
            args[5] = name;
            let cli = Cli::try_parse_from(args).unwrap();
            assert_eq!(cli.extraction_method, expected);
        }
    }

    #[test]
    fn rejects_unknown_extraction_method() {
        let mut args = base_args();
        args[5] = "bmp_copy";
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn rejects_missing_positionals() {
        assert!(Cli::try_parse_from(["hmc-ingest", "bot", "cam1.mov"]).is_err());
    }

    #[test]
    fn parses_overrides_into_request() {
        let mut args = base_args();
        args.extend([
            "--take-number",
            "3",
            "--slate-name",
            "slate_a",
            "--audio-path",
            "audio.wav",
            "--audio-timecode-rate",
            "24",
            "--overwrite",
        ]);

        let request = Cli::try_parse_from(args).unwrap().into_request();
        assert_eq!(request.take_number, 3);
        assert_eq!(request.slate_name.as_deref(), Some("slate_a"));
        assert_eq!(request.audio_timecode_rate, Some(24.0));
        assert!(request.overwrite);
    }
}
