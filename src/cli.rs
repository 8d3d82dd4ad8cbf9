use clap::{Parser, ValueEnum, error::ErrorKind};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

use crate::net::Backend;
use crate::pipeline::SEPARATOR;

#[derive(Parser, Debug)]
#[command(name = "infer-video")]
#[command(about = "Semantic segmentation of a video file or webcam stream")]
#[command(long_about = "Runs a segmentation network on every frame of a video file or the default webcam. With a video file, the color mask and the blend are recorded next to it as <name>.segmentation-color<ext> and <name>.segmentation-blend<ext>.")]
pub struct Args {
    #[arg(
        long = "video",
        help = "Video to infer. Defaults to webcam"
    )]
    pub video: Option<PathBuf>,

    #[arg(
        short = 'p',
        long = "path",
        help = "Directory to get the inference model from. No default"
    )]
    pub path: Option<PathBuf>,

    #[arg(
        short = 'b',
        long = "backend",
        help = "Backend running the network [default: pytorch]"
    )]
    pub backend: Option<BackendArg>,

    #[arg(
        short = 'v',
        long = "verbose",
        help = "Verbose mode. Shows the masks and profiles inference"
    )]
    pub verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendArg {
    #[value(name = "pytorch")]
    Pytorch,
    #[value(name = "tensorrt")]
    TensorRt,
}

impl From<BackendArg> for Backend {
    fn from(backend: BackendArg) -> Self {
        match backend {
            BackendArg::Pytorch => Backend::Pytorch,
            BackendArg::TensorRt => Backend::TensorRt,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No path! See --help (-h) for help. Exiting")]
    MissingModelPath,

    #[error("Model directory {0:?} does not exist")]
    ModelDirectoryNotFound(PathBuf),
}

/// Operating parameters of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub model_dir: PathBuf,
    pub backend: Backend,
    pub video: Option<PathBuf>,
    pub verbose: bool,
    backend_defaulted: bool,
    verbose_defaulted: bool,
}

impl Settings {
    /// One line per parameter, defaults marked as such.
    pub fn summary(&self) -> Vec<String> {
        let video = match &self.video {
            Some(video) => format!("video: {}", video.display()),
            None => "video: Using default (camera)!".to_string(),
        };
        let backend = if self.backend_defaulted {
            format!("backend: {}. Using default!", self.backend)
        } else {
            format!("backend: {}", self.backend)
        };
        let verbose = if self.verbose_defaulted {
            format!("verbose: {}. Using default!", self.verbose)
        } else {
            format!("verbose: {}", self.verbose)
        };

        vec![
            video,
            format!("path: {}", self.model_dir.display()),
            backend,
            verbose,
        ]
    }

    /// Writes the summary between separators, bypassing the log filter.
    pub fn print_summary(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "{}", SEPARATOR)?;
        for line in self.summary() {
            writeln!(out, "{}", line)?;
        }
        writeln!(out, "{}", SEPARATOR)
    }
}

/// Help and version requests succeed, every other parse failure exits with 1.
pub fn exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

impl Args {
    pub fn parse_args() -> Self {
        match Self::try_parse() {
            Ok(args) => args,
            Err(e) => {
                let _ = e.print();
                std::process::exit(exit_code(e.kind()));
            }
        }
    }

    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let model_dir = self.path.ok_or(ConfigError::MissingModelPath)?;
        if !model_dir.is_dir() {
            return Err(ConfigError::ModelDirectoryNotFound(model_dir));
        }

        Ok(Settings {
            model_dir,
            backend: self.backend.map(Backend::from).unwrap_or_default(),
            video: self.video,
            verbose: self.verbose,
            backend_defaulted: self.backend.is_none(),
            verbose_defaulted: !self.verbose,
        })
    }

    pub fn setup_logging(&self) {
        init_tracing(if self.verbose { "debug" } else { "info" });
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides `default_level`.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level))
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Logging was already initialized");
    }
}
