use clap::Parser;
use infer_video::cli::init_tracing;
use infer_video::legend::generate_legends;
use std::path::PathBuf;
use tracing::info;

const DEFAULT_CONFIG: &str = "cfg.yaml";

#[derive(Parser, Debug)]
#[command(name = "generate-legends")]
#[command(about = "Renders a legend swatch per label and a combined legend sheet from a model cfg.yaml")]
struct Args {
    #[arg(
        value_name = "CONFIG",
        conflicts_with = "config",
        help = "Model configuration with labels and color_map"
    )]
    config_path: Option<PathBuf>,

    #[arg(
        short = 'c',
        long = "config",
        help = "Same as the positional CONFIG [default: cfg.yaml]"
    )]
    config: Option<PathBuf>,
}

impl Args {
    fn config(self) -> PathBuf {
        self.config_path
            .or(self.config)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
    }
}

fn main() {
    let args = Args::parse();
    init_tracing("info");

    match generate_legends(&args.config()) {
        Ok(written) => info!("Wrote {} legend images", written.len()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
