use anyhow::{Context, Result};
use infer_video::cli::{Args, Settings};
use infer_video::display::HighGuiViewer;
use infer_video::net::make_net;
use infer_video::pipeline::SegmentationPipeline;
use infer_video::recorder::OpenCvSinks;
use infer_video::source::open_source;

fn main() -> Result<()> {
    let args = Args::parse_args();
    args.setup_logging();

    let settings = match args.resolve() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run_application(settings) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn run_application(settings: Settings) -> Result<()> {
    settings.print_summary(&mut std::io::stderr().lock())?;

    let mut net = make_net(&settings.model_dir, settings.backend)
        .context("Failed to create segmentation network")?;
    net.set_verbosity(settings.verbose);

    let source = open_source(settings.video.as_deref())
        .context("Failed to open frame source")?;

    let mut pipeline = SegmentationPipeline::new(source, net, Box::new(OpenCvSinks));
    if settings.verbose {
        let viewer = HighGuiViewer::new().context("Failed to create display windows")?;
        pipeline = pipeline.with_viewer(Box::new(viewer));
    }

    // Dropping the pipeline on return finalizes the recordings
    Err(pipeline.run().into())
}
