use anyhow::{Context, Result};
use camcal::camera::{encode_camera, CameraFileFormat};
use camcal::{load_camera, save_camera, CamcalConfig, CameraModel, PinholeCamera, StereoCamera};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "camcal")]
#[command(about = "Inspect, convert and apply stored camera calibrations")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "camcal.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, global = true, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, global = true, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, global = true, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, global = true, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a pinhole or stereo camera file, validate it and print a summary
    Inspect { file: PathBuf },

    /// Rewrite a camera file in the format named by the output extension
    Convert { input: PathBuf, output: PathBuf },

    /// Print default configuration in TOML format
    PrintConfig,

    /// Validate the configuration file and exit
    ValidateConfig,

    /// Undistort image files with a stored pinhole camera
    #[cfg(feature = "files")]
    Undistort {
        /// Pinhole camera file (.json or .toml)
        #[arg(long)]
        camera: PathBuf,

        /// Directory receiving the undistorted images
        #[arg(short, long)]
        output: PathBuf,

        /// Input images, processed in order
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::PrintConfig = args.command {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;
    debug!("camcal v{}", env!("CARGO_PKG_VERSION"));

    match &args.command {
        Command::Inspect { file } => inspect(file),
        Command::Convert { input, output } => convert(input, output),
        Command::PrintConfig => Ok(()),
        Command::ValidateConfig => validate_config(&args.config),
        #[cfg(feature = "files")]
        Command::Undistort {
            camera,
            output,
            images,
        } => undistort(&args.config, camera, output, images),
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("camcal={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(())
}

fn print_default_config() -> Result<()> {
    let text = toml::to_string_pretty(&CamcalConfig::default())
        .context("Failed to serialise default configuration")?;

    println!("# camcal configuration file");
    println!("# Every key can be overridden with CAMCAL_<SECTION>__<KEY>");
    println!();
    println!("{}", text);
    Ok(())
}

fn validate_config(path: &str) -> Result<()> {
    let config = CamcalConfig::load_from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path))?;

    match config.validate() {
        Ok(()) => {
            info!("Configuration validation successful");
            println!("✓ Configuration is valid");
            Ok(())
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn inspect(file: &PathBuf) -> Result<()> {
    let model = load_camera(file).with_context(|| format!("Failed to load camera from {}", file.display()))?;
    let (width, height) = model.size();

    println!("{}: {} camera, {}x{}", file.display(), model.kind(), width, height);
    match &model {
        CameraModel::Pinhole(camera) => print_pinhole("", camera),
        CameraModel::Stereo(camera) => print_stereo(camera),
    }
    Ok(())
}

fn print_pinhole(label: &str, camera: &PinholeCamera) {
    let (fx, fy) = camera.focal_point();
    let (cx, cy) = camera.center();
    println!("{}focal:      ({:.4}, {:.4})", label, fx, fy);
    println!("{}center:     ({:.4}, {:.4})", label, cx, cy);
    println!("{}distortion: {:?}", label, camera.distortion());
    println!(
        "{}rectified:  {}",
        label,
        camera.rectify().is_some() && camera.projection().is_some()
    );
}

fn print_stereo(camera: &StereoCamera) {
    print_pinhole("left  ", camera.left());
    print_pinhole("right ", camera.right());
    let t = camera.translation();
    println!("translation: ({:.4}, {:.4}, {:.4})", t.x, t.y, t.z);
    println!("baseline:    {:.4}", t.norm());
}

fn convert(input: &PathBuf, output: &PathBuf) -> Result<()> {
    let model = load_camera(input).with_context(|| format!("Failed to load camera from {}", input.display()))?;
    let format = CameraFileFormat::from_path(output)
        .with_context(|| format!("Cannot choose a format for {}", output.display()))?;

    debug!("Encoded {} camera:\n{}", model.kind(), encode_camera(&model, format)?);
    save_camera(&model, output).with_context(|| format!("Failed to write {}", output.display()))?;

    println!("✓ Wrote {} camera to {}", model.kind(), output.display());
    Ok(())
}

#[cfg(feature = "files")]
fn undistort(config_path: &str, camera: &PathBuf, output: &PathBuf, images: &[PathBuf]) -> Result<()> {
    use camcal::source::{frames, save_pixels, with_source};
    use camcal::{CalibratedCamera, ImageFiles, Processor, RemapSolver};
    use std::sync::Arc;

    let config = CamcalConfig::load_from_file(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    let model = load_camera(camera).with_context(|| format!("Failed to load camera from {}", camera.display()))?;
    let Some(pinhole) = model.as_pinhole().cloned() else {
        anyhow::bail!("{} holds a {} camera, undistort needs a pinhole camera", camera.display(), model.kind());
    };

    std::fs::create_dir_all(output).with_context(|| format!("Failed to create {}", output.display()))?;

    let stage = CalibratedCamera::applied(pinhole, Arc::new(RemapSolver));
    let mut pipeline = Processor::new(stage, ImageFiles::new(images.iter().cloned()), config.processor);
    info!("Undistorting {} images through {}", images.len(), camcal::VideoSource::name(&pipeline));

    let written = with_source(&mut pipeline, |pipeline| {
        let mut written = 0;
        for (frame, input) in frames(pipeline).zip(images) {
            let frame = frame?;
            let file_name = input.file_name().unwrap_or(input.as_os_str());
            for image in frame.images() {
                save_pixels(image.pixels(), output.join(file_name))?;
                written += 1;
            }
        }
        Ok(written)
    })
    .context("Undistortion failed")?;

    println!("✓ Wrote {} undistorted images to {}", written, output.display());
    Ok(())
}
