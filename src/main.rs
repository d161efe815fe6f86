use anyhow::Context;
use clap::{Parser, Subcommand};
use image::ImageReader;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use garment_detect::detection::render::{encode_jpeg, Renderer};
use garment_detect::{
    ColorThresholdDetector, DetectionConfig, DetectionService, Detector, DetectorKind, Preset,
    ServiceConfig,
};

#[derive(Parser)]
#[command(name = "garment-detect")]
#[command(about = "Detect high-visibility safety garments in images")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON service configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Detection strategy
    #[arg(long, global = true, value_enum, env = "GARMENT_STRATEGY")]
    strategy: Option<DetectorKind>,

    /// Colour-threshold tuning preset
    #[arg(long, global = true, value_enum, env = "GARMENT_PRESET")]
    preset: Option<Preset>,

    /// Model file, tried before the default locations
    #[arg(long, global = true, value_name = "FILE", env = "GARMENT_MODEL_PATH")]
    model: Option<PathBuf>,

    /// Font used to label boxes in the annotated image
    #[arg(long, global = true, value_name = "FILE", env = "GARMENT_FONT")]
    font: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run detection on an image file
    Detect {
        /// Path to input image file
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// Write the annotated image (JPEG) here
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Save intermediate masks to directory (must be empty, colour strategy only)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,

        /// Print detections as JSON
        #[arg(long)]
        json: bool,
    },
    /// Process a JSON request body ("-" reads stdin) exactly as the service does
    Request {
        #[arg(value_name = "BODY")]
        body: PathBuf,
    },
    /// Print service info and health
    Info,
}

impl Cli {
    fn service_config(&self) -> anyhow::Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::from_file(path)?,
            None => ServiceConfig::default(),
        };

        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(preset) = self.preset {
            config.detection = DetectionConfig::from_preset(preset);
        }
        if let Some(model) = &self.model {
            config.model.candidate_paths.insert(0, model.clone());
        }
        if let Some(font) = &self.font {
            config.label_font = Some(font.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("garment_detect={}", default_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_cli_detector(
    config: &ServiceConfig,
    debug_out: Option<PathBuf>,
) -> anyhow::Result<Arc<dyn Detector>> {
    match (config.strategy, debug_out) {
        (DetectorKind::Color, Some(debug_dir)) => {
            let renderer = match &config.label_font {
                Some(path) => Renderer::new().with_font_file(path)?,
                None => Renderer::new(),
            };
            let detector = ColorThresholdDetector::new(config.detection.clone())?
                .with_renderer(renderer)
                .with_debug(debug_dir)?;
            Ok(Arc::new(detector))
        }
        (DetectorKind::Model, Some(_)) => {
            anyhow::bail!("--debug-out is only supported by the color strategy")
        }
        (_, None) => Ok(garment_detect::build_detector(config)?),
    }
}

async fn run_detect(
    config: &ServiceConfig,
    image_path: PathBuf,
    output: Option<PathBuf>,
    debug_out: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    tracing::info!("Loading image: {:?}", image_path);
    let img = ImageReader::open(&image_path)?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;
    tracing::debug!("Image loaded: {}x{}", img.width(), img.height());

    let detector = build_cli_detector(config, debug_out)?;
    let method = detector.method().to_string();
    let result = tokio::task::spawn_blocking(move || detector.detect(&img)).await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.records())?);
    } else {
        println!("\n=== Garment Detection Results ({}) ===", method);
        println!("Total detections: {}", result.detections.len());
        for (i, detection) in result.detections.iter().enumerate() {
            let [x1, y1, x2, y2] = detection.bbox.to_xyxy();
            println!(
                "  {}. {} at ({}, {})-({}, {}) - confidence: {:.2}",
                i + 1,
                detection.class,
                x1,
                y1,
                x2,
                y2,
                detection.confidence
            );
        }
    }

    if let Some(output) = output {
        let jpeg = encode_jpeg(&result.annotated, config.jpeg_quality)?;
        std::fs::write(&output, jpeg)
            .with_context(|| format!("Failed to write annotated image to {}", output.display()))?;
        tracing::info!("Annotated image written to {}", output.display());
    }

    Ok(())
}

async fn run_request(config: &ServiceConfig, body_path: PathBuf) -> anyhow::Result<()> {
    let body = if body_path.as_os_str() == "-" {
        let mut body = String::new();
        std::io::stdin().read_to_string(&mut body)?;
        body
    } else {
        std::fs::read_to_string(&body_path)
            .with_context(|| format!("Failed to read request body {}", body_path.display()))?
    };

    let service = DetectionService::from_config(config)?;
    let (status, response) = service.handle_json(&body).await;
    eprintln!("HTTP {}", status);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn run_info(config: &ServiceConfig) -> anyhow::Result<()> {
    let service = DetectionService::from_config(config)?;
    if let Err(e) = service.warm_up().await {
        tracing::warn!("Detector not ready: {}", e);
    }
    println!("{}", serde_json::to_string_pretty(&service.info())?);
    println!("{}", serde_json::to_string_pretty(&service.health())?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let config = args.service_config()?;

    match args.command {
        Command::Detect {
            image_path,
            output,
            debug_out,
            json,
        } => run_detect(&config, image_path, output, debug_out, json).await,
        Command::Request { body } => run_request(&config, body).await,
        Command::Info => run_info(&config).await,
    }
}
