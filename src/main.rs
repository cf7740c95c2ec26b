//! cropcare CLI
//!
//! Entry point for curating the leaf dataset, training the classifier,
//! exporting its backbone, predicting single images and running the
//! diagnosis server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use cropcare::backend::{backend_name, default_device, InferenceBackend, TrainingBackend};
use cropcare::diagnosis::Diagnosis;
use cropcare::server::{AppState, ServerConfig};
use cropcare::training::{ClassifierPipeline, TrainOutcome, TrainingReport};
use cropcare::utils::logging::{init_logging, LogConfig, LogLevel};
use cropcare::utils::{format_bar, format_duration};
use cropcare::{ArtifactHandle, PipelineConfig};

/// Plant leaf disease classification with Burn
#[derive(Parser, Debug)]
#[command(name = "cropcare")]
#[command(version)]
#[command(about = "Plant leaf disease classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CROPCARE_LOG")]
    log_level: Option<String>,

    /// JSON configuration file (defaults apply to missing fields)
    #[arg(short, long, global = true, env = "CROPCARE_CONFIG")]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Curate the dataset, train both phases and save the model
    Train {
        /// Root searched for a train/ directory
        #[arg(long)]
        data_root: Option<PathBuf>,

        /// Class directory to use directly (skips the train/ search)
        #[arg(long)]
        train_dir: Option<PathBuf>,

        /// Where the model and class names are written
        #[arg(short, long)]
        models_dir: Option<PathBuf>,

        /// Epochs with the backbone frozen
        #[arg(long)]
        head_epochs: Option<usize>,

        /// Fine-tuning epochs
        #[arg(long)]
        fine_tune_epochs: Option<usize>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Square input resolution
        #[arg(long)]
        image_size: Option<u32>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Pretrained backbone record (see `export-backbone`)
        #[arg(long)]
        backbone_weights: Option<PathBuf>,

        /// Decode all images into memory before training
        #[arg(long, default_value = "false")]
        cache_images: bool,

        /// Retrain even if a model already exists
        #[arg(long, default_value = "false")]
        force: bool,
    },

    /// Save the trained model's backbone for use as pretrained weights
    ExportBackbone {
        /// Directory containing the trained model
        #[arg(short, long)]
        models_dir: Option<PathBuf>,

        /// Destination file (defaults to <models-dir>/backbone.mpk)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Classify a single leaf image
    Predict {
        /// Path to the image
        #[arg(short, long)]
        image: PathBuf,

        /// Restrict the prediction to classes starting with this crop name
        #[arg(long)]
        crop: Option<String>,

        /// Directory containing the trained model
        #[arg(short, long)]
        models_dir: Option<PathBuf>,

        /// Print the full diagnosis as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Curate the dataset and show per-class counts
    Stats {
        /// Root searched for a train/ directory
        #[arg(long)]
        data_root: Option<PathBuf>,

        /// Class directory to use directly
        #[arg(long)]
        train_dir: Option<PathBuf>,
    },

    /// Print the default configuration as JSON
    Config {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the diagnosis HTTP server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Directory containing the trained model
        #[arg(short, long)]
        models_dir: Option<PathBuf>,

        /// API key for the chat assistant
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
        gemini_api_key: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = init_logging(&log_config(&cli));

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Train {
            data_root,
            train_dir,
            models_dir,
            head_epochs,
            fine_tune_epochs,
            batch_size,
            image_size,
            seed,
            backbone_weights,
            cache_images,
            force,
        } => {
            print_banner();
            let mut config = config;
            if let Some(data_root) = data_root {
                config.data.data_root = data_root;
            }
            if train_dir.is_some() {
                config.data.train_dir = train_dir;
            }
            if let Some(models_dir) = models_dir {
                config.artifacts.models_dir = models_dir;
            }
            if let Some(epochs) = head_epochs {
                config.training.head_epochs = epochs;
            }
            if let Some(epochs) = fine_tune_epochs {
                config.training.fine_tune_epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                config.training.batch_size = batch_size;
            }
            if let Some(image_size) = image_size {
                config.model.image_size = image_size;
            }
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if backbone_weights.is_some() {
                config.model.backbone_weights = backbone_weights;
            }
            config.training.cache_images |= cache_images;
            cmd_train(config, force)?;
        }
        Commands::ExportBackbone { models_dir, output } => {
            let mut config = config;
            if let Some(models_dir) = models_dir {
                config.artifacts.models_dir = models_dir;
            }
            cmd_export_backbone(config, output)?;
        }
        Commands::Predict {
            image,
            crop,
            models_dir,
            json,
        } => {
            let mut config = config;
            if let Some(models_dir) = models_dir {
                config.artifacts.models_dir = models_dir;
            }
            cmd_predict(config, &image, crop.as_deref(), json)?;
        }
        Commands::Stats { data_root, train_dir } => {
            let mut config = config;
            if let Some(data_root) = data_root {
                config.data.data_root = data_root;
            }
            if train_dir.is_some() {
                config.data.train_dir = train_dir;
            }
            cmd_stats(config)?;
        }
        Commands::Config { output } => {
            cmd_config(&config, output.as_deref())?;
        }
        Commands::Serve {
            host,
            port,
            models_dir,
            gemini_api_key,
        } => {
            let mut config = config;
            if let Some(models_dir) = models_dir {
                config.artifacts.models_dir = models_dir;
            }
            let server_config = ServerConfig {
                host,
                port,
                gemini_api_key,
                ..ServerConfig::default()
            };
            cmd_serve(config, server_config)?;
        }
    }

    Ok(())
}

fn log_config(cli: &Cli) -> LogConfig {
    let base = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else if matches!(cli.command, Commands::Serve { .. }) {
        LogConfig::production()
    } else {
        LogConfig::default()
    };

    match cli.log_level.as_deref() {
        Some(level) => base.with_level(LogLevel::parse(level)),
        None => base,
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path)),
        None => Ok(PipelineConfig::default()),
    }
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════╗
 ║   🌱 cropcare                                    ║
 ║   Leaf Disease Classification with Burn + Rust   ║
 ╚══════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_train(config: PipelineConfig, force: bool) -> Result<()> {
    config.validate()?;

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  🧠 Backend:          {}", backend_name());
    println!("  📁 Data root:        {:?}", config.data.data_root);
    println!("  💾 Models dir:       {:?}", config.artifacts.models_dir);
    println!("  🖼️  Image size:       {}", config.model.image_size);
    println!("  📦 Batch size:       {}", config.training.batch_size);
    println!(
        "  🔄 Epochs:           {} head + {} fine-tune",
        config.training.head_epochs, config.training.fine_tune_epochs
    );
    println!("  🎲 Seed:             {}", config.seed);
    match &config.model.backbone_weights {
        Some(path) => println!("  🧩 Backbone:         {:?}", path),
        None => println!("  🧩 Backbone:         random init"),
    }
    println!();

    let report_file = config.artifact_paths().report_file();
    let mut pipeline = ClassifierPipeline::<TrainingBackend>::new(config, default_device()).with_force(force);
    match pipeline.train()? {
        TrainOutcome::AlreadyTrained { catalog } => {
            println!(
                "{} Model already trained ({} classes). Use --force to retrain.",
                "Note:".yellow(),
                catalog.len()
            );
            if let Ok(previous) = TrainingReport::load(&report_file) {
                println!(
                    "  Last run {} ({} train / {} validation), final val accuracy {:.2}%",
                    previous.finished_at.format("%Y-%m-%d %H:%M UTC"),
                    previous.train_size,
                    previous.validation_size,
                    previous.final_val_accuracy() * 100.0
                );
            }
        }
        TrainOutcome::Trained(report) => {
            let seconds = (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0;
            println!();
            println!("{}", "Training Complete!".green().bold());
            println!("  📊 Classes:             {}", report.num_classes());
            println!(
                "  🏷️  Train / validation:  {} / {}",
                report.train_size, report.validation_size
            );
            println!("  ⚠️  Skipped files:       {}", report.skipped_files);
            println!(
                "  🎉 Final val accuracy:  {:.2}%",
                report.final_val_accuracy() * 100.0
            );
            println!("  ⏱️  Duration:            {}", format_duration(seconds));
            println!();
            println!("{}", "Next steps:".cyan().bold());
            println!("  • Predict: cropcare predict --image <leaf.jpg> [--crop <plant>]");
            println!("  • Serve:   cropcare serve");
            println!("  • Reuse:   cropcare export-backbone");
        }
    }
    Ok(())
}

fn cmd_predict(config: PipelineConfig, image: &Path, crop: Option<&str>, json: bool) -> Result<()> {
    info!("Running inference on {:?}", image);
    let handle = ArtifactHandle::<InferenceBackend>::new(config, default_device());

    let prediction = match handle.predict_file(image, crop) {
        Ok(prediction) => prediction,
        Err(e) if e.is_model_not_ready() => {
            eprintln!("Train a model first:");
            eprintln!("  cropcare train");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    let diagnosis = Diagnosis::from_prediction(&prediction);
    if json {
        println!("{}", serde_json::to_string_pretty(&diagnosis)?);
        return Ok(());
    }

    println!("{}", prediction.display());
    println!("{}", "Diagnosis:".cyan().bold());
    println!("  {} ({}% confidence)", diagnosis.disease.bold(), diagnosis.confidence);
    let severity = match diagnosis.severity {
        cropcare::Severity::High => diagnosis.severity.to_string().red(),
        cropcare::Severity::Medium => diagnosis.severity.to_string().yellow(),
        cropcare::Severity::Low => diagnosis.severity.to_string().green(),
    };
    println!("  Severity: {}", severity);
    println!("  {}", diagnosis.description);
    println!();
    println!("{}", "Suggestions:".cyan().bold());
    for suggestion in &diagnosis.suggestions {
        println!("  • {}", suggestion);
    }
    Ok(())
}

fn cmd_export_backbone(config: PipelineConfig, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| config.artifact_paths().backbone_file());
    let pipeline = ClassifierPipeline::<TrainingBackend>::new(config, default_device());
    let written = pipeline
        .export_backbone(&output)
        .context("Failed to export backbone (train a model first)")?;

    println!("{} Backbone written to {:?}", "✓".green(), written);
    println!();
    println!("Start a new run from it:");
    println!("  cropcare train --backbone-weights {:?} --force", written);
    Ok(())
}

fn cmd_stats(config: PipelineConfig) -> Result<()> {
    let pipeline = ClassifierPipeline::<TrainingBackend>::new(config, default_device());
    let report = pipeline.curate()?;

    println!();
    println!("{}", "Dataset Statistics:".cyan().bold());
    println!("  📁 Class root:     {:?}", report.class_root);
    println!("  📊 Classes:        {}", report.num_classes());
    println!("  🖼️  Valid images:   {}", report.samples.len());
    println!(
        "  ⚠️  Skipped:        {} ({} extension, {} undecodable)",
        report.skipped(),
        report.skipped_extension,
        report.skipped_decode
    );
    println!();

    let max_count = report.class_counts.iter().copied().max().unwrap_or(0).max(1);
    println!("{}", "Per-class counts:".cyan().bold());
    for (name, count) in report.catalog.names().iter().zip(&report.class_counts) {
        println!(
            "  {:<45} {:>6} {}",
            name,
            count,
            format_bar(*count as f64 / max_count as f64, 30)
        );
    }
    Ok(())
}

fn cmd_config(config: &PipelineConfig, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            config.save(path)?;
            println!("{} Configuration written to {:?}", "✓".green(), path);
        }
        None => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

fn cmd_serve(config: PipelineConfig, server_config: ServerConfig) -> Result<()> {
    config.validate()?;
    info!("cropcare server v{}", cropcare::VERSION);
    info!("  Models dir: {:?}", config.artifacts.models_dir);
    info!("  Backend:    {}", backend_name());

    let state = Arc::new(AppState::new(server_config, config));
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(cropcare::server::serve(state))?;
    Ok(())
}
