use anyhow::Context;
use clap::Parser;
use std::{path::PathBuf, sync::Arc};

use marquee_api::{
    config::LogFormat, storage::FsArtifactStorage, telemetry, training::TrainingPipeline,
    EngineConfig,
};

/// Builds a model bundle from a MovieLens 100k directory and publishes it
#[derive(Debug, Parser)]
#[command(name = "marquee-train")]
struct Args {
    /// Directory containing u.item
    #[arg(long, env = "MARQUEE_DATA_DIR", default_value = "data/ml-100k")]
    data_dir: PathBuf,

    /// Version to publish the bundle under
    #[arg(long = "version", env = "MARQUEE_MODEL_VERSION", default_value = "v1.0.0")]
    model_version: String,

    /// Root directory of published bundles
    #[arg(long, env = "MARQUEE_ARTIFACTS_DIR", default_value = "models")]
    artifacts_dir: PathBuf,

    /// Weight of the scaled release year feature, in (0, 1]
    #[arg(long, env = "MARQUEE_YEAR_WEIGHT", default_value_t = 0.1)]
    year_weight: f64,

    #[arg(long, env = "MARQUEE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let format = if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    telemetry::init_logging(&args.log_level, format)?;

    let defaults = EngineConfig::default();
    let engine = EngineConfig::new(
        args.year_weight,
        defaults.cache_capacity().get(),
        defaults.default_method(),
        args.model_version.clone(),
        args.artifacts_dir.clone(),
    )
    .context("Invalid training configuration")?;

    let storage = Arc::new(FsArtifactStorage::new(args.artifacts_dir.clone()));
    let pipeline = TrainingPipeline::new(engine, storage);

    let bundle = pipeline
        .run(&args.data_dir, &args.model_version)
        .await
        .with_context(|| format!("Training {} failed", args.model_version))?;

    tracing::info!(
        version = bundle.version(),
        movies = bundle.movie_count(),
        path = %args.artifacts_dir.join(bundle.version()).display(),
        "Bundle published"
    );
    Ok(())
}
