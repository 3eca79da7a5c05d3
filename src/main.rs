mod cli;
mod ui;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use tracing::debug;
use url::Url;

use transform_status::config::StatusConfig;
use transform_status::telemetry::init_logging;
use transform_status::worker::{TransformationWorker, WorkItem};
use transform_status::{
    InMemoryTransformationManager, StoredTransformation, Transformation, TransformationManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => StatusConfig::load_from(path)?,
        None => StatusConfig::load()?,
    };
    let mut logging = config.logging();
    if cli.verbose {
        logging.level = "debug";
    }
    init_logging(&logging)?;

    match cli.command {
        Command::Demo { types, fail } => {
            let types = if types.is_empty() {
                config.metadata_types.clone()
            } else {
                types
            };
            run_demo(&config, &types, fail.as_deref()).await
        }
        Command::Inspect { file } => inspect(&file),
    }
}

async fn run_demo(config: &StatusConfig, types: &[String], fail: Option<&str>) -> Result<()> {
    let manager = InMemoryTransformationManager::new();
    let transformation = manager.create_transform(
        Url::parse("file:///var/spool/transform/input.pdf")?,
        Url::parse("https://content.example.com/input.pdf")?,
        Url::parse("https://content.example.com/input.xml")?,
    )?;
    debug!(transform_id = %transformation.transform_id(), ?types, "starting demo");

    let progress = Arc::new(ui::TransformProgress::start(
        transformation.transform_id(),
        types.len(),
    ));
    let worker = TransformationWorker::new(Duration::from_millis(config.worker_delay_ms));
    worker
        .run(
            Arc::clone(&transformation),
            WorkItem::plan(types, fail),
            progress.clone(),
        )
        .await?;

    let record = manager.get(transformation.transform_id())?.to_record();
    progress.finish(&record);
    progress.print_record(&StoredTransformation::from(record).to_json_pretty()?);
    Ok(())
}

fn inspect(file: &std::path::Path) -> Result<()> {
    let json =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;

    match StoredTransformation::from_json(&json)? {
        StoredTransformation::Current(record) => {
            let transform_id = record.transform_id.clone();
            let manager = InMemoryTransformationManager::new();
            manager.restore(Transformation::restore(record)?)?;
            for line in ui::summary_lines(&manager.get(&transform_id)?.to_record()) {
                println!("{line}");
            }
        }
        StoredTransformation::Unknown(record) => {
            let fields: Vec<&str> = record.fields.keys().map(String::as_str).collect();
            println!(
                "record version {} is not supported by this build (fields: {})",
                record.version,
                fields.join(", ")
            );
        }
    }
    Ok(())
}
