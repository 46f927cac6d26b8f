use anyhow::{Context, Result};
use mctsrate::{
    config::{Config, CONFIG_FILE},
    history::History,
    process,
};
use std::path::Path;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    // stdout carries the table previews, logs go to stderr
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();
    info!("startup");

    // ─── 2) configure ────────────────────────────────────────────────
    let config = Config::load_or_default(Path::new(CONFIG_FILE))?;
    let inputs = config.resolve_inputs()?;
    info!("{} input file(s) to process", inputs.len());

    let history = config
        .history_dir
        .as_ref()
        .map(|dir| History::new(dir.clone()))
        .transpose()?;

    // ─── 3) process inputs one at a time ─────────────────────────────
    for input in &inputs {
        if let Some(history) = &history {
            info!(
                input = %input.display(),
                previous_runs = history.run_count(input)?,
                "history"
            );
        }

        let summary = process::process_file(input, &config)
            .with_context(|| format!("processing {}", input.display()))?;
        info!(summary = %serde_json::to_string(&summary)?, "run complete");

        if let Some(history) = &history {
            history.record_run(&summary)?;
        }
    }

    info!("all done");
    Ok(())
}
