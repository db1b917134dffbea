use std::fs;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rmbg_rs::{
    compositor::MaskCompositor, Config, MattingPipeline, ModelSource, PipelineResult,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level())),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    ensure!(config.input.exists(), "Input file does not exist");
    if let Some(model_path) = &config.model_path {
        ensure!(model_path.exists(), "Model path does not exist");
    }

    let spec = config.model_spec();
    let pipeline = MattingPipeline::new(config.model_source(), spec.clone()).with_compositor(
        MaskCompositor::new(spec.processor.resample).with_max_alloc(config.max_alloc_bytes()),
    );

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} [{elapsed}] {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = remove_background(&pipeline, &config, &spinner).await?;

    let output_path = config.output_path();
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    result
        .handle
        .save(&output_path)
        .with_context(|| format!("Failed to save image: {}", output_path.display()))?;

    tracing::info!(
        output = %output_path.display(),
        width = result.width,
        height = result.height,
        "saved"
    );
    result.revoke();

    Ok(())
}

/// Load the model and process the input file; the spinner is cleared on every exit.
async fn remove_background<S: ModelSource>(
    pipeline: &MattingPipeline<S>,
    config: &Config,
    spinner: &ProgressBar,
) -> Result<PipelineResult> {
    let _clear = ClearOnDrop(spinner);
    let model_id = &pipeline.registry().spec().model_id;

    spinner.set_message(format!("Loading {}", model_id));
    pipeline
        .ensure_ready()
        .await
        .with_context(|| format!("Failed to load model {}", model_id))?;

    let bytes = fs::read(&config.input)
        .with_context(|| format!("Failed to read image: {}", config.input.display()))?;
    spinner.set_message(format!("Removing background from {}", config.input.display()));

    pipeline.process(bytes).await.map_err(|e| {
        if e.is_unsupported_platform() {
            anyhow!(
                "{}. Try a smaller image or raise --max-alloc-mb (currently {} MiB)",
                e,
                config.max_alloc_mb
            )
        } else {
            anyhow::Error::new(e).context(format!("Failed to process {}", config.input.display()))
        }
    })
}

struct ClearOnDrop<'a>(&'a ProgressBar);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.finish_and_clear();
    }
}
