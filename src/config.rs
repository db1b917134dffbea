use std::path::{Path, PathBuf};

use clap::Parser;
use image::ImageFormat;

use crate::compositor::DEFAULT_MAX_ALLOC;
use crate::model::{ModelSpec, OrtModelSource, RMBG_MODEL_ID};

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Image to remove the background from
    pub input: PathBuf,

    /// Output PNG file [default: <input-stem>-nobg.png next to the input]
    #[arg(short, long, value_parser = check_output)]
    pub output: Option<PathBuf>,

    /// Local ONNX model; downloaded from the hub when omitted
    #[arg(short, long)]
    pub model_path: Option<PathBuf>,

    #[arg(long, default_value = RMBG_MODEL_ID)]
    pub model_id: String,

    #[arg(long, default_value = "main")]
    pub revision: String,

    /// Hub cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// Largest pixel buffer the compositor may allocate, in MiB
    #[arg(long, default_value_t = DEFAULT_MAX_ALLOC / (1024 * 1024))]
    pub max_alloc_mb: u64,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_path(&self.input))
    }

    pub fn model_spec(&self) -> ModelSpec {
        ModelSpec::rmbg()
            .with_model_id(&self.model_id)
            .with_revision(&self.revision)
    }

    pub fn model_source(&self) -> OrtModelSource {
        let mut source = OrtModelSource::new().with_device_id(self.device_id);
        if let Some(path) = &self.model_path {
            source = source.with_model_path(path);
        }
        if let Some(dir) = &self.cache_dir {
            source = source.with_cache_dir(dir);
        }
        source
    }

    pub const fn max_alloc_bytes(&self) -> u64 {
        self.max_alloc_mb.saturating_mul(1024 * 1024)
    }

    pub const fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}-nobg.png", stem))
}

fn check_output(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    match ImageFormat::from_path(&path) {
        Ok(ImageFormat::Png) => Ok(path),
        _ => Err(format!(
            "{} is not supported. Output must be a `png` file to keep the alpha channel",
            s
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        let config = Config::parse_from(["rmbg-rs", "photos/cat.jpg"]);
        assert_eq!(config.output_path(), PathBuf::from("photos/cat-nobg.png"));
        assert_eq!(config.model_id, "briaai/RMBG-1.4");
        assert_eq!(config.revision, "main");
        assert_eq!(config.max_alloc_bytes(), DEFAULT_MAX_ALLOC);
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_explicit_output_and_overrides() {
        let config = Config::parse_from([
            "rmbg-rs",
            "cat.jpg",
            "-o",
            "out/cat.png",
            "--model-id",
            "someone/RMBG-fork",
            "-d",
            "1",
            "-vv",
        ]);
        assert_eq!(config.output_path(), PathBuf::from("out/cat.png"));
        assert_eq!(config.model_spec().model_id, "someone/RMBG-fork");
        assert_eq!(config.device_id, 1);
        assert_eq!(config.log_level(), "trace");
    }

    #[test]
    fn test_non_png_output_is_rejected() {
        assert!(check_output("out.png").is_ok());
        assert!(check_output("out.PNG").is_ok());
        assert!(check_output("out.jpg").is_err());
        assert!(check_output("out").is_err());
        assert!(Config::try_parse_from(["rmbg-rs", "cat.jpg", "-o", "cat.webp"]).is_err());
    }
}
