use std::path::{Path, PathBuf};

/// Resolve the model directory.
///
/// Fallback chain:
/// 1. `IMPRO_MODELS_DIR` env var (runtime override)
/// 2. `model_dir` from config.toml
/// 3. `<data_dir>/impro/models`
/// 4. `./models` relative to CWD
pub fn models_dir(configured: Option<&Path>) -> PathBuf {
    if let Ok(dir) = std::env::var("IMPRO_MODELS_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = configured {
        return dir.to_path_buf();
    }
    dirs::data_dir()
        .map(|d| d.join("impro").join("models"))
        .unwrap_or_else(|| PathBuf::from("models"))
}

/// Log file location (`<config_dir>/impro/impro.log`).
pub fn log_file() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("impro"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("impro.log")
}
