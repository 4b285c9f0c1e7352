//! Model persistence: one plain-text blob per file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const MODEL_EXTENSION: &str = "txt";

/// Resolve a user-supplied model name. Bare names land in `models_dir`
/// and get the model extension; anything with a directory part is used
/// as given.
pub fn resolve_model_path(name: &str, models_dir: &Path) -> PathBuf {
    let path = PathBuf::from(name);
    let path = if path.components().count() > 1 || path.is_absolute() {
        path
    } else {
        models_dir.join(path)
    };
    if path.extension().is_none() {
        path.with_extension(MODEL_EXTENSION)
    } else {
        path
    }
}

/// Write `blob` to `path` via a temp file and rename, so a crash never
/// leaves a half-written model behind.
pub fn save_model(path: &Path, blob: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, blob)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    log::info!(target: "engine::model", "saved model to {}", path.display());
    Ok(())
}

pub fn load_model(path: &Path) -> io::Result<String> {
    let blob = fs::read_to_string(path)?;
    log::info!(target: "engine::model", "read model {} ({} bytes)", path.display(), blob.len());
    Ok(blob)
}

/// Model files in `dir`, sorted by name. A missing directory is empty.
pub fn list_models(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut models = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == MODEL_EXTENSION) {
            models.push(path);
        }
    }
    models.sort();
    Ok(models)
}
