//! Resolves a model path argument that may point directly at a `.gguf` file
//! or at a directory containing exactly one.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

pub fn resolve(path: &str) -> Result<PathBuf> {
    let path = Path::new(path);
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    let entries = std::fs::read_dir(path)
        .with_context(|| format!("failed to read model directory {}", path.display()))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry?;
        let entry_path = entry.path();
        if entry_path.extension().and_then(|ext| ext.to_str()) == Some("gguf") {
            candidates.push(entry_path);
        }
    }

    match candidates.len() {
        0 => bail!("no .gguf file found in {}", path.display()),
        1 => Ok(candidates.remove(0)),
        n => bail!(
            "expected exactly one .gguf file in {}, found {n}",
            path.display()
        ),
    }
}
