//! Small helpers for reading sysfs attribute files

use std::path::Path;

use anyhow::{Context, Result};

/// Read an attribute, trimming surrounding whitespace
pub async fn read_string(path: &Path) -> Result<String> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(raw.trim().to_string())
}

/// Read an attribute holding a decimal integer
pub async fn read_int(path: &Path) -> Result<i64> {
    let value = read_string(path).await?;
    value
        .parse::<i64>()
        .with_context(|| format!("{} does not hold an integer: {value:?}", path.display()))
}

/// Whether `path` exists and is a directory
pub async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_dir())
}
