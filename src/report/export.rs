//! CSV export of report rows

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Write rows with a header line taken from the row's field names
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))?;
    for row in rows {
        writer.serialize(row).context("Failed to serialize report row")?;
    }
    writer.flush()?;
    info!("Wrote {} rows to {:?}", rows.len(), path);
    Ok(())
}
