use crate::storage::tweets::ExportRow;
use anyhow::Context;
use std::path::Path;

pub const EXPORT_COLUMNS: [&str; 6] = [
    "id",
    "sentiment",
    "caps_percentage",
    "length",
    "not_meltdown_votes",
    "meltdown_votes",
];

/// Writes `rows` to `path` as CSV with a header line, replacing any previous export.
pub fn write_csv(path: &Path, rows: &[ExportRow]) -> anyhow::Result<usize> {
    // Header written up front so an empty result set still yields the column line.
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer
        .write_record(EXPORT_COLUMNS)
        .context("failed to write CSV header")?;
    for row in rows {
        writer.serialize(row).context("failed to encode CSV row")?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(rows.len())
}
