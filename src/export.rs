//! Export files: the member JSON document and the plain-text name list
//! derived from it.

use crate::schemas::NormalizedRecord;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write members as a pretty-printed JSON array
pub fn write_members_json(records: &[NormalizedRecord], output_path: &Path) -> Result<(), ExportError> {
    info!("Writing {} members to {:?}", records.len(), output_path);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(output_path)?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records)?;
    std::io::Write::flush(&mut writer)?;
    Ok(())
}

/// Read members back from an export file
pub fn read_members_json(path: &Path) -> Result<Vec<NormalizedRecord>, ExportError> {
    let file = std::fs::File::open(path)?;
    let records = serde_json::from_reader(std::io::BufReader::new(file))?;
    Ok(records)
}

/// One `id:<id> name: <first> [<last>]` line per member
pub fn member_name_lines(records: &[NormalizedRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let mut line = format!(
                "id:{} name: {}",
                record.id,
                record.first_name.as_deref().unwrap_or_default()
            );
            if let Some(last) = record.last_name.as_deref().filter(|l| !l.is_empty()) {
                line.push(' ');
                line.push_str(last);
            }
            line
        })
        .collect()
}

/// Write the name list, newline separated
pub fn write_name_list(records: &[NormalizedRecord], output_path: &Path) -> Result<usize, ExportError> {
    let lines = member_name_lines(records);
    std::fs::write(output_path, lines.join("\n"))?;
    info!("Wrote {} names to {:?}", lines.len(), output_path);
    Ok(lines.len())
}
