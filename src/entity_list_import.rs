//! Entity names from a CSV export with a `University` column.

use std::io::Read;
use std::path::Path;

use log::debug;

pub const NAME_COLUMN: &str = "University";

pub fn parse_entity_names<R: Read>(reader: R) -> Result<Vec<String>, String> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|err| format!("Failed to read CSV header: {err}"))?
        .clone();
    let Some(column) = headers
        .iter()
        .position(|header| header.trim_start_matches('\u{feff}') == NAME_COLUMN)
    else {
        debug!("CSV has no '{}' column", NAME_COLUMN);
        return Ok(Vec::new());
    };

    let mut names = Vec::new();
    for (index, record) in csv_reader.records().enumerate() {
        let record = record.map_err(|err| format!("Failed to read CSV row {}: {err}", index + 2))?;
        match record.get(column) {
            Some(name) if !name.is_empty() => names.push(name.to_string()),
            _ => debug!("Skipping CSV row {} without a name", index + 2),
        }
    }
    Ok(names)
}

/// Reads every non-blank name. A missing file is an error.
pub fn read_entity_names(path: &Path) -> Result<Vec<String>, String> {
    if !path.is_file() {
        return Err(format!("CSV file not found: {}", path.display()));
    }
    let file = std::fs::File::open(path)
        .map_err(|err| format!("Failed to open {}: {err}", path.display()))?;
    parse_entity_names(file)
}
