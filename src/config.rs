use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::error::SubsetError;
use crate::subsetter::{subset_file, Bbox, CrsSpec, SubsetRequest, SubsetSummary};

static BRACKET_CONTENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(.*?)\]").unwrap());
static QUOTED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"'([^']*)'").unwrap());

/// Parse a bracket-formatted cell like `"['Crime type' 'Location']"` into a
/// list of column names. Only single-quoted items count; unquoted tokens
/// between the brackets are dropped.
pub fn parse_bracket_list(value: &str) -> Result<Vec<String>, SubsetError> {
    let content = BRACKET_CONTENT
        .captures(value)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| {
            SubsetError::Table(format!("'{value}' is not a bracket-formatted column list"))
        })?;

    Ok(QUOTED_ITEM
        .captures_iter(content.as_str())
        .map(|caps| caps[1].to_string())
        .collect())
}

/// One row of a batch table: everything needed to subset one input file.
#[derive(Debug, Clone)]
pub struct BatchRow {
    pub input_file: PathBuf,
    pub output_dir: PathBuf,
    pub bbox: Bbox,
    pub file_prefix: String,
    pub crs: CrsSpec,
    pub columns: Vec<String>,
}

impl From<BatchRow> for SubsetRequest {
    fn from(row: BatchRow) -> Self {
        SubsetRequest {
            input: row.input_file,
            output_dir: row.output_dir,
            bbox: row.bbox,
            prefix: row.file_prefix,
            columns: row.columns,
            crs: row.crs,
        }
    }
}

const REQUIRED_COLUMNS: [&str; 9] = [
    "input_file",
    "output_dir",
    "minx",
    "miny",
    "maxx",
    "maxy",
    "file_prefix",
    "crs",
    "columns_to_keep",
];

// Splits one CSV line, honoring double-quoted fields with embedded commas.
// The batch tables are small enough that a dedicated CSV crate is not worth
// carrying for this one call site.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(ch),
        }
    }
    fields.push(field);
    fields
}

/// Read a batch table CSV. Columns are located by header name, so their order
/// in the file does not matter.
pub fn read_table(path: &Path) -> Result<Vec<BatchRow>, SubsetError> {
    let contents = fs::read_to_string(path)?;
    let mut lines = contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header_line) = lines
        .next()
        .ok_or_else(|| SubsetError::Table(format!("{} is empty", path.display())))?;
    let header: Vec<String> = split_csv_line(header_line)
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut positions = [0usize; REQUIRED_COLUMNS.len()];
    for (slot, name) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = header.iter().position(|h| h == name).ok_or_else(|| {
            SubsetError::Table(format!("missing required column '{name}'"))
        })?;
    }
    let [input_file, output_dir, minx, miny, maxx, maxy, file_prefix, crs, columns_to_keep] =
        positions;

    let mut rows = Vec::new();
    for (line_no, line) in lines {
        let fields = split_csv_line(line);
        if fields.len() != header.len() {
            return Err(SubsetError::Table(format!(
                "line {}: expected {} fields, found {}",
                line_no + 1,
                header.len(),
                fields.len()
            )));
        }

        let number = |idx: usize, name: &str| -> Result<f64, SubsetError> {
            fields[idx].trim().parse::<f64>().map_err(|_| {
                SubsetError::Table(format!(
                    "line {}: '{}' is not a number for {name}",
                    line_no + 1,
                    fields[idx].trim()
                ))
            })
        };

        rows.push(BatchRow {
            input_file: PathBuf::from(fields[input_file].trim()),
            output_dir: PathBuf::from(fields[output_dir].trim()),
            bbox: Bbox::new(
                number(minx, "minx")?,
                number(miny, "miny")?,
                number(maxx, "maxx")?,
                number(maxy, "maxy")?,
            ),
            file_prefix: fields[file_prefix].trim().to_string(),
            crs: fields[crs].trim().parse()?,
            columns: parse_bracket_list(&fields[columns_to_keep])?,
        });
    }

    Ok(rows)
}

/// Subset every file listed in a batch table, in row order.
pub fn subset_from_table(path: &Path) -> Result<Vec<SubsetSummary>, SubsetError> {
    let rows = read_table(path)?;
    info!(rows = rows.len(), table = %path.display(), "running batch subset");

    let mut summaries = Vec::with_capacity(rows.len());
    for row in rows {
        summaries.push(subset_file(&row.into())?);
    }

    info!(processed = summaries.len(), "batch complete");
    Ok(summaries)
}
