//! Table export
//!
//! Serializes decoded rows to JSON or CSV and frames reconstructed
//! `CREATE TABLE` statements into a single script. Each export can also be
//! written to a file named after its table or schema.

use crate::decoder::{Row, SqlValue};
use crate::{Error, Result};
use chrono::NaiveTime;
use serde::Serialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::info;

/// Block written before every table in a DDL export
pub const SEPARATOR: &str = "
========================================================================
========================================================================
";

/// Layout used for date and time values in CSV output (e.g. `02 Jan 06 15:04 UTC`)
pub const DATETIME_LAYOUT: &str = "%d %b %y %H:%M UTC";

/// A finished file export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileExport {
    pub path: PathBuf,
    pub bytes_written: usize,
}

/// Write `contents` to `directory/file_name`, creating the directory if needed
///
/// `file_name` is derived from a table or schema name; names containing a path
/// separator are rejected.
pub async fn write_file(directory: &Path, file_name: &str, contents: &[u8]) -> Result<FileExport> {
    if file_name.contains(['/', '\\']) {
        return Err(Error::export(format!(
            "refusing to export to file name {:?}",
            file_name
        )));
    }

    tokio::fs::create_dir_all(directory)
        .await
        .map_err(Error::export)?;
    let path = directory.join(file_name);
    tokio::fs::write(&path, contents)
        .await
        .map_err(Error::export)?;

    info!(path = %path.display(), bytes = contents.len(), "wrote export");
    Ok(FileExport {
        path,
        bytes_written: contents.len(),
    })
}

/// Frame one table's DDL with the separator and a table-name header
pub fn frame_ddl(table: &str, ddl: &str) -> String {
    format!("{}\n===== TABLE: {} =====\n{}\n", SEPARATOR, table, ddl)
}

/// Rows as a tab-indented JSON array
pub fn to_json(rows: &[Row]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    rows.serialize(&mut serializer)?;
    Ok(buffer)
}

/// Rows as CSV
///
/// The header comes from the first row's keys; without rows the output is
/// empty. NULL becomes an empty field.
pub fn to_csv(rows: &[Row]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };

    let mut output = String::new();
    push_record(&mut output, first.keys().map(|key| Cow::Borrowed(key.as_str())));

    for row in rows {
        push_record(&mut output, row.values().map(csv_field));
    }

    output
}

fn push_record<'a>(output: &mut String, fields: impl Iterator<Item = Cow<'a, str>>) {
    let record = fields
        .map(|field| escape(&field).into_owned())
        .collect::<Vec<_>>()
        .join(",");
    output.push_str(&record);
    output.push('\n');
}

/// Default string form of a value in CSV output
pub fn csv_field(value: &SqlValue) -> Cow<'_, str> {
    match value {
        SqlValue::Null => Cow::Borrowed(""),
        SqlValue::Bool(value) => Cow::Owned(value.to_string()),
        SqlValue::Int(value) => Cow::Owned(value.to_string()),
        SqlValue::UInt(value) => Cow::Owned(value.to_string()),
        SqlValue::Float(value) => Cow::Owned(value.to_string()),
        SqlValue::Decimal(text) | SqlValue::Text(text) => Cow::Borrowed(text),
        SqlValue::Bytes(bytes) => String::from_utf8_lossy(bytes),
        SqlValue::Date(date) => Cow::Owned(
            date.and_time(NaiveTime::MIN)
                .format(DATETIME_LAYOUT)
                .to_string(),
        ),
        SqlValue::Time(time) => Cow::Owned(time.format("%H:%M:%S").to_string()),
        SqlValue::DateTime(datetime) => Cow::Owned(datetime.format(DATETIME_LAYOUT).to_string()),
        SqlValue::DateTimeUtc(datetime) => {
            Cow::Owned(datetime.format(DATETIME_LAYOUT).to_string())
        }
        SqlValue::Json(json) => Cow::Owned(json.to_string()),
    }
}

/// Quote a field when it contains a delimiter, a quote or a line break
fn escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
