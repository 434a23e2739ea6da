//! Tabular input (uploaded CSV or spreadsheet values) and results export.

use crate::pages::escape;
use std::fmt::Write as _;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("the file is empty")]
    Empty,
    #[error("the header row has no columns")]
    NoColumns,
    #[error("{0}")]
    Csv(#[from] csv::Error),
}

/// A header row plus data rows. Rows may be shorter or longer than the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn from_csv(bytes: &[u8]) -> Result<Self, DatasetError> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(DatasetError::Empty);
        }
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(true)
            .from_reader(bytes);
        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Self::new(columns, rows)
    }

    /// First row is the header, the rest are data.
    pub fn from_rows(values: Vec<Vec<String>>) -> Result<Self, DatasetError> {
        let mut it = values.into_iter();
        let columns = it.next().ok_or(DatasetError::Empty)?;
        Self::new(columns, it.collect())
    }

    fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, DatasetError> {
        if columns.iter().all(|c| c.is_empty()) {
            return Err(DatasetError::NoColumns);
        }
        Ok(Self { columns, rows })
    }

    /// HTML table with a leading row-index column.
    pub fn to_html(&self) -> String {
        let mut out = String::from("<table class=\"dataframe\">\n  <thead>\n    <tr><th></th>");
        for c in &self.columns {
            let _ = write!(out, "<th>{}</th>", escape(c));
        }
        out.push_str("</tr>\n  </thead>\n  <tbody>\n");
        for (i, row) in self.rows.iter().enumerate() {
            let _ = write!(out, "    <tr><th>{}</th>", i);
            for col in 0..self.columns.len() {
                let cell = row.get(col).map(String::as_str).unwrap_or("");
                let _ = write!(out, "<td>{}</td>", escape(cell));
            }
            out.push_str("</tr>\n");
        }
        out.push_str("  </tbody>\n</table>");
        out
    }
}

pub const RESULTS_FILENAME: &str = "results.csv";

/// The downloadable results: one header and one data row, CRLF-terminated.
pub fn results_csv(extracted: &str) -> Result<Vec<u8>, DatasetError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    writer.write_record(["Extracted Information"])?;
    writer.write_record([extracted])?;
    writer
        .into_inner()
        .map_err(|e| DatasetError::Csv(csv::Error::from(e.into_error())))
}
