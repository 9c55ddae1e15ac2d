//! In-memory table with an ordered, mutable column layout.
//!
//! Conversion inserts output columns at specific positions (ids next to the
//! names they describe, overflow candidates after the primary ward column),
//! so the table is modeled as ordered headers plus string rows rather than a
//! fixed-width record type. Missing cells created by a column insertion are
//! filled with empty strings.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use encoding_rs::Encoding;

use crate::io_utils;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Frame {
    pub fn new(headers: Vec<String>) -> Self {
        Frame {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn from_parts(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Frame { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub fn value(&self, row: usize, column: usize) -> &str {
        self.rows[row].get(column).map(String::as_str).unwrap_or("")
    }

    pub fn set_value(&mut self, row: usize, column: usize, value: String) {
        self.rows[row][column] = value;
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// Inserts an empty column at `position`, shifting existing columns right.
    pub fn insert_column(&mut self, position: usize, name: &str) {
        let position = position.min(self.headers.len());
        self.headers.insert(position, name.to_string());
        for row in &mut self.rows {
            row.insert(position, String::new());
        }
    }

    /// Appends an empty column at the end of the layout.
    pub fn push_column(&mut self, name: &str) {
        self.insert_column(self.headers.len(), name);
    }

    /// Removes the named column if present; returns whether it existed.
    pub fn drop_column(&mut self, name: &str) -> bool {
        match self.column_index(name) {
            Some(idx) => {
                self.headers.remove(idx);
                for row in &mut self.rows {
                    if idx < row.len() {
                        row.remove(idx);
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Moves the rows out of the frame, leaving the header layout in place.
    pub fn take_rows(&mut self) -> Vec<Vec<String>> {
        std::mem::take(&mut self.rows)
    }

    /// Reads a whole CSV file (headers required) into a frame.
    pub fn read_csv(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Frame> {
        let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
        let headers = io_utils::reader_headers(&mut reader, encoding)?;
        let width = headers.len();
        let mut frame = Frame::new(headers);
        for (ordinal, record) in reader.byte_records().enumerate() {
            let record = record.with_context(|| format!("Reading row {}", ordinal + 2))?;
            let mut row = io_utils::decode_record(&record, encoding)?;
            if row.len() != width {
                row.resize(width, String::new());
            }
            frame.push_row(row);
        }
        Ok(frame)
    }

    /// Writes the frame as CSV to `path`, or to stdout when `path` is `None`
    /// or `-`.
    pub fn write_csv(&self, path: Option<&Path>, delimiter: u8) -> Result<()> {
        let mut writer = io_utils::open_csv_writer(path, delimiter)?;
        writer
            .write_record(self.headers.iter())
            .context("Writing output headers")?;
        for row in &self.rows {
            writer.write_record(row.iter()).context("Writing output row")?;
        }
        writer.flush().context("Flushing output")?;
        Ok(())
    }

    /// Concatenates chunk frames produced from the same base layout back into
    /// one frame, preserving chunk order.
    ///
    /// Chunks may have grown different overflow-column sets; the widest chunk
    /// layout is taken as the final layout and narrower chunks are remapped
    /// into it by column name, filling absent columns with empty values.
    pub fn concat_chunks(chunks: Vec<Frame>) -> Result<Frame> {
        let Some(widest) = chunks
            .iter()
            .max_by_key(|chunk| chunk.column_count())
            .map(|chunk| chunk.headers.clone())
        else {
            return Ok(Frame::default());
        };

        let mut merged = Frame::new(widest);
        for chunk in chunks {
            if chunk.headers == merged.headers {
                merged.rows.extend(chunk.rows);
                continue;
            }
            let mapping = chunk
                .headers
                .iter()
                .map(|name| {
                    merged.column_index(name).ok_or_else(|| {
                        anyhow!("Chunk column '{name}' missing from merged layout")
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            for row in chunk.rows {
                let mut remapped = vec![String::new(); merged.headers.len()];
                for (value, target) in row.into_iter().zip(&mapping) {
                    remapped[*target] = value;
                }
                merged.rows.push(remapped);
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::from_parts(
            vec!["a".into(), "b".into()],
            vec![
                vec!["1".into(), "2".into()],
                vec!["3".into(), "4".into()],
            ],
        )
    }

    #[test]
    fn insert_column_shifts_layout_and_fills_empty() {
        let mut frame = sample();
        frame.insert_column(1, "x");
        assert_eq!(frame.headers(), ["a", "x", "b"]);
        assert_eq!(frame.rows()[0], vec!["1", "", "2"]);
        assert_eq!(frame.column_index("b"), Some(2));
    }

    #[test]
    fn drop_column_removes_cells() {
        let mut frame = sample();
        assert!(frame.drop_column("a"));
        assert!(!frame.drop_column("a"));
        assert_eq!(frame.headers(), ["b"]);
        assert_eq!(frame.rows()[1], vec!["4"]);
    }

    #[test]
    fn concat_reconciles_divergent_chunk_layouts() {
        let base = vec!["a".to_string(), "b".to_string()];
        let narrow = Frame::from_parts(base.clone(), vec![vec!["1".into(), "2".into()]]);
        let mut wide = Frame::from_parts(base, vec![vec!["3".into(), "4".into()]]);
        wide.insert_column(2, "b_option_2");
        wide.set_value(0, 2, "extra".into());

        let merged = Frame::concat_chunks(vec![narrow, wide]).expect("merge");
        assert_eq!(merged.headers(), ["a", "b", "b_option_2"]);
        assert_eq!(merged.rows()[0], vec!["1", "2", ""]);
        assert_eq!(merged.rows()[1], vec!["3", "4", "extra"]);
    }

    #[test]
    fn concat_preserves_chunk_order() {
        let headers = vec!["a".to_string()];
        let first = Frame::from_parts(headers.clone(), vec![vec!["1".into()]]);
        let second = Frame::from_parts(headers, vec![vec!["2".into()]]);
        let merged = Frame::concat_chunks(vec![first, second]).expect("merge");
        assert_eq!(merged.rows(), [vec!["1".to_string()], vec!["2".to_string()]]);
    }
}
