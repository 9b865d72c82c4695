//! Row-oriented CSV frame.
//!
//! The pipeline's working state is one sheet per input batch: every input
//! column carried through untouched, plus derived and discovered columns
//! appended as resolution progresses. Column order is append-only - a key
//! discovered mid-run lands after the initial schema, never inserted
//! positionally - which keeps checkpoint overwrites stable across resumed
//! runs.
//!
//! Writes are atomic (temp file + fsync + rename) so a crash mid-write
//! never corrupts the previous checkpoint.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct Sheet {
    columns: Vec<String>,
    rows: Vec<HashMap<String, String>>,
}

impl Sheet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Read a CSV file. A UTF-8 BOM on the header (Excel exports) is
    /// tolerated.
    pub fn read_csv(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?;
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(content.as_bytes());

        let columns: Vec<String> = reader
            .headers()
            .context("Failed to read CSV headers")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.context("Failed to parse CSV record")?;
            let mut row = HashMap::new();
            for (i, column) in columns.iter().enumerate() {
                if let Some(value) = record.get(i) {
                    row.insert(column.clone(), value.to_string());
                }
            }
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    /// Fatal load-time check: every required column must exist. The error
    /// names every missing column.
    pub fn require_columns(&self, required: &[&str]) -> Result<()> {
        let missing: Vec<&str> = required
            .iter()
            .filter(|c| !self.has_column(c))
            .copied()
            .collect();
        if !missing.is_empty() {
            bail!(
                "input is missing required column(s): {} (found: {})",
                missing.join(", "),
                self.columns.join(", ")
            );
        }
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Append a column to the schema if it is not already present.
    pub fn ensure_column(&mut self, name: &str) {
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell value, empty string for absent cells.
    pub fn get(&self, row: usize, column: &str) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Set a cell, appending the column to the schema when new. Setting an
    /// existing cell overwrites in place, which is what makes reprocessing
    /// after a resume idempotent.
    pub fn set(&mut self, row: usize, column: &str, value: impl Into<String>) {
        self.ensure_column(column);
        if let Some(r) = self.rows.get_mut(row) {
            r.insert(column.to_string(), value.into());
        }
    }

    pub fn push_row(&mut self, row: HashMap<String, String>) {
        self.rows.push(row);
    }

    /// Atomic write: temp file in the same directory, fsync, rename.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.columns)
            .context("Failed to write CSV header")?;
        for row in &self.rows {
            let record: Vec<&str> = self
                .columns
                .iter()
                .map(|c| row.get(c).map(String::as_str).unwrap_or(""))
                .collect();
            writer.write_record(&record).context("Failed to write CSV row")?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV buffer: {e}"))?;

        let temp_path = path.with_extension("csv.tmp");
        {
            let mut file = File::create(&temp_path)
                .with_context(|| format!("Failed to create {}", temp_path.display()))?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to move {} into place", path.display()))?;

        Ok(())
    }

    /// Column-subset copy, keeping only columns that exist, in the order
    /// given.
    pub fn project(&self, columns: &[String]) -> Sheet {
        let kept: Vec<String> = columns
            .iter()
            .filter(|c| self.has_column(c))
            .cloned()
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                kept.iter()
                    .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                    .collect()
            })
            .collect();
        Sheet { columns: kept, rows }
    }

    /// Row-subset copy with the full schema.
    pub fn filter_rows<F: Fn(usize) -> bool>(&self, keep: F) -> Sheet {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| keep(*i))
            .map(|(_, r)| r.clone())
            .collect();
        Sheet {
            columns: self.columns.clone(),
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Sheet {
        let mut sheet = Sheet::new(vec!["stt".into(), "mst".into()]);
        let mut row = HashMap::new();
        row.insert("stt".to_string(), "1".to_string());
        row.insert("mst".to_string(), "0102234896".to_string());
        sheet.push_row(row);
        sheet
    }

    #[test]
    fn test_read_write_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("batch.csv");

        let mut sheet = sample();
        sheet.set(0, "crawl_status", "ok_masothue_link");
        sheet.write_csv(&path).unwrap();

        let loaded = Sheet::read_csv(&path).unwrap();
        assert_eq!(loaded.columns(), sheet.columns());
        assert_eq!(loaded.get(0, "mst"), "0102234896");
        assert_eq!(loaded.get(0, "crawl_status"), "ok_masothue_link");
    }

    #[test]
    fn test_bom_on_header_is_tolerated() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bom.csv");
        fs::write(&path, "\u{feff}stt,mst\n1,0102234896\n").unwrap();

        let sheet = Sheet::read_csv(&path).unwrap();
        assert!(sheet.has_column("stt"));
        assert_eq!(sheet.get(0, "stt"), "1");
    }

    #[test]
    fn test_require_columns_names_all_missing() {
        let sheet = sample();
        let err = sheet
            .require_columns(&["stt", "cif", "customer_name", "mst"])
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cif"));
        assert!(msg.contains("customer_name"));
        assert!(!msg.contains("missing required column(s): stt"));
    }

    #[test]
    fn test_discovered_columns_append_after_schema() {
        let mut sheet = sample();
        sheet.set(0, "mst_t1_Tên chính thức", "CÔNG TY TNHH MINH ANH");
        sheet.set(0, "mst_t1_Địa chỉ", "Hà Nội");
        assert_eq!(
            sheet.columns(),
            &["stt", "mst", "mst_t1_Tên chính thức", "mst_t1_Địa chỉ"]
        );

        // Re-setting an existing key must not move or duplicate the column.
        sheet.set(0, "mst_t1_Tên chính thức", "CÔNG TY TNHH MINH ANH");
        assert_eq!(sheet.columns().len(), 4);
    }

    #[test]
    fn test_overwrite_is_idempotent() {
        let mut sheet = sample();
        sheet.set(0, "crawl_status", "error");
        sheet.set(0, "crawl_status", "ok_masothue_link");
        assert_eq!(sheet.get(0, "crawl_status"), "ok_masothue_link");
        assert_eq!(
            sheet.columns().iter().filter(|c| *c == "crawl_status").count(),
            1
        );
    }

    #[test]
    fn test_projection_keeps_order_and_skips_unknown() {
        let mut sheet = sample();
        sheet.set(0, "link_masothue", "https://masothue.com/x");
        let links = sheet.project(&[
            "stt".to_string(),
            "nonexistent".to_string(),
            "link_masothue".to_string(),
        ]);
        assert_eq!(links.columns(), &["stt", "link_masothue"]);
        assert_eq!(links.get(0, "link_masothue"), "https://masothue.com/x");
    }

    #[test]
    fn test_filter_rows_partitions() {
        let mut sheet = sample();
        let mut row = HashMap::new();
        row.insert("stt".to_string(), "2".to_string());
        row.insert("mst".to_string(), "".to_string());
        sheet.push_row(row);

        let failed = sheet.filter_rows(|i| sheet.get(i, "mst").is_empty());
        assert_eq!(failed.len(), 1);
        assert_eq!(failed.get(0, "stt"), "2");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.csv");
        sample().write_csv(&path).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("csv.tmp").exists());
    }
}
