//! Offline snapshot exports: structured JSON, tabular Parquet, checksum manifest.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{RecordBatch, StringArray};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use bidmon_core::Opportunity;
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::RunSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    pub schema_version: u32,
    pub run_id: String,
    pub files: Vec<ExportManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// Writes `opportunities.json`, `opportunities.parquet` and `manifest.json`
/// into `reports_root/<run_id>/` and returns that directory.
pub fn write_exports(
    reports_root: &Path,
    summary: &RunSummary,
    opportunities: &[Opportunity],
) -> Result<PathBuf> {
    let run_dir = reports_root.join(summary.run_id.to_string());
    std::fs::create_dir_all(&run_dir).with_context(|| format!("creating {}", run_dir.display()))?;

    let json_path = run_dir.join("opportunities.json");
    let json = serde_json::to_vec_pretty(&serde_json::json!({
        "run": summary,
        "count": opportunities.len(),
        "bids": opportunities,
    }))
    .context("serializing opportunities export")?;
    std::fs::write(&json_path, json).with_context(|| format!("writing {}", json_path.display()))?;

    let parquet_path = run_dir.join("opportunities.parquet");
    write_opportunities_parquet(&parquet_path, opportunities)?;

    let manifest = ExportManifest {
        schema_version: 1,
        run_id: summary.run_id.to_string(),
        files: vec![
            manifest_entry("opportunities_json", &run_dir, &json_path)?,
            manifest_entry("opportunities_parquet", &run_dir, &parquet_path)?,
        ],
    };
    let manifest_path = run_dir.join("manifest.json");
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing export manifest")?;
    std::fs::write(&manifest_path, bytes)
        .with_context(|| format!("writing {}", manifest_path.display()))?;

    Ok(run_dir)
}

fn string_column<'a>(rows: &'a [Opportunity], f: impl Fn(&'a Opportunity) -> Option<&'a str>) -> StringArray {
    StringArray::from(rows.iter().map(f).collect::<Vec<_>>())
}

fn write_opportunities_parquet(path: &Path, rows: &[Opportunity]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("source", DataType::Utf8, false),
        ArrowField::new("title", DataType::Utf8, false),
        ArrowField::new("url", DataType::Utf8, false),
        ArrowField::new("posted_date", DataType::Utf8, false),
        ArrowField::new("location", DataType::Utf8, false),
        ArrowField::new("type", DataType::Utf8, false),
        ArrowField::new("bid_number", DataType::Utf8, false),
        ArrowField::new("description", DataType::Utf8, true),
    ]));

    let posted = rows
        .iter()
        .map(|o| Some(o.posted_date.format("%Y-%m-%d").to_string()))
        .collect::<Vec<_>>();

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(string_column(rows, |o| Some(o.source.as_str()))),
            Arc::new(string_column(rows, |o| Some(o.title.as_str()))),
            Arc::new(string_column(rows, |o| Some(o.url.as_str()))),
            Arc::new(StringArray::from(posted)),
            Arc::new(string_column(rows, |o| Some(o.location.as_str()))),
            Arc::new(string_column(rows, |o| Some(o.jurisdiction_type.as_str()))),
            Arc::new(string_column(rows, |o| Some(o.bid_number.as_str()))),
            Arc::new(string_column(rows, |o| o.description.as_deref())),
        ],
    )
    .context("building opportunities record batch")?;

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn manifest_entry(name: &str, run_dir: &Path, path: &Path) -> Result<ExportManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = hex::encode(hasher.finalize());
    let rel = path
        .strip_prefix(run_dir)
        .unwrap_or(path)
        .display()
        .to_string();
    Ok(ExportManifestFile {
        name: name.to_string(),
        path: rel,
        sha256,
        bytes: bytes.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bidmon_core::JurisdictionType;
    use chrono::{NaiveDate, Utc};
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use tempfile::tempdir;
    use uuid::Uuid;

    fn rows() -> Vec<Opportunity> {
        vec![
            Opportunity {
                source: "Ohio DAS eProcurement".into(),
                title: "Statewide Vactor Truck Maintenance RFP-2026-9".into(),
                url: "https://procure.ohio.gov/bid/9".into(),
                posted_date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
                location: "Ohio (Statewide)".into(),
                jurisdiction_type: JurisdictionType::State,
                bid_number: "RFP-2026-9".into(),
                description: Some("Statewide Vactor Truck Maintenance RFP-2026-9 closes Dec 1".into()),
            },
            Opportunity {
                source: "Franklin County".into(),
                title: "Culvert Cleaning and Inspection".into(),
                url: "https://purchasing.franklincountyohio.gov/bids/3".into(),
                posted_date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
                location: "Franklin County, OH".into(),
                jurisdiction_type: JurisdictionType::County,
                bid_number: String::new(),
                description: None,
            },
        ]
    }

    fn summary() -> RunSummary {
        RunSummary {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            sources_attempted: 2,
            sources_failed: vec![],
            candidates: 2,
            unique: 2,
            duplicates_removed: 0,
        }
    }

    #[test]
    fn exports_json_parquet_and_manifest() {
        let dir = tempdir().unwrap();
        let summary = summary();
        let run_dir = write_exports(dir.path(), &summary, &rows()).unwrap();
        assert!(run_dir.ends_with(summary.run_id.to_string()));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(run_dir.join("opportunities.json")).unwrap()).unwrap();
        assert_eq!(json["count"], 2);
        assert_eq!(json["bids"][0]["type"], "State");
        assert!(json["bids"][1].get("description").is_none());

        let reader = SerializedFileReader::new(File::open(run_dir.join("opportunities.parquet")).unwrap()).unwrap();
        let meta = reader.metadata();
        assert_eq!(meta.file_metadata().num_rows(), 2);
        assert_eq!(meta.file_metadata().schema_descr().num_columns(), 8);

        let manifest: ExportManifest =
            serde_json::from_str(&std::fs::read_to_string(run_dir.join("manifest.json")).unwrap()).unwrap();
        assert_eq!(manifest.files.len(), 2);
        let json_entry = &manifest.files[0];
        assert_eq!(json_entry.path, "opportunities.json");
        let bytes = std::fs::read(run_dir.join("opportunities.json")).unwrap();
        assert_eq!(json_entry.bytes, bytes.len() as u64);
        assert_eq!(json_entry.sha256.len(), 64);
    }
}
