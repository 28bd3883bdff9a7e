//! CSV export of leads for operators.
//!
//! Spreadsheet-friendly output: semicolon-delimited, every field quoted,
//! and the contact column guarded with a leading apostrophe so Excel does
//! not mangle phone numbers into scientific notation.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use csv::{QuoteStyle, WriterBuilder};

use crate::model::Lead;

const HEADER: &[&str] = &[
    "id", "created_at", "status", "source", "name", "contact", "email", "category", "urgency",
    "duration_min", "slot", "brief",
];

/// Timestamped export file name.
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("leads_export_{}.csv", now.format("%Y%m%d_%H%M"))
}

/// Render leads as CSV bytes.
pub fn render_csv(leads: &[Lead]) -> anyhow::Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());

    writer.write_record(HEADER).context("write CSV header")?;

    for lead in leads {
        let mut contact = lead.contact.clone().unwrap_or_default();
        if !contact.is_empty() && !contact.starts_with('\'') {
            contact.insert(0, '\'');
        }
        let brief = lead
            .brief
            .as_deref()
            .unwrap_or_default()
            .replace('\n', " ");

        writer
            .write_record([
                lead.id.to_string(),
                lead.created_at.format("%Y-%m-%d %H:%M").to_string(),
                lead.status.as_str().to_string(),
                lead.source.as_str().to_string(),
                lead.name.clone().unwrap_or_default(),
                contact,
                lead.email.clone().unwrap_or_default(),
                lead.category.clone().unwrap_or_default(),
                lead.urgency.clone().unwrap_or_default(),
                lead.duration_min.map(|d| d.to_string()).unwrap_or_default(),
                lead.slot.clone().unwrap_or_default(),
                brief,
            ])
            .with_context(|| format!("write CSV row for lead {}", lead.id))?;
    }

    writer
        .into_inner()
        .context("flush CSV writer")
}

/// Write the export into `export_dir` and return (file name, bytes) for
/// delivery back to the operator.
pub fn write_export(leads: &[Lead], export_dir: &Path) -> anyhow::Result<(String, Vec<u8>)> {
    let bytes = render_csv(leads)?;
    let file_name = export_file_name(Utc::now());

    std::fs::create_dir_all(export_dir)
        .with_context(|| format!("create export directory {}", export_dir.display()))?;
    let path: PathBuf = export_dir.join(&file_name);
    std::fs::write(&path, &bytes)
        .with_context(|| format!("write export file {}", path.display()))?;

    tracing::info!(path = %path.display(), leads = leads.len(), "CSV export written");
    Ok((file_name, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LeadSource, LeadStatus};

    fn lead(id: i64, contact: Option<&str>) -> Lead {
        Lead {
            id,
            user_id: 1,
            source: LeadSource::QuickQuestion,
            category: Some("contract review".into()),
            brief: Some("line one\nline two".into()),
            urgency: Some("today".into()),
            consult_format: None,
            duration_min: None,
            slot: None,
            name: Some("A. Smith".into()),
            contact: contact.map(String::from),
            email: None,
            status: LeadStatus::New,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn csv_is_semicolon_delimited_and_fully_quoted() {
        let bytes = render_csv(&[lead(1, Some("+1-555-0100"))]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("\"id\";\"created_at\";\"status\""));

        let row = lines.next().unwrap();
        assert!(row.contains(";\"new\";\"quick-question\";"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn contact_is_apostrophe_guarded() {
        let bytes = render_csv(&[lead(1, Some("+1-555-0100"))]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"'+1-555-0100\""));

        // Already guarded contacts are not double-guarded
        let bytes = render_csv(&[lead(2, Some("'+1-555-0100"))]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"'+1-555-0100\""));
        assert!(!text.contains("''"));
    }

    #[test]
    fn newlines_in_brief_are_flattened() {
        let bytes = render_csv(&[lead(1, None)]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"line one line two\""));
    }

    #[test]
    fn empty_export_has_header_only() {
        let bytes = render_csv(&[]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn write_export_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let (file_name, bytes) = write_export(&[lead(1, None)], dir.path()).unwrap();
        assert!(file_name.starts_with("leads_export_"));
        assert!(file_name.ends_with(".csv"));

        let on_disk = std::fs::read(dir.path().join(&file_name)).unwrap();
        assert_eq!(on_disk, bytes);
    }
}
