//! Output formatters: TSV, JSON, and aligned text tables.

use std::io::{self, Write};

use clap::ValueEnum;
use serde::Serialize;

use gws_contacts::{ContactEntry, SyncReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Tsv,
    Json,
    Text,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tsv" => Ok(Self::Tsv),
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

/// A record that renders as one table row.
pub trait Tabular {
    fn headers() -> &'static [&'static str];

    /// One cell per header; `None` for missing values.
    fn row(&self) -> Vec<Option<String>>;
}

/// Render a list of records to `out`. With the text format an empty list
/// prints `No results.` to `err` instead.
pub fn render_list<T, W, E>(items: &[T], format: OutputFormat, out: &mut W, err: &mut E) -> io::Result<()>
where
    T: Tabular + Serialize,
    W: Write,
    E: Write,
{
    match format {
        OutputFormat::Tsv => write_tsv(items, out),
        OutputFormat::Json => write_json(&items, out),
        OutputFormat::Text if items.is_empty() => writeln!(err, "No results."),
        OutputFormat::Text => write_table(items, out),
    }
}

/// Render a single record. JSON output is an object rather than an array.
pub fn render_record<T, W>(item: &T, format: OutputFormat, out: &mut W) -> io::Result<()>
where
    T: Tabular + Serialize,
    W: Write,
{
    match format {
        OutputFormat::Tsv => write_tsv(std::slice::from_ref(item), out),
        OutputFormat::Json => write_json(item, out),
        OutputFormat::Text => write_table(std::slice::from_ref(item), out),
    }
}

fn write_json<T: Serialize + ?Sized, W: Write>(value: &T, out: &mut W) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)
}

fn tsv_cell(value: &Option<String>) -> String {
    value
        .as_deref()
        .unwrap_or("")
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect()
}

fn write_tsv<T: Tabular, W: Write>(items: &[T], out: &mut W) -> io::Result<()> {
    writeln!(out, "{}", T::headers().join("\t"))?;
    for item in items {
        let cells: Vec<String> = item.row().iter().map(tsv_cell).collect();
        writeln!(out, "{}", cells.join("\t"))?;
    }
    Ok(())
}

fn write_table<T: Tabular, W: Write>(items: &[T], out: &mut W) -> io::Result<()> {
    let headers = T::headers();
    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|item| {
            item.row()
                .into_iter()
                .map(|cell| {
                    cell.map(|v| v.replace(['\t', '\n', '\r'], " "))
                        .filter(|v| !v.is_empty())
                        .unwrap_or_else(|| "-".to_string())
                })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_uppercase()).collect();
    write_aligned(&header_cells, &widths, out)?;
    for row in &rows {
        write_aligned(row, &widths, out)?;
    }
    Ok(())
}

fn write_aligned<W: Write>(cells: &[String], widths: &[usize], out: &mut W) -> io::Result<()> {
    let mut line = String::new();
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        line.push_str(cell);
        let pad = width.saturating_sub(cell.chars().count());
        line.extend(std::iter::repeat(' ').take(pad));
    }
    writeln!(out, "{}", line.trim_end())
}

impl Tabular for ContactEntry {
    fn headers() -> &'static [&'static str] {
        &["name", "email", "phone", "organization", "resource_id"]
    }

    fn row(&self) -> Vec<Option<String>> {
        vec![
            Some(self.display_name.clone()),
            self.primary_email.clone(),
            self.primary_phone.clone(),
            self.organization.clone(),
            Some(self.resource_id.clone()),
        ]
    }
}

impl Tabular for SyncReport {
    fn headers() -> &'static [&'static str] {
        &["mode", "reason", "created", "updated", "deleted", "fallback_full", "total"]
    }

    fn row(&self) -> Vec<Option<String>> {
        vec![
            Some(self.mode.as_str().to_string()),
            self.reason.map(|r| r.as_str().to_string()),
            Some(self.created.to_string()),
            Some(self.updated.to_string()),
            Some(self.deleted.to_string()),
            Some(self.fallback_full.to_string()),
            Some(self.total.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use chrono::{TimeZone, Utc};

    fn contact(name: &str, email: Option<&str>) -> ContactEntry {
        ContactEntry {
            resource_id: format!("people/{}", name.len()),
            display_name: name.to_string(),
            primary_email: email.map(str::to_string),
            primary_phone: None,
            organization: None,
            last_modified: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    fn render(items: &[ContactEntry], format: OutputFormat) -> (String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        render_list(items, format, &mut out, &mut err).unwrap();
        (String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
    }

    #[test]
    fn test_tsv_shape() {
        let (out, _) = render(
            &[contact("Ann\tLee", Some("ann@example.com")), contact("Bo", None)],
            OutputFormat::Tsv,
        );
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "name\temail\tphone\torganization\tresource_id");
        assert_eq!(lines[1], "Ann Lee\tann@example.com\t\t\tpeople/7");
        assert_eq!(lines[2], "Bo\t\t\t\tpeople/2");
    }

    #[test]
    fn test_json_shape() {
        let (out, _) = render(&[contact("Bo", None)], OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert!(value.is_array());
        assert_eq!(value[0]["display_name"], "Bo");
        assert!(value[0]["primary_email"].is_null());
        assert_eq!(value[0]["last_modified"], "2026-01-02T03:04:05Z");
    }

    #[test]
    fn test_text_table_aligns_and_marks_missing() {
        let (out, _) = render(
            &[contact("Ann Lee", Some("ann@example.com")), contact("Bo", None)],
            OutputFormat::Text,
        );
        let lines: Vec<&str> = out.lines().collect();

        assert!(lines[0].starts_with("NAME     EMAIL"));
        assert!(lines[2].starts_with("Bo       -"));
        let email_col = lines[0].find("EMAIL").unwrap();
        assert_eq!(lines[1].find("ann@").unwrap(), email_col);
    }

    #[test]
    fn test_empty_results() {
        let (out, err) = render(&[], OutputFormat::Text);
        assert!(out.is_empty());
        assert_eq!(err, "No results.\n");

        let (out, _) = render(&[], OutputFormat::Json);
        assert_eq!(out.trim(), "[]");

        let (out, _) = render(&[], OutputFormat::Tsv);
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn test_single_record_json_is_object() {
        let report = SyncReport::incremental(Default::default(), 4);
        let mut out = Vec::new();
        render_record(&report, OutputFormat::Json, &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["mode"], "incremental");
        assert!(value["reason"].is_null());
        assert_eq!(value["total"], 4);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("TSV".parse::<OutputFormat>().unwrap(), OutputFormat::Tsv);
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
