//! Report generation
//!
//! Renders the dataset summary, one window of rows, a search hit and a
//! signal series either as plain text tables or as one JSON document.

use anyhow::Result;
use can_log_core::{DatabaseInfo, Dataset, DatasetSummary, RecordView, SearchHit, SignalSeries};
use serde::Serialize;
use std::io::Write;

/// Everything one run prints
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub databases: Vec<DatabaseInfo>,
    pub summary: &'a DatasetSummary,
    pub filter: String,
    pub filtered_count: usize,
    pub window_start: usize,
    pub rows: Vec<RowReport>,
    pub search: Option<SearchReport>,
    pub series: Option<SignalSeries>,
}

#[derive(Debug, Serialize)]
pub struct RowReport {
    pub sequence: u64,
    pub timestamp: f64,
    pub channel: u16,
    pub id: String,
    pub direction: String,
    pub dlc: usize,
    pub data: String,
    pub message: Option<String>,
    pub signals: Vec<SignalReport>,
}

#[derive(Debug, Serialize)]
pub struct SignalReport {
    pub name: String,
    pub raw: i64,
    pub value: f64,
    pub unit: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchReport {
    pub position: usize,
    pub wrapped: bool,
    pub row: RowReport,
}

impl RowReport {
    pub fn from_view(view: &RecordView<'_>) -> Self {
        let frame = view.frame();
        let id = if frame.is_extended {
            format!("0x{:08X}", frame.can_id)
        } else {
            format!("0x{:03X}", frame.can_id)
        };
        Self {
            sequence: view.sequence(),
            timestamp: frame.timestamp,
            channel: frame.channel,
            id,
            direction: frame.direction.to_string(),
            dlc: frame.dlc(),
            data: frame.payload.to_hex(),
            message: view.message_name().map(str::to_string),
            signals: view
                .readings()
                .map(|reading| SignalReport {
                    name: reading.name().to_string(),
                    raw: reading.raw,
                    value: reading.physical,
                    unit: reading.unit().map(str::to_string),
                    label: reading.label().map(str::to_string),
                })
                .collect(),
        }
    }
}

impl SearchReport {
    pub fn new(dataset: &Dataset, hit: SearchHit) -> Option<Self> {
        let view = dataset.record_at(hit.record_index)?;
        Some(Self {
            position: hit.position,
            wrapped: hit.wrapped,
            row: RowReport::from_view(&view),
        })
    }
}

pub fn write_json(out: &mut impl Write, report: &Report<'_>) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, report)?;
    writeln!(out)?;
    Ok(())
}

pub fn write_text(out: &mut impl Write, report: &Report<'_>) -> Result<()> {
    if !report.databases.is_empty() {
        writeln!(out, "Definitions databases:")?;
        for db in &report.databases {
            writeln!(
                out,
                "  {} {:<20} {:>5} messages {:>6} signals {:>3} warnings  {:?}",
                if db.active { "*" } else { " " },
                db.id,
                db.message_count,
                db.signal_count,
                db.warning_count,
                db.path
            )?;
        }
        writeln!(out)?;
    }

    let summary = report.summary;
    writeln!(out, "Dataset:")?;
    writeln!(out, "  Records:     {}", summary.record_count)?;
    writeln!(out, "  Identifiers: {}", summary.identifiers.len())?;
    writeln!(out, "  Duration:    {:.6} s", summary.duration())?;
    writeln!(out, "  Rx / Tx:     {} / {}", summary.rx_count, summary.tx_count)?;
    if let Some(start) = summary.start_time {
        writeln!(out, "  Started:     {}", start.format("%Y-%m-%d %H:%M:%S%.3f"))?;
    }
    for source in &summary.sources {
        writeln!(
            out,
            "  {} {:?}: {} frames, {} warnings, {} skipped{}",
            source.format,
            source.path,
            source.parse.frame_count,
            source.parse.warnings.len(),
            source.parse.skipped_events,
            if source.parse.truncated { ", truncated" } else { "" }
        )?;
        for warning in source.parse.warnings.iter().take(10) {
            writeln!(out, "      {}", warning)?;
        }
        if source.parse.warnings.len() > 10 {
            writeln!(out, "      ... {} more", source.parse.warnings.len() - 10)?;
        }
    }
    writeln!(out)?;

    writeln!(out, "Filter: {} ({} records)", report.filter, report.filtered_count)?;
    writeln!(
        out,
        "{:>8} {:>14} {:>3} {:>10} {:>2} {:>3}  {}",
        "#", "Time", "Ch", "ID", "Dir", "DLC", "Data"
    )?;
    for (offset, row) in report.rows.iter().enumerate() {
        write_row(out, report.window_start + offset, row)?;
    }

    if let Some(search) = &report.search {
        writeln!(out)?;
        writeln!(
            out,
            "Search hit at position {}{}:",
            search.position,
            if search.wrapped { " (wrapped)" } else { "" }
        )?;
        write_row(out, search.position, &search.row)?;
    }

    if let Some(series) = &report.series {
        writeln!(out)?;
        writeln!(
            out,
            "Series {}: {} samples, min {} max {}{}",
            series.key,
            series.len(),
            series.min,
            series.max,
            series.unit.as_deref().map(|u| format!(" {}", u)).unwrap_or_default()
        )?;
    }
    Ok(())
}

fn write_row(out: &mut impl Write, position: usize, row: &RowReport) -> Result<()> {
    writeln!(
        out,
        "{:>8} {:>14.6} {:>3} {:>10} {:>3} {:>3}  {}{}",
        position,
        row.timestamp,
        row.channel,
        row.id,
        row.direction,
        row.dlc,
        row.data,
        row.message.as_deref().map(|m| format!("  [{}]", m)).unwrap_or_default()
    )?;
    for signal in &row.signals {
        let value = match &signal.label {
            Some(label) => format!("{} ({})", label, signal.value),
            None => signal.value.to_string(),
        };
        writeln!(
            out,
            "{:>35} = {}{}",
            signal.name,
            value,
            signal.unit.as_deref().map(|u| format!(" {}", u)).unwrap_or_default()
        )?;
    }
    Ok(())
}
