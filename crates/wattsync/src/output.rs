use chrono::SecondsFormat;
use owo_colors::OwoColorize;
use wattsync_alerts::silence::{MonitorReport, RemovalReport};
use wattsync_core::model::labels::LabelSet;
use wattsync_core::model::silence::Silence;
use wattsync_core::time::format_ts;
use wattsync_ingest::paginate::PageEnd;
use wattsync_ingest::sync::SyncReport;
use wattsync_ingest::transform::TransformReport;

use crate::WatermarkRow;

pub fn print_sync_human(v: &SyncReport) {
    for m in &v.measurements {
        let from = if m.resumed { "resume" } else { "bootstrap" };
        println!(
            "{} {} begin={} ({from}) pages={} samples={} {}",
            m.host.cyan(),
            m.measurement,
            format_ts(m.start),
            m.outcome.pages,
            m.outcome.samples,
            end_label(m.outcome.end)
        );
    }
    let elapsed = (v.finished_at - v.started_at).num_milliseconds();
    println!(
        "-- {} measurements, {} samples, {} failed, {elapsed}ms --",
        v.measurements.len(),
        v.samples_written(),
        v.failures()
    );
}

fn end_label(end: PageEnd) -> String {
    match end {
        PageEnd::UpToDate => "up_to_date".green().to_string(),
        PageEnd::Exhausted => "exhausted".green().to_string(),
        PageEnd::StalledCursor => "stalled_cursor".yellow().to_string(),
        PageEnd::DeviceError => "device_error".red().to_string(),
        PageEnd::WriteError => "write_error".red().to_string(),
    }
}

pub fn print_transform_human(v: &TransformReport) {
    println!(
        "chunks written={} empty={} failed={} points={}",
        v.chunks_written, v.chunks_empty, v.chunks_failed, v.points
    );
}

pub fn print_labels_human(v: &LabelSet) {
    for (k, val) in v.iter() {
        println!("{k}={val}");
    }
}

pub fn print_watermarks_human(rows: &[WatermarkRow]) {
    for row in rows {
        let at = match (&row.watermark, &row.error) {
            (_, Some(e)) => format!("error: {e}").red().to_string(),
            (Some(ts), None) => format_ts(*ts),
            (None, None) => "none".bright_black().to_string(),
        };
        println!("{} {} {at}", row.host.cyan(), row.measurement);
    }
}

pub fn print_silences_human(v: &[Silence]) {
    for s in v {
        let state = if s.is_active() {
            s.status.state.green().to_string()
        } else {
            s.status.state.bright_black().to_string()
        };
        let ends = s
            .ends_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| "-".to_string());
        let matchers = s
            .matchers
            .iter()
            .map(|m| {
                let op = if m.is_regex { "=~" } else { "=" };
                format!("{}{op}{}", m.name, m.value)
            })
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{} {state} ends={ends} by=\"{}\" {matchers} | {}",
            s.id, s.created_by, s.comment
        );
    }
    println!("-- {} silences --", v.len());
}

pub fn print_removal_human(v: &RemovalReport) {
    for id in &v.removed {
        println!("removed {id}");
    }
    for id in &v.failed {
        println!("{} {id}", "failed".red());
    }
    println!(
        "-- matched={} removed={} failed={} --",
        v.matched,
        v.removed.len(),
        v.failed.len()
    );
}

pub fn print_monitor_human(v: &MonitorReport) {
    let how = if v.interrupted { "interrupted" } else { "elapsed" };
    println!("silence {} {how}", v.silence_id);
    print_removal_human(&v.removal);
}
