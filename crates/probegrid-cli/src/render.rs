//! Human-readable sweep output.

use probegrid_core::{HealthSnapshot, JobResult, OutputMode, Target};
use probegrid_sweep::SweepReport;

/// Render a report for `mode`. JSON is handled by the caller.
pub fn format_report(report: &SweepReport, mode: OutputMode) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Group {} ({} targets, {} ms)\n\n",
        report.group,
        report.summary.total,
        report.duration.as_millis()
    ));

    for result in &report.results {
        match mode {
            OutputMode::Raw => push_raw(&mut out, result),
            _ => push_parsed(&mut out, result),
        }
    }

    out.push_str(&report.summary_line());
    let breakdown: Vec<String> = report
        .summary
        .by_classification
        .iter()
        .map(|(label, n)| format!("{label} {n}"))
        .collect();
    if !breakdown.is_empty() {
        out.push_str(&format!("  ({})", breakdown.join(", ")));
    }
    out.push('\n');
    out
}

fn header(out: &mut String, result: &JobResult) {
    out.push_str(&format!(
        "{:<28} {:<16} {:>6} ms\n",
        result.target.name,
        result.classification.label(),
        result.elapsed.as_millis()
    ));
}

fn push_parsed(out: &mut String, result: &JobResult) {
    header(out, result);

    if let Some(snapshot) = &result.snapshot {
        push_snapshot(out, snapshot);
    }
    if let Some(error) = &result.error {
        out.push_str(&format!("    error: {error}\n"));
    }
    out.push('\n');
}

fn push_snapshot(out: &mut String, snapshot: &HealthSnapshot) {
    let counts = &snapshot.counts;
    if counts.total() > 0 {
        out.push_str(&format!(
            "    components: {} up, {} degraded, {} unhealthy\n",
            counts.healthy, counts.degraded, counts.unhealthy
        ));
    }
    if !snapshot.details.is_empty() {
        out.push_str(&format!("    details: {}\n", snapshot.details));
    }

    for component in &snapshot.components {
        out.push_str(format!("    {:<24} {:<14} {}\n", component.name, component.status.as_str(), component.details).trim_end());
        out.push('\n');
        for sub in &component.sub_components {
            out.push_str(format!("      {:<22} {:<14} {}\n", sub.name, sub.status.as_str(), sub.details).trim_end());
            out.push('\n');
        }
    }
}

fn push_raw(out: &mut String, result: &JobResult) {
    header(out, result);

    match (&result.raw, &result.error) {
        (Some(raw), _) if !raw.is_empty() => {
            out.push_str(String::from_utf8_lossy(raw).trim_end());
            out.push('\n');
        }
        (_, Some(error)) => out.push_str(&format!("error: {error}\n")),
        _ => out.push_str("<empty body>\n"),
    }
    out.push('\n');
}

/// Table of resolved group members.
pub fn format_targets(targets: &[Target], default_port: u16) -> String {
    let mut out = format!("{:<32} {:<6} {}\n", "NAME", "READY", "PORT");
    for target in targets {
        let port = match target.remote_port {
            Some(port) => port.to_string(),
            None => format!("{default_port} (default)"),
        };
        out.push_str(&format!(
            "{:<32} {:<6} {}\n",
            target.name,
            if target.ready { "yes" } else { "no" },
            port
        ));
    }
    out
}
