//! Report writers: console, JSON, and markdown renditions of a run report.
use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use colored::Colorize;
use funnelstorm_engine::RunReport;

pub fn generate_console_report(
    out: &mut dyn Write,
    report: &RunReport,
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Load Test Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "====================".cyan())?;
    writeln!(out, "Profile: {}", report.source.bold())?;
    writeln!(out, "Finished: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "Wall time: {total_duration:?}")?;
    writeln!(out)?;

    let population = &report.population;
    writeln!(out, "{}", "👥 Sessions".bright_yellow().bold())?;
    writeln!(out, "Spawned: {}", population.spawned)?;
    writeln!(
        out,
        "Completed: {}  Dropped: {}  Aborted: {}",
        population.completed.to_string().green(),
        population.dropped,
        population.aborted.to_string().red()
    )?;
    if population.scheduling_saturation > 0 {
        writeln!(
            out,
            "Scheduling saturation: {}",
            population.scheduling_saturation.to_string().yellow()
        )?;
    }
    writeln!(out)?;

    writeln!(out, "{}", "📨 Beacons".bright_yellow().bold())?;
    for row in &report.events {
        if row.attempted == 0 {
            continue;
        }
        writeln!(
            out,
            "{:16} attempted {:>9}  accepted {:>9}  failed {:>7}  rate {:.2}%",
            row.event_type,
            row.attempted,
            row.accepted,
            row.failed,
            row.success_rate * 100.0
        )?;
    }
    writeln!(
        out,
        "Overall error rate: {:.3}%",
        report.overall_error_rate * 100.0
    )?;
    writeln!(out)?;

    let latency = &report.latency;
    writeln!(out, "{}", "⏱  Beacon Latency".bright_yellow().bold())?;
    writeln!(
        out,
        "count {}  min {}ms  mean {:.1}ms  p50 {}ms  p95 {}ms  p99 {}ms  max {}ms",
        latency.count,
        latency.min_ms,
        latency.mean_ms,
        latency.p50_ms,
        latency.p95_ms,
        latency.p99_ms,
        latency.max_ms
    )?;
    writeln!(out)?;

    writeln!(out, "{}", "🎯 Thresholds".bright_yellow().bold())?;
    for verdict in &report.thresholds {
        let status = if verdict.passed {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };
        writeln!(out, "{} {}", status, verdict.metric.bold())?;
        for bound in &verdict.bounds {
            let observed = bound
                .observed
                .map_or_else(|| "unresolved".to_string(), |value| format!("{value:.3}"));
            writeln!(out, "   {} (observed {})", bound.expr, observed)?;
        }
    }
    writeln!(out)?;

    let verdict = if report.passed {
        "✅ OVERALL: PASS".green().bold()
    } else {
        "❌ OVERALL: FAIL".red().bold()
    };
    writeln!(out, "{verdict}")?;
    Ok(())
}

pub fn generate_json_report(out: &mut dyn Write, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    writeln!(out, "{json}")?;
    Ok(())
}

pub fn generate_markdown_report(
    out: &mut dyn Write,
    report: &RunReport,
    total_duration: Duration,
) -> Result<()> {
    writeln!(out, "# Funnelstorm Load Test Report\n")?;
    writeln!(out, "- **Profile**: {}", report.source)?;
    writeln!(
        out,
        "- **Finished**: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;
    writeln!(out, "- **Wall time**: {total_duration:?}")?;
    writeln!(
        out,
        "- **Overall verdict**: {}\n",
        if report.passed { "PASS ✅" } else { "FAIL ❌" }
    )?;

    writeln!(out, "## Sessions\n")?;
    let population = &report.population;
    writeln!(out, "| Spawned | Completed | Dropped | Aborted | Saturation |")?;
    writeln!(out, "|---:|---:|---:|---:|---:|")?;
    writeln!(
        out,
        "| {} | {} | {} | {} | {} |\n",
        population.spawned,
        population.completed,
        population.dropped,
        population.aborted,
        population.scheduling_saturation
    )?;

    writeln!(out, "## Beacons\n")?;
    writeln!(out, "| Event | Attempted | Accepted | Failed | Success |")?;
    writeln!(out, "|---|---:|---:|---:|---:|")?;
    for row in &report.events {
        writeln!(
            out,
            "| {} | {} | {} | {} | {:.2}% |",
            row.event_type,
            row.attempted,
            row.accepted,
            row.failed,
            row.success_rate * 100.0
        )?;
    }
    writeln!(
        out,
        "\nOverall error rate: {:.3}%\n",
        report.overall_error_rate * 100.0
    )?;

    let latency = &report.latency;
    writeln!(out, "## Latency\n")?;
    writeln!(out, "| Count | Min | Mean | p50 | p95 | p99 | Max |")?;
    writeln!(out, "|---:|---:|---:|---:|---:|---:|---:|")?;
    writeln!(
        out,
        "| {} | {}ms | {:.1}ms | {}ms | {}ms | {}ms | {}ms |\n",
        latency.count,
        latency.min_ms,
        latency.mean_ms,
        latency.p50_ms,
        latency.p95_ms,
        latency.p99_ms,
        latency.max_ms
    )?;

    writeln!(out, "## Thresholds\n")?;
    for verdict in &report.thresholds {
        let status = if verdict.passed { "✅" } else { "❌" };
        writeln!(out, "### {} {}\n", status, verdict.metric)?;
        for bound in &verdict.bounds {
            let observed = bound
                .observed
                .map_or_else(|| "unresolved".to_string(), |value| format!("{value:.3}"));
            writeln!(out, "- `{}` — observed {}", bound.expr, observed)?;
        }
        writeln!(out)?;
    }
    Ok(())
}
