mod beacon;
mod profiles;
mod reports;

use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use funnelstorm_engine::{LoadProfile, LoadTest, RunReport};

use beacon::HttpBeaconSender;

#[derive(Debug, Parser)]
#[command(name = "funnelstorm", version = "0.3.0")]
#[command(about = "Synthetic funnel traffic generator and threshold judge for the tracking service")]
struct Args {
    /// Built-in profile name, or a path to a profile JSON document
    #[arg(long, default_value = "smoke")]
    profile: String,

    /// List built-in profiles and exit
    #[arg(long)]
    list_profiles: bool,

    /// Base URL of the tracking service
    #[arg(long, default_value = "http://localhost:8787")]
    base_url: String,

    /// Origin header to send with every beacon (CORS allowlisting)
    #[arg(long)]
    origin: Option<String>,

    /// Per-beacon timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Skip the /health preflight check
    #[arg(long)]
    skip_preflight: bool,

    /// Validate the profile and exit without sending traffic
    #[arg(long)]
    dry_run: bool,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["console", "json", "markdown"])]
    report: String,

    /// Optional path to write the report instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.list_profiles {
        let mut target = OutputTarget::new(args.output.clone())?;
        writeln!(target.writer(), "Available profiles:")?;
        for (name, description) in profiles::list() {
            writeln!(target.writer(), "  {name:15} - {description}")?;
        }
        target.flush_inner()?;
        return Ok(());
    }

    announce_banner();

    let profile = resolve_profile(&args.profile)?;
    // Fail fast: a profile that does not validate never generates traffic.
    let compiled = profile
        .compile()
        .with_context(|| format!("profile '{}' failed validation", args.profile))?;
    println!(
        "🌪️  Profile {} | {} steps | {} ramp stages over {:.0}s | peak {} sessions",
        profile.source.bright_white().bold(),
        compiled.model.len(),
        compiled.plan.stages().len(),
        compiled.plan.total_duration().as_secs_f64(),
        compiled.plan.peak_concurrency()
    );

    if args.dry_run {
        println!("{}", "Dry run: profile is valid, no traffic sent.".green());
        return Ok(());
    }

    let sender = Arc::new(HttpBeaconSender::new(
        &args.base_url,
        args.origin.clone(),
        Duration::from_secs(args.timeout_secs),
    )?);

    if args.skip_preflight {
        log::warn!("preflight skipped");
    } else {
        sender
            .preflight()
            .await
            .context("preflight failed; refusing to start the ramp")?;
    }

    let test = LoadTest::new(&profile, sender)?;
    let start_time = Instant::now();
    let report = test.run().await;
    write_report(&args, &report, start_time.elapsed())?;

    if !report.passed {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if verbose && std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn announce_banner() {
    println!("{}", "🌪️  Funnelstorm Load Tester".bright_cyan().bold());
    println!("{}", "===========================".cyan());
}

/// A built-in profile name, or a path to a profile JSON document.
fn resolve_profile(selector: &str) -> Result<LoadProfile> {
    if let Some(profile) = profiles::builtin(selector) {
        return Ok(profile);
    }
    let path = PathBuf::from(selector);
    if path.exists() {
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return LoadProfile::from_json(&json)
            .with_context(|| format!("failed to parse {}", path.display()));
    }
    anyhow::bail!(
        "unknown profile '{selector}' (not a built-in and not a file; try --list-profiles)"
    )
}

fn write_report(args: &Args, report: &RunReport, total_duration: Duration) -> Result<()> {
    let mut target = OutputTarget::new(args.output.clone())?;
    match args.report.as_str() {
        "json" => reports::generate_json_report(&mut target, report)?,
        "markdown" => reports::generate_markdown_report(&mut target, report, total_duration)?,
        _ => reports::generate_console_report(&mut target, report, total_duration)?,
    }
    target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_profile_finds_builtins() {
        let profile = resolve_profile("funnel-flow").unwrap();
        assert_eq!(profile.source, "funnel-flow");
    }

    #[test]
    fn resolve_profile_rejects_unknown_names() {
        let err = resolve_profile("definitely-not-a-profile").unwrap_err();
        assert!(err.to_string().contains("unknown profile"));
    }

    #[test]
    fn resolve_profile_reads_a_json_document() {
        let json = r#"{
            "source": "custom",
            "rampStages": [{ "durationSeconds": 10, "targetConcurrency": 2 }],
            "funnelSteps": [{ "id": "website", "dwellRange": { "min": 0, "max": 1 } }]
        }"#;
        let path = std::env::temp_dir().join("funnelstorm-profile-test.json");
        std::fs::write(&path, json).unwrap();
        let profile = resolve_profile(path.to_str().unwrap()).unwrap();
        assert_eq!(profile.source, "custom");
        assert!(profile.compile().is_ok());
    }

    #[test]
    fn args_parse_with_defaults() {
        let args = Args::try_parse_from(["funnelstorm"]).unwrap();
        assert_eq!(args.profile, "smoke");
        assert_eq!(args.report, "console");
        assert_eq!(args.timeout_secs, 10);
        assert!(!args.skip_preflight);
    }

    #[test]
    fn args_reject_unknown_report_format() {
        assert!(Args::try_parse_from(["funnelstorm", "--report", "xml"]).is_err());
    }

    #[test]
    fn output_target_writes_to_file() {
        let path = std::env::temp_dir().join("funnelstorm-output-test.txt");
        let mut target = OutputTarget::new(Some(path.clone())).unwrap();
        target.write_all(b"verdict").unwrap();
        target.flush_inner().unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "verdict");
    }
}
