//! CLI binary for expense-evidence.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `EvidenceConfig`, loads manual images and writes the artifact.

use anyhow::{bail, Context, Result};
use clap::Parser;
use expense_evidence::{
    export_to_file, read_feed, BatchProgressCallback, EvidenceConfig, ManualOverrides, OutputMode,
    ProgressCallback, Record, RecordError,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar with one log line per record.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} rows  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_records: usize) {
        self.bar.set_length(total_records as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_records} records…"))
        ));
    }

    fn on_record_start(&self, record: &Record) {
        self.bar.set_message(format!("row {}", record.row_index));
    }

    fn on_record_complete(&self, record: &Record, image_count: usize) {
        self.bar.println(format!(
            "  {} Linha {:>4}  Despesa {}  Relatório {}  {}",
            green("✓"),
            record.row_index,
            record.expense_id,
            record.report_id,
            dim(&format!("{image_count} image(s)")),
        ));
        self.bar.inc(1);
    }

    fn on_record_error(&self, record: &Record, error: &RecordError) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        let mut msg = error.to_string();
        if msg.chars().count() > 80 {
            msg = msg.chars().take(79).collect::<String>() + "\u{2026}";
        }

        self.bar.println(format!(
            "  {} Linha {:>4}  Despesa {}  Relatório {}  {}",
            red("✗"),
            record.row_index,
            record.expense_id,
            record.report_id,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_records: usize, success_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} records processed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} records processed  ({} failed)",
                if failed == total_records {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_records,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One Word document, a page per attachment image
  evidencias relatorio.xlsx

  # Size-bounded ZIP archives (200 MB per part)
  evidencias relatorio.xlsx --mode archive -o imagens.zip

  # Which rows have no attachment link?
  evidencias relatorio.xlsx --list-missing

  # Supply images for rows without a link
  evidencias relatorio.xlsx --manual 7=recibo7.jpg --manual 12=recibo12.png

  # Machine-readable summary and a failure list
  evidencias relatorio.xlsx --json --failures falhas.txt

SPREADSHEET:
  The first row must contain the columns "Link do Anexo", "ID da Despesa"
  and "ID do Relatório". The attachment link is read from the cell's
  hyperlink, not from its displayed text.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to libpdfium (otherwise the system library is used)
  RUST_LOG          Override the log filter (e.g. expense_evidence=debug)
"#;

/// Build the evidence document or archive for an expense report.
#[derive(Parser, Debug)]
#[command(
    name = "evidencias",
    version,
    about = "Assemble expense-report attachments into a Word document or ZIP archives",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Spreadsheet (.xlsx) listing the attachments.
    input: PathBuf,

    /// Output format.
    #[arg(long, env = "EVIDENCIAS_MODE", value_enum, default_value = "document")]
    mode: ModeArg,

    /// Write the artifact here instead of `anexos_ordenados.docx` /
    /// `imagens_compactadas.zip` in the current directory.
    #[arg(short, long, env = "EVIDENCIAS_OUTPUT")]
    output: Option<PathBuf>,

    /// Manual image for a row without a link, as ROW=PATH. Repeatable.
    #[arg(long = "manual", value_name = "ROW=PATH", value_parser = parse_manual)]
    manual: Vec<(u32, PathBuf)>,

    /// List the rows still waiting for a manual image and exit.
    #[arg(long)]
    list_missing: bool,

    /// PDF rendering DPI (72–400).
    #[arg(long, env = "EVIDENCIAS_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Per-attachment download timeout in seconds.
    #[arg(long, env = "EVIDENCIAS_TIMEOUT", default_value_t = 20)]
    timeout: u64,

    /// Maximum image bytes per sub-archive, in MiB (archive mode).
    #[arg(long, env = "EVIDENCIAS_CAPACITY_MB", default_value_t = 200)]
    capacity_mb: u64,

    /// Also write the failure list to this file.
    #[arg(long, env = "EVIDENCIAS_FAILURES")]
    failures: Option<PathBuf>,

    /// Print a JSON summary on stdout.
    #[arg(long, env = "EVIDENCIAS_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "EVIDENCIAS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EVIDENCIAS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EVIDENCIAS_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Document,
    Archive,
}

impl From<ModeArg> for OutputMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Document => OutputMode::Document,
            ModeArg::Archive => OutputMode::Archive,
        }
    }
}

fn parse_manual(s: &str) -> Result<(u32, PathBuf), String> {
    let (row, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ROW=PATH, got '{s}'"))?;
    let row = row
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid row '{row}': {e}"))?;
    if path.is_empty() {
        return Err("empty path".to_string());
    }
    Ok((row, PathBuf::from(path)))
}

#[derive(Serialize)]
struct Summary<'a> {
    artifact: String,
    bytes: usize,
    stats: &'a expense_evidence::BatchStats,
    failures: &'a [expense_evidence::FailureEntry],
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar already reports every record; keep INFO logs out of
    // its way unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list_missing;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Feed ─────────────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let records = read_feed(&cli.input, &config.columns)
        .with_context(|| format!("Failed to load {}", cli.input.display()))?;

    let mut overrides = ManualOverrides::new();
    for (row, path) in &cli.manual {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read manual image {}", path.display()))?;
        overrides.insert(*row, bytes);
    }

    // ── List-missing mode ────────────────────────────────────────────────
    if cli.list_missing {
        let missing = overrides.missing(&records);
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&missing).context("Failed to serialise rows")?
            );
        } else if missing.is_empty() {
            eprintln!("{} every row has an attachment", green("✔"));
        } else {
            for r in &missing {
                println!(
                    "Linha {} | Despesa: {} | Relatório: {}",
                    r.row_index, r.expense_id, r.report_id
                );
            }
        }
        return Ok(());
    }

    let missing = overrides.missing(&records);
    if !missing.is_empty() && !cli.quiet {
        let rows: Vec<String> = missing.iter().map(|r| r.row_index.to_string()).collect();
        eprintln!(
            "{} rows without a link: {}. Supply them with --manual ROW=PATH",
            red("✘"),
            rows.join(", ")
        );
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let output_path = match cli.output {
        Some(ref p) => p.clone(),
        None => PathBuf::from(match config.mode {
            OutputMode::Document => format!("{}.docx", config.document_name),
            OutputMode::Archive => format!("{}.zip", config.archive_name),
        }),
    };

    let output = export_to_file(&records, &overrides, &output_path, &config)
        .await
        .context("Export failed")?;

    if let Some(ref path) = cli.failures {
        tokio::fs::write(path, output.failures.to_string())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if cli.json {
        let summary = Summary {
            artifact: output_path.display().to_string(),
            bytes: output.artifact.bytes.len(),
            stats: &output.stats,
            failures: &output.failures.entries,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        if !show_progress {
            eprintln!(
                "Processed {}/{} records, {} images in {}ms",
                output.stats.succeeded,
                output.stats.total_records,
                output.stats.total_images,
                output.stats.duration_ms
            );
        }
        if !output.failures.is_empty() {
            eprintln!("{}", bold("Failures:"));
            for line in output.failures.to_string().lines() {
                eprintln!("  {}", red(line));
            }
        }
        eprintln!(
            "{}  {}",
            if output.failures.is_empty() {
                green("✔")
            } else {
                cyan("⚠")
            },
            bold(&output_path.display().to_string())
        );
    }

    Ok(())
}

/// Map CLI args to `EvidenceConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<EvidenceConfig> {
    if cli.capacity_mb == 0 {
        bail!("--capacity-mb must be at least 1");
    }

    let mut builder = EvidenceConfig::builder()
        .mode(cli.mode.into())
        .dpi(cli.dpi)
        .fetch_timeout_secs(cli.timeout)
        .archive_capacity_bytes(cli.capacity_mb.saturating_mul(1024 * 1024));

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_flag_parses_row_and_path() {
        assert_eq!(
            parse_manual("7=recibo.jpg").unwrap(),
            (7, PathBuf::from("recibo.jpg"))
        );
        assert!(parse_manual("recibo.jpg").is_err());
        assert!(parse_manual("x=recibo.jpg").is_err());
        assert!(parse_manual("7=").is_err());
    }

    #[test]
    fn capacity_flag_is_mebibytes() {
        let cli = Cli::parse_from(["evidencias", "r.xlsx", "--capacity-mb", "1"]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.archive_capacity_bytes, 1024 * 1024);
    }
}
