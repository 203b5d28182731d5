//! CLI binary for pdfocr.
//!
//! A thin shim over the library crate that maps CLI flags to `OcrConfig`,
//! draws a progress bar, and turns the run report into an exit code.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdfocr::{convert, OcrConfig, PipelineObserver, RunReport, RunState};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Terminal observer using indicatif ────────────────────────────────────────

/// Live progress bar plus one log line per page.
struct CliObserver {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
    streamed_chars: AtomicUsize,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Checking OCR service…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
            streamed_chars: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize, done: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total as u64);
        self.bar.set_position(done as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Recognizing");
        self.bar.reset_eta();
    }

    fn page_elapsed(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut g| g.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Hide the bar (e.g. on fatal errors) so the error message is readable.
    fn abandon(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineObserver for CliObserver {
    fn on_run_start(&self, total_pages: usize, already_done: usize) {
        self.activate_bar(total_pages, already_done);
        let resumed = if already_done > 0 {
            format!(" ({already_done} already recognized)")
        } else {
            String::new()
        };
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{total_pages} pages{resumed}"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut started) = self.page_started.lock() {
            *started = Some(Instant::now());
        }
        self.streamed_chars.store(0, Ordering::SeqCst);
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_fragment(&self, page_num: usize, fragment: &str) {
        let n = self
            .streamed_chars
            .fetch_add(fragment.chars().count(), Ordering::SeqCst)
            + fragment.chars().count();
        self.bar.set_message(format!("page {page_num}  {n} chars"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, blocks: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{blocks:>4} blocks")),
            dim(&format!("{:.1}s", self.page_elapsed())),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{:.1}s", self.page_elapsed())),
        ));
    }

    fn on_run_complete(&self, report: &RunReport) {
        self.bar.finish_and_clear();
        print_summary(report);
    }
}

fn print_summary(report: &RunReport) {
    let mark = match report.state {
        RunState::Done if report.failed_pages.is_empty() => green("✔"),
        RunState::Done => cyan("⚠"),
        _ => red("✘"),
    };
    eprintln!(
        "{} {}/{} pages recognized  ({} new, {} failed)  {}ms",
        mark,
        bold(&report.recognized_pages.to_string()),
        report.total_pages,
        report.newly_recognized,
        report.failed_pages.len(),
        report.duration_ms,
    );
    if let Some(md) = &report.markdown_path {
        eprintln!("   → {}", bold(&md.display().to_string()));
    }
    if !report.images_written.is_empty() || !report.image_failures.is_empty() {
        eprintln!(
            "   {} images extracted, {} failed",
            report.images_written.len(),
            report.image_failures.len()
        );
    }
    if report.state == RunState::PartiallyComplete {
        eprintln!(
            "   {}",
            dim("interrupted; run the same command again to resume")
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Recognize a PDF (resumes automatically from <file>.ocr_progress.json)
  pdfocr document.pdf output/

  # OCR service on another host
  pdfocr document.pdf output/ --api-base http://192.168.1.100:5123

  # Machine-readable run report
  pdfocr --json document.pdf output/ > report.json

OUTPUT:
  <output>/<stem>.md                               assembled markdown
  <output>/<stem>_page_<N>_<x1>_<x2>_<y1>_<y2>.png  extracted figures
  <pdf>.ocr_progress.json                          per-page progress (beside the PDF)

ENVIRONMENT VARIABLES:
  PDFOCR_API_BASE   OCR service base URL
  PDFIUM_LIB_PATH   Path to an existing libpdfium
  RUST_LOG          Log filter (overrides --verbose / --quiet)

EXIT STATUS:
  0  every step ran to completion (individual pages may still have failed)
  1  the run was interrupted, or a fatal error occurred
"#;

/// Recognize a PDF through a layout-OCR service and export markdown.
#[derive(Parser, Debug)]
#[command(
    name = "pdfocr",
    version,
    about = "Recognize a PDF through a layout-OCR service and export markdown with figures",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to the PDF file.
    pdf_path: PathBuf,

    /// Folder for the markdown file and extracted images.
    output_folder: PathBuf,

    /// Base URL of the OCR service.
    #[arg(long, env = "PDFOCR_API_BASE", default_value = "http://localhost:5123")]
    api_base: String,

    /// Rendering DPI (72–600). Figure crops use the same DPI.
    #[arg(long, env = "PDFOCR_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFOCR_PASSWORD")]
    password: Option<String>,

    /// Progress file location (default: beside the PDF).
    #[arg(long, env = "PDFOCR_PROGRESS_FILE")]
    progress_file: Option<PathBuf>,

    /// Sampling temperature.
    #[arg(long, env = "PDFOCR_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Nucleus-sampling top-p.
    #[arg(long, env = "PDFOCR_TOP_P", default_value_t = 1.0)]
    top_p: f32,

    /// Generation budget per page.
    #[arg(long, env = "PDFOCR_MAX_NEW_TOKENS", default_value_t = 12_000)]
    max_new_tokens: u32,

    /// Health probe timeout in seconds.
    #[arg(long, env = "PDFOCR_HEALTH_TIMEOUT", default_value_t = 20)]
    health_timeout: u64,

    /// Per-page OCR request timeout in seconds.
    #[arg(long, env = "PDFOCR_REQUEST_TIMEOUT", default_value_t = 300)]
    request_timeout: u64,

    /// Print the run report as JSON on stdout.
    #[arg(long, env = "PDFOCR_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFOCR_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFOCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFOCR_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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
        .with_writer(std::io::stderr)
        .init();

    let observer = show_progress.then(CliObserver::new);
    let config = build_config(&cli, observer.clone())?;

    let result = convert(&cli.pdf_path, &cli.output_folder, &config).await;
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if let Some(obs) = &observer {
                obs.abandon();
            }
            return Err(e).context("OCR run failed");
        }
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet && observer.is_none() {
        print_summary(&report);
    }

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Map CLI args to `OcrConfig`.
fn build_config(cli: &Cli, observer: Option<Arc<CliObserver>>) -> Result<OcrConfig> {
    let mut builder = OcrConfig::builder()
        .api_base(&cli.api_base)
        .dpi(cli.dpi)
        .temperature(cli.temperature)
        .top_p(cli.top_p)
        .max_new_tokens(cli.max_new_tokens)
        .health_timeout_secs(cli.health_timeout)
        .request_timeout_secs(cli.request_timeout);

    if let Some(pwd) = &cli.password {
        builder = builder.password(pwd);
    }
    if let Some(path) = &cli.progress_file {
        builder = builder.progress_path(path);
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }

    builder.build().context("Invalid configuration")
}
