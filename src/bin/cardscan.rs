//! CLI binary for cardscan.
//!
//! A thin shim over the library crate that maps CLI flags to `ScanConfig`,
//! picks the staging store, and prints one block per card.

use anyhow::{Context, Result};
use clap::Parser;
use cardscan::schema::{display_list, display_value};
use cardscan::{
    scan, scan_to_file, CardRecord, ExtractionOutcome, MemoryObjectStore, ObjectStore,
    ProgressCallback, ScanConfig, ScanOutput, ScanProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

/// Live progress bar plus one log line per finished card. Cards may finish
/// out of order when `--concurrency` > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} cards  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Scanning");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ScanProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Scanning {total} card(s)…"))
        ));
    }

    fn on_card_start(&self, index: usize, _total: usize, filename: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(filename.to_string());
    }

    fn on_card_complete(&self, index: usize, total: usize, filename: &str) {
        self.bar.println(format!(
            "  {} Card {:>3}/{:<3}  {}  {}",
            green("✓"),
            index + 1,
            total,
            filename,
            dim(&format!("{:.1}s", self.elapsed_secs(index))),
        ));
        self.bar.inc(1);
    }

    fn on_card_error(&self, index: usize, total: usize, filename: &str, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Card {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index + 1,
            total,
            filename,
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs(index))),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} card(s) extracted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} card(s) extracted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract one card, print a readable summary
  cardscan card.jpg

  # Several cards, four at a time, JSON on stdout
  cardscan --concurrency 4 --json front.jpg back.png office/*.jpg

  # Write the full result (outcomes + stats) to a file
  cardscan cards/*.jpg -o contacts.json

  # Stage through S3 so the model fetches a presigned URL
  cardscan --store s3 --bucket my-cards --prefix staging card.jpg

  # MinIO or another S3-compatible endpoint
  cardscan --store s3 --bucket cards --endpoint-url http://localhost:9000 card.jpg

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  CARDSCAN_LLM_PROVIDER   Override provider (openai, anthropic, gemini, ollama)
  CARDSCAN_MODEL          Override model ID
  CARDSCAN_S3_BUCKET      Bucket for --store s3
  AWS_REGION, AWS_PROFILE Standard AWS credential chain for --store s3
"#;

/// Extract contact details from business-card photos using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "cardscan",
    version,
    about = "Extract contact details from business-card photos using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Card images: local paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Write the JSON result to this file instead of stdout.
    #[arg(short, long, env = "CARDSCAN_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4o, claude-sonnet-4-20250514).
    #[arg(long, env = "CARDSCAN_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "CARDSCAN_LLM_PROVIDER")]
    provider: Option<String>,

    /// Number of cards processed at once.
    #[arg(short, long, env = "CARDSCAN_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Where staged images live while the model reads them.
    #[arg(long, env = "CARDSCAN_STORE", value_enum, default_value = "memory")]
    store: StoreArg,

    /// Bucket for `--store s3`.
    #[arg(long, env = "CARDSCAN_S3_BUCKET")]
    bucket: Option<String>,

    /// Key prefix inside the bucket.
    #[arg(long, env = "CARDSCAN_S3_PREFIX", default_value = "")]
    prefix: String,

    /// AWS region (defaults to the AWS environment).
    #[arg(long, env = "CARDSCAN_S3_REGION")]
    region: Option<String>,

    /// Custom S3 endpoint (MinIO, R2, …).
    #[arg(long, env = "CARDSCAN_S3_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    /// Validity of staged URLs in seconds.
    #[arg(long, env = "CARDSCAN_STAGING_TTL", default_value_t = 36_000)]
    staging_ttl: u64,

    /// Path to a text file with a custom extraction instruction.
    #[arg(long, env = "CARDSCAN_INSTRUCTION")]
    instruction: Option<PathBuf>,

    /// Max LLM output tokens per card.
    #[arg(long, env = "CARDSCAN_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "CARDSCAN_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Output structured JSON (ScanOutput) instead of text.
    #[arg(long, env = "CARDSCAN_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "CARDSCAN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CARDSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CARDSCAN_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "CARDSCAN_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Per-card LLM call timeout in seconds.
    #[arg(long, env = "CARDSCAN_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Eq)]
enum StoreArg {
    Memory,
    S3,
}

#[tokio::main]
async fn main() -> Result<()> {
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
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ScanProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;
    let store = build_store(&cli).await?;

    // ── Run scan ─────────────────────────────────────────────────────────
    let stats = if let Some(ref output_path) = cli.output {
        let stats = scan_to_file(&cli.inputs, output_path, store, &config)
            .await
            .context("Scan failed")?;

        if !cli.quiet {
            eprintln!(
                "{}  {}/{} cards  {}ms  →  {}",
                if stats.failed == 0 { green("✔") } else { cyan("⚠") },
                stats.succeeded,
                stats.total_cards,
                stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
        stats
    } else {
        let output = scan(&cli.inputs, store, &config)
            .await
            .context("Scan failed")?;

        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            print_text(&output).context("Failed to write to stdout")?;
        }
        output.stats
    };

    if !cli.quiet && !cli.json {
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  {}ms total",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
            stats.total_duration_ms,
        );
    }

    Ok(())
}

/// Map CLI args to `ScanConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ScanConfig> {
    let mut builder = ScanConfig::builder()
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .staging_ttl_secs(cli.staging_ttl)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.instruction {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction from {:?}", path))?;
        builder = builder.instruction(text);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(feature = "s3")]
async fn build_store(cli: &Cli) -> Result<Arc<dyn ObjectStore>> {
    match cli.store {
        StoreArg::Memory => Ok(Arc::new(MemoryObjectStore::new())),
        StoreArg::S3 => {
            let store = cardscan::S3ObjectStore::from_env(
                cli.bucket.clone().unwrap_or_default(),
                cli.prefix.clone(),
                cli.region.clone(),
                cli.endpoint_url.clone(),
            )
            .await
            .context("Failed to set up S3 staging")?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(not(feature = "s3"))]
async fn build_store(cli: &Cli) -> Result<Arc<dyn ObjectStore>> {
    if cli.store == StoreArg::S3 {
        anyhow::bail!("This build of cardscan was compiled without the `s3` feature");
    }
    Ok(Arc::new(MemoryObjectStore::new()))
}

fn print_text(output: &ScanOutput) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (i, outcome) in output.outcomes.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        match outcome {
            ExtractionOutcome::Success { filename, record } => {
                writeln!(out, "{}", bold(filename))?;
                write_record(&mut out, record)?;
            }
            ExtractionOutcome::Failure { filename, reason } => {
                writeln!(out, "{}", bold(filename))?;
                writeln!(out, "  {} {}", red("error:"), reason)?;
            }
        }
    }
    Ok(())
}

fn write_record(out: &mut impl Write, record: &CardRecord) -> io::Result<()> {
    if record.is_unreadable() {
        writeln!(
            out,
            "  {} {}",
            cyan("unreadable:"),
            display_value(&record.company_name)
        )?;
        return Ok(());
    }

    writeln!(out, "  Company:   {}", display_value(&record.company_name))?;

    if record.contact_person.is_empty() {
        writeln!(out, "  Contact:   {}", cardscan::NOT_FOUND)?;
    }
    for person in &record.contact_person {
        writeln!(
            out,
            "  Contact:   {} ({})",
            display_value(&person.name),
            display_value(&person.position)
        )?;
        writeln!(out, "    Phone:   {}", display_list(&person.personal_phone))?;
        writeln!(out, "    Email:   {}", display_list(&person.personal_email))?;
    }

    if record.company_address.is_empty() {
        writeln!(out, "  Address:   {}", cardscan::NOT_FOUND)?;
    }
    for addr in &record.company_address {
        writeln!(
            out,
            "  Address:   {}, {}, {}, {} {}",
            display_value(&addr.remaining),
            display_value(&addr.city),
            display_value(&addr.state),
            display_value(&addr.country),
            display_value(&addr.pincode)
        )?;
    }

    writeln!(out, "  Email:     {}", display_list(&record.company_email))?;
    writeln!(out, "  Phone:     {}", display_list(&record.company_phone))?;
    writeln!(out, "  Fax:       {}", display_list(&record.company_fax))?;
    writeln!(out, "  Website:   {}", display_list(&record.company_website))?;
    writeln!(out, "  GSTIN:     {}", display_list(&record.company_gstin))?;
    writeln!(out, "  Details:   {}", display_list(&record.company_details_if_any))?;
    Ok(())
}
