//! CLI entry point for `mailstash`.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailstash::config::{self, Config};
use mailstash::error::StashError;
use mailstash::mailbox::ImapMailbox;
use mailstash::model::record::LogRecord;
use mailstash::pipeline::{self, RunOptions};
use mailstash::store::attachments::AttachmentStore;
use mailstash::store::log::LogStore;

/// Save email attachments from an IMAP mailbox and log what was saved.
#[derive(Parser)]
#[command(name = "mailstash", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to $MAILSTASH_CONFIG or the user config dir)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the most recent messages and save their attachments
    Run {
        /// Number of most recent messages to examine
        #[arg(short = 'n', long = "window", value_name = "N")]
        window: Option<usize>,
        /// IMAP server host
        #[arg(long, value_name = "HOST")]
        server: Option<String>,
        /// Directory attachments are saved to
        #[arg(long, value_name = "DIR")]
        attachments: Option<PathBuf>,
        /// CSV log file
        #[arg(long, value_name = "FILE")]
        log: Option<PathBuf>,
    },
    /// Show the most recent log records
    Log {
        /// Number of records to show
        #[arg(long, default_value_t = 20)]
        tail: usize,
        #[arg(long)]
        json: bool,
        /// CSV log file
        #[arg(long, value_name = "FILE")]
        log: Option<PathBuf>,
    },
    /// Create the attachment directory, an empty log and a default config
    Init,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config(cli.config.as_deref())?;
    config.apply_env();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Run {
            window,
            server,
            attachments,
            log,
        } => {
            if let Some(host) = server {
                config.mailbox.host = host;
            }
            if let Some(dir) = attachments {
                config.storage.attachments_dir = dir;
            }
            if let Some(file) = log {
                config.storage.log_file = file;
            }
            cmd_run(&config, window)
        }
        Commands::Log { tail, json, log } => {
            let path = log.unwrap_or_else(|| config.storage.log_file.clone());
            cmd_log(&path, tail, json)
        }
        Commands::Init => cmd_init(&config, cli.config.as_deref()),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = config::log_file_path(config);
    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_name = log_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "mailstash.log".into());
        let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Name the failing phase of a fatal mailbox error.
fn describe(e: StashError) -> anyhow::Error {
    match e.phase() {
        Some(phase) => anyhow::Error::new(e).context(format!("{phase} failed")),
        None => e.into(),
    }
}

/// Connect, process the window and report.
fn cmd_run(config: &Config, window: Option<usize>) -> anyhow::Result<()> {
    let window = config.window(window)?;
    let credentials = config.credentials()?;
    let server = config.server_settings();

    let log_path = config.storage.log_file.as_path();
    let log = LogStore::load(log_path)?;
    let attachments = AttachmentStore::new(&config.storage.attachments_dir);

    println!("  Connecting to {}…", server.host);
    let mut mailbox = ImapMailbox::connect(&server, &credentials).map_err(describe)?;
    println!("  Connected");

    // Ctrl-C during connect keeps its default behavior. From here on the
    // first one stops after the current message, a second one exits.
    let cancel = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register_conditional_shutdown(
        signal_hook::consts::SIGINT,
        130,
        Arc::clone(&cancel),
    )?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&cancel))?;
    println!("  Press Ctrl-C to stop after the current message, twice to quit");

    let pb = ProgressBar::new(window.get() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Processing [{bar:40.cyan/blue}] {pos}/{len} messages")?
            .progress_chars("#>-"),
    );
    let progress = |current: usize, total: usize| {
        pb.set_length(total as u64);
        pb.set_position(current as u64);
    };

    let start = Instant::now();
    let options = RunOptions {
        key_strategy: config.mailbox.id_strategy,
        cancel: Some(&*cancel),
        progress: Some(&progress),
        ..RunOptions::new(window)
    };
    let result = pipeline::run(&mut mailbox, log, &attachments, log_path, &options);
    pb.finish_and_clear();
    let report = result.map_err(describe)?;

    if report.mailbox_size == 0 {
        println!("  No emails found");
        return Ok(());
    }
    if report.cancelled {
        println!("  Interrupted, log saved");
    }

    print_run_summary(&report, &attachments, log_path, start.elapsed());
    Ok(())
}

fn print_run_summary(
    report: &pipeline::RunReport,
    attachments: &AttachmentStore,
    log_path: &Path,
    elapsed: std::time::Duration,
) {
    use humansize::{format_size, BINARY};

    println!(
        "  Finished processing {} attachments",
        report.attachments_saved
    );
    println!();
    println!("  {:<22} {}", "Messages examined", report.messages_examined);
    if report.messages_failed > 0 {
        println!("  {:<22} {}", "Messages skipped", report.messages_failed);
    }
    println!(
        "  {:<22} {} ({})",
        "Attachments saved",
        report.attachments_saved,
        format_size(report.bytes_written, BINARY)
    );
    if report.write_failures > 0 {
        println!("  {:<22} {}", "Write failures", report.write_failures);
    }
    println!(
        "  {:<22} {} new, {} already logged",
        "Log records", report.records_added, report.records_existing
    );
    println!("  {:<22} {}", "Attachment directory", attachments.dir().display());
    println!("  {:<22} {}", "Log file", log_path.display());
    println!("  {:<22} {:.2?}", "Elapsed", elapsed);
    println!();
}

/// Print the last `tail` log records.
fn cmd_log(path: &Path, tail: usize, json: bool) -> anyhow::Result<()> {
    let log = LogStore::load(path)?;
    let records = log.tail(tail);

    if json {
        let output = serde_json::json!({
            "total": log.len(),
            "records": records,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_log_table(records, log.len());
    }
    Ok(())
}

fn print_log_table(records: &[LogRecord], total: usize) {
    println!();
    println!("  {} of {} record(s)", records.len(), total);
    println!();
    if records.is_empty() {
        return;
    }

    println!(
        "  {:<10} {:<25} {:<30} {:<25}",
        "ID", "From", "Subject", "Attachment"
    );
    println!("  {}", "-".repeat(93));
    for r in records {
        println!(
            "  {:<10} {:<25} {:<30} {:<25}",
            truncate(&r.message_id, 10),
            truncate(&r.from, 25),
            truncate(&r.subject, 30),
            truncate(&r.attachment_filename, 25),
        );
    }
    println!();
}

/// Cut `s` to `max` characters, marking the cut with an ellipsis.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Create the attachment directory, a header-only log and, if none
/// exists, a config file with the defaults.
fn cmd_init(config: &Config, config_path: Option<&Path>) -> anyhow::Result<()> {
    let dir = &config.storage.attachments_dir;
    std::fs::create_dir_all(dir).map_err(|e| StashError::io(dir, e))?;
    println!("  {:<22} {}", "Attachment directory", dir.display());

    let log_path = &config.storage.log_file;
    let created = LogStore::ensure_exists(log_path)?;
    println!(
        "  {:<22} {}{}",
        "Log file",
        log_path.display(),
        if created { "" } else { " (exists)" }
    );

    let config_path = config_path
        .map(Path::to_path_buf)
        .or_else(config::config_file_path);
    if let Some(path) = config_path {
        if path.exists() {
            println!("  {:<22} {} (exists)", "Config file", path.display());
        } else {
            config::save_config(&Config::default(), &path)?;
            println!("  {:<22} {}", "Config file", path.display());
        }
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailstash", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
