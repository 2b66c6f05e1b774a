//! replaychat CLI.
//!
//! Subcommands:
//!  - `download`    : fetch chat replays of one video or a channel's past broadcasts
//!  - `import`      : load interchange JSON files into the chat database
//!  - `export`      : write stored videos back out as interchange JSON
//!  - `stats`       : print database statistics
//!  - `init-config` : write a config file with the default settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use replaychat::api::auth::CookieManager;
use replaychat::api::metadata::{VideoMetadataResolver, YtDlpResolver};
use replaychat::config::{AppConfig, ConfigManager};
use replaychat::cancel::install_interrupt_handler;
use replaychat::database::{export_videos, import_directory, BatchSummary, ExportSummary};
use replaychat::io::interchange_file_name;
use replaychat::logging::init_logging;
use replaychat::progress::{NoProgress, ProgressBarReporter, ReplayProgress};
use replaychat::{
    CancelFlag, ChatDatabase, ChatSink, DatabaseSink, FlatLogSink, ImportMode, InnerTubeClient,
    InterchangeSink, NegativeOffsetPolicy, ReplayDownloader, StopReason, VideoInfo,
};

#[derive(Parser)]
#[command(
    name = "replaychat",
    about = "Download YouTube chat replays and archive them in SQLite",
    version
)]
struct Cli {
    /// Config file (defaults to the XDG config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download chat replays.
    Download(DownloadArgs),

    /// Import interchange JSON files into the database.
    Import(ImportArgs),

    /// Export stored videos as interchange JSON files.
    Export(ExportArgs),

    /// Show database statistics.
    Stats(StatsArgs),

    /// Write a config file with the default settings.
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    /// One JSON document per video
    Json,
    /// `time,user,comment` lines per video
    Flat,
    /// Straight into the chat database
    Db,
}

#[derive(Args)]
struct DownloadArgs {
    /// Video URL
    #[arg(long, conflicts_with = "channel", required_unless_present = "channel")]
    url: Option<String>,

    /// Channel URL; every past broadcast is downloaded
    #[arg(long)]
    channel: Option<String>,

    #[arg(long, value_enum, default_value_t = SinkKind::Json)]
    sink: SinkKind,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Netscape cookies file
    #[arg(long)]
    cookies: Option<PathBuf>,

    /// Skip videos that already have output
    #[arg(long)]
    incremental: bool,

    /// Seconds to wait between videos
    #[arg(long)]
    sleep_interval: Option<u64>,

    /// How to treat chat posted before the broadcast started
    #[arg(long, value_enum)]
    negative_offsets: Option<NegativeOffsetPolicy>,

    #[arg(long)]
    no_progress: bool,
}

#[derive(Args)]
struct ImportArgs {
    /// Directory of interchange JSON files
    #[arg(long)]
    json_dir: Option<PathBuf>,

    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Skip videos already in the database
    #[arg(long)]
    incremental: bool,

    /// Only print warnings and the final summary
    #[arg(long)]
    quiet: bool,
}

#[derive(Args)]
struct ExportArgs {
    #[arg(long)]
    db_path: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Video to export; repeat for several, omit for all
    #[arg(long = "video-id")]
    video_ids: Vec<String>,
}

#[derive(Args)]
struct StatsArgs {
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[derive(Args)]
struct InitConfigArgs {
    /// Replace an existing config file
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    if let Commands::InitConfig(args) = &cli.command {
        return run_init_config(&manager, args.force);
    }

    let mut config = manager.load_config()?;
    if let Commands::Import(args) = &cli.command {
        if args.quiet {
            config.log.log_level = "warn".to_string();
        }
    }
    let _guard = init_logging(&config.log)?;

    match cli.command {
        Commands::Download(args) => run_download(config, args).await,
        Commands::Import(args) => run_import(&config, args),
        Commands::Export(args) => run_export(&config, args),
        Commands::Stats(args) => run_stats(&config, args),
        Commands::InitConfig(_) => Ok(()),
    }
}

/// Per-video result of the download loop.
enum VideoOutcome {
    Saved { messages: u64, path: Option<PathBuf> },
    Skipped,
    Cancelled,
}

struct DownloadContext<'a> {
    client: &'a InnerTubeClient,
    resolver: &'a dyn VideoMetadataResolver,
    downloader: &'a ReplayDownloader,
    sink: SinkKind,
    output_dir: &'a Path,
    mode: ImportMode,
}

async fn run_download(mut config: AppConfig, args: DownloadArgs) -> Result<()> {
    if let Some(dir) = args.output_dir {
        config.output.output_dir = dir;
    }
    if let Some(path) = args.db_path {
        config.output.database_path = path;
    }
    if let Some(path) = args.cookies {
        config.output.cookies_path = path;
    }
    if let Some(secs) = args.sleep_interval {
        config.batch.video_interval_secs = secs;
    }
    if let Some(policy) = args.negative_offsets {
        config.fetch.negative_offsets = policy;
    }

    let cancel = CancelFlag::new();
    install_interrupt_handler(&cancel).context("Failed to install Ctrl+C handler")?;

    let cookie_manager = CookieManager::new(&config.output.cookies_path);
    let cookies = cookie_manager.load_optional()?;
    let cookie_header = cookies.as_ref().map(|c| c.to_cookie_header());
    let resolver = YtDlpResolver::new(
        cookie_manager
            .exists()
            .then(|| config.output.cookies_path.clone()),
    );

    let urls = match (&args.url, &args.channel) {
        (Some(url), _) => vec![url.clone()],
        (None, Some(channel)) => {
            tracing::info!("📺 Listing past broadcasts of {}", channel);
            let urls = resolver
                .list_past_broadcasts(channel)
                .await
                .with_context(|| format!("Failed to list broadcasts of {channel}"))?;
            tracing::info!("📋 Found {} past broadcasts", urls.len());
            urls
        }
        (None, None) => bail!("either --url or --channel is required"),
    };

    let client = InnerTubeClient::new(
        config.fetch.base_url.clone(),
        cookie_header,
        config.fetch.retry_policy(),
    )?;

    let progress: Box<dyn ReplayProgress> = if args.no_progress {
        Box::new(NoProgress)
    } else {
        Box::new(ProgressBarReporter::new())
    };
    let downloader = ReplayDownloader::new(config.fetch.replay_options())
        .with_cancel_flag(cancel.clone())
        .with_progress(progress);

    let mut db = match args.sink {
        SinkKind::Db => Some(
            ChatDatabase::new(&config.output.database_path).with_context(|| {
                format!(
                    "Failed to open database: {}",
                    config.output.database_path.display()
                )
            })?,
        ),
        SinkKind::Json | SinkKind::Flat => {
            std::fs::create_dir_all(&config.output.output_dir).with_context(|| {
                format!(
                    "Failed to create output directory: {}",
                    config.output.output_dir.display()
                )
            })?;
            None
        }
    };

    let context = DownloadContext {
        client: &client,
        resolver: &resolver,
        downloader: &downloader,
        sink: args.sink,
        output_dir: &config.output.output_dir,
        mode: ImportMode::from_incremental(args.incremental),
    };
    let interval = Duration::from_secs(config.batch.video_interval_secs);

    let mut summary = BatchSummary::default();
    for (index, url) in urls.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        tracing::info!("🎬 [{}/{}] {}", index + 1, urls.len(), url);

        match process_video(&context, db.as_mut(), url).await {
            Ok(VideoOutcome::Saved { messages, path }) => {
                summary.succeeded += 1;
                summary.total_messages += messages;
                match path {
                    Some(path) => tracing::info!("💾 {} messages -> {}", messages, path.display()),
                    None => tracing::info!("💾 {} messages saved", messages),
                }
            }
            Ok(VideoOutcome::Skipped) => {
                summary.skipped += 1;
                tracing::info!("⏭️ Already downloaded, skipping {}", url);
            }
            Ok(VideoOutcome::Cancelled) => break,
            Err(e) => {
                tracing::error!("❌ {}: {:#}", url, e);
                summary.record_failure(url.clone(), &format!("{e:#}"));
            }
        }

        if index + 1 < urls.len() && !interval.is_zero() {
            sleep_unless_cancelled(interval, &cancel).await;
        }
    }

    print_batch_summary("Download", &summary);
    if cancel.is_cancelled() {
        println!("Interrupted; the video in progress was discarded.");
    }
    Ok(())
}

async fn process_video(
    context: &DownloadContext<'_>,
    db: Option<&mut ChatDatabase>,
    url: &str,
) -> Result<VideoOutcome> {
    let video = context
        .resolver
        .resolve_video(url)
        .await
        .context("Failed to resolve video metadata")?;

    if context.mode == ImportMode::Incremental && already_saved(context, db.as_deref(), &video)? {
        return Ok(VideoOutcome::Skipped);
    }

    let session = context
        .client
        .bootstrap_session(url)
        .await
        .context("Failed to start replay session")?;
    let initial = session.continuation.clone();

    let mut sink: Box<dyn ChatSink + '_> = match (context.sink, db) {
        (SinkKind::Json, _) => Box::new(InterchangeSink::new(video.clone(), context.output_dir)),
        (SinkKind::Flat, _) => Box::new(FlatLogSink::create(flat_log_path(context.output_dir, &video))?),
        (SinkKind::Db, Some(db)) => Box::new(DatabaseSink::new(db, video.clone(), context.mode)),
        (SinkKind::Db, None) => bail!("database sink without an open database"),
    };

    let progress = context.downloader.progress();
    let label = if video.title.is_empty() {
        video.id.as_str()
    } else {
        video.title.as_str()
    };
    progress.begin(label, video.duration_seconds);

    let outcome = match context
        .downloader
        .download(&session, initial, video.duration_seconds, sink.as_mut())
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            progress.finish("failed");
            return Err(e.into());
        }
    };

    if outcome.stop_reason == StopReason::Cancelled {
        progress.finish("cancelled");
        return Ok(VideoOutcome::Cancelled);
    }

    let written = sink.finalize()?;
    progress.finish(&format!(
        "{} messages ({})",
        written.messages_written, outcome.stop_reason
    ));
    if written.skipped {
        return Ok(VideoOutcome::Skipped);
    }
    Ok(VideoOutcome::Saved {
        messages: written.messages_written,
        path: written.path,
    })
}

fn already_saved(
    context: &DownloadContext<'_>,
    db: Option<&ChatDatabase>,
    video: &VideoInfo,
) -> Result<bool> {
    Ok(match context.sink {
        SinkKind::Json => context
            .output_dir
            .join(interchange_file_name(video))
            .exists(),
        SinkKind::Flat => flat_log_path(context.output_dir, video).exists(),
        SinkKind::Db => match db {
            Some(db) => db.video_exists(&video.id)?,
            None => false,
        },
    })
}

fn flat_log_path(output_dir: &Path, video: &VideoInfo) -> PathBuf {
    output_dir
        .join(interchange_file_name(video))
        .with_extension("csv")
}

async fn sleep_unless_cancelled(total: Duration, cancel: &CancelFlag) {
    let step = Duration::from_millis(250);
    let mut waited = Duration::ZERO;
    while waited < total && !cancel.is_cancelled() {
        let chunk = step.min(total - waited);
        tokio::time::sleep(chunk).await;
        waited += chunk;
    }
}

fn run_import(config: &AppConfig, args: ImportArgs) -> Result<()> {
    let json_dir = args
        .json_dir
        .unwrap_or_else(|| config.output.output_dir.clone());
    let db_path = args
        .db_path
        .unwrap_or_else(|| config.output.database_path.clone());
    let mode = ImportMode::from_incremental(args.incremental);

    let cancel = CancelFlag::new();
    install_interrupt_handler(&cancel).context("Failed to install Ctrl+C handler")?;

    let mut db = ChatDatabase::new(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    let summary = import_directory(&mut db, &json_dir, mode, &cancel)
        .with_context(|| format!("Failed to import {}", json_dir.display()))?;

    print_batch_summary("Import", &summary);
    if summary.cancelled {
        println!("Interrupted; remaining files were not imported.");
    }
    if !args.quiet && summary.succeeded > 0 {
        let stats = db.stats().context("Failed to read database statistics")?;
        println!();
        print_stats(&db_path, &stats);
    }
    Ok(())
}

fn run_export(config: &AppConfig, args: ExportArgs) -> Result<()> {
    let db_path = args
        .db_path
        .unwrap_or_else(|| config.output.database_path.clone());
    let output_dir = args
        .output_dir
        .unwrap_or_else(|| config.output.output_dir.clone());
    if !db_path.exists() {
        bail!("database not found: {}", db_path.display());
    }

    let cancel = CancelFlag::new();
    install_interrupt_handler(&cancel).context("Failed to install Ctrl+C handler")?;

    let db = ChatDatabase::new(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    let summary = export_videos(&db, &args.video_ids, &output_dir, &cancel)
        .with_context(|| format!("Failed to export to {}", output_dir.display()))?;

    print_export_summary(&summary);
    Ok(())
}

fn run_init_config(manager: &ConfigManager, force: bool) -> Result<()> {
    if manager.config_exists() && !force {
        bail!(
            "config already exists: {} (use --force to replace it)",
            manager.config_path().display()
        );
    }
    manager.save_config(&AppConfig::default())?;
    println!("Wrote {}", manager.config_path().display());
    Ok(())
}

fn run_stats(config: &AppConfig, args: StatsArgs) -> Result<()> {
    let db_path = args
        .db_path
        .unwrap_or_else(|| config.output.database_path.clone());
    if !db_path.exists() {
        bail!("database not found: {}", db_path.display());
    }

    let db = ChatDatabase::new(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    let stats = db.stats().context("Failed to read database statistics")?;
    print_stats(&db_path, &stats);
    Ok(())
}

fn print_batch_summary(what: &str, summary: &BatchSummary) {
    println!("{what} summary");
    println!("  succeeded: {}", summary.succeeded);
    println!("  skipped:   {}", summary.skipped);
    println!("  failed:    {}", summary.failed);
    println!("  total:     {}", summary.total());
    println!("  messages:  {}", summary.total_messages);
    if summary.rejected_messages > 0 {
        println!("  rejected:  {} (empty author or message)", summary.rejected_messages);
    }
    for failure in &summary.failures {
        println!("  ✗ {}: {}", failure.source, failure.error);
    }
}

fn print_export_summary(summary: &ExportSummary) {
    println!("Export summary");
    println!("  exported: {}", summary.exported);
    println!("  messages: {}", summary.total_messages);
    for id in &summary.missing {
        println!("  ✗ {}: not in database", id);
    }
    if summary.cancelled {
        println!("Interrupted; remaining videos were not exported.");
    }
}

fn print_stats(db_path: &Path, stats: &replaychat::database::DatabaseStats) {
    println!("Database: {}", db_path.display());
    println!("  videos:   {}", stats.video_count);
    println!("  messages: {}", stats.message_count);
    println!("  authors:  {}", stats.author_count);
    println!("  size:     {:.2} MB", stats.db_size_mb());
    if let Some((first, last)) = &stats.date_range {
        println!("  uploads:  {} .. {}", first, last);
    }
}
