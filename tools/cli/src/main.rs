//! driveup CLI - upload local files into a Google Drive folder.
//!
//! Authorizes with the installed-app OAuth2 flow (reusing cached tokens
//! when possible), uploads each requested file in order and prints one
//! outcome line per file.

mod config;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use driveup_storage::gdrive::{DriveClient, InstalledFlowAuthorizer};
use driveup_storage::{
    AuthorizationHandle, CredentialProvider, MemoryStorage, StorageClient,
};
use driveup_upload::{ConsoleReporter, JsonReporter, Reporter, RunSummary, Uploader};

use config::{Overrides, UploaderConfig};

/// Exit status for `--strict` runs that did not upload everything.
const PARTIAL_EXIT: u8 = 2;

#[derive(Parser)]
#[command(name = "driveup")]
#[command(about = "driveup - Upload files into a Google Drive folder")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Client secret file (default: client_secret.json).
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    /// Token cache file.
    #[arg(long, global = true)]
    token_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files into a folder.
    Upload {
        /// Destination folder id.
        #[arg(short, long)]
        folder_id: Option<String>,

        /// Content type sent with every file.
        #[arg(long)]
        content_type: Option<String>,

        /// Print outcomes as JSON.
        #[arg(long)]
        json: bool,

        /// Exit with status 2 when any file was skipped or failed.
        #[arg(long)]
        strict: bool,

        /// Upload into an in-memory store instead of Drive.
        #[arg(long)]
        dry_run: bool,

        /// Do not launch a browser; only print the consent URL.
        #[arg(long)]
        no_browser: bool,

        /// Files to upload (replaces the configured list).
        files: Vec<String>,
    },

    /// Authorize and cache tokens without uploading.
    Auth {
        /// Do not launch a browser; only print the consent URL.
        #[arg(long)]
        no_browser: bool,
    },

    /// Delete cached tokens.
    Logout,
}

struct UploadOptions {
    json: bool,
    strict: bool,
    dry_run: bool,
    open_browser: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for the report
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = load_config(&cli.common)?;

    match cli.command {
        Commands::Upload {
            folder_id,
            content_type,
            json,
            strict,
            dry_run,
            no_browser,
            files,
        } => {
            config.apply(Overrides {
                folder_id,
                content_type,
                files,
                ..Overrides::default()
            });
            let options = UploadOptions {
                json,
                strict,
                dry_run,
                open_browser: !no_browser,
            };
            cmd_upload(&config, &options).await
        }

        Commands::Auth { no_browser } => cmd_auth(&config, !no_browser).await,

        Commands::Logout => cmd_logout(&config).await,
    }
}

fn load_config(args: &CommonArgs) -> Result<UploaderConfig> {
    let mut config = match &args.config {
        Some(path) => UploaderConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => UploaderConfig::default(),
    };

    config.apply(Overrides {
        credentials_path: args.credentials.clone(),
        token_path: args.token_path.clone(),
        ..Overrides::default()
    });

    Ok(config)
}

async fn cmd_upload(config: &UploaderConfig, options: &UploadOptions) -> Result<ExitCode> {
    let code = run_upload(config, options, &mut std::io::stdout()).await?;
    Ok(ExitCode::from(code))
}

/// Authorize, upload every configured file and write the report to `out`.
///
/// Returns the process exit status for a completed run.
async fn run_upload(
    config: &UploaderConfig,
    options: &UploadOptions,
    out: &mut dyn Write,
) -> Result<u8> {
    let folder_id = config.folder_id().context("Invalid configuration")?;
    let content_type = config.content_type().context("Invalid configuration")?;

    if config.files.is_empty() {
        warn!("No files to upload");
    }

    let (client, auth): (Arc<dyn StorageClient>, AuthorizationHandle) = if options.dry_run {
        info!("Dry run: uploads go to an in-memory store");
        (
            Arc::new(MemoryStorage::new()),
            AuthorizationHandle::fixed("dry-run"),
        )
    } else {
        let authorizer = InstalledFlowAuthorizer::new(config.flow_config(options.open_browser));
        let auth = authorizer
            .authorize(&config.credentials_path, &config.scopes)
            .await
            .context("Authorization failed")?;
        let client = DriveClient::new().context("Failed to create Drive client")?;
        (Arc::new(client), auth)
    };

    let uploader =
        Uploader::new(client, Arc::new(config.file_source())).with_content_type(content_type);
    let outcomes = uploader.upload(&auth, &folder_id, &config.files).await;

    let mut reporter: Box<dyn Reporter + '_> = if options.json {
        Box::new(JsonReporter::new(&mut *out))
    } else {
        Box::new(ConsoleReporter::new(&mut *out))
    };
    reporter
        .report(&outcomes)
        .context("Failed to write report")?;

    let summary = RunSummary::from_outcomes(&outcomes);
    info!("All tasks complete ({} file(s)): {}", summary.total(), summary);

    Ok(exit_status(&summary, options.strict))
}

/// Completed runs exit 0 unless `strict` and something was not uploaded.
fn exit_status(summary: &RunSummary, strict: bool) -> u8 {
    if strict && summary.is_partial() {
        PARTIAL_EXIT
    } else {
        0
    }
}

async fn cmd_auth(config: &UploaderConfig, open_browser: bool) -> Result<ExitCode> {
    let authorizer = InstalledFlowAuthorizer::new(config.flow_config(open_browser));
    authorizer
        .authorize(&config.credentials_path, &config.scopes)
        .await
        .context("Authorization failed")?;

    println!("Authorized.");
    println!("  Token cache: {}", authorizer.store().path().display());

    Ok(ExitCode::SUCCESS)
}

async fn cmd_logout(config: &UploaderConfig) -> Result<ExitCode> {
    let authorizer = InstalledFlowAuthorizer::new(config.flow_config(false));
    let store = authorizer.store();

    let removed = store.clear().await.context("Failed to remove token cache")?;
    if removed {
        println!("Removed cached tokens: {}", store.path().display());
    } else {
        println!("No cached tokens at {}", store.path().display());
    }

    Ok(ExitCode::SUCCESS)
}
