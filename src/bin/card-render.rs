//! CLI binary for card-render.
//!
//! A thin shim over the library crate: `serve` runs the HTTP surface,
//! `render` renders one request file without a server.

use anyhow::{Context, Result};
use card_render::pipeline::package::sanitize_filename;
use card_render::server;
use card_render::{
    render_card, render_card_to_file, ArtifactStore, BlobStore, DisabledStore, FsStore,
    RenderConfig, RenderRequest,
};
use clap::{Args, Parser, Subcommand};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on port 3000, returning data URLs
  card-render serve --addr 0.0.0.0:3000

  # Serve and persist cards to a local directory behind a CDN
  card-render serve --storage-dir ./public/cards --public-base-url https://cdn.example.com/cards

  # Serve and upload cards to a blob endpoint
  card-render serve --blob-endpoint https://blob.example.com/upload --blob-token $TOKEN

  # One-shot render
  card-render render request.json -o card.png

  # One-shot render, print the JSON envelope instead
  card-render render request.json --json

REQUEST FILE:
  {
    "style": "photo_caption",
    "imageUrl": "https://www.dropbox.com/s/abc/photo.jpg?dl=0",
    "caption": "**Launch day**\nEverything ships at noon.",
    "handle": "@acme",
    "pageNo": "1/3"
  }

STYLES:
  photo_caption  quote  cta  title_only  notes_cover  markdown_note  auto

ENVIRONMENT VARIABLES:
  CARD_RENDER_CHROME_PATH   Chrome/Chromium binary (auto-detected otherwise)
  CARD_RENDER_NO_SANDBOX    Launch Chrome without its sandbox (containers)
  RUST_LOG                  Overrides the log filter
"#;

/// Render social-media cards to PNG with headless Chrome.
#[derive(Parser, Debug)]
#[command(
    name = "card-render",
    version,
    about = "Render social-media cards to PNG with headless Chrome",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CARD_RENDER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "CARD_RENDER_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Render one request file.
    Render(RenderArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address.
    #[arg(long, env = "CARD_RENDER_ADDR", default_value = "127.0.0.1:3000")]
    addr: SocketAddr,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(flatten)]
    storage: StorageArgs,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// JSON request file (`-` for stdin).
    request: PathBuf,

    /// Write the PNG here.
    #[arg(short, long, env = "CARD_RENDER_OUTPUT", conflicts_with = "json")]
    output: Option<PathBuf>,

    /// Print the JSON envelope (URL or data URL) instead of writing a PNG.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(flatten)]
    storage: StorageArgs,
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Chrome/Chromium binary.
    #[arg(long, env = "CARD_RENDER_CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// Launch Chrome without its sandbox.
    #[arg(long, env = "CARD_RENDER_NO_SANDBOX")]
    no_sandbox: bool,

    /// Device scale factor (1.0–4.0).
    #[arg(long, env = "CARD_RENDER_SCALE", default_value_t = 2.0)]
    scale: f64,

    /// Image download timeout in seconds.
    #[arg(long, env = "CARD_RENDER_FETCH_TIMEOUT", default_value_t = 20)]
    fetch_timeout: u64,

    /// Document load timeout in seconds.
    #[arg(long, env = "CARD_RENDER_LOAD_TIMEOUT", default_value_t = 30)]
    load_timeout: u64,

    /// Upper bound on waiting for images to decode, in milliseconds.
    #[arg(long, env = "CARD_RENDER_MEDIA_TIMEOUT", default_value_t = 6000)]
    media_timeout: u64,

    /// Default footer handle.
    #[arg(long, env = "CARD_RENDER_HANDLE")]
    handle: Option<String>,
}

#[derive(Args, Debug)]
struct StorageArgs {
    /// Persist cards to this directory.
    #[arg(long, env = "CARD_RENDER_STORAGE_DIR", requires = "public_base_url",
          conflicts_with = "blob_endpoint")]
    storage_dir: Option<PathBuf>,

    /// Public URL prefix under which `--storage-dir` is served.
    #[arg(long, env = "CARD_RENDER_PUBLIC_BASE_URL")]
    public_base_url: Option<String>,

    /// Upload cards to this blob endpoint (HTTP PUT).
    #[arg(long, env = "CARD_RENDER_BLOB_ENDPOINT", requires = "blob_token")]
    blob_endpoint: Option<String>,

    /// Bearer token for `--blob-endpoint`.
    #[arg(long, env = "CARD_RENDER_BLOB_TOKEN", hide_env_values = true)]
    blob_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
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

    match cli.command {
        Command::Serve(args) => {
            let config = build_config(&args.engine, &args.storage)?;
            server::serve(args.addr, config)
                .await
                .with_context(|| format!("Server on {} failed", args.addr))?;
        }
        Command::Render(args) => run_render(args, cli.quiet).await?,
    }

    Ok(())
}

async fn run_render(args: RenderArgs, quiet: bool) -> Result<()> {
    let req = read_request(&args.request).await?;
    let config = build_config(&args.engine, &args.storage)?;

    if args.json {
        let json_req = RenderRequest {
            return_as: Some("json".into()),
            binary: None,
            ..req
        };
        let output = render_card(&json_req, &config).await.context("Render failed")?;
        let json = serde_json::to_string_pretty(&output.envelope())
            .context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    // Without -o the request's own filename decides where the PNG lands.
    let output_path = args
        .output
        .unwrap_or_else(|| PathBuf::from(sanitize_filename(req.filename.as_deref())));

    let output = render_card_to_file(&req, &output_path, &config)
        .await
        .context("Render failed")?;
    if !quiet {
        eprintln!(
            "{} {}x{} in {}ms → {}",
            output.style,
            output.pixel_size.0,
            output.pixel_size.1,
            output.duration_ms,
            output_path.display()
        );
    }
    Ok(())
}

async fn read_request(path: &Path) -> Result<RenderRequest> {
    let raw = if path.as_os_str() == "-" {
        tokio::task::spawn_blocking(|| io::read_to_string(io::stdin()))
            .await
            .context("Failed to join stdin reader")?
            .context("Failed to read request from stdin")?
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read request from {:?}", path))?
    };
    serde_json::from_str(&raw).with_context(|| format!("Invalid request JSON in {:?}", path))
}

/// Map CLI args to `RenderConfig`.
fn build_config(engine: &EngineArgs, storage: &StorageArgs) -> Result<RenderConfig> {
    let mut builder = RenderConfig::builder()
        .device_scale_factor(engine.scale)
        .fetch_timeout_secs(engine.fetch_timeout)
        .load_timeout_secs(engine.load_timeout)
        .media_timeout_ms(engine.media_timeout)
        .sandbox(!engine.no_sandbox)
        .store(build_store(storage)?);

    if let Some(ref path) = engine.chrome_path {
        builder = builder.chrome_path(path);
    }
    if let Some(ref handle) = engine.handle {
        builder = builder.default_handle(handle);
    }

    builder.build().context("Invalid configuration")
}

fn build_store(args: &StorageArgs) -> Result<Arc<dyn ArtifactStore>> {
    let store: Arc<dyn ArtifactStore> = match (&args.storage_dir, &args.blob_endpoint) {
        (Some(dir), _) => {
            let base = args
                .public_base_url
                .as_deref()
                .context("--storage-dir requires --public-base-url")?;
            Arc::new(FsStore::new(dir, base))
        }
        (None, Some(endpoint)) => {
            let token = args
                .blob_token
                .as_deref()
                .context("--blob-endpoint requires --blob-token")?;
            Arc::new(BlobStore::new(endpoint, token).context("Failed to create blob store client")?)
        }
        (None, None) => Arc::new(DisabledStore),
    };
    Ok(store)
}
