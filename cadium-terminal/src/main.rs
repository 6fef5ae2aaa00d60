/// CADium - terminal model viewer
///
/// Loads an OBJ or STL model from a path or HTTP(S) URL and shows it in the
/// terminal. With `--screenshot` it renders offscreen and writes a PNG instead.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use cadium_core::{Configuration, HeadlessTarget, Viewport, ViewportEvent, ViewportOptions};
use cadium_terminal::{SourceFetcher, SurfaceMode, TerminalApp};
use clap::Parser;
use log::info;
use serde::de::DeserializeOwned;

#[derive(Parser, Debug)]
#[command(name = "cadium", version)]
#[command(about = "Terminal viewer for OBJ and STL models")]
struct Cli {
    /// Model path or http(s):// URL
    model: Option<String>,

    /// Initial display configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Viewport options (JSON)
    #[arg(long)]
    options: Option<PathBuf>,

    /// Luminosity-ramp ASCII output instead of truecolor half blocks
    #[arg(long)]
    ascii: bool,

    /// Render offscreen, write a PNG here and exit
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Offscreen width in pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Offscreen height in pixels
    #[arg(long, default_value_t = 720)]
    height: u32,
}

fn read_json<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Load (if asked), wait for the load to settle, render once more and save.
fn render_offscreen(cli: &Cli, config: Configuration, options: ViewportOptions, out: &Path) -> Result<()> {
    let deadline = options.load.timeout().unwrap_or(Duration::from_secs(300)) + Duration::from_secs(1);
    let fetcher = Arc::new(SourceFetcher::new(options.load.timeout()));
    let target = HeadlessTarget::new(cli.width, cli.height);
    let mut viewport = Viewport::initialize(Box::new(target), config, options, fetcher)
        .context("initializing offscreen viewport")?;

    if let Some(model) = &cli.model {
        viewport.load_model(model);
        let started = Instant::now();
        loop {
            viewport.frame()?;
            for event in viewport.drain_events() {
                if let ViewportEvent::LoadFailed { url, error } = event {
                    bail!("loading {url}: {error}");
                }
            }
            if !viewport.is_loading() {
                break;
            }
            if started.elapsed() > deadline {
                bail!("gave up waiting for {model}");
            }
            std::thread::sleep(viewport.render_loop().interval());
        }
    }

    viewport.frame()?;
    viewport
        .screenshot()
        .save(out)
        .with_context(|| format!("writing {}", out.display()))?;
    info!("wrote {}", out.display());
    Ok(())
}

fn main() -> Result<()> {
    // Logs go to stderr; keep them quiet by default so they do not fight the canvas
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_secs()
        .try_init();

    let cli = Cli::parse();
    let config: Configuration = read_json(cli.config.as_deref())?;
    let options: ViewportOptions = read_json(cli.options.as_deref())?;

    if let Some(out) = &cli.screenshot {
        return render_offscreen(&cli, config, options, out);
    }

    let mode = if cli.ascii {
        SurfaceMode::Ascii
    } else {
        SurfaceMode::HalfBlock
    };
    let fetcher = Arc::new(SourceFetcher::new(options.load.timeout()));
    let mut app = TerminalApp::new(config, options, mode, fetcher).context("starting terminal viewer")?;
    if let Some(model) = &cli.model {
        app.load_model(model);
    }
    app.run().context("terminal viewer")?;

    println!("Thank you for using CADium!");
    Ok(())
}
