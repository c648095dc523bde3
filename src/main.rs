mod app;
mod config;
mod grid;
mod theme;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use app::{App, Popup};
use config::AppConfig;
use grid::export::{self, DOWNLOAD_FILENAME};
use grid::registry::ImagePayload;
use grid::session::Session;
use grid::Position;

#[derive(Parser, Debug)]
#[command(name = "ninegrid")]
#[command(author = "Sean Fournier")]
#[command(version = "0.1.0")]
#[command(about = "Compose up to nine images into a 3x3 grid PNG")]
struct Args {
    /// Place an image without opening the TUI, e.g. `-i 5=cat.png` (PATH may be a data: URI)
    #[arg(short, long = "image", value_name = "POS=PATH")]
    images: Vec<String>,

    /// Directory to save the composed PNG into
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Print the composed PNG as a data URI instead of saving it
    #[arg(long, requires = "images")]
    data_uri: bool,

    /// Print a JSON summary of the composition (for scripts)
    #[arg(short, long, requires = "images")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout is reserved for --data-uri / --json output
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = AppConfig::load().unwrap_or_default();
    let output_dir = args.output.clone().unwrap_or_else(|| config.output_dir());

    // Handle CLI-only composition
    if !args.images.is_empty() {
        return compose_headless(&args, &config, output_dir).await;
    }

    // Run TUI
    ui::init_theme(theme::Theme::load(&config.theme));
    run_tui(config, output_dir).await
}

/// Split a `POS=PATH` argument
fn parse_placement(arg: &str) -> Result<(Position, &str)> {
    let (pos, source) = arg
        .split_once('=')
        .with_context(|| format!("Expected POS=PATH, got '{}'", arg))?;
    let pos: Position = pos.parse()?;
    Ok((pos, source))
}

async fn compose_headless(args: &Args, config: &AppConfig, output_dir: PathBuf) -> Result<()> {
    let mut session = Session::new();

    for arg in &args.images {
        let (pos, source) = parse_placement(arg)?;
        let payload = if source.starts_with("data:") {
            ImagePayload::from_data_uri(source)?
        } else {
            ImagePayload::from_path(Path::new(source)).await?
        };
        session
            .set_image(pos, payload)
            .with_context(|| format!("Position {} ({})", pos, source))?;
    }

    let (width, height, rows) = match session.compose().await {
        Ok(result) => (result.width(), result.height(), result.layout.rows),
        Err(e) => {
            if config.notifications {
                delivered(notify("Composition failed", &e.to_string()));
            }
            return Err(e.into());
        }
    };
    let uri = session
        .data_uri()
        .context("Composition produced no preview")?;

    let path = if args.data_uri {
        println!("{}", uri);
        None
    } else {
        let path = export::download(&uri, &output_dir, DOWNLOAD_FILENAME).await?;
        if config.notifications {
            delivered(notify("ninegrid", &format!("Saved {}", path.display())));
        }
        Some(path)
    };

    if args.json {
        let output = serde_json::json!({
            "width": width,
            "height": height,
            "rows": rows,
            "count": session.registry().count(),
            "path": path.as_ref().map(|p| p.display().to_string()),
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if let Some(path) = path {
        println!("{}", path.display());
    }

    Ok(())
}

async fn run_tui(config: AppConfig, output_dir: PathBuf) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Create app state
    let mut app = App::new(config, output_dir);

    // Main loop
    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    // Remember where the picker was last used
    if let Err(e) = app.config.save() {
        tracing::warn!("Could not save config: {}", e);
    }

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') if app.popup == Popup::None => return Ok(()),
                        KeyCode::Char('c') if key.modifiers.contains(event::KeyModifiers::CONTROL) => {
                            return Ok(())
                        }
                        _ => {
                            // Handle key and catch any errors to prevent crashes
                            if let Err(e) = app.handle_key(key).await {
                                app.set_status(format!("Error: {}", e));
                            }
                        }
                    }
                }
            }
        }

        // Periodic refresh
        let _ = app.tick().await;
    }
}

pub fn notify(summary: &str, body: &str) -> Result<()> {
    notify_rust::Notification::new()
        .summary(summary)
        .body(body)
        .icon("image-x-generic")
        .show()?;
    Ok(())
}

/// Log a failed notification; they are never fatal
pub fn delivered(sent: Result<()>) -> bool {
    match sent {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Notification failed: {}", e);
            false
        }
    }
}
