// crates/tracking-client/src/main.rs

mod app;
mod components;
mod ui;

use std::fs::File;
use std::path::PathBuf;
use std::{io, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracking_client::reporter::{run_reporter, SyntheticDriver};
use tracking_client::{ClientConfig, ConnectionManager, Tracker, TrackingTarget};
use tracking_core::DriverId;

use crate::app::App;

#[derive(Parser)]
#[command(name = "tracking-client")]
#[command(about = "Live driver presence and location monitor")]
struct Cli {
    /// Server address (overrides the config file)
    #[arg(short, long)]
    server: Option<String>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Watch a single driver instead of the whole fleet
    #[arg(short, long)]
    driver: Option<u64>,

    /// Log changes instead of drawing the terminal UI
    #[arg(long)]
    headless: bool,

    /// Act as a driver device reporting a synthetic position
    #[arg(long, value_name = "DRIVER_ID")]
    report: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Write logs to this file (the terminal UI logs nowhere otherwise)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(server) = &cli.server {
        config.server_addr = server.clone();
    }

    let interactive = !cli.headless && cli.report.is_none();
    init_logging(&cli, interactive)?;

    let manager = ConnectionManager::tcp(config.clone());

    if let Some(id) = cli.report {
        let driver = SyntheticDriver::new(DriverId(id), 6.2442, -75.5812);
        info!("Reporting as driver {} to {}", id, config.server_addr);
        tokio::select! {
            _ = run_reporter(manager.clone(), driver, Duration::from_secs(2)) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
        manager.dispose();
        return Ok(());
    }

    let target = match cli.driver {
        Some(id) => TrackingTarget::Driver(DriverId(id)),
        None => TrackingTarget::Fleet,
    };

    if cli.headless {
        run_headless(&manager, target).await;
        manager.dispose();
        return Ok(());
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let app = App::new(manager.clone(), target, Box::new(config.label_lookup()));
    let res = run_app(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    manager.dispose();

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn init_logging(cli: &Cli, interactive: bool) -> Result<()> {
    let default = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    match &cli.log_file {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        // Logging to the terminal would corrupt the UI.
        None if interactive => {}
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn run_headless(manager: &ConnectionManager, target: TrackingTarget) {
    let tracker = Tracker::new(manager, target);
    let mut changes = tracker.changes();

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }

        if let Some(err) = tracker.error() {
            info!("connected={} error={}", tracker.is_connected(), err);
        }
        match target {
            TrackingTarget::Driver(id) => match tracker.location() {
                Some(loc) => info!(
                    "driver {} at {:.5}, {:.5} online={} connected={}",
                    id, loc.latitude, loc.longitude, loc.is_online, tracker.is_connected()
                ),
                None => {
                    info!("driver {}: no location yet (connected={})", id, tracker.is_connected())
                }
            },
            TrackingTarget::Fleet => {
                let all = tracker.all_locations();
                let online = all.iter().filter(|loc| loc.is_online).count();
                info!(
                    "fleet: {} drivers, {} online (connected={})",
                    all.len(),
                    online,
                    tracker.is_connected()
                );
            }
        }
    }

    tracker.close();
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<()> {
    let mut changes = app.tracker.changes();

    loop {
        app.sync_rows();
        terminal.draw(|f| ui::draw(f, &app))?;

        // Handle events with timeout
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                        app.should_quit = true;
                    }
                    KeyCode::Char('r') | KeyCode::Char('R') => {
                        app.request_refresh();
                    }
                    KeyCode::Up | KeyCode::Char('k') => {
                        app.move_selection_up();
                    }
                    KeyCode::Down | KeyCode::Char('j') => {
                        app.move_selection_down();
                    }
                    _ => {}
                }
            }
        }

        if app.should_quit {
            break;
        }

        // Give network tasks a turn; redraw immediately if something changed.
        let _ = tokio::time::timeout(Duration::from_millis(10), changes.changed()).await;
    }

    Ok(())
}
