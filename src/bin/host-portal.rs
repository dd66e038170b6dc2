//! Settings portal on the host, for working on pages and form handling
//! without a board.
//!
//! ```text
//! cargo run --bin host-portal
//! ```
//!
//! Environment:
//! - `SCOREBOX_CONFIG` - configuration file (default `config.json`)
//! - `SCOREBOX_PORT` - listen port (default 8080)
//! - `SCOREBOX_TEMPLATES` - serve pages from this directory instead of the
//!   compiled-in ones
//! - `SCOREBOX_FEED` - scan this feed file once for the configured team
//!   before serving

use log::{error, info, warn};
use scorebox::config::{ConfigStore, JsonFileStore, CONFIG_FILE};
use scorebox::portal::{
    ConfigServer, DirTemplates, EmbeddedTemplates, PortalMode, ServeExit, TemplateProvider,
};
use scorebox::scanner::{poll_score, FileFeed, ScoreStreamScanner};
use std::env;
use std::process::ExitCode;

const DEFAULT_PORT: u16 = 8080;

/// Device code shown on the page in place of the MAC-derived one.
const HOST_DEVICE_CODE: &str = "HOST";

fn port_from_env() -> u16 {
    match env::var("SCOREBOX_PORT") {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            warn!("Ignoring SCOREBOX_PORT={:?}, using {}", value, DEFAULT_PORT);
            DEFAULT_PORT
        }),
        Err(_) => DEFAULT_PORT,
    }
}

fn serve<T: TemplateProvider>(store: &JsonFileStore, templates: T, port: u16) -> ExitCode {
    let server = ConfigServer::new(store, templates, PortalMode::Settings, HOST_DEVICE_CODE)
        .with_port(port);
    info!("Open http://localhost:{}/config", port);

    match server.serve() {
        Ok(ServeExit::RestartRequested(request)) => {
            info!(
                "Settings saved to {:?}; the device would restart in {:?}",
                store.path(),
                request.delay
            );
            ExitCode::SUCCESS
        }
        Ok(ServeExit::Stopped) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Could not serve on port {}: {}", port, e);
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let store = JsonFileStore::new(env::var("SCOREBOX_CONFIG").unwrap_or_else(|_| CONFIG_FILE.into()));
    let config = store.load();
    info!("Using configuration {:?}: {:?}", store.path(), config.wifi);

    if let Ok(path) = env::var("SCOREBOX_FEED") {
        let scanner = ScoreStreamScanner::new(&config.device.team_abbrev);
        let outcome = poll_score(&mut FileFeed::new(&path), &scanner);
        info!(
            "{} in {}: {:?} ({})",
            config.device.team_abbrev,
            path,
            outcome,
            outcome.sentinel()
        );
    }

    let port = port_from_env();
    match env::var("SCOREBOX_TEMPLATES") {
        Ok(dir) => {
            info!("Serving templates from {}", dir);
            serve(&store, DirTemplates::new(dir), port)
        }
        Err(_) => serve(&store, EmbeddedTemplates, port),
    }
}
