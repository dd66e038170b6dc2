//! Single-connection configuration server.
//!
//! Serves the settings page and accepts form posts over plain TCP. One
//! client at a time: accept, one read of up to 1024 bytes, one response,
//! close. The accept and read calls have no timeout, so a client that
//! connects and sends nothing holds up the loop until it disconnects.
//!
//! A successful save never restarts the device from inside the handler.
//! The response is written and the connection closed first, then the loop
//! returns [`ServeExit::RestartRequested`] and the caller restarts.

use super::http::{self, HttpResponse, Route, MAX_REQUEST_BYTES};
use super::template::{render, TemplateError, TemplateName, TemplateProvider};
use crate::config::{
    ConfigError, ConfigStore, DeviceConfig, DeviceSettings, FormData, WifiSettings,
    DEFAULT_BRIGHTNESS, DEFAULT_HOSTNAME, DEFAULT_POLL_INTERVAL, DEFAULT_TEAM,
};
use crate::wifi::FallbackPortal;
use log::{debug, error, info, warn};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use socket2::{Domain, Protocol, Socket, Type};
use std::time::Duration;
use zeroize::Zeroize;

/// Default port for the configuration server.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Time between answering a save and restarting, so the page reaches the
/// browser before the radio goes down.
pub const RESTART_DELAY: Duration = Duration::from_secs(3);

/// Pending connections the listener queues. Further clients are refused
/// while one is being served.
pub const LISTEN_BACKLOG: i32 = 1;

/// Pause after a failed accept before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// The caller should restart the device after `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartRequest {
    pub delay: Duration,
}

impl Default for RestartRequest {
    fn default() -> Self {
        Self {
            delay: RESTART_DELAY,
        }
    }
}

/// Why a serve loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeExit {
    /// Stopped on request.
    Stopped,
    /// Settings were saved and the response sent.
    RestartRequested(RestartRequest),
}

/// Which configuration page `GET /` shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalMode {
    /// On our own access point after a failed connect: WiFi form only.
    Setup,
    /// On the home network: scoreboard and WiFi settings.
    Settings,
}

impl PortalMode {
    fn config_template(self) -> TemplateName {
        match self {
            Self::Setup => TemplateName::WifiConfig,
            Self::Settings => TemplateName::DeviceConfig,
        }
    }
}

/// Result of handling one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handled {
    pub response: HttpResponse,
    pub restart: Option<RestartRequest>,
}

impl Handled {
    fn respond(response: HttpResponse) -> Self {
        Self {
            response,
            restart: None,
        }
    }

    fn saved(response: HttpResponse) -> Self {
        Self {
            response,
            restart: Some(RestartRequest::default()),
        }
    }
}

/// Failures while handling a request. Only missing setup fields are the
/// client's fault (400); everything else is answered 500.
#[derive(Debug)]
enum HandlerError {
    BadRequest(String),
    Template(TemplateError),
    Config(ConfigError),
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "{}", msg),
            Self::Template(e) => write!(f, "{}", e),
            Self::Config(e) => write!(f, "{}", e),
        }
    }
}

impl From<TemplateError> for HandlerError {
    fn from(e: TemplateError) -> Self {
        Self::Template(e)
    }
}

impl From<ConfigError> for HandlerError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl HandlerError {
    fn into_response(self) -> HttpResponse {
        match self {
            Self::BadRequest(msg) => HttpResponse::bad_request(msg),
            other => HttpResponse::internal_error(other),
        }
    }
}

/// Configuration portal.
///
/// Generic over where settings are stored and where pages come from, so the
/// same server runs on the device (NVS, embedded pages) and on the host.
pub struct ConfigServer<S, T> {
    store: S,
    templates: T,
    mode: PortalMode,
    device_code: String,
    port: u16,
}

impl<S, T> ConfigServer<S, T>
where
    S: ConfigStore,
    T: TemplateProvider,
{
    /// Create a server on [`DEFAULT_HTTP_PORT`].
    ///
    /// `device_code` is shown in the page title to tell units apart.
    pub fn new(store: S, templates: T, mode: PortalMode, device_code: impl Into<String>) -> Self {
        Self {
            store,
            templates,
            mode,
            device_code: device_code.into(),
            port: DEFAULT_HTTP_PORT,
        }
    }

    /// Listen on `port` instead; 0 picks a free one.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Port the server binds.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Which configuration page this server shows.
    pub fn mode(&self) -> PortalMode {
        self.mode
    }

    /// Handle one raw request.
    pub fn handle(&self, raw: &[u8]) -> Handled {
        let request = match http::decode_request(raw) {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejecting request: {}", e);
                return Handled::respond(HttpResponse::internal_error(e));
            }
        };

        let route = Route::of(request);
        debug!("Request routed to {:?}", route);
        let body = http::body(request);

        let result = match route {
            Route::ConfigPage => self.config_page().map(Handled::respond),
            Route::SaveDevice => self.save_device(body),
            Route::SaveWifi => self.save_wifi(body),
            Route::Save => self.save_setup(body),
            Route::NotFound => Ok(Handled::respond(HttpResponse::not_found())),
        };

        result.unwrap_or_else(|e| {
            warn!("Request failed: {}", e);
            Handled::respond(e.into_response())
        })
    }

    fn page_values(&self, config: &DeviceConfig) -> Vec<(&'static str, String)> {
        vec![
            ("DEVICE_CODE", self.device_code.clone()),
            ("SSID", config.wifi.ssid.clone()),
            ("PASSWORD", config.wifi.password.clone()),
            ("HOSTNAME", config.wifi.hostname.clone()),
            ("TEAM", config.device.team_abbrev.clone()),
            ("POLL", config.device.poll_interval.to_string()),
            ("BRIGHTNESS", config.device.brightness.to_string()),
        ]
    }

    /// Render `name` with the values from `config`, then wipe the copies
    /// made for substitution.
    fn render_page(&self, name: TemplateName, config: &DeviceConfig) -> Result<String, HandlerError> {
        let template = self.templates.load(name)?;
        let mut values = self.page_values(config);
        let page = render(&template, &values);
        values.iter_mut().for_each(|(_, value)| value.zeroize());
        Ok(page)
    }

    fn config_page(&self) -> Result<HttpResponse, HandlerError> {
        let config = self.store.load();
        let page = self.render_page(self.mode.config_template(), &config)?;
        Ok(HttpResponse::ok(page))
    }

    /// Validate, render the confirmation, then persist.
    ///
    /// The page is rendered before saving so a missing template cannot
    /// leave saved settings without a restart.
    fn persist(&self, config: DeviceConfig, page: TemplateName) -> Result<Handled, HandlerError> {
        config.wifi.validate()?;
        let body = self.render_page(page, &config)?;

        if let Err(e) = self.store.save(&config) {
            error!("Error saving configuration: {}", e);
            return Err(e.into());
        }
        info!("Configuration saved, restart requested");
        Ok(Handled::saved(HttpResponse::ok(body)))
    }

    fn save_device(&self, body: &str) -> Result<Handled, HandlerError> {
        let form = FormData::parse(body);
        let default_poll = DEFAULT_POLL_INTERVAL.to_string();
        let default_brightness = DEFAULT_BRIGHTNESS.to_string();

        let device = DeviceSettings::parse(
            form.get_or("team", DEFAULT_TEAM),
            form.get_or("poll", &default_poll),
            form.get_or("brightness", &default_brightness),
        )?;

        let mut config = self.store.load();
        config.device = device;
        self.persist(config, TemplateName::DeviceSaved)
    }

    fn save_wifi(&self, body: &str) -> Result<Handled, HandlerError> {
        let form = FormData::parse(body);
        let mut config = self.store.load();
        config.wifi = WifiSettings::new(
            form.get_or("ssid", ""),
            form.get_or("password", ""),
            form.get_or("hostname", DEFAULT_HOSTNAME),
        );
        self.persist(config, TemplateName::WifiSaved)
    }

    /// The setup form: SSID and password are both required.
    fn save_setup(&self, body: &str) -> Result<Handled, HandlerError> {
        let form = FormData::parse(body);
        let ssid = form.get_or("ssid", "");
        let password = form.get_or("password", "");
        if ssid.is_empty() || password.is_empty() {
            return Err(HandlerError::BadRequest("Invalid parameters".into()));
        }

        let mut config = self.store.load();
        config.wifi = WifiSettings::new(ssid, password, form.get_or("hostname", DEFAULT_HOSTNAME));
        self.persist(config, TemplateName::WifiSaved)
    }

    /// Read one request from `stream`, answer it and close.
    ///
    /// The restart request is returned even if writing the response failed,
    /// since the settings are already persisted.
    fn serve_connection(&self, mut stream: TcpStream) -> io::Result<Option<RestartRequest>> {
        let mut buf = [0u8; MAX_REQUEST_BYTES];
        let read = stream.read(&mut buf);
        let handled = match read {
            Ok(n) => self.handle(&buf[..n]),
            Err(e) => {
                buf.zeroize();
                return Err(e);
            }
        };
        // The request may carry the WiFi password.
        buf.zeroize();

        let Handled {
            mut response,
            restart,
        } = handled;
        if response.status.code() >= 400 {
            debug!("Answering {}", response.status.code());
        }

        // The settings page echoes the password back.
        let mut wire = response.to_wire();
        response.body.zeroize();
        let sent = stream.write_all(wire.as_bytes()).and_then(|_| stream.flush());
        wire.zeroize();
        if let Err(e) = sent {
            warn!("Failed to send response: {}", e);
        }
        drop(stream);

        Ok(restart)
    }

    /// Serve `listener` until a save or until `running` is cleared.
    ///
    /// `running` is checked after every accepted connection; see
    /// [`BackgroundPortal::stop`] for how a blocked accept is woken.
    pub fn serve_listener(&self, listener: &TcpListener, running: &AtomicBool) -> ServeExit {
        loop {
            // Use Acquire ordering to ensure we see the flag from stop()
            if !running.load(Ordering::Acquire) {
                info!("Configuration server shutting down");
                return ServeExit::Stopped;
            }

            let (stream, peer) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_RETRY_DELAY);
                    continue;
                }
            };

            if !running.load(Ordering::Acquire) {
                info!("Configuration server shutting down");
                return ServeExit::Stopped;
            }

            debug!("Client connected from {}", peer);
            match self.serve_connection(stream) {
                Ok(Some(request)) => return ServeExit::RestartRequested(request),
                Ok(None) => {}
                Err(e) => warn!("Client {} failed: {}", peer, e),
            }
        }
    }

    /// Listen on all interfaces with [`LISTEN_BACKLOG`] and `SO_REUSEADDR`,
    /// so the port can be taken again right after a previous portal closed.
    fn bind(&self) -> io::Result<TcpListener> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port);
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        let listener: TcpListener = socket.into();
        info!(
            "Configuration server running on port {}",
            listener.local_addr().map(|a| a.port()).unwrap_or(self.port)
        );
        Ok(listener)
    }

    /// Bind the port and serve in the foreground until settings are saved.
    pub fn serve(&self) -> io::Result<ServeExit> {
        let listener = self.bind()?;
        let running = AtomicBool::new(true);
        Ok(self.serve_listener(&listener, &running))
    }
}

impl<S, T> ConfigServer<S, T>
where
    S: ConfigStore + Send + 'static,
    T: TemplateProvider + Send + 'static,
{
    /// Bind the port and serve from a worker thread.
    ///
    /// The worker shares the store with the caller without locking; see
    /// [`crate::config::ConfigStore`] for the lost-update hazard.
    pub fn start_background(self) -> io::Result<BackgroundPortal> {
        let listener = self.bind()?;
        let local_addr = listener.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();
        let (restart_tx, restart_rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            match self.serve_listener(&listener, &running_clone) {
                ServeExit::RestartRequested(request) => {
                    if restart_tx.send(request).is_err() {
                        warn!("Restart requested but nobody is listening");
                    }
                }
                ServeExit::Stopped => {}
            }
        });

        Ok(BackgroundPortal {
            handle: Some(handle),
            running,
            restart_rx,
            local_addr,
        })
    }
}

impl<S, T> FallbackPortal for ConfigServer<S, T>
where
    S: ConfigStore,
    T: TemplateProvider,
{
    fn serve_until_saved(&mut self) -> io::Result<ServeExit> {
        self.serve()
    }
}

/// Handle to a portal running on a worker thread. Drop it to stop the
/// server.
pub struct BackgroundPortal {
    handle: Option<thread::JoinHandle<()>>,
    running: Arc<AtomicBool>,
    restart_rx: mpsc::Receiver<RestartRequest>,
    local_addr: SocketAddr,
}

impl BackgroundPortal {
    /// Address the worker is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A save happened; the caller should restart after the given delay.
    /// The worker has already exited at this point.
    pub fn restart_requested(&self) -> Option<RestartRequest> {
        self.restart_rx.try_recv().ok()
    }

    /// Stop the worker and wait for it.
    ///
    /// Accept has no timeout, so a throwaway local connection is made to
    /// wake the loop after clearing the flag.
    pub fn stop(&mut self) {
        // Use Release ordering to ensure the server thread sees this write
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                let wake_ip = match self.local_addr.ip() {
                    ip if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
                    ip => ip,
                };
                if let Err(e) = TcpStream::connect(SocketAddr::new(wake_ip, self.local_addr.port())) {
                    debug!("Wake-up connection failed: {}", e);
                }
            }
            if handle.join().is_err() {
                error!("Configuration server thread panicked");
            }
        }
    }
}

impl Drop for BackgroundPortal {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use crate::portal::EmbeddedTemplates;
    use std::time::Instant;

    type TestServer = ConfigServer<Arc<MemoryStore>, EmbeddedTemplates>;

    fn server(mode: PortalMode) -> (TestServer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let server = ConfigServer::new(store.clone(), EmbeddedTemplates, mode, "EEFF");
        (server, store)
    }

    fn post(path: &str, body: &str) -> Vec<u8> {
        format!(
            "POST {} HTTP/1.1\r\nHost: 192.168.4.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            path,
            body.len(),
            body
        )
        .into_bytes()
    }

    fn get(path: &str) -> Vec<u8> {
        format!("GET {} HTTP/1.1\r\nHost: 192.168.4.1\r\n\r\n", path).into_bytes()
    }

    // ==================== Pages ====================

    #[test]
    fn test_setup_page_shows_device_code() {
        let (server, _) = server(PortalMode::Setup);
        let handled = server.handle(&get("/"));
        assert_eq!(handled.response.status, http::Status::Ok);
        assert!(handled.response.body.contains("ScoreBox EEFF"));
        assert!(handled.response.body.contains("action=\"/save\""));
        assert_eq!(handled.restart, None);
    }

    #[test]
    fn test_settings_page_on_config_path() {
        let (server, _) = server(PortalMode::Settings);
        let handled = server.handle(&get("/config"));
        assert_eq!(handled.response.status, http::Status::Ok);
        assert!(handled.response.body.contains("value=\"MIN\""));
        assert!(handled.response.body.contains("value=\"wildsensor\""));
    }

    #[test]
    fn test_unknown_path_is_404() {
        let (server, store) = server(PortalMode::Settings);
        let handled = server.handle(&get("/favicon.ico"));
        assert_eq!(handled.response.status, http::Status::NotFound);
        assert_eq!(handled.restart, None);
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_invalid_utf8_is_500() {
        let (server, _) = server(PortalMode::Settings);
        let handled = server.handle(&[0xFF, 0xFE, b'\r', b'\n']);
        assert_eq!(handled.response.status, http::Status::InternalServerError);
        assert!(handled.response.body.contains("UTF-8"));
    }

    // ==================== Saves ====================

    #[test]
    fn test_setup_save_persists_and_requests_restart() {
        let (server, store) = server(PortalMode::Setup);
        let handled = server.handle(&post("/save", "ssid=My+Wifi&password=p%40ss&hostname=rink"));

        assert_eq!(handled.response.status, http::Status::Ok);
        assert_eq!(handled.restart, Some(RestartRequest::default()));
        assert!(handled.response.body.contains("My Wifi"));

        let config = store.load();
        assert_eq!(config.wifi.ssid, "My Wifi");
        assert_eq!(config.wifi.password, "p@ss");
        assert_eq!(config.wifi.hostname, "rink");
    }

    #[test]
    fn test_setup_save_requires_ssid_and_password() {
        let (server, store) = server(PortalMode::Setup);
        let handled = server.handle(&post("/save", "ssid=OnlySsid"));
        assert_eq!(handled.response.status, http::Status::BadRequest);
        assert_eq!(handled.response.body, "Invalid parameters");
        assert_eq!(handled.restart, None);
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_save_wifi_defaults_hostname() {
        let (server, store) = server(PortalMode::Settings);
        let handled = server.handle(&post("/save_wifi", "ssid=Cabin&password="));
        assert!(handled.restart.is_some());
        let config = store.load();
        assert_eq!(config.wifi.hostname, "wildsensor");
        assert_eq!(config.wifi.password, "");
    }

    #[test]
    fn test_save_wifi_keeps_device_section() {
        let (server, store) = server(PortalMode::Settings);
        let mut config = store.load();
        config.device.team_abbrev = "DAL".into();
        store.save(&config).unwrap();

        server.handle(&post("/save_wifi", "ssid=Cabin&password=secret12&hostname=box"));

        assert_eq!(store.load().device.team_abbrev, "DAL");
    }

    #[test]
    fn test_save_device_uppercases_team() {
        let (server, store) = server(PortalMode::Settings);
        let handled = server.handle(&post("/save_device", "team=col&poll=30&brightness=75"));

        assert_eq!(handled.response.status, http::Status::Ok);
        assert!(handled.response.body.contains("COL"));
        let device = store.load().device;
        assert_eq!(device.team_abbrev, "COL");
        assert_eq!(device.poll_interval, 30);
        assert_eq!(device.brightness, 75);
    }

    #[test]
    fn test_save_device_bad_number_is_rejected() {
        let (server, store) = server(PortalMode::Settings);
        let handled = server.handle(&post("/save_device", "team=MIN&poll=often&brightness=50"));
        assert_eq!(handled.response.status, http::Status::InternalServerError);
        assert!(handled.response.body.contains("poll_interval"));
        assert_eq!(handled.restart, None);
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_store_failure_is_500_without_restart() {
        struct ReadOnlyStore;
        impl ConfigStore for ReadOnlyStore {
            fn load(&self) -> DeviceConfig {
                DeviceConfig::default()
            }
            fn save(&self, _: &DeviceConfig) -> Result<(), ConfigError> {
                Err(ConfigError::Storage("flash worn out".into()))
            }
        }

        let server = ConfigServer::new(ReadOnlyStore, EmbeddedTemplates, PortalMode::Settings, "EEFF");
        let handled = server.handle(&post("/save_wifi", "ssid=a&password=b"));
        assert_eq!(handled.response.status, http::Status::InternalServerError);
        assert!(handled.response.body.starts_with("Error: "));
        assert!(handled.response.body.contains("flash worn out"));
        assert_eq!(handled.restart, None);
    }

    #[test]
    fn test_missing_template_is_500() {
        let store = Arc::new(MemoryStore::default());
        let server = ConfigServer::new(
            store,
            crate::portal::DirTemplates::new(std::env::temp_dir().join("scorebox-no-templates")),
            PortalMode::Settings,
            "EEFF",
        );
        let handled = server.handle(&get("/"));
        assert_eq!(handled.response.status, http::Status::InternalServerError);
        assert!(handled.response.body.contains("device_config"));
    }

    #[test]
    fn test_saved_values_render_back() {
        let (server, _) = server(PortalMode::Settings);
        server.handle(&post("/save_wifi", "ssid=My+Wifi&password=p%40ss%21&hostname=rink%2F2"));
        server.handle(&post("/save_device", "team=wpg&poll=45&brightness=0"));

        let page = server.handle(&get("/config")).response.body;
        for expected in [
            "value=\"My Wifi\"",
            "value=\"p@ss!\"",
            "value=\"rink/2\"",
            "value=\"WPG\"",
            "value=\"45\"",
            "value=\"0\"",
        ] {
            assert!(page.contains(expected), "page missing {}", expected);
        }
    }

    #[test]
    fn test_placeholder_text_renders_back() {
        let (server, store) = server(PortalMode::Settings);
        server.handle(&post("/save_wifi", "ssid={{TEAM}}&password=pw&hostname=h"));
        assert_eq!(store.load().wifi.ssid, "{{TEAM}}");

        let page = server.handle(&get("/config")).response.body;
        assert!(page.contains("value=\"{{TEAM}}\""));
        assert_eq!(page.matches("value=\"MIN\"").count(), 1);
    }

    // ==================== Socket ====================

    fn exchange(addr: SocketAddr, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(request).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_serve_listener_until_save() {
        let (server, store) = server(PortalMode::Setup);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || {
            let page = exchange(addr, &get("/"));
            let missing = exchange(addr, &get("/nope"));
            let saved = exchange(addr, &post("/save", "ssid=Net&password=pw123456"));
            (page, missing, saved)
        });

        let running = AtomicBool::new(true);
        let exit = server.serve_listener(&listener, &running);
        let (page, missing, saved) = client.join().unwrap();

        assert_eq!(exit, ServeExit::RestartRequested(RestartRequest::default()));
        assert!(page.starts_with("HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n"));
        assert!(missing.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(saved.starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(store.load().wifi.ssid, "Net");
    }

    #[test]
    fn test_silent_client_does_not_end_loop() {
        let (server, _) = server(PortalMode::Setup);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || {
            // Connect and hang up without sending anything.
            drop(TcpStream::connect(addr).unwrap());
            exchange(addr, &post("/save", "ssid=Net&password=pw123456"))
        });

        let running = AtomicBool::new(true);
        let exit = server.serve_listener(&listener, &running);
        assert!(matches!(exit, ServeExit::RestartRequested(_)));
        assert!(client.join().unwrap().starts_with("HTTP/1.1 200 OK"));
    }

    #[test]
    fn test_background_portal_stop() {
        let (server, _) = server(PortalMode::Settings);
        let mut portal = server.with_port(0).start_background().unwrap();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), portal.local_addr().port());

        let page = exchange(addr, &get("/config"));
        assert!(page.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(portal.restart_requested(), None);

        let started = Instant::now();
        portal.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_port_rebinds_after_stop() {
        let (first, _) = server(PortalMode::Settings);
        let mut portal = first.with_port(0).start_background().unwrap();
        let port = portal.local_addr().port();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        // The server closes first, leaving the port in TIME_WAIT.
        assert!(exchange(addr, &get("/config")).starts_with("HTTP/1.1 200 OK"));
        portal.stop();

        let (second, _) = server(PortalMode::Settings);
        let mut portal = second.with_port(port).start_background().unwrap();
        assert!(exchange(addr, &get("/config")).starts_with("HTTP/1.1 200 OK"));
        portal.stop();
    }

    #[test]
    fn test_background_portal_reports_restart() {
        let (server, store) = server(PortalMode::Settings);
        let portal = server.with_port(0).start_background().unwrap();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), portal.local_addr().port());

        let saved = exchange(addr, &post("/save_device", "team=edm&poll=20&brightness=40"));
        assert!(saved.starts_with("HTTP/1.1 200 OK"));

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut request = None;
        while request.is_none() && Instant::now() < deadline {
            request = portal.restart_requested();
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(request, Some(RestartRequest::default()));
        assert_eq!(store.load().device.team_abbrev, "EDM");
    }
}
