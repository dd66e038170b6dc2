//! Configuration web portal.
//!
//! # Components
//!
//! - [`http`] - raw request routing and response framing
//! - [`template`] - HTML pages with `{{NAME}}` placeholders
//! - `server` - [`ConfigServer`], foreground and background serve loops

pub mod http;
pub mod template;

mod server;

pub use http::{HttpResponse, ProtocolError, Route, Status, MAX_REQUEST_BYTES};
pub use server::{
    BackgroundPortal, ConfigServer, Handled, PortalMode, RestartRequest, ServeExit,
    DEFAULT_HTTP_PORT, LISTEN_BACKLOG, RESTART_DELAY,
};
pub use template::{
    render, DirTemplates, EmbeddedTemplates, TemplateError, TemplateName, TemplateProvider,
};
