//! HTML page templates.
//!
//! Placeholders have the form `{{NAME}}` and are replaced verbatim. Values
//! are NOT HTML-escaped: an SSID containing `"` or `<` ends up in the page
//! as-is. The page is only reachable from the local network or the device's
//! own access point.

use log::debug;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Pages the portal can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateName {
    DeviceConfig,
    DeviceSaved,
    WifiConfig,
    WifiSaved,
}

impl TemplateName {
    /// Template name without extension.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeviceConfig => "device_config",
            Self::DeviceSaved => "device_saved",
            Self::WifiConfig => "wifi_config",
            Self::WifiSaved => "wifi_saved",
        }
    }

    /// File name under the template directory.
    pub fn file_name(self) -> String {
        format!("{}.html", self.as_str())
    }
}

impl fmt::Display for TemplateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of raw template text.
pub trait TemplateProvider {
    fn load(&self, name: TemplateName) -> Result<String, TemplateError>;
}

/// Templates compiled into the firmware image from `www/`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedTemplates;

impl TemplateProvider for EmbeddedTemplates {
    fn load(&self, name: TemplateName) -> Result<String, TemplateError> {
        let text = match name {
            TemplateName::DeviceConfig => include_str!("../../www/device_config.html"),
            TemplateName::DeviceSaved => include_str!("../../www/device_saved.html"),
            TemplateName::WifiConfig => include_str!("../../www/wifi_config.html"),
            TemplateName::WifiSaved => include_str!("../../www/wifi_saved.html"),
        };
        Ok(text.to_string())
    }
}

/// Templates read from a directory at request time.
#[derive(Debug, Clone)]
pub struct DirTemplates {
    root: PathBuf,
}

impl DirTemplates {
    /// Templates read from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TemplateProvider for DirTemplates {
    fn load(&self, name: TemplateName) -> Result<String, TemplateError> {
        let path = self.root.join(name.file_name());
        debug!("Loading template {:?}", path);
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => TemplateError::NotFound(name),
            _ => TemplateError::Io(e.to_string()),
        })
    }
}

/// Replace each `{{KEY}}` with its value, verbatim.
///
/// One pass over the template: substituted values are never scanned for
/// placeholders. Unknown placeholders are left in place.
pub fn render(template: &str, values: &[(&str, String)]) -> String {
    let mut page = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        page.push_str(&rest[..open]);
        let inner = &rest[open + 2..];
        let token = inner.find("}}").and_then(|close| {
            let name = &inner[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (close, value))
        });
        match token {
            Some((close, value)) => {
                page.push_str(value);
                rest = &inner[close + 2..];
            }
            None => {
                // Not a known key: keep the braces, look for a token after them.
                page.push_str("{{");
                rest = inner;
            }
        }
    }

    page.push_str(rest);
    page
}

/// Errors loading a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    NotFound(TemplateName),
    Io(String),
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(name) => write!(f, "template not found: {}", name),
            Self::Io(msg) => write!(f, "template read failed: {}", msg),
        }
    }
}

impl std::error::Error for TemplateError {}
