use std::path::Path;

use anyhow::{Context, Result};

use crate::models::file::MediaClass;

/// Default size cap for a single staged upload (10 MiB).
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024;

const DEFAULT_SETTINGS: &str = "\
# Memories service settings
version=0.1.0
brand_name=Memories
http_host=127.0.0.1
http_port=8080
enable_console_commands=true
# Session lifetime in days
max_session_age=7
max_upload_size=10485760
allow_unregistered_login=false
password_hash_memory_kib=19456
password_hash_iterations=3
image_formats=jpg,jpeg,png,gif,webp,heic
video_formats=mp4,mov,webm,mkv,avi
audio_formats=mp3,wav,ogg,flac,m4a
text_formats=txt,md,pdf
other_formats=zip
# Outbound mail used for password reset
smtp_host=
smtp_port=587
smtp_username=
smtp_password=
smtp_sender=
";

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Entry { key: String, value: String },
    Verbatim(String),
}

/// A `key=value` settings document that keeps comments and line order.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    lines: Vec<Line>,
}

impl Settings {
    /// Parses a settings document. Lines that are not `key=value` are kept verbatim.
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|raw| {
                let trimmed = raw.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                    return Line::Verbatim(raw.to_string());
                }
                match trimmed.split_once('=') {
                    Some((key, value)) => Line::Entry {
                        key: key.trim().to_string(),
                        value: value.trim().to_string(),
                    },
                    None => Line::Verbatim(raw.to_string()),
                }
            })
            .collect();

        Self { lines }
    }

    /// Loads the document at `path`, writing the defaults first if it is absent.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            std::fs::write(path, DEFAULT_SETTINGS)
                .with_context(|| format!("writing default settings to {}", path.display()))?;
            tracing::info!("Wrote default settings to {}", path.display());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    pub fn defaults() -> Self {
        Self::parse(DEFAULT_SETTINGS)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Entry { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Sets `key`, rewriting the existing line in place or appending a new one.
    pub fn set(&mut self, key: &str, value: &str) {
        for line in &mut self.lines {
            if let Line::Entry { key: k, value: v } = line {
                if k == key {
                    *v = value.to_string();
                    return;
                }
            }
        }
        self.lines.push(Line::Entry {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Entry { key, value } => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(value);
                }
                Line::Verbatim(raw) => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render())
            .with_context(|| format!("writing settings to {}", path.display()))
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            None | Some("") => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid value for {}: {}", key, raw)),
        }
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Extension whitelists per media class.
#[derive(Debug, Clone, Default)]
pub struct FormatLists {
    pub image: Vec<String>,
    pub video: Vec<String>,
    pub audio: Vec<String>,
    pub text: Vec<String>,
    pub other: Vec<String>,
}

impl FormatLists {
    /// Returns the media class whose whitelist contains `ext`.
    pub fn classify(&self, ext: &str) -> Option<MediaClass> {
        let ext = ext.to_lowercase();
        [
            (&self.image, MediaClass::Image),
            (&self.video, MediaClass::Video),
            (&self.audio, MediaClass::Audio),
            (&self.text, MediaClass::Text),
            (&self.other, MediaClass::Other),
        ]
        .into_iter()
        .find(|(list, _)| list.iter().any(|e| *e == ext))
        .map(|(_, class)| class)
    }
}

/// Outbound mail settings, handed to the mailer untouched.
#[derive(Debug, Clone, Default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub sender: String,
}

/// The application's configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Service version stamped on every transaction.
    pub version: String,
    pub brand_name: String,
    pub http_host: String,
    pub http_port: u16,
    pub enable_console_commands: bool,
    /// The duration of a session in days.
    pub max_session_age: i64,
    /// Size cap for a staged upload in bytes.
    pub max_upload_size: u64,
    /// Lets users that are not yet Complete log in.
    pub allow_unregistered_login: bool,
    pub password_hash_memory_kib: u32,
    pub password_hash_iterations: u32,
    pub formats: FormatLists,
    pub smtp: SmtpSettings,
}

impl Config {
    /// Builds a `Config` from a settings document.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            version: settings
                .get("version")
                .filter(|v| !v.is_empty())
                .unwrap_or(env!("CARGO_PKG_VERSION"))
                .to_string(),
            brand_name: settings
                .get("brand_name")
                .unwrap_or("Memories")
                .to_string(),
            http_host: settings
                .get("http_host")
                .unwrap_or("127.0.0.1")
                .to_string(),
            http_port: settings.parse_or("http_port", 8080)?,
            enable_console_commands: settings.parse_or("enable_console_commands", false)?,
            max_session_age: settings.parse_or("max_session_age", 7)?,
            max_upload_size: settings.parse_or("max_upload_size", DEFAULT_MAX_UPLOAD_SIZE)?,
            allow_unregistered_login: settings.parse_or("allow_unregistered_login", false)?,
            password_hash_memory_kib: settings.parse_or("password_hash_memory_kib", 19 * 1024)?,
            password_hash_iterations: settings.parse_or("password_hash_iterations", 3)?,
            formats: FormatLists {
                image: settings.list("image_formats"),
                video: settings.list("video_formats"),
                audio: settings.list("audio_formats"),
                text: settings.list("text_formats"),
                other: settings.list("other_formats"),
            },
            smtp: SmtpSettings {
                host: settings.get("smtp_host").unwrap_or_default().to_string(),
                port: settings.parse_or("smtp_port", 587)?,
                username: settings.get("smtp_username").unwrap_or_default().to_string(),
                sender: settings.get("smtp_sender").unwrap_or_default().to_string(),
            },
        })
    }
}
