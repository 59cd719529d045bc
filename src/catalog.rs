use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("MPD connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("MPD protocol error: {0}")]
    Protocol(String),
}

/// One track in the catalog listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// URI relative to the music root, as reported by MPD.
    pub uri: String,
    /// Last-Modified as unix seconds (0 if the server omitted it).
    pub last_modified: i64,
}

/// Why a blocking wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    /// The catalog reported a database change.
    Changed,
    /// The wait was cancelled; no new sync pass should start.
    Cancelled,
}

/// The external media-library catalog.
///
/// `MpdCatalog` is the production implementation; tests inject a scripted
/// fake so the sync driver never needs a live server.
pub trait Catalog {
    /// Bulk-fetch the full listing. MPD has no incremental listing, so this
    /// is always the whole library.
    fn list(&mut self) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// Block until the catalog changes or the wait is cancelled.
    fn wait_for_change(&mut self) -> Result<ChangeEvent, CatalogError>;
}

/// MPD connection settings, resolved CLI/config first, then the `MPD_HOST`
/// and `MPD_PORT` environment variables (with the `password@host` scheme),
/// then localhost:6600.
#[derive(Debug, Clone)]
pub struct MpdSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl MpdSettings {
    pub fn resolve(host: Option<String>, port: Option<u16>, password: Option<String>) -> Self {
        let (env_password, env_host) = match std::env::var("MPD_HOST") {
            Ok(raw) => {
                let (pw, host) = split_password(&raw);
                (pw, Some(host))
            }
            Err(_) => (None, None),
        };
        let env_port = std::env::var("MPD_PORT").ok().and_then(|p| p.parse().ok());

        Self {
            host: host.or(env_host).unwrap_or_else(|| "localhost".to_string()),
            port: port.or(env_port).unwrap_or(6600),
            password: password.or(env_password),
        }
    }
}

/// Split the `password@host` form used by MPD_HOST.
fn split_password(raw: &str) -> (Option<String>, String) {
    match raw.split_once('@') {
        Some((password, host)) => (Some(password.to_string()), host.to_string()),
        None => (None, raw.to_string()),
    }
}

/// Plain-text MPD protocol client over TCP.
pub struct MpdCatalog {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    stop: Arc<AtomicBool>,
}

impl MpdCatalog {
    /// Connect, check the greeting, and authenticate if a password is set.
    ///
    /// `stop` is shared with the ctrl-c handler; a pending `idle` wait
    /// observes it and unblocks via `noidle`.
    pub fn connect(settings: &MpdSettings, stop: Arc<AtomicBool>) -> Result<Self, CatalogError> {
        let writer = TcpStream::connect((settings.host.as_str(), settings.port))?;
        let reader = BufReader::new(writer.try_clone()?);
        let mut catalog = Self {
            reader,
            writer,
            stop,
        };

        let greeting = catalog.read_line()?;
        if !greeting.starts_with("OK MPD") {
            return Err(CatalogError::Protocol(format!(
                "unexpected greeting: {greeting}"
            )));
        }
        log::debug!("Connected to MPD: {}", greeting.trim());

        if let Some(password) = &settings.password {
            catalog.send(&format!("password {}", quote(password)))?;
            catalog.read_response()?;
        }
        Ok(catalog)
    }

    fn send(&mut self, command: &str) -> Result<(), CatalogError> {
        self.writer.write_all(command.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, CatalogError> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Err(CatalogError::Protocol(
                "connection closed by server".to_string(),
            ));
        }
        Ok(line)
    }

    /// Read response lines until the terminating `OK`; `ACK` is an error.
    fn read_response(&mut self) -> Result<Vec<String>, CatalogError> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let trimmed = line.trim_end();
            if trimmed == "OK" {
                return Ok(lines);
            }
            if let Some(ack) = trimmed.strip_prefix("ACK ") {
                return Err(CatalogError::Protocol(ack.to_string()));
            }
            lines.push(trimmed.to_string());
        }
    }
}

impl Catalog for MpdCatalog {
    fn list(&mut self) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.send("listallinfo")?;
        let lines = self.read_response()?;
        Ok(parse_entries(&lines))
    }

    fn wait_for_change(&mut self) -> Result<ChangeEvent, CatalogError> {
        self.send("idle database")?;
        self.writer
            .set_read_timeout(Some(Duration::from_secs(1)))?;

        let mut saw_change = false;
        let mut noidle_sent = false;
        let mut pending = String::new();
        let event = loop {
            match self.reader.read_line(&mut pending) {
                Ok(0) => {
                    self.writer.set_read_timeout(None)?;
                    return Err(CatalogError::Protocol(
                        "connection closed by server".to_string(),
                    ));
                }
                Ok(_) => {
                    let line = pending.trim_end().to_string();
                    pending.clear();
                    if line == "OK" {
                        break if saw_change {
                            ChangeEvent::Changed
                        } else {
                            ChangeEvent::Cancelled
                        };
                    }
                    if let Some(ack) = line.strip_prefix("ACK ") {
                        self.writer.set_read_timeout(None)?;
                        return Err(CatalogError::Protocol(ack.to_string()));
                    }
                    if line.starts_with("changed:") {
                        saw_change = true;
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    // Periodic wakeup so cancellation is observed even while
                    // the server stays silent.
                    if self.stop.load(Ordering::SeqCst) && !noidle_sent {
                        self.send("noidle")?;
                        noidle_sent = true;
                    }
                }
                Err(e) => {
                    self.writer.set_read_timeout(None)?;
                    return Err(e.into());
                }
            }
        };

        self.writer.set_read_timeout(None)?;
        Ok(event)
    }
}

/// Quote an argument for the MPD line protocol.
fn quote(arg: &str) -> String {
    let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Extract (uri, last-modified) pairs from a `listallinfo` response.
///
/// Directories and playlists carry Last-Modified lines too, so timestamps
/// only attach while the cursor is inside a `file:` block.
fn parse_entries(lines: &[String]) -> Vec<CatalogEntry> {
    let mut entries: Vec<CatalogEntry> = Vec::new();
    let mut in_file = false;

    for line in lines {
        if let Some(uri) = line.strip_prefix("file: ") {
            entries.push(CatalogEntry {
                uri: uri.to_string(),
                last_modified: 0,
            });
            in_file = true;
        } else if line.starts_with("directory: ") || line.starts_with("playlist: ") {
            in_file = false;
        } else if let Some(stamp) = line.strip_prefix("Last-Modified: ") {
            if in_file {
                if let Some(entry) = entries.last_mut() {
                    entry.last_modified = parse_timestamp(stamp);
                }
            }
        }
    }
    entries
}

/// Parse an MPD Last-Modified value (RFC 3339) into unix seconds.
fn parse_timestamp(stamp: &str) -> i64 {
    match chrono::DateTime::parse_from_rfc3339(stamp) {
        Ok(dt) => dt.timestamp(),
        Err(e) => {
            log::debug!("Unparseable Last-Modified {stamp:?}: {e}");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_entries_basic() {
        let response = lines(&[
            "file: dead/scarlet.mp3",
            "Last-Modified: 2023-01-01T00:00:05Z",
            "Title: Scarlet Begonias",
            "file: dead/fire.mp3",
            "Last-Modified: 2023-01-01T00:00:10Z",
        ]);
        let entries = parse_entries(&response);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].uri, "dead/scarlet.mp3");
        assert_eq!(entries[0].last_modified, 1672531205);
        assert_eq!(entries[1].uri, "dead/fire.mp3");
        assert_eq!(entries[1].last_modified, 1672531210);
    }

    #[test]
    fn test_parse_entries_skips_directory_timestamps() {
        let response = lines(&[
            "file: a.mp3",
            "Last-Modified: 2023-01-01T00:00:05Z",
            "directory: dead",
            "Last-Modified: 2024-06-01T00:00:00Z",
            "playlist: best-of",
            "Last-Modified: 2024-06-02T00:00:00Z",
            "file: dead/b.mp3",
            "Last-Modified: 2023-01-01T00:00:10Z",
        ]);
        let entries = parse_entries(&response);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].last_modified, 1672531205);
        assert_eq!(entries[1].last_modified, 1672531210);
    }

    #[test]
    fn test_parse_entries_missing_timestamp() {
        let entries = parse_entries(&lines(&["file: untagged.mp3"]));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].last_modified, 0);
    }

    #[test]
    fn test_parse_timestamp_garbage_is_zero() {
        assert_eq!(parse_timestamp("last tuesday"), 0);
    }

    #[test]
    fn test_split_password() {
        assert_eq!(
            split_password("secret@jukebox"),
            (Some("secret".to_string()), "jukebox".to_string())
        );
        assert_eq!(split_password("jukebox"), (None, "jukebox".to_string()));
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }
}
