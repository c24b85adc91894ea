//! # Audit Logs
//!
//! Append-only, line-oriented records under `<target>/logs/`. Report tooling
//! parses these files, so the layout of each line is fixed:
//!
//! ```text
//! commands.log  [*] [<timestamp>]:<tag>:<command>
//! patterns.log  [*] [<timestamp>]:<tag>:<description>:<matched-text>
//! error.log     [-] [<timestamp>]:<tag>:Error:<detail>
//! scanner.log   [*] [<timestamp>]:<tag>:<message>
//! ```
//!
//! The tag's labels are joined with `:`.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use rekon_common::tag::Tag;
use serde::Serialize;
use tracing::warn;

pub const COMMANDS_LOG: &str = "commands.log";
pub const PATTERNS_LOG: &str = "patterns.log";
pub const ERROR_LOG: &str = "error.log";
pub const SCANNER_LOG: &str = "scanner.log";

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d:%H.%M.%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    Command,
    Pattern { description: String },
    Error,
    Info,
}

impl RecordKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            RecordKind::Command => COMMANDS_LOG,
            RecordKind::Pattern { .. } => PATTERNS_LOG,
            RecordKind::Error => ERROR_LOG,
            RecordKind::Info => SCANNER_LOG,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub timestamp: DateTime<Local>,
    pub tag: Tag,
    pub kind: RecordKind,
    pub payload: String,
}

impl AuditRecord {
    pub fn new(tag: &Tag, kind: RecordKind, payload: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            tag: tag.clone(),
            kind,
            payload: payload.into(),
        }
    }
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.kind {
            RecordKind::Error => "[-]",
            _ => "[*]",
        };
        write!(
            f,
            "{marker} [{}]:{}:",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.tag
        )?;

        // One record, one line.
        let payload = self.payload.replace(['\r', '\n'], " ");
        match &self.kind {
            RecordKind::Command | RecordKind::Info => f.write_str(&payload),
            RecordKind::Pattern { description } => write!(f, "{description}:{payload}"),
            RecordKind::Error => write!(f, "Error:{payload}"),
        }
    }
}

/// Writer for one target's `logs/` directory.
#[derive(Debug)]
pub struct AuditLog {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    /// Creates `dir` if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: &RecordKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    pub fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(&record.kind))?;

        // Other targets may append to the same file; one write per line.
        let line = format!("{record}\n");
        file.write_all(line.as_bytes())
    }

    pub fn command(&self, tag: &Tag, command: &str) {
        self.write(AuditRecord::new(tag, RecordKind::Command, command));
    }

    pub fn pattern(&self, tag: &Tag, description: &str, matched: &str) {
        let kind = RecordKind::Pattern {
            description: description.to_string(),
        };
        self.write(AuditRecord::new(tag, kind, matched));
    }

    pub fn error(&self, tag: &Tag, detail: impl fmt::Display) {
        self.write(AuditRecord::new(tag, RecordKind::Error, detail.to_string()));
    }

    pub fn info(&self, tag: &Tag, message: impl fmt::Display) {
        self.write(AuditRecord::new(tag, RecordKind::Info, message.to_string()));
    }

    fn write(&self, record: AuditRecord) {
        if let Err(e) = self.append(&record) {
            warn!(
                "Failed to write {}: {e}",
                self.path(&record.kind).display()
            );
        }
    }
}

/// One parsed `patterns.log` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternEntry {
    pub timestamp: String,
    pub phase: String,
    pub plugin: String,
    /// Everything after the plugin label: scan context, description, match.
    pub detail: String,
}

impl PatternEntry {
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix("[*] [")?;
        let (timestamp, rest) = rest.split_once("]:")?;

        let mut parts = rest.splitn(3, ':');
        let phase = parts.next()?;
        let plugin = parts.next()?;
        let detail = parts.next()?;

        if phase.is_empty() || plugin.is_empty() {
            return None;
        }

        Some(Self {
            timestamp: timestamp.to_string(),
            phase: phase.to_string(),
            plugin: plugin.to_string(),
            detail: detail.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(log: &AuditLog, kind: &RecordKind) -> Vec<String> {
        std::fs::read_to_string(log.path(kind))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn writes_each_kind_to_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("logs")).unwrap();
        let tag = Tag::new("portscan", "NmapTCPTop1000").with("10.0.0.5");

        log.command(&tag, "nmap -sV 10.0.0.5");
        log.pattern(&tag, "portscan", "tcp/80/http");
        log.error(&tag, 1);
        log.info(&tag, "started");

        let commands = read(&log, &RecordKind::Command);
        assert_eq!(commands.len(), 1);
        assert!(commands[0].starts_with("[*] ["));
        assert!(commands[0].ends_with("]:portscan:NmapTCPTop1000:10.0.0.5:nmap -sV 10.0.0.5"));

        let patterns = read(&log, &RecordKind::Pattern { description: String::new() });
        assert!(patterns[0].ends_with(":portscan:NmapTCPTop1000:10.0.0.5:portscan:tcp/80/http"));

        let errors = read(&log, &RecordKind::Error);
        assert!(errors[0].starts_with("[-] ["));
        assert!(errors[0].ends_with(":portscan:NmapTCPTop1000:10.0.0.5:Error:1"));

        assert_eq!(read(&log, &RecordKind::Info).len(), 1);
    }

    #[test]
    fn concurrent_writers_never_split_lines() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let log = AuditLog::open(&logs).unwrap();
                scope.spawn(move || {
                    let tag = Tag::new("discover", "SubFinder")
                        .with(format!("host{worker}.example.com"));
                    for i in 0..2000 {
                        let matched = format!("www{i}.example.com => 10.0.0.{worker}");
                        log.pattern(&tag, "domain2ip", &matched);
                    }
                });
            }
        });

        let log = AuditLog::open(&logs).unwrap();
        let lines = read(&log, &RecordKind::Pattern { description: String::new() });
        assert_eq!(lines.len(), 8000);
        assert!(lines.iter().all(|line| PatternEntry::parse(line).is_some()));
        assert!(lines.iter().all(|line| line.matches(" => ").count() == 1));
    }

    #[test]
    fn timestamp_layout() {
        let tag = Tag::new("scans", "Whatweb");
        let record = AuditRecord::new(&tag, RecordKind::Command, "whatweb\nhttp://x");
        let line = record.to_string();

        // [*] [YYYYMMDD:HH.MM.SS]:...
        let stamp = &line[5..22];
        assert_eq!(stamp.len(), 17);
        assert_eq!(&stamp[8..9], ":");
        assert_eq!(&stamp[11..12], ".");
        assert!(line.ends_with(":scans:Whatweb:whatweb http://x"));
    }

    #[test]
    fn parses_pattern_lines() {
        let entry = PatternEntry::parse(
            "[*] [20250101:12.30.00]:scans:Whatweb:tcp/80/http:10.0.0.5:webtech:HTTPServer[nginx]",
        )
        .unwrap();

        assert_eq!(entry.timestamp, "20250101:12.30.00");
        assert_eq!(entry.phase, "scans");
        assert_eq!(entry.plugin, "Whatweb");
        assert_eq!(entry.detail, "tcp/80/http:10.0.0.5:webtech:HTTPServer[nginx]");

        assert_eq!(PatternEntry::parse("garbage"), None);
        assert_eq!(PatternEntry::parse("[-] [20250101:12.30.00]:a:b:Error:1"), None);
    }
}
