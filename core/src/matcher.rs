//! # Pattern Match Engine
//!
//! Turns one output stream of a command into [`Finding`]s while the command
//! is still running.
//!
//! Every line is tested against the plugin's patterns in declaration order.
//! The named groups of a matching pattern decide what kind of finding it
//! produces:
//!
//! * `domain` / `ipaddress` → [`Finding::DomainToIp`]. An empty address is
//!   filled in by the resolver; names that fail to resolve are logged and
//!   skipped.
//! * `port` / `service` / `version` → [`Finding::PortService`], parsed from
//!   the full nmap-style service line.
//! * anything else → [`Finding::FreeText`].
//!
//! Each finding is written to `patterns.log` the first time its
//! `(pattern, text)` pair shows up in this stream. Duplicates across streams
//! are left for the scheduler to sort out.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use rekon_common::finding::{Finding, Protocol, ServiceRecord};
use rekon_common::network::domain;
use rekon_common::tag::Tag;
use rekon_plugins::PatternSet;
use rekon_plugins::patterns::CompiledPattern;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, trace};

use crate::audit::AuditLog;
use crate::resolver::Resolver;

static NMAP_SERVICE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<port>\d+)/(?P<protocol>tcp|udp)\s+\S+\s+(?P<service>[A-Za-z0-9_.+-]+)\s*(?P<version>.*)$",
    )
    .expect("nmap service line regex should compile")
});

static TTL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:syn-ack\s+)?ttl\s+(?P<ttl>\d+)").expect("ttl regex should compile")
});

static SYN_ACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsyn-ack\b").expect("syn-ack regex should compile"));

static TUNNEL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?P<inner>[A-Za-z0-9_.+-]+)\s*").expect("tunnel token regex should compile")
});

static SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("whitespace regex should compile"));

/// A parsed nmap service line such as
/// `443/tcp open ssl/http syn-ack ttl 63 nginx 1.18.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLine {
    pub protocol: Protocol,
    pub port: u16,
    pub service: String,
    pub version: Option<String>,
    pub ttl: Option<u8>,
}

pub fn parse_service_line(line: &str) -> Option<ServiceLine> {
    let caps = NMAP_SERVICE_LINE.captures(line.trim())?;

    let port = caps["port"].parse().ok()?;
    let protocol = caps["protocol"].parse().unwrap_or_default();
    let mut service = caps["service"].to_string();
    let mut version = caps
        .name("version")
        .map_or("", |m| m.as_str())
        .trim()
        .to_string();

    // `ssl/http` splits into service `ssl` and version `/http ...`; fold
    // the tunnelled protocol back into the service name.
    if matches!(service.to_ascii_lowercase().as_str(), "ssl" | "tls")
        && let Some(token) = TUNNEL_TOKEN.captures(&version)
    {
        service = format!("{service}/{}", &token["inner"]);
        version = version[token[0].len()..].to_string();
    }

    // Out-of-range ttl text is dropped along with the rest.
    let ttl = TTL
        .captures(&version)
        .and_then(|m| m["ttl"].parse::<u8>().ok());
    version = TTL.replace_all(&version, "").into_owned();
    version = SYN_ACK.replace_all(&version, "").into_owned();

    // nmap marks unsure guesses as `http?`; the `?` lands in the version.
    let version = version.trim().trim_start_matches('?');
    let version = SPACES.replace_all(version.trim(), " ").into_owned();

    Some(ServiceLine {
        protocol,
        port,
        service,
        version: (!version.is_empty()).then_some(version),
        ttl,
    })
}

/// Everything needed to match one command's output. Cheap to clone; one
/// clone per stream.
#[derive(Clone)]
pub struct PatternMatcher {
    patterns: Arc<PatternSet>,
    tag: Tag,
    audit: Arc<AuditLog>,
    resolver: Arc<dyn Resolver>,
    base_domain: Option<String>,
}

impl PatternMatcher {
    pub fn new(
        patterns: Arc<PatternSet>,
        tag: Tag,
        audit: Arc<AuditLog>,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        Self {
            patterns,
            tag,
            audit,
            resolver,
            base_domain: None,
        }
    }

    /// Discovered names outside `base` are ignored.
    pub fn with_base_domain(mut self, base: Option<String>) -> Self {
        self.base_domain = base;
        self
    }

    /// Binds the matcher to one stream.
    pub fn stream<R>(self, reader: R) -> FindingStream<R>
    where
        R: AsyncBufRead + Unpin,
    {
        FindingStream {
            matcher: self,
            reader,
            buf: Vec::new(),
            seen: HashSet::new(),
            resolved: HashMap::new(),
            queue: VecDeque::new(),
            eof: false,
        }
    }

    /// Drains `reader` and returns every finding in order.
    pub async fn match_stream<R>(self, reader: R) -> Vec<Finding>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut stream = self.stream(reader);
        let mut findings = Vec::new();
        while let Some(finding) = stream.next().await {
            findings.push(finding);
        }
        findings
    }
}

/// Lazy sequence of findings for a single stream.
///
/// Lines are only read when the queue runs dry. Once the underlying reader
/// hits EOF (or fails) the sequence is over.
pub struct FindingStream<R> {
    matcher: PatternMatcher,
    reader: R,
    buf: Vec<u8>,
    seen: HashSet<(usize, String)>,
    resolved: HashMap<String, Option<IpAddr>>,
    queue: VecDeque<Finding>,
    eof: bool,
}

impl<R> FindingStream<R>
where
    R: AsyncBufRead + Unpin,
{
    pub async fn next(&mut self) -> Option<Finding> {
        loop {
            if let Some(finding) = self.queue.pop_front() {
                return Some(finding);
            }
            if self.eof {
                return None;
            }

            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) => self.eof = true,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&self.buf).trim().to_string();
                    if !line.is_empty() {
                        self.process_line(&line).await;
                    }
                }
                Err(e) => {
                    error!("Failed to read output of {}: {e}", self.matcher.tag);
                    self.eof = true;
                }
            }
        }
    }

    async fn process_line(&mut self, line: &str) {
        trace!("[{}] {line}", self.matcher.tag);

        let patterns = Arc::clone(&self.matcher.patterns);
        for (index, pattern) in patterns.iter() {
            let Some(caps) = pattern.regex.captures(line) else {
                continue;
            };

            let finding = if pattern.has_group("domain") || pattern.has_group("ipaddress") {
                self.domain_finding(&caps).await
            } else if ["port", "service", "version"]
                .iter()
                .any(|group| pattern.has_group(group))
            {
                service_finding(line, &caps)
            } else {
                Some(free_text(pattern, &caps))
            };

            if let Some(finding) = finding {
                self.emit(index, pattern, finding);
            }
        }
    }

    fn emit(&mut self, index: usize, pattern: &CompiledPattern, finding: Finding) {
        let text = finding.audit_text();
        if !self.seen.insert((index, text.clone())) {
            return;
        }

        self.matcher
            .audit
            .pattern(&self.matcher.tag, &pattern.label, &text);
        self.queue.push_back(finding);
    }

    async fn domain_finding(&mut self, caps: &Captures<'_>) -> Option<Finding> {
        let name = domain::normalize_name(caps.name("domain")?.as_str())?;

        if domain::is_reverse_zone(&name) {
            return None;
        }
        if let Some(base) = &self.matcher.base_domain
            && !domain::in_scope(&name, base)
        {
            return None;
        }

        let captured_ip = caps
            .name("ipaddress")
            .and_then(|m| m.as_str().trim().parse::<IpAddr>().ok());

        let ip = match captured_ip {
            Some(ip) => ip,
            None => self.resolve(&name).await?,
        };

        Some(Finding::DomainToIp { domain: name, ip })
    }

    /// Resolves each name at most once per stream.
    async fn resolve(&mut self, name: &str) -> Option<IpAddr> {
        if let Some(cached) = self.resolved.get(name) {
            return *cached;
        }

        let answer = match self.matcher.resolver.resolve(name).await {
            Ok(ip) => Some(ip),
            Err(e) => {
                error!("{e}");
                self.matcher.audit.error(&self.matcher.tag, &e);
                None
            }
        };

        self.resolved.insert(name.to_string(), answer);
        answer
    }
}

fn service_finding(line: &str, caps: &Captures<'_>) -> Option<Finding> {
    let protocol = caps
        .name("protocol")
        .and_then(|m| m.as_str().parse().ok());

    let record = match parse_service_line(line) {
        Some(parsed) => ServiceRecord {
            protocol: protocol.unwrap_or(parsed.protocol),
            port: parsed.port,
            service: parsed.service,
            version: parsed.version,
            ttl: parsed.ttl,
        },
        // Not an nmap line (e.g. masscan): take what the pattern captured.
        None => ServiceRecord {
            protocol: protocol.unwrap_or_default(),
            port: caps.name("port")?.as_str().parse().ok()?,
            service: caps
                .name("service")
                .map_or("unknown", |m| m.as_str())
                .to_string(),
            version: caps
                .name("version")
                .map(|m| m.as_str().trim().to_string())
                .filter(|v| !v.is_empty()),
            ttl: None,
        },
    };

    Some(Finding::PortService(record))
}

fn free_text(pattern: &CompiledPattern, caps: &Captures<'_>) -> Finding {
    let matched = caps
        .get(0)
        .map_or("", |m| m.as_str())
        .trim()
        .trim_matches('"')
        .to_string();

    Finding::FreeText {
        description: pattern.label.clone(),
        matched,
    }
}
