//! Service name classification applied before plugin matching.

/// Names port scanners print when they could not fingerprint a service.
const WRAPPED_INDICATORS: &[&str] = &["tcpwrapped", "unknown"];

/// Well-known services, used only for wrapped/unknown reports.
const PORT_GUESSES: &[(u16, &str)] = &[
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "domain"),
    (80, "http"),
    (110, "pop3"),
    (111, "rpcbind"),
    (135, "msrpc"),
    (139, "netbios-ssn"),
    (143, "imap"),
    (389, "ldap"),
    (443, "ssl/https"),
    (445, "microsoft-ds"),
    (636, "ssl/ldap"),
    (993, "ssl/imap"),
    (995, "ssl/pop3"),
    (1433, "ms-sql-s"),
    (1521, "oracle"),
    (3306, "mysql"),
    (3389, "ms-wbt-server"),
    (5432, "postgresql"),
    (5900, "vnc"),
    (6379, "redis"),
    (8080, "http-proxy"),
    (8443, "ssl/https"),
    (27017, "mongod"),
];

pub fn guess_service(port: u16) -> Option<&'static str> {
    PORT_GUESSES
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, service)| *service)
}

/// Replaces a wrapped/unknown indicator with the guess for `port`.
/// Anything else, including an indicator on an unlisted port, is returned
/// unchanged.
pub fn resolve_wrapped(service: &str, port: u16) -> String {
    let bare = service.trim_end_matches('?');
    if WRAPPED_INDICATORS.contains(&bare)
        && let Some(guess) = guess_service(port)
    {
        return guess.to_string();
    }
    service.to_string()
}

/// A service name ready for plugin matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceView {
    pub name: String,
    /// Eligible for TLS-specific plugins.
    pub tls: bool,
}

/// Resolves wrapped indicators, then unwraps `ssl/` and `tls/` prefixes.
///
/// `ssl/http` becomes `https` so URL templates pick the right scheme.
pub fn classify(service: &str, port: u16) -> ServiceView {
    let resolved = resolve_wrapped(service, port).to_ascii_lowercase();
    let resolved = resolved.trim_end_matches('?');

    if let Some(inner) = resolved
        .strip_prefix("ssl/")
        .or_else(|| resolved.strip_prefix("tls/"))
    {
        let name = if inner == "http" { "https" } else { inner };
        return ServiceView {
            name: name.to_string(),
            tls: true,
        };
    }

    ServiceView {
        name: resolved.to_string(),
        tls: matches!(resolved, "https" | "ssl" | "tls"),
    }
}
