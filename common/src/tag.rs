use std::fmt;

use serde::Serialize;

/// Identity of one task: ordered labels, phase first, then plugin name,
/// then whatever scan context tells sibling tasks apart.
///
/// Rendered with `:` between labels; the audit logs depend on that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Tag {
    labels: Vec<String>,
}

impl Tag {
    pub fn new(phase: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            labels: vec![phase.into(), plugin.into()],
        }
    }

    /// Appends one more context label.
    pub fn with(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn phase(&self) -> &str {
        &self.labels[0]
    }

    pub fn plugin(&self) -> &str {
        &self.labels[1]
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.labels.join(":"))
    }
}
