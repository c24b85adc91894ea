//! # Run-Once Registry
//!
//! Decides whether a plugin may be dispatched for a given context. The first
//! `allow` for a key consumes it; every later call with the same key is
//! refused.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use rekon_plugins::PluginMeta;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// `run_once` plugins: one dispatch per scan tree.
    Plugin(String),
    /// Everything else: one dispatch per target, plugin and context.
    Context {
        target: String,
        plugin: String,
        context: String,
    },
}

impl ScopeKey {
    /// The key dictated by the plugin's declared policy.
    pub fn for_dispatch(meta: &PluginMeta, target: &str, context: &str) -> Self {
        if meta.run_once {
            ScopeKey::Plugin(meta.name.clone())
        } else {
            ScopeKey::Context {
                target: target.to_string(),
                plugin: meta.name.clone(),
                context: context.to_string(),
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RunOnceRegistry {
    consumed: Mutex<HashSet<ScopeKey>>,
}

impl RunOnceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` exactly once per key.
    pub fn allow(&self, key: ScopeKey) -> bool {
        self.consumed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key)
    }

    /// Shorthand for [`ScopeKey::for_dispatch`] followed by [`allow`](Self::allow).
    pub fn allow_dispatch(&self, meta: &PluginMeta, target: &str, context: &str) -> bool {
        self.allow(ScopeKey::for_dispatch(meta, target, context))
    }

    pub fn len(&self) -> usize {
        self.consumed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rekon_common::config::ScanModule;
    use rekon_plugins::Category;

    use super::*;

    fn meta(name: &str, run_once: bool) -> PluginMeta {
        PluginMeta {
            name: name.into(),
            description: String::new(),
            categories: vec![Category::Scans],
            modules: vec![ScanModule::Netscan],
            profiles: vec![],
            service_matches: vec!["^http".into()],
            run_once,
            tls: false,
            recon_extra: false,
        }
    }

    #[test]
    fn run_once_plugins_dispatch_once_per_tree() {
        let registry = RunOnceRegistry::new();
        let nuclei = meta("Nuclei", true);

        assert!(registry.allow_dispatch(&nuclei, "10.0.0.5", "tcp/80/http"));
        assert!(!registry.allow_dispatch(&nuclei, "10.0.0.5", "tcp/8080/http"));
        assert!(!registry.allow_dispatch(&nuclei, "www.example.com", "tcp/80/http"));
    }

    #[test]
    fn other_plugins_dispatch_once_per_context() {
        let registry = RunOnceRegistry::new();
        let whatweb = meta("Whatweb", false);

        assert!(registry.allow_dispatch(&whatweb, "10.0.0.5", "tcp/80/http"));
        assert!(registry.allow_dispatch(&whatweb, "10.0.0.5", "tcp/8080/http"));
        assert!(!registry.allow_dispatch(&whatweb, "10.0.0.5", "tcp/80/http"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_callers_get_one_grant() {
        let registry = Arc::new(RunOnceRegistry::new());
        let nuclei = meta("Nuclei", true);

        let grants: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let registry = Arc::clone(&registry);
                    let nuclei = nuclei.clone();
                    s.spawn(move || {
                        registry.allow_dispatch(&nuclei, "10.0.0.5", &format!("tcp/{i}/http"))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });

        assert_eq!(grants, 1);
    }
}
