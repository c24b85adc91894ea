use anyhow::Context;
use async_trait::async_trait;

use crate::catalog::PluginDef;
use crate::plugin::{Invocation, Plugin, PluginMeta};

/// A plugin defined entirely by catalog data: metadata plus a command template.
#[derive(Debug, Clone)]
pub struct CommandPlugin {
    meta: PluginMeta,
    template: String,
}

impl CommandPlugin {
    pub fn new(meta: PluginMeta, template: impl Into<String>) -> Self {
        Self {
            meta,
            template: template.into(),
        }
    }

    pub fn from_def(def: PluginDef) -> Self {
        let meta = def.meta();
        Self::new(meta, def.command)
    }
}

#[async_trait]
impl Plugin for CommandPlugin {
    fn describe(&self) -> &PluginMeta {
        &self.meta
    }

    async fn command(&self, invocation: &Invocation) -> anyhow::Result<String> {
        let scans_dir = invocation.output_dir.join("scans");
        tokio::fs::create_dir_all(&scans_dir)
            .await
            .with_context(|| format!("failed to create {}", scans_dir.display()))?;

        Ok(render(&self.template, invocation))
    }
}

/// Fills `{target}`, `{output}`, `{protocol}`, `{port}` and `{service}`.
///
/// Unknown placeholders, and service placeholders of an invocation without
/// a service, are left verbatim so shell snippets like `awk '{print $1}'`
/// survive untouched.
pub fn render(template: &str, invocation: &Invocation) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let value = after
            .find('}')
            .and_then(|close| lookup(&after[..close], invocation).map(|v| (close, v)));

        match value {
            Some((close, value)) => {
                out.push_str(&value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn lookup(key: &str, invocation: &Invocation) -> Option<String> {
    let service = invocation.service.as_ref();
    match key {
        "target" => Some(invocation.target.clone()),
        "output" => Some(invocation.output_dir.display().to_string()),
        "protocol" => service.map(|s| s.protocol.to_string()),
        "port" => service.map(|s| s.port.to_string()),
        "service" => service.map(|s| s.service.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rekon_common::config::ScanModule;
    use rekon_common::finding::Protocol;
    use rekon_common::tag::Tag;

    use super::*;
    use crate::plugin::{Category, ServiceContext};

    fn invocation(service: Option<ServiceContext>) -> Invocation {
        Invocation {
            target: "10.0.0.5".into(),
            output_dir: PathBuf::from("/tmp/recon/10.0.0.5"),
            tag: Tag::new("scans", "Whatweb"),
            module: ScanModule::Netscan,
            service,
        }
    }

    #[test]
    fn renders_service_placeholders() {
        let inv = invocation(Some(ServiceContext {
            protocol: Protocol::Tcp,
            port: 443,
            service: "https".into(),
        }));

        assert_eq!(
            render(
                "whatweb {service}://{target}:{port} | tee {output}/scans/{protocol}_{port}_{service}_whatweb.ansi",
                &inv
            ),
            "whatweb https://10.0.0.5:443 | tee /tmp/recon/10.0.0.5/scans/tcp_443_https_whatweb.ansi"
        );
    }

    #[test]
    fn leaves_unknown_placeholders_alone() {
        let inv = invocation(None);

        assert_eq!(
            render("dig {target} | awk '{print $1}' {port} {", &inv),
            "dig 10.0.0.5 | awk '{print $1}' {port} {"
        );
    }

    #[tokio::test]
    async fn command_creates_scans_dir() {
        let dir = tempfile::tempdir().unwrap();
        let meta = PluginMeta {
            name: "Echo".into(),
            description: String::new(),
            categories: vec![Category::Portscan],
            modules: vec![ScanModule::Netscan],
            profiles: vec![],
            service_matches: vec![],
            run_once: true,
            tls: false,
            recon_extra: false,
        };
        let plugin = CommandPlugin::new(meta, "echo {target} > {output}/scans/echo.txt");

        let mut inv = invocation(None);
        inv.output_dir = dir.path().to_path_buf();

        let cmd = plugin.command(&inv).await.unwrap();
        assert!(dir.path().join("scans").is_dir());
        assert!(cmd.starts_with("echo 10.0.0.5 > "));
    }
}
