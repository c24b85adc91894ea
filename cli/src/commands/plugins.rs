use std::path::Path;

use colored::*;
use rekon_common::config::ScanModule;
use rekon_plugins::catalog;

use crate::terminal::{colors, print};

pub fn list(module: Option<ScanModule>, catalog_dir: Option<&Path>) -> anyhow::Result<()> {
    let catalogs = catalog::load(catalog_dir)?;
    let modules = match module {
        Some(module) => vec![module],
        None => vec![ScanModule::Netscan, ScanModule::Osint],
    };

    for module in modules {
        print::header(&format!("{module} plugins"));
        let plugins: Vec<_> = catalogs.plugins.for_module(module).collect();
        print::set_key_width(plugins.iter().map(|p| p.meta().name.as_str()));

        for plugin in plugins {
            let meta = plugin.meta();
            let categories: Vec<&str> = meta.categories.iter().map(|c| c.as_str()).collect();
            let mut value = format!(
                "{} {}",
                format!("[{}]", categories.join(",")).color(colors::ACCENT),
                meta.description
            );
            if meta.run_once {
                value = format!("{value} {}", "(once)".bright_black());
            }
            print::aligned_line(&meta.name, value);
        }
    }

    print::end_of_program();
    Ok(())
}
