mod commands;
mod terminal;

use commands::{CommandLine, Commands, plugins, report, scan};
use rekon_common::config::ScanModule;
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    logging::init(commands.verbose);

    match commands.command {
        Commands::Netscan(args) => {
            print::banner();
            scan::scan(ScanModule::Netscan, args, commands.verbose).await
        }
        Commands::Osint(args) => {
            print::banner();
            scan::scan(ScanModule::Osint, args, commands.verbose).await
        }
        Commands::Plugins {
            module,
            catalog_dir,
        } => plugins::list(module, catalog_dir.as_deref()),
        Commands::Report { dir, json } => report::report(&dir, json),
    }
}
