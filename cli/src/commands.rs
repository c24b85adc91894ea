pub mod plugins;
pub mod report;
pub mod scan;

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use rekon_common::config::{
    Config, DEFAULT_CONCURRENT_SCANS, DEFAULT_CONCURRENT_TARGETS, Profile, ScanModule,
};

#[derive(Parser)]
#[command(name = "rekon", version)]
#[command(about = "Discovery-driven reconnaissance scheduler.")]
pub struct CommandLine {
    /// Show debug output (-v) or every line of command output (-vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Port scan targets and enumerate every service found
    #[command(alias = "n")]
    Netscan(ScanArgs),
    /// Enumerate names, addresses and metadata of domains or IPs
    #[command(alias = "o")]
    Osint(ScanArgs),
    /// List the plugins of the catalog
    #[command(alias = "p")]
    Plugins {
        /// Only plugins supporting this module
        #[arg(short, long)]
        module: Option<ScanModule>,
        /// Directory holding plugins.toml and patterns.toml
        #[arg(long)]
        catalog_dir: Option<PathBuf>,
    },
    /// Summarize the pattern logs of a previous run
    #[command(alias = "r")]
    Report {
        /// Output directory of the run
        dir: PathBuf,
        /// Print JSON instead of a tree
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// IPs, ranges, CIDR blocks, domains, or files with one target per line
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Root output directory [default: recon for netscan, osint for osint]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Port scan profile
    #[arg(long, default_value = "default")]
    pub profile: Profile,

    /// Seed only plugins whose name contains this text
    #[arg(short = 'P', long = "plugin")]
    pub plugin: Option<String>,

    /// Run the seed plugins only, without follow-up scans
    #[arg(long, visible_alias = "only-portscan")]
    pub only_recon: bool,

    /// Create only scans/ and logs/ below each target directory
    #[arg(long)]
    pub only_scans_dir: bool,

    /// Targets scanned in parallel
    #[arg(short = 't', long, default_value_t = DEFAULT_CONCURRENT_TARGETS)]
    pub concurrent_targets: usize,

    /// Commands running in parallel inside one target
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENT_SCANS)]
    pub concurrent_scans: usize,

    /// Seconds a terminated command gets before it is killed
    #[arg(long, default_value_t = 3)]
    pub grace_period: u64,

    /// Do not listen for 'q' on the terminal
    #[arg(long)]
    pub no_input: bool,

    /// Directory holding plugins.toml and patterns.toml
    #[arg(long)]
    pub catalog_dir: Option<PathBuf>,
}

impl ScanArgs {
    /// Splits the arguments into the immutable run configuration and the
    /// raw target inputs.
    pub fn into_config(self, module: ScanModule, verbose: u8) -> (Config, Vec<String>) {
        let config = Config {
            output_dir: self
                .output
                .unwrap_or_else(|| PathBuf::from(module.default_output_dir())),
            concurrent_targets: self.concurrent_targets,
            concurrent_scans: self.concurrent_scans,
            profile: self.profile,
            plugin_filter: self.plugin,
            only_recon: self.only_recon,
            only_scans_dir: self.only_scans_dir,
            verbose,
            grace_period: Duration::from_secs(self.grace_period),
            disable_input: self.no_input,
            catalog_dir: self.catalog_dir,
        };

        (config, self.targets)
    }
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
