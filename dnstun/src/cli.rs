use clap::{Parser, Subcommand};
use dnstun_core::config::Mode;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "dnstun",
    version,
    about = "IP tunnel disguised as DNS-like datagrams"
)]
pub struct Cli {
    /// Path to config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the tunnel in the foreground
    Run {
        /// Override the configured mode (server or client)
        #[arg(long)]
        mode: Option<Mode>,

        /// Override the configured bind/peer address
        #[arg(long)]
        address: Option<String>,

        /// Override the configured UDP port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Write a default config file (does not overwrite unless --force)
    InitConfig {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Print the resolved config file path
    PrintConfigPath,
}
