use anyhow::Result;

mod cli;
mod config;
mod runtime;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = <cli::Cli as clap::Parser>::parse();
    let config_path = match cli.config {
        Some(p) => p,
        None => config::default_config_path()?,
    };

    match cli.command.unwrap_or(cli::Command::Run {
        mode: None,
        address: None,
        port: None,
    }) {
        cli::Command::PrintConfigPath => {
            println!("{}", config_path.display());
            Ok(())
        }
        cli::Command::InitConfig { force } => {
            let cfg = dnstun_core::config::TunnelConfig::default();
            config::save(&config_path, &cfg, force)?;
            println!("Wrote default config to {}", config_path.display());
            Ok(())
        }
        cli::Command::Run {
            mode,
            address,
            port,
        } => {
            let mut cfg = config::load(&config_path)?;
            if let Some(mode) = mode {
                cfg.mode = mode;
            }
            if let Some(address) = address {
                cfg.address = address;
            }
            if let Some(port) = port {
                cfg.port = port;
            }

            // The signal handler only resolves Ctrl+C into the stop channel;
            // the engine itself never touches signals.
            let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Ctrl+C received, stopping tunnel");
                    let _ = stop_tx.send(true);
                }
            });

            runtime::run(cfg, stop_rx).await
        }
    }
}
