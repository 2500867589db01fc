use anyhow::Result;
use dnstun_core::config::TunnelConfig;
use tokio::sync::watch;

/// Assemble the tunnel from its configuration and run it to completion.
pub async fn run(cfg: TunnelConfig, stop: watch::Receiver<bool>) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        run_linux(cfg, stop).await
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = (cfg, stop);
        anyhow::bail!("the tunnel requires a Linux TUN device")
    }
}

#[cfg(target_os = "linux")]
async fn run_linux(cfg: TunnelConfig, stop: watch::Receiver<bool>) -> Result<()> {
    use anyhow::Context;
    use dnstun_core::config::Mode;
    use dnstun_core::engine::TunnelEngine;
    use dnstun_core::proto::PseudoDns;
    use dnstun_core::transport::TunnelSocket;
    use dnstun_core::tun::LinuxTun;
    use std::net::SocketAddr;
    use std::sync::Arc;

    tracing::info!(
        "tunnel config: mode={} address={} port={} tun='{}' mtu={} part_size={}",
        cfg.mode,
        cfg.address,
        cfg.port,
        cfg.tun_device_name,
        cfg.tun_mtu,
        cfg.part_size
    );

    let addr: SocketAddr = format!("{}:{}", cfg.address, cfg.port)
        .parse()
        .with_context(|| "address/port is not a valid socket address")?;

    let socket = match cfg.mode {
        Mode::Server => TunnelSocket::bind(addr)
            .await
            .with_context(|| format!("failed to bind UDP socket to {addr}"))?,
        Mode::Client => TunnelSocket::connect(addr)
            .await
            .with_context(|| format!("failed to connect UDP socket to {addr}"))?,
    };

    let tun = LinuxTun::create(&cfg.tun_device_name, cfg.tun_mtu)
        .with_context(|| format!("failed to create TUN device '{}'", cfg.tun_device_name))?;

    let engine = TunnelEngine::new(
        tun,
        socket,
        Arc::new(PseudoDns),
        cfg.part_size,
        cfg.peer_retry_interval,
    )
    .context("invalid fragmentation part size")?;

    engine.run(stop).await;
    Ok(())
}
