//! Linux TUN device backed by `tun-rs`.
//!
//! Creating the device requires root privileges, the `tun` kernel module,
//! and access to `/dev/net/tun`.

use std::io;

use tun_rs::DeviceBuilder;

use super::TunInterface;

/// A Linux TUN device.
pub struct LinuxTun {
    name: String,
    mtu: usize,
    device: tun_rs::AsyncDevice,
}

impl LinuxTun {
    /// Create a TUN device named `name` with the given MTU.
    pub fn create(name: &str, mtu: usize) -> io::Result<Self> {
        let mtu_u16 = u16::try_from(mtu)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "MTU must fit in u16"))?;

        let device = DeviceBuilder::new()
            .name(name)
            .mtu(mtu_u16)
            .build_async()
            .map_err(|e| {
                io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("failed to create TUN device (root privileges required): {e}"),
                )
            })?;

        let actual_name = device
            .name()
            .map_err(|e| io::Error::other(format!("failed to get device name: {e}")))?;

        tracing::info!("created TUN device '{actual_name}' with MTU {mtu}");

        Ok(Self {
            name: actual_name,
            mtu,
            device,
        })
    }
}

impl TunInterface for LinuxTun {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.device.recv(buf).await
    }

    async fn send(&self, buf: &[u8]) -> io::Result<()> {
        self.device.send(buf).await.map(|_| ())
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn name(&self) -> &str {
        &self.name
    }
}
