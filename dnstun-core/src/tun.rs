//! Virtual Layer-3 interface contract.
//!
//! The engine consumes a TUN device only through this trait, so tests can
//! substitute an in-memory implementation. The real device lives in the
//! Linux-only [`linux`] submodule.

use std::future::Future;
use std::io;

#[cfg(target_os = "linux")]
pub mod linux;

/// A tunnel device carrying raw IP packets.
pub trait TunInterface: Send + Sync + 'static {
    /// Read one packet from the interface into `buf`, returning its length.
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Write one packet to the interface.
    fn send(&self, buf: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// MTU of the device; bounds the uplink read buffer.
    fn mtu(&self) -> usize;

    /// Name of the device.
    fn name(&self) -> &str;
}

#[cfg(target_os = "linux")]
pub use linux::LinuxTun;
