//! BLE GATT constants for the BLUFI provisioning service
//!
//! UUIDs of the characteristics the provisioning exchange runs over, and
//! the frame-type opcodes this tool sends. Variant firmware builds expose
//! the `ff01`/`ff02` pair; older builds expose `fff1` for writes.

/// Write characteristic (variant firmware builds)
pub const VARIANT_WRITE_UUID: &str = "0000ff01-0000-1000-8000-00805f9b34fb";

/// Write characteristic (standard builds)
pub const STANDARD_WRITE_UUID: &str = "0000fff1-0000-1000-8000-00805f9b34fb";

/// Notify characteristic carrying device responses
pub const VARIANT_NOTIFY_UUID: &str = "0000ff02-0000-1000-8000-00805f9b34fb";

/// BLUFI frame-type opcodes
pub mod frame_type {
    /// Set WiFi operating mode
    pub const OPMODE: u8 = 0x08;

    /// Set station SSID - the handler copies the payload into a fixed
    /// stack buffer without bounds checking
    pub const STA_SSID: u8 = 0x09;
}

/// Payload bytes for OPMODE frames
pub mod opmode {
    /// Station mode
    pub const STATION: u8 = 0x01;
}
