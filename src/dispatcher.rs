use std::collections::HashMap;

use log::{debug, info, trace, warn};
use mac_address::MacAddress;

use crate::advertisement::AdvertisingRecord;
use crate::config::{BleDevice, Role};
use crate::decoder::{self, Decoded};
use crate::presence::{PresenceTracker, Timestamp, Transition};
use crate::sink::ReportSink;

/// Known addresses and what they are used for.
#[derive(Debug, Default, Clone)]
pub struct RoleMap {
    roles: HashMap<MacAddress, Role>,
}

impl RoleMap {
    pub fn from_devices(devices: &[BleDevice]) -> Self {
        let mut map = RoleMap::default();
        for device in devices {
            info!(
                "Tracking {} ({}) as {:?}",
                device.name, device.address, device.role
            );
            map.insert(device.address, device.role);
        }
        if !map.has(Role::Beacon) {
            warn!("No beacon configured, the lock will never open");
        }
        if !map.has(Role::Sensor) {
            warn!("No sensor configured, no readings will be reported");
        }
        map
    }

    pub fn insert(&mut self, address: MacAddress, role: Role) {
        self.roles.insert(address, role);
    }

    pub fn role_of(&self, address: &MacAddress) -> Option<Role> {
        self.roles.get(address).copied()
    }

    fn has(&self, role: Role) -> bool {
        self.roles.values().any(|r| *r == role)
    }
}

/// Routes advertising records to the presence tracker and the sensor decoder
/// and hands the results to the sink.
pub struct Dispatcher<S: ReportSink> {
    roles: RoleMap,
    tracker: PresenceTracker,
    sink: S,
    forward_combined: bool,
}

impl<S: ReportSink> Dispatcher<S> {
    pub fn new(roles: RoleMap, tracker: PresenceTracker, sink: S) -> Self {
        Dispatcher {
            roles,
            tracker,
            sink,
            forward_combined: false,
        }
    }

    /// Also report frames that are not forwarded by default.
    pub fn with_forward_combined(mut self, forward_combined: bool) -> Self {
        self.forward_combined = forward_combined;
        self
    }

    pub fn dispatch(&mut self, record: &AdvertisingRecord) {
        self.dispatch_at(record, Timestamp::now());
    }

    pub fn dispatch_at(&mut self, record: &AdvertisingRecord, now: Timestamp) {
        let role = self.roles.role_of(&record.address);
        if role.is_some() {
            debug!(
                "{} - RSSI {} ({:?}, event {:#04x}, address type {})",
                record.address_string(),
                record.rssi,
                role,
                record.event_type,
                record.address_type
            );
        }

        if role == Some(Role::Sensor) {
            self.decode_sensor(record);
        }

        let transition = self.tracker.observe(role == Some(Role::Beacon), now);
        self.forward_transition(transition);
    }

    /// Re-evaluates the presence window without a new record.
    pub fn tick(&mut self, now: Timestamp) {
        let transition = self.tracker.observe(false, now);
        self.forward_transition(transition);
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[cfg(test)]
    pub fn tracker(&self) -> &PresenceTracker {
        &self.tracker
    }

    fn decode_sensor(&mut self, record: &AdvertisingRecord) {
        match decoder::decode(&record.payload, record.length()) {
            Ok(Decoded::Frame {
                sub_type,
                forwarded,
                readings,
            }) => {
                if !forwarded && !self.forward_combined {
                    debug!("Sub-type {:#04x} not forwarded: {:?}", sub_type, readings);
                    return;
                }
                for reading in readings {
                    let value = reading.value.to_string();
                    debug!("{} = {}", reading.kind.name(), value);
                    self.sink.report(reading.kind.name(), &value);
                }
            }
            Ok(Decoded::Skip) => {
                trace!("Skipping frame from {}", record.address_string());
            }
            Err(err) => {
                debug!(
                    "Dropping frame from {}: {}",
                    record.address_string(),
                    err
                );
            }
        }
    }

    fn forward_transition(&mut self, transition: Option<Transition>) {
        if let Some(Transition { to }) = transition {
            info!("STATUS: {:?}", to);
            self.sink.report("lock", to.report_value());
        }
    }
}
