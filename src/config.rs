use mac_address::MacAddress;
use serde_derive::Deserialize;

/// Presence window used when `[presence]` does not override it.
pub const DEFAULT_WINDOW_MICROS: u64 = 5_000_000;
pub const DEFAULT_TICK_MILLIS: u64 = 1000;

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub devices: Option<Vec<BleDevice>>,
    pub presence: Option<PresenceConfig>,
    pub sensor: Option<SensorConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub publisher_id: Option<String>,
    pub topic_path: Option<String>,
    pub keep_alive_seconds: Option<u64>,
}

/// What a known address is used for.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sightings keep the lock open.
    Beacon,
    /// Advertises measurements in its service data.
    Sensor,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BleDevice {
    pub address: MacAddress,
    pub name: String,
    pub role: Role,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct PresenceConfig {
    pub window_micros: Option<u64>,
    pub tick_millis: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct SensorConfig {
    /// Also report the combined temperature/humidity frame (sub-type 0x0D).
    pub forward_combined: Option<bool>,
}

impl AppConfig {
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::de::from_str(contents)
    }

    pub fn devices(&self) -> &[BleDevice] {
        self.devices.as_deref().unwrap_or_default()
    }

    pub fn window_micros(&self) -> u64 {
        self.presence
            .as_ref()
            .and_then(|p| p.window_micros)
            .unwrap_or(DEFAULT_WINDOW_MICROS)
    }

    pub fn tick_millis(&self) -> u64 {
        self.presence
            .as_ref()
            .and_then(|p| p.tick_millis)
            .unwrap_or(DEFAULT_TICK_MILLIS)
    }

    pub fn forward_combined(&self) -> bool {
        self.sensor
            .as_ref()
            .and_then(|s| s.forward_combined)
            .unwrap_or(false)
    }
}
