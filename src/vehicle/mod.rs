use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Where a vehicle was when the reading was taken
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Home,
    Away,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Home => "home",
            Location::Away => "away",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("home") {
            Location::Home
        } else {
            Location::Away
        }
    }
}

/// Battery snapshot for one vehicle, produced by a vehicle source once per poll
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VehicleReading {
    /// Stable vehicle identifier (e.g., "Tesla Model Y")
    pub vehicle_id: String,

    /// State of charge, clamped to 0..=100 by the producing source
    pub battery_percent: f64,

    /// Whether the vehicle is currently drawing charge
    pub is_charging: bool,

    /// When the source observed this state
    pub observed_at: DateTime<Utc>,

    /// Estimated remaining range
    pub range_km: f64,

    pub location: Location,

    /// True when the reading was fabricated by a mock generator
    #[serde(default)]
    pub is_mock: bool,

    /// Charger power while charging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charging_rate_kw: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    /// Reverse-geocoded street address, if resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl VehicleReading {
    /// Minimal reading with the fields the decision engine looks at.
    pub fn new(
        vehicle_id: impl Into<String>,
        battery_percent: f64,
        is_charging: bool,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            battery_percent,
            is_charging,
            observed_at,
            range_km: 0.0,
            location: Location::Home,
            is_mock: false,
            charging_rate_kw: None,
            latitude: None,
            longitude: None,
            address: None,
        }
    }

    /// Age of the reading relative to `now` (never negative)
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        let age = now - self.observed_at;
        if age < Duration::zero() {
            Duration::zero()
        } else {
            age
        }
    }

    /// True if the reading is older than `max_age`
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) > max_age
    }

    pub fn is_home(&self) -> bool {
        self.location == Location::Home
    }
}

/// Clamp a raw state-of-charge value to 0..=100.
///
/// Sources apply this before handing readings on; the decision engine never does.
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}
