//! Synthetic readings for running without vehicle access.
//!
//! Both generators are slow periodic waves over wall-clock hours, shaped so the
//! two vehicles rarely sit at the same battery level.

use crate::vehicle::{Location, VehicleReading};
use chrono::{DateTime, Utc};

/// Wave parameters for one simulated vehicle
#[derive(Clone, Copy, Debug)]
pub struct MockProfile {
    pub base: f64,
    pub amplitude: f64,
    pub frequency: f64,
    pub use_cosine: bool,
    pub floor: f64,
    pub ceiling: f64,
    /// Simulated vehicles plug in below this level
    pub charging_below: f64,
    pub km_per_percent: f64,
    pub charging_rate_kw: f64,
}

pub const PRIMARY_PROFILE: MockProfile = MockProfile {
    base: 70.0,
    amplitude: 20.0,
    frequency: 1.0,
    use_cosine: false,
    floor: 20.0,
    ceiling: 90.0,
    charging_below: 40.0,
    km_per_percent: 4.5,
    charging_rate_kw: 11.0,
};

pub const SECONDARY_PROFILE: MockProfile = MockProfile {
    base: 65.0,
    amplitude: 25.0,
    frequency: 1.2,
    use_cosine: true,
    floor: 15.0,
    ceiling: 95.0,
    charging_below: 35.0,
    km_per_percent: 4.8,
    charging_rate_kw: 10.5,
};

impl MockProfile {
    /// Battery percentage at `now`, rounded to one decimal
    pub fn battery_at(&self, now: DateTime<Utc>) -> f64 {
        let hours = now.timestamp_millis() as f64 / 3_600_000.0;
        let phase = hours * self.frequency;
        let wave = if self.use_cosine { phase.cos() } else { phase.sin() };
        let battery = (self.base + wave * self.amplitude).clamp(self.floor, self.ceiling);
        (battery * 10.0).round() / 10.0
    }

    pub fn reading(&self, vehicle_id: &str, now: DateTime<Utc>) -> VehicleReading {
        let battery = self.battery_at(now);
        let is_charging = battery < self.charging_below;

        let mut reading = VehicleReading::new(vehicle_id, battery, is_charging, now);
        reading.range_km = (battery * self.km_per_percent).round();
        reading.location = Location::Home;
        reading.is_mock = true;
        reading.charging_rate_kw = is_charging.then_some(self.charging_rate_kw);
        reading
    }
}
