use super::mock::SECONDARY_PROFILE;
use super::{SourceResult, VehicleSource};
use crate::config::IoniqConfig;
use crate::vehicle::VehicleReading;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

pub const VEHICLE_NAME: &str = "Hyundai Ioniq 5";

/// Secondary vehicle. There is no live integration yet, so readings always
/// come from [`SECONDARY_PROFILE`].
pub struct IoniqSource;

impl IoniqSource {
    pub fn new(config: &IoniqConfig) -> Self {
        if !config.mock_mode {
            warn!(vehicle = VEHICLE_NAME, "Live integration not available, using mock mode");
        }
        Self
    }
}

#[async_trait]
impl VehicleSource for IoniqSource {
    fn name(&self) -> &str {
        VEHICLE_NAME
    }

    fn is_mock(&self) -> bool {
        true
    }

    async fn authenticate(&self) -> SourceResult<()> {
        debug!(vehicle = VEHICLE_NAME, "Mock mode, no authentication needed");
        Ok(())
    }

    async fn get_status(&self) -> SourceResult<VehicleReading> {
        let reading = SECONDARY_PROFILE.reading(VEHICLE_NAME, Utc::now());
        debug!(
            vehicle = VEHICLE_NAME,
            battery = reading.battery_percent,
            range_km = reading.range_km,
            "Mock reading"
        );
        Ok(reading)
    }

    async fn close(&self) {
        info!(vehicle = VEHICLE_NAME, "Source closed");
    }
}
