//! Cloud vehicle API source.
//!
//! Live mode talks to the owner API (`/api/1/vehicles`), with readings cached
//! for `cache_ttl_seconds`. Mock mode serves [`mock::PRIMARY_PROFILE`].

use super::mock::PRIMARY_PROFILE;
use super::{SourceError, SourceResult, TokenManager, VehicleSource};
use crate::config::TeslaConfig;
use crate::geocoding;
use crate::vehicle::{clamp_percent, Location, VehicleReading};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const VEHICLE_NAME: &str = "Tesla Model Y";

const MILES_TO_KM: f64 = 1.60934;
const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    response: T,
}

#[derive(Clone, Debug, Deserialize)]
struct VehicleSummary {
    id: u64,
    #[serde(default)]
    vin: String,
    display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VehicleData {
    #[serde(default)]
    charge_state: ChargeState,
    #[serde(default)]
    drive_state: DriveState,
}

#[derive(Debug, Default, Deserialize)]
struct ChargeState {
    battery_level: Option<f64>,
    battery_range: Option<f64>,
    charging_state: Option<String>,
    charger_power: Option<f64>,
    /// Milliseconds since epoch
    timestamp: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct DriveState {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

struct CachedReading {
    reading: VehicleReading,
    fetched_at: Instant,
}

pub struct TeslaSource {
    config: TeslaConfig,
    mock_mode: AtomicBool,
    http_client: reqwest::Client,
    tokens: Option<TokenManager>,
    vehicle: Mutex<Option<VehicleSummary>>,
    cache: Mutex<Option<CachedReading>>,
}

impl TeslaSource {
    pub fn new(config: TeslaConfig, http_client: reqwest::Client, tokens: Option<TokenManager>) -> Self {
        let mock_mode = config.mock_mode;
        Self {
            config,
            mock_mode: AtomicBool::new(mock_mode),
            http_client,
            tokens,
            vehicle: Mutex::new(None),
            cache: Mutex::new(None),
        }
    }

    /// Mock-mode source with default settings
    pub fn mock() -> Self {
        Self::new(TeslaConfig::default(), reqwest::Client::new(), None)
    }

    /// Switch between live and mock readings at runtime
    pub fn set_mock_mode(&self, enabled: bool) {
        self.mock_mode.store(enabled, Ordering::Relaxed);
        if enabled {
            info!(vehicle = VEHICLE_NAME, "Mock mode enabled");
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn bearer_token(&self) -> SourceResult<String> {
        let tokens = self
            .tokens
            .as_ref()
            .ok_or_else(|| SourceError::NotConfigured("no API credentials".to_string()))?;

        tokens
            .access_token()
            .await
            .map_err(|e| SourceError::Authentication(format!("{:#}", e)))
    }

    fn selected_vehicle(&self) -> Option<VehicleSummary> {
        self.vehicle.lock().expect("Vehicle lock poisoned").clone()
    }

    fn cached(&self, max_age: Option<Duration>) -> Option<VehicleReading> {
        let cache = self.cache.lock().expect("Cache lock poisoned");
        cache
            .as_ref()
            .filter(|c| max_age.map_or(true, |ttl| c.fetched_at.elapsed() < ttl))
            .map(|c| c.reading.clone())
    }

    async fn fetch_from_api(&self) -> SourceResult<VehicleReading> {
        let vehicle = match self.selected_vehicle() {
            Some(v) => v,
            None => {
                self.authenticate().await?;
                self.selected_vehicle()
                    .ok_or_else(|| SourceError::Authentication("no vehicle selected".to_string()))?
            }
        };

        let token = self.bearer_token().await?;
        let url = self.api_url(&format!("/api/1/vehicles/{}/vehicle_data", vehicle.id));

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .query(&[("endpoints", "charge_state;drive_state;location_data")])
            .send()
            .await
            .map_err(|e| SourceError::Api(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::REQUEST_TIMEOUT {
            return Err(SourceError::Asleep(format!("{} is asleep or offline", VEHICLE_NAME)));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(SourceError::Api(format!("vehicle_data returned {}: {}", status, body)));
        }

        let data: ApiResponse<VehicleData> = response
            .json()
            .await
            .map_err(|e| SourceError::Api(format!("invalid vehicle_data response: {}", e)))?;

        Ok(self.build_reading(data.response).await)
    }

    async fn build_reading(&self, data: VehicleData) -> VehicleReading {
        let charge = data.charge_state;
        let is_charging = matches!(charge.charging_state.as_deref(), Some("Charging") | Some("Starting"));
        let observed_at = charge
            .timestamp
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        let mut reading = VehicleReading::new(
            VEHICLE_NAME,
            clamp_percent(charge.battery_level.unwrap_or(0.0)),
            is_charging,
            observed_at,
        );
        reading.range_km = charge.battery_range.unwrap_or(0.0) * MILES_TO_KM;
        reading.charging_rate_kw = if is_charging { charge.charger_power } else { None };
        reading.latitude = data.drive_state.latitude;
        reading.longitude = data.drive_state.longitude;
        reading.location = self.classify_location(reading.latitude, reading.longitude);

        if self.config.geocode {
            if let (Some(lat), Some(lon)) = (reading.latitude, reading.longitude) {
                let address =
                    geocoding::reverse_geocode(&self.http_client, &self.config.geocode_url, lat, lon).await;
                reading.address =
                    Some(address.unwrap_or_else(|| geocoding::format_coordinates(Some(lat), Some(lon))));
            }
        }

        reading
    }

    fn classify_location(&self, latitude: Option<f64>, longitude: Option<f64>) -> Location {
        match (
            self.config.home_latitude,
            self.config.home_longitude,
            latitude,
            longitude,
        ) {
            (Some(home_lat), Some(home_lon), Some(lat), Some(lon)) => {
                let distance = haversine_km(home_lat, home_lon, lat, lon);
                if distance <= self.config.home_radius_km {
                    Location::Home
                } else {
                    debug!(distance_km = distance, "Vehicle away from home");
                    Location::Away
                }
            }
            _ => Location::Home,
        }
    }

    /// Wake the vehicle from sleep. No-op in mock mode.
    pub async fn wake_vehicle(&self) -> SourceResult<()> {
        if self.is_mock() {
            return Ok(());
        }

        let vehicle = self
            .selected_vehicle()
            .ok_or_else(|| SourceError::NotConfigured("no vehicle selected".to_string()))?;
        let token = self.bearer_token().await?;
        let url = self.api_url(&format!("/api/1/vehicles/{}/wake_up", vehicle.id));

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SourceError::Asleep(format!("Could not wake vehicle: {}", e)))?;

        if !response.status().is_success() {
            error!(status = %response.status(), "Failed to wake vehicle");
            return Err(SourceError::Asleep(format!(
                "Could not wake vehicle: status {}",
                response.status()
            )));
        }

        info!(vehicle = VEHICLE_NAME, "Vehicle woken up");
        Ok(())
    }
}

#[async_trait]
impl VehicleSource for TeslaSource {
    fn name(&self) -> &str {
        VEHICLE_NAME
    }

    fn is_mock(&self) -> bool {
        self.mock_mode.load(Ordering::Relaxed)
    }

    async fn authenticate(&self) -> SourceResult<()> {
        if self.is_mock() {
            info!(vehicle = VEHICLE_NAME, "Mock mode enabled, skipping authentication");
            return Ok(());
        }

        let token = self.bearer_token().await?;
        let response = self
            .http_client
            .get(self.api_url("/api/1/vehicles"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SourceError::Api(format!("vehicle list request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SourceError::Authentication(format!("vehicle list returned {}", status)));
        }
        if !status.is_success() {
            return Err(SourceError::Api(format!("vehicle list returned {}", status)));
        }

        let list: ApiResponse<Vec<VehicleSummary>> = response
            .json()
            .await
            .map_err(|e| SourceError::Api(format!("invalid vehicle list: {}", e)))?;

        let selected = match &self.config.vin {
            Some(vin) => list
                .response
                .into_iter()
                .find(|v| &v.vin == vin)
                .ok_or_else(|| SourceError::Authentication(format!("Vehicle {} not found in account", vin)))?,
            None => list
                .response
                .into_iter()
                .next()
                .ok_or_else(|| SourceError::Authentication("No vehicles found in account".to_string()))?,
        };

        info!(
            vehicle_id = selected.id,
            display_name = selected.display_name.as_deref().unwrap_or(VEHICLE_NAME),
            "Connected to vehicle API"
        );

        *self.vehicle.lock().expect("Vehicle lock poisoned") = Some(selected);
        Ok(())
    }

    async fn get_status(&self) -> SourceResult<VehicleReading> {
        if self.is_mock() {
            let reading = PRIMARY_PROFILE.reading(VEHICLE_NAME, Utc::now());
            debug!(vehicle = VEHICLE_NAME, battery = reading.battery_percent, "Mock reading");
            return Ok(reading);
        }

        let ttl = Duration::from_secs(self.config.cache_ttl_seconds);
        if let Some(reading) = self.cached(Some(ttl)) {
            debug!(vehicle = VEHICLE_NAME, "Using cached reading");
            return Ok(reading);
        }

        match self.fetch_from_api().await {
            Ok(reading) => {
                *self.cache.lock().expect("Cache lock poisoned") = Some(CachedReading {
                    reading: reading.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(reading)
            }
            Err(e) => {
                error!(vehicle = VEHICLE_NAME, error = %e, "Failed to fetch vehicle data");
                match self.cached(None) {
                    Some(stale) => {
                        warn!(vehicle = VEHICLE_NAME, "Returning stale cached reading due to API error");
                        Ok(stale)
                    }
                    None => Err(e),
                }
            }
        }
    }

    async fn close(&self) {
        *self.vehicle.lock().expect("Vehicle lock poisoned") = None;
        *self.cache.lock().expect("Cache lock poisoned") = None;
        info!(vehicle = VEHICLE_NAME, "Source closed");
    }
}

/// Great-circle distance between two coordinates
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;
    use crate::sources::token::OAuthClient;

    const VEHICLES_BODY: &str = r#"{"response":[
        {"id":111,"vin":"VIN-A","display_name":"Daily"},
        {"id":222,"vin":"VIN-B","display_name":"Spare"}
    ],"count":2}"#;

    const VEHICLE_DATA_BODY: &str = r#"{"response":{
        "charge_state":{"battery_level":55,"battery_range":150.0,"charging_state":"Charging","charger_power":7,"timestamp":1700000000000},
        "drive_state":{"latitude":59.9139,"longitude":10.7522}
    }}"#;

    fn live_source(server_url: &str, vin: Option<&str>) -> TeslaSource {
        let config = TeslaConfig {
            mock_mode: false,
            api_base: server_url.to_string(),
            vin: vin.map(|v| v.to_string()),
            home_latitude: Some(59.9139),
            home_longitude: Some(10.7522),
            ..TeslaConfig::default()
        };
        // Valid token: no refresh traffic
        let tokens = TokenManager::new(
            "tesla",
            OAuthClient {
                token_url: format!("{}/token", server_url),
                client_id: "client".to_string(),
                client_secret: String::new(),
            },
            reqwest::Client::new(),
            Credentials {
                access_token: "token".to_string(),
                refresh_token: None,
                expires_at: None,
            },
            None,
        );
        TeslaSource::new(config, reqwest::Client::new(), Some(tokens))
    }

    #[tokio::test]
    async fn test_mock_reading() {
        let source = TeslaSource::mock();
        assert!(source.is_mock());
        source.authenticate().await.unwrap();

        let reading = source.get_status().await.unwrap();
        assert!(reading.is_mock);
        assert_eq!(reading.vehicle_id, VEHICLE_NAME);
        assert!((20.0..=90.0).contains(&reading.battery_percent));
    }

    #[tokio::test]
    async fn test_live_reading_and_cache() {
        let mut server = mockito::Server::new_async().await;
        let list = server
            .mock("GET", "/api/1/vehicles")
            .match_header("authorization", "Bearer token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(VEHICLES_BODY)
            .create_async()
            .await;
        let data = server
            .mock("GET", "/api/1/vehicles/222/vehicle_data")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(VEHICLE_DATA_BODY)
            .expect(1)
            .create_async()
            .await;

        let source = live_source(&server.url(), Some("VIN-B"));
        source.authenticate().await.unwrap();

        let reading = source.get_status().await.unwrap();
        assert!(!reading.is_mock);
        assert_eq!(reading.battery_percent, 55.0);
        assert!(reading.is_charging);
        assert_eq!(reading.charging_rate_kw, Some(7.0));
        assert!((reading.range_km - 150.0 * MILES_TO_KM).abs() < 1e-9);
        assert_eq!(reading.location, Location::Home);
        assert_eq!(reading.observed_at.timestamp_millis(), 1_700_000_000_000);

        // Second call is served from cache
        let cached = source.get_status().await.unwrap();
        assert_eq!(cached.battery_percent, 55.0);

        list.assert_async().await;
        data.assert_async().await;
    }

    #[tokio::test]
    async fn test_asleep_vehicle() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/api/1/vehicles")
            .with_status(200)
            .with_body(VEHICLES_BODY)
            .create_async()
            .await;
        let _data = server
            .mock("GET", "/api/1/vehicles/111/vehicle_data")
            .match_query(mockito::Matcher::Any)
            .with_status(408)
            .create_async()
            .await;

        let source = live_source(&server.url(), None);
        let err = source.get_status().await.unwrap_err();
        assert!(matches!(err, SourceError::Asleep(_)));
        assert_eq!(err.error_type(), "asleep");
    }

    #[tokio::test]
    async fn test_stale_cache_returned_on_error() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/api/1/vehicles")
            .with_status(200)
            .with_body(VEHICLES_BODY)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/api/1/vehicles/111/vehicle_data")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(VEHICLE_DATA_BODY)
            .expect(1)
            .create_async()
            .await;

        let mut source = live_source(&server.url(), None);
        source.config.cache_ttl_seconds = 0;

        let first = source.get_status().await.unwrap();
        ok.assert_async().await;
        ok.remove_async().await;

        let _fail = server
            .mock("GET", "/api/1/vehicles/111/vehicle_data")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let stale = source.get_status().await.unwrap();
        assert_eq!(stale.battery_percent, first.battery_percent);
    }

    #[tokio::test]
    async fn test_geocode_failure_falls_back_to_coordinates() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/api/1/vehicles")
            .with_status(200)
            .with_body(VEHICLES_BODY)
            .create_async()
            .await;
        let _data = server
            .mock("GET", "/api/1/vehicles/111/vehicle_data")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(VEHICLE_DATA_BODY)
            .create_async()
            .await;
        let geocoder = server
            .mock("GET", "/reverse")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let mut source = live_source(&server.url(), None);
        source.config.geocode = true;
        source.config.geocode_url = server.url();

        let reading = source.get_status().await.unwrap();
        assert_eq!(reading.address.as_deref(), Some("59.913900, 10.752200"));

        geocoder.assert_async().await;
    }

    #[tokio::test]
    async fn test_wake_vehicle() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/api/1/vehicles")
            .with_status(200)
            .with_body(VEHICLES_BODY)
            .create_async()
            .await;
        let wake = server
            .mock("POST", "/api/1/vehicles/111/wake_up")
            .match_header("authorization", "Bearer token")
            .with_status(200)
            .with_body(r#"{"response":{"state":"online"}}"#)
            .create_async()
            .await;

        let source = live_source(&server.url(), None);
        // No vehicle selected yet
        assert_eq!(source.wake_vehicle().await.unwrap_err().error_type(), "not_configured");

        source.authenticate().await.unwrap();
        source.wake_vehicle().await.unwrap();
        wake.assert_async().await;

        // Mock mode never calls out
        assert!(TeslaSource::mock().wake_vehicle().await.is_ok());
    }

    #[tokio::test]
    async fn test_no_vehicles_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/api/1/vehicles")
            .with_status(200)
            .with_body(r#"{"response":[],"count":0}"#)
            .create_async()
            .await;

        let source = live_source(&server.url(), None);
        let err = source.authenticate().await.unwrap_err();
        assert!(matches!(err, SourceError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_live_without_tokens_not_configured() {
        let config = TeslaConfig {
            mock_mode: false,
            ..TeslaConfig::default()
        };
        let source = TeslaSource::new(config, reqwest::Client::new(), None);
        let err = source.authenticate().await.unwrap_err();
        assert_eq!(err.error_type(), "not_configured");

        source.set_mock_mode(true);
        assert!(source.get_status().await.unwrap().is_mock);
    }

    #[test]
    fn test_haversine() {
        assert!(haversine_km(59.91, 10.75, 59.91, 10.75) < 1e-9);
        // Oslo to Bergen is roughly 305 km
        let d = haversine_km(59.9139, 10.7522, 60.3913, 5.3221);
        assert!((d - 305.0).abs() < 10.0, "{d}");
    }

    #[test]
    fn test_classify_location() {
        let source = TeslaSource::new(
            TeslaConfig {
                home_latitude: Some(59.9139),
                home_longitude: Some(10.7522),
                home_radius_km: 0.5,
                ..TeslaConfig::default()
            },
            reqwest::Client::new(),
            None,
        );
        assert_eq!(source.classify_location(Some(59.9140), Some(10.7523)), Location::Home);
        assert_eq!(source.classify_location(Some(60.0), Some(10.75)), Location::Away);
        assert_eq!(source.classify_location(None, None), Location::Home);
    }
}
