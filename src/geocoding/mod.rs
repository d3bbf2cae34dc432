//! Reverse geocoding of vehicle coordinates via a Nominatim-compatible `/reverse` endpoint.

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = "charge-manager/0.1";
const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: AddressParts,
    display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AddressParts {
    road: Option<String>,
    house_number: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    postcode: Option<String>,
}

/// Resolve coordinates to a short street address.
///
/// Returns `None` on any failure (network, status, parse). Never errors.
pub async fn reverse_geocode(
    client: &reqwest::Client,
    base_url: &str,
    latitude: f64,
    longitude: f64,
) -> Option<String> {
    let url = format!("{}/reverse", base_url.trim_end_matches('/'));
    let lat = latitude.to_string();
    let lon = longitude.to_string();

    let response = match client
        .get(&url)
        .query(&[
            ("lat", lat.as_str()),
            ("lon", lon.as_str()),
            ("format", "json"),
            ("addressdetails", "1"),
        ])
        .header("User-Agent", USER_AGENT)
        .timeout(TIMEOUT)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "Geocoding request failed");
            return None;
        }
    };

    if !response.status().is_success() {
        warn!(status = %response.status(), "Geocoding failed");
        return None;
    }

    let body: ReverseResponse = match response.json().await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "Failed to parse geocoding response");
            return None;
        }
    };

    let address = format_address(&body);
    if let Some(ref a) = address {
        debug!(latitude, longitude, address = %a, "Geocoded position");
    }
    address
}

fn format_address(response: &ReverseResponse) -> Option<String> {
    let a = &response.address;
    let mut parts = Vec::new();

    if let Some(road) = &a.road {
        match &a.house_number {
            Some(number) => parts.push(format!("{} {}", road, number)),
            None => parts.push(road.clone()),
        }
    }

    if let Some(place) = a.city.as_ref().or(a.town.as_ref()).or(a.village.as_ref()) {
        parts.push(place.clone());
    }

    if let Some(postcode) = &a.postcode {
        parts.push(postcode.clone());
    }

    if parts.is_empty() {
        response.display_name.clone()
    } else {
        Some(parts.join(", "))
    }
}

/// Coordinates as `"lat, lon"` with six decimals.
pub fn format_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> String {
    match (latitude, longitude) {
        (Some(lat), Some(lon)) => format!("{:.6}, {:.6}", lat, lon),
        _ => "Unknown position".to_string(),
    }
}
