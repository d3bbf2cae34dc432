//! SQLite persistence for battery history, recommendations, errors and credentials.
//!
//! All writes are append-only logging except `credentials`, which is upserted per
//! source. Timestamps are stored as UTC RFC 3339 strings with millisecond precision
//! so lexicographic order matches time order.

pub mod error_sink;

pub use error_sink::{ErrorRecord, ErrorSink};

use crate::credentials::Credentials;
use crate::decision::Recommendation;
use crate::vehicle::{Location, VehicleReading};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};


const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS battery_readings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        vehicle TEXT NOT NULL,
        battery_percent REAL NOT NULL,
        range_km REAL NOT NULL,
        location TEXT NOT NULL,
        is_charging INTEGER NOT NULL,
        is_mock INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_readings_timestamp ON battery_readings(timestamp);
    CREATE INDEX IF NOT EXISTS idx_readings_vehicle ON battery_readings(vehicle);

    CREATE TABLE IF NOT EXISTS recommendations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        vehicle TEXT NOT NULL,
        action TEXT NOT NULL,
        reason TEXT NOT NULL,
        battery_percent REAL NOT NULL,
        threshold REAL NOT NULL,
        priority_score REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_recommendations_timestamp ON recommendations(timestamp);

    CREATE TABLE IF NOT EXISTS errors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        service TEXT NOT NULL,
        error_type TEXT NOT NULL,
        message TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_errors_timestamp ON errors(timestamp);

    CREATE TABLE IF NOT EXISTS credentials (
        source TEXT PRIMARY KEY,
        access_token TEXT NOT NULL,
        refresh_token TEXT,
        expires_at TEXT,
        updated_at TEXT NOT NULL
    );
"#;

/// One stored battery reading, as returned by the history API
#[derive(Clone, Debug, Serialize)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub vehicle: String,
    pub battery_percent: f64,
    pub range_km: f64,
    pub location: Location,
    pub is_charging: bool,
    pub is_mock: bool,
}

/// History database backed by SQLite.
///
/// The connection is wrapped in a Mutex; callers on async tasks hold it only for
/// the duration of a single statement.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (or creates) the database and ensures the schema exists.
    ///
    /// `":memory:"` opens a private in-memory database. For file paths the parent
    /// directory is created if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path != Path::new(":memory:") {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let conn = Connection::open(path).context("Failed to open database")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create database schema")?;

        info!(path = %path.display(), "Database initialized");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("Database lock poisoned")
    }

    pub fn save_battery_reading(&self, reading: &VehicleReading) -> Result<()> {
        self.lock()
            .execute(
                r#"
                INSERT INTO battery_readings
                    (timestamp, vehicle, battery_percent, range_km, location, is_charging, is_mock)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    format_ts(reading.observed_at),
                    reading.vehicle_id,
                    reading.battery_percent,
                    reading.range_km,
                    reading.location.as_str(),
                    reading.is_charging,
                    reading.is_mock,
                ],
            )
            .context("Failed to save battery reading")?;

        debug!(
            vehicle = %reading.vehicle_id,
            battery = reading.battery_percent,
            "Saved battery reading"
        );
        Ok(())
    }

    pub fn save_recommendation(&self, recommendation: &Recommendation, vehicle: &str) -> Result<()> {
        self.lock()
            .execute(
                r#"
                INSERT INTO recommendations
                    (timestamp, vehicle, action, reason, battery_percent, threshold, priority_score)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    format_ts(recommendation.timestamp),
                    vehicle,
                    recommendation.action.as_str(),
                    recommendation.reason,
                    recommendation.battery_percent,
                    recommendation.threshold,
                    recommendation.priority_score,
                ],
            )
            .context("Failed to save recommendation")?;

        debug!(vehicle = %vehicle, action = %recommendation.action, "Saved recommendation");
        Ok(())
    }

    pub fn save_error(&self, service: &str, error_type: &str, message: &str) -> Result<()> {
        self.lock()
            .execute(
                "INSERT INTO errors (timestamp, service, error_type, message) VALUES (?1, ?2, ?3, ?4)",
                params![format_ts(Utc::now()), service, error_type, message],
            )
            .context("Failed to save error")?;
        Ok(())
    }

    /// Battery readings from the last `hours`, newest first, optionally for one vehicle.
    pub fn get_history(&self, vehicle: Option<&str>, hours: i64) -> Result<Vec<HistoryRecord>> {
        let since = format_ts(Utc::now() - Duration::hours(hours));
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT timestamp, vehicle, battery_percent, range_km, location, is_charging, is_mock
                FROM battery_readings
                WHERE timestamp >= ?1 AND (?2 IS NULL OR vehicle = ?2)
                ORDER BY timestamp DESC
                "#,
            )
            .context("Failed to prepare history query")?;

        let readings = stmt
            .query_map(params![since, vehicle], row_to_history)
            .context("Failed to execute history query")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read history rows")?;

        Ok(readings)
    }

    /// Most recent battery reading for a vehicle
    pub fn get_latest_reading(&self, vehicle: &str) -> Result<Option<HistoryRecord>> {
        let conn = self.lock();
        conn.query_row(
            r#"
            SELECT timestamp, vehicle, battery_percent, range_km, location, is_charging, is_mock
            FROM battery_readings
            WHERE vehicle = ?1
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
            params![vehicle],
            row_to_history,
        )
        .optional()
        .context("Failed to query latest reading")
    }

    /// Delete readings, recommendations and errors older than `days`.
    ///
    /// Returns the total number of rows removed. `days` must be at least 1; a
    /// window that does not fit a timestamp is an error.
    pub fn cleanup_old_data(&self, days: i64) -> Result<usize> {
        if days < 1 {
            bail!("Retention must be at least 1 day, got {}", days);
        }
        let cutoff = Duration::try_days(days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .with_context(|| format!("Retention of {} days is out of range", days))?;
        let cutoff = format_ts(cutoff);
        let conn = self.lock();

        let mut removed = 0;
        for table in ["battery_readings", "recommendations", "errors"] {
            removed += conn
                .execute(
                    &format!("DELETE FROM {} WHERE timestamp < ?1", table),
                    params![cutoff],
                )
                .with_context(|| format!("Failed to clean up {}", table))?;
        }

        info!(days = days, removed = removed, "Cleaned up old data");
        Ok(removed)
    }

    /// Upsert credentials for a vehicle source.
    pub fn save_credentials(&self, source: &str, credentials: &Credentials) -> Result<()> {
        self.lock()
            .execute(
                r#"
                INSERT INTO credentials (source, access_token, refresh_token, expires_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(source) DO UPDATE SET
                    access_token = excluded.access_token,
                    refresh_token = excluded.refresh_token,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                "#,
                params![
                    source,
                    credentials.access_token,
                    credentials.refresh_token,
                    credentials.expires_at.map(format_ts),
                    format_ts(Utc::now()),
                ],
            )
            .context("Failed to store credentials")?;
        Ok(())
    }

    pub fn load_credentials(&self, source: &str) -> Result<Option<Credentials>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT access_token, refresh_token, expires_at FROM credentials WHERE source = ?1",
                params![source],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query credentials")?;

        let Some((access_token, refresh_token, expires_at)) = row else {
            return Ok(None);
        };

        let expires_at = expires_at
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
            .transpose()
            .context("Failed to parse expires_at timestamp")?;

        Ok(Some(Credentials {
            access_token,
            refresh_token,
            expires_at,
        }))
    }
}

fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn row_to_history(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
    let raw: String = row.get(0)?;
    let timestamp = DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let location: String = row.get(4)?;

    Ok(HistoryRecord {
        timestamp,
        vehicle: row.get(1)?,
        battery_percent: row.get(2)?,
        range_km: row.get(3)?,
        location: Location::parse(&location),
        is_charging: row.get(5)?,
        is_mock: row.get(6)?,
    })
}
