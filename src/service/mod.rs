//! Evaluation cycle: poll sources, decide, persist, push.

use crate::config::{engine_snapshot, SharedEngineConfig};
use crate::decision::{recommend_both, DualRecommendation, Priority, Recommendation};
use crate::notify::{Notifier, ServerMessage};
use crate::sources::{SourceResult, VehicleSource};
use crate::store::{Database, ErrorSink, HistoryRecord};
use crate::vehicle::VehicleReading;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[cfg(test)]
mod tests;

/// One evaluation result, as served by `/api/status` and the push channel
#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub timestamp: DateTime<Utc>,
    pub primary: VehicleReading,
    pub primary_recommendation: Recommendation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<VehicleReading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_recommendation: Option<Recommendation>,
    pub priority_vehicle: Priority,
    /// True if any reading is older than the configured maximum age
    pub stale: bool,
}

impl StatusSnapshot {
    pub fn new(
        primary: VehicleReading,
        secondary: Option<VehicleReading>,
        dual: DualRecommendation,
        stale: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            primary,
            primary_recommendation: dual.a,
            secondary,
            secondary_recommendation: dual.b,
            priority_vehicle: dual.priority_vehicle,
            stale,
        }
    }
}

pub struct ChargingService {
    primary: Arc<dyn VehicleSource>,
    secondary: Option<Arc<dyn VehicleSource>>,
    engine: SharedEngineConfig,
    db: Arc<Database>,
    notifier: Arc<Notifier>,
    errors: ErrorSink,
    max_reading_age: Duration,
}

impl ChargingService {
    pub fn new(
        primary: Arc<dyn VehicleSource>,
        secondary: Option<Arc<dyn VehicleSource>>,
        engine: SharedEngineConfig,
        db: Arc<Database>,
        notifier: Arc<Notifier>,
        errors: ErrorSink,
    ) -> Self {
        Self {
            primary,
            secondary,
            engine,
            db,
            notifier,
            errors,
            max_reading_age: Duration::minutes(120),
        }
    }

    pub fn with_max_reading_age(mut self, max_age: Duration) -> Self {
        self.max_reading_age = max_age;
        self
    }

    pub fn engine_config(&self) -> &SharedEngineConfig {
        &self.engine
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// True if the primary source is serving fabricated readings
    pub fn is_mock(&self) -> bool {
        self.primary.is_mock()
    }

    pub fn sources(&self) -> impl Iterator<Item = &Arc<dyn VehicleSource>> {
        std::iter::once(&self.primary).chain(self.secondary.iter())
    }

    /// Poll both vehicles and evaluate them against the current thresholds.
    ///
    /// A primary failure is returned. A secondary failure is logged and
    /// reported, and the evaluation continues with the primary alone.
    pub async fn current_status(&self) -> SourceResult<StatusSnapshot> {
        let primary = self.primary.get_status().await?;

        let secondary = match &self.secondary {
            Some(source) => match source.get_status().await {
                Ok(reading) => Some(reading),
                Err(e) => {
                    warn!(vehicle = %source.name(), error = %e, "Secondary vehicle unavailable");
                    self.errors.report(source.name(), e.error_type(), e.to_string());
                    None
                }
            },
            None => None,
        };

        let now = Utc::now();
        let stale = std::iter::once(&primary)
            .chain(secondary.iter())
            .filter(|r| r.is_stale(now, self.max_reading_age))
            .inspect(|r| {
                warn!(
                    vehicle = %r.vehicle_id,
                    age_minutes = r.age(now).num_minutes(),
                    "Reading is stale"
                )
            })
            .count()
            > 0;

        // Thresholds are read per evaluation, never cached
        let config = engine_snapshot(&self.engine);
        let dual = recommend_both(&primary, secondary.as_ref(), &config);

        Ok(StatusSnapshot::new(primary, secondary, dual, stale))
    }

    /// One scheduled cycle: evaluate, persist (best effort), broadcast.
    pub async fn update_cycle(&self) -> SourceResult<StatusSnapshot> {
        debug!("Running update cycle");

        let snapshot = match self.current_status().await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Update cycle failed");
                self.errors.report("scheduler", e.error_type(), e.to_string());
                return Err(e);
            }
        };

        self.persist(&snapshot);

        let delivered = self
            .notifier
            .broadcast(&ServerMessage::StatusUpdate(snapshot.clone()));

        info!(
            primary_battery = snapshot.primary.battery_percent,
            primary_action = %snapshot.primary_recommendation.action,
            priority = %snapshot.priority_vehicle,
            delivered = delivered,
            "Update cycle complete"
        );

        Ok(snapshot)
    }

    fn persist(&self, snapshot: &StatusSnapshot) {
        let mut pairs = vec![(&snapshot.primary, &snapshot.primary_recommendation)];
        if let (Some(reading), Some(rec)) = (&snapshot.secondary, &snapshot.secondary_recommendation) {
            pairs.push((reading, rec));
        }

        for (reading, rec) in pairs {
            let result = self
                .save_if_newer(reading)
                .and_then(|_| self.db.save_recommendation(rec, &reading.vehicle_id));

            if let Err(e) = result {
                warn!(vehicle = %reading.vehicle_id, error = %e, "Failed to persist update");
                self.errors.report("database", "write", format!("{:#}", e));
            }
        }
    }

    /// Store a reading unless history already holds one at least as new.
    ///
    /// A source serving its cached reading after an API error repeats the same
    /// `observed_at` every cycle; those repeats are not stored again.
    fn save_if_newer(&self, reading: &VehicleReading) -> anyhow::Result<()> {
        if let Some(latest) = self.db.get_latest_reading(&reading.vehicle_id)? {
            // Stored timestamps carry millisecond precision
            if reading.observed_at.timestamp_millis() <= latest.timestamp.timestamp_millis() {
                debug!(
                    vehicle = %reading.vehicle_id,
                    observed_at = %reading.observed_at,
                    "Reading already stored, skipping"
                );
                return Ok(());
            }
        }
        self.db.save_battery_reading(reading)
    }

    /// Stored readings from the last `hours`, newest first
    pub fn history(&self, vehicle: Option<&str>, hours: i64) -> anyhow::Result<Vec<HistoryRecord>> {
        self.db.get_history(vehicle, hours)
    }

    pub fn cleanup_old_data(&self, retention_days: i64) -> anyhow::Result<usize> {
        self.db.cleanup_old_data(retention_days)
    }
}
