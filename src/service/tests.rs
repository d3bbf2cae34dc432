use super::*;
use crate::config::{new_engine_config, update_threshold};
use crate::decision::{ChargeAction, EngineConfig};
use crate::sources::SourceError;
use async_trait::async_trait;

/// Source returning a scripted reading or error
struct FixedSource {
    name: String,
    battery: Option<f64>,
    charging: bool,
    age: Duration,
    /// Serve this exact observation time on every call, like a cached reading
    pinned_at: Option<DateTime<Utc>>,
}

impl FixedSource {
    fn new(name: &str, battery: f64) -> Self {
        Self {
            name: name.to_string(),
            battery: Some(battery),
            charging: false,
            age: Duration::zero(),
            pinned_at: None,
        }
    }

    fn failing(name: &str) -> Self {
        Self {
            battery: None,
            ..Self::new(name, 0.0)
        }
    }
}

#[async_trait]
impl VehicleSource for FixedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_mock(&self) -> bool {
        true
    }

    async fn authenticate(&self) -> SourceResult<()> {
        Ok(())
    }

    async fn get_status(&self) -> SourceResult<VehicleReading> {
        match self.battery {
            Some(battery) => Ok(VehicleReading::new(
                self.name.clone(),
                battery,
                self.charging,
                self.pinned_at.unwrap_or_else(|| Utc::now() - self.age),
            )),
            None => Err(SourceError::Api("unreachable".to_string())),
        }
    }

    async fn close(&self) {}
}

fn service(primary: FixedSource, secondary: Option<FixedSource>) -> (ChargingService, Arc<Database>) {
    let db = Arc::new(Database::open(":memory:").unwrap());
    let service = ChargingService::new(
        Arc::new(primary),
        secondary.map(|s| Arc::new(s) as Arc<dyn VehicleSource>),
        new_engine_config(EngineConfig::default()),
        db.clone(),
        Arc::new(Notifier::new()),
        ErrorSink::disabled(),
    );
    (service, db)
}

#[tokio::test]
async fn test_single_vehicle_status() {
    let (service, _db) = service(FixedSource::new("a", 50.0), None);
    let status = service.current_status().await.unwrap();

    assert_eq!(status.primary_recommendation.action, ChargeAction::Charge);
    assert_eq!(status.priority_vehicle, Priority::Vehicle("a".to_string()));
    assert!(status.secondary.is_none());
    assert!(!status.stale);
}

#[tokio::test]
async fn test_dual_vehicle_status() {
    let (service, _db) = service(FixedSource::new("a", 60.0), Some(FixedSource::new("b", 30.0)));
    let status = service.current_status().await.unwrap();

    assert_eq!(status.priority_vehicle, Priority::Vehicle("b".to_string()));
    assert_eq!(status.secondary.as_ref().unwrap().vehicle_id, "b");
    assert!(status.secondary_recommendation.is_some());
}

#[tokio::test]
async fn test_secondary_failure_degrades_to_primary_only() {
    let (service, _db) = service(FixedSource::new("a", 90.0), Some(FixedSource::failing("b")));
    let status = service.current_status().await.unwrap();

    assert!(status.secondary.is_none());
    assert_eq!(status.primary_recommendation.action, ChargeAction::NoCharge);
    assert_eq!(status.priority_vehicle, Priority::None);
}

#[tokio::test]
async fn test_primary_failure_propagates() {
    let (service, db) = service(FixedSource::failing("a"), None);
    let err = service.update_cycle().await.unwrap_err();

    assert_eq!(err.error_type(), "api");
    assert!(db.get_history(None, 24).unwrap().is_empty());
}

#[tokio::test]
async fn test_threshold_change_applies_next_evaluation() {
    let (service, _db) = service(FixedSource::new("a", 75.0), None);
    assert_eq!(
        service.current_status().await.unwrap().primary_recommendation.action,
        ChargeAction::Charge
    );

    update_threshold(service.engine_config(), 70.0).unwrap();
    assert_eq!(
        service.current_status().await.unwrap().primary_recommendation.action,
        ChargeAction::NoCharge
    );
}

#[tokio::test]
async fn test_stale_reading_flagged_but_evaluated() {
    let mut old = FixedSource::new("a", 10.0);
    old.age = Duration::hours(5);
    let (service, _db) = service(old, None);

    let status = service.current_status().await.unwrap();
    assert!(status.stale);
    assert_eq!(status.primary_recommendation.action, ChargeAction::Charge);
}

#[tokio::test]
async fn test_update_cycle_persists_and_broadcasts() {
    let (service, db) = service(FixedSource::new("a", 60.0), Some(FixedSource::new("b", 30.0)));
    let (_id, mut rx) = service.notifier().register();

    service.update_cycle().await.unwrap();

    let history = service.history(None, 1).unwrap();
    assert_eq!(history.len(), 2);
    assert!(db.get_latest_reading("b").unwrap().is_some());

    let pushed: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(pushed["type"], "status_update");
    assert_eq!(pushed["priority_vehicle"], "b");
}

#[tokio::test]
async fn test_repeated_cached_reading_stored_once() {
    let mut cached = FixedSource::new("a", 55.0);
    cached.pinned_at = Some(Utc::now() - Duration::minutes(10));
    let (service, db) = service(cached, Some(FixedSource::new("b", 40.0)));

    for _ in 0..3 {
        service.update_cycle().await.unwrap();
        // Keep fresh observations in distinct milliseconds
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    assert_eq!(db.get_history(Some("a"), 1).unwrap().len(), 1);
    // Fresh readings keep accumulating
    assert_eq!(db.get_history(Some("b"), 1).unwrap().len(), 3);
}
