use crate::decision::recommendation::{ChargeAction, DualRecommendation, Priority, Recommendation};
use crate::vehicle::VehicleReading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priority given to the critical-floor rule. Nothing else reaches it.
const CRITICAL_PRIORITY: f64 = 100.0;

/// Fixed priority for a charge session already in progress
const CONTINUE_PRIORITY: f64 = 50.0;

/// Thresholds the decision engine evaluates against.
///
/// Expected `0 <= minimum_charge <= charge_threshold <= 100`. The engine does not
/// check this; a violated ordering just runs through the rule cascade as written.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Don't charge at or above this percentage
    #[serde(default = "default_charge_threshold")]
    pub charge_threshold: f64,
    /// Always charge below this percentage
    #[serde(default = "default_minimum_charge")]
    pub minimum_charge: f64,
}

fn default_charge_threshold() -> f64 {
    80.0
}

fn default_minimum_charge() -> f64 {
    20.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            charge_threshold: default_charge_threshold(),
            minimum_charge: default_minimum_charge(),
        }
    }
}

/// Recommend an action for a single vehicle, stamped with the current time.
pub fn recommend(reading: &VehicleReading, config: &EngineConfig) -> Recommendation {
    recommend_at(reading, config, Utc::now())
}

/// Recommend an action for a single vehicle.
///
/// Rules are evaluated in order and the first match wins:
/// 1. below `minimum_charge` → CHARGE at priority 100, even while charging
/// 2. charging → CONTINUE_CHARGING below threshold, NO_CHARGE at or above it
/// 3. at or above threshold → NO_CHARGE
/// 4. otherwise → CHARGE, priority ramping linearly with the gap to threshold
pub fn recommend_at(
    reading: &VehicleReading,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Recommendation {
    let battery = reading.battery_percent;
    let threshold = config.charge_threshold;
    let minimum = config.minimum_charge;

    let (action, reason, priority_score) = if battery < minimum {
        (
            ChargeAction::Charge,
            format!("Battery critically low ({}% < {}%)", battery, minimum),
            CRITICAL_PRIORITY,
        )
    } else if reading.is_charging {
        if battery < threshold {
            (
                ChargeAction::ContinueCharging,
                format!("Continue charging to threshold ({}% → {}%)", battery, threshold),
                CONTINUE_PRIORITY,
            )
        } else {
            (
                ChargeAction::NoCharge,
                format!("Charging complete, above threshold ({}% >= {}%)", battery, threshold),
                0.0,
            )
        }
    } else if battery >= threshold {
        (
            ChargeAction::NoCharge,
            format!("Battery above threshold ({}% >= {}%)", battery, threshold),
            0.0,
        )
    } else {
        // Only reachable with battery < threshold, so threshold > battery here.
        // Scaled against the full threshold; stays below 100 for non-negative readings.
        let gap = threshold - battery;
        let ramp = gap / threshold * 100.0;
        // Capped without f64::min so a NaN ramp stays NaN
        let priority = if ramp > CRITICAL_PRIORITY { CRITICAL_PRIORITY } else { ramp };
        (
            ChargeAction::Charge,
            format!("Battery below threshold ({}% < {}%)", battery, threshold),
            priority,
        )
    };

    tracing::debug!(
        vehicle = %reading.vehicle_id,
        battery = battery,
        action = %action,
        priority = priority_score,
        "Recommendation computed"
    );

    Recommendation {
        action,
        reason,
        timestamp: now,
        battery_percent: battery,
        threshold,
        priority_score,
    }
}

/// Decide which of two vehicles should charge first.
///
/// Returns the vehicle id of the winner, or `Priority::None` if neither needs power.
/// When both need power the higher score wins, then the lower battery. On an exact
/// tie in both, `b` wins.
pub fn compare(a: &VehicleReading, b: &VehicleReading, config: &EngineConfig) -> Priority {
    let now = Utc::now();
    let rec_a = recommend_at(a, config, now);
    let rec_b = recommend_at(b, config, now);
    pick_priority(a, &rec_a, b, &rec_b)
}

fn pick_priority(
    a: &VehicleReading,
    rec_a: &Recommendation,
    b: &VehicleReading,
    rec_b: &Recommendation,
) -> Priority {
    match (rec_a.action.needs_charging(), rec_b.action.needs_charging()) {
        (false, false) => Priority::None,
        (true, false) => Priority::Vehicle(a.vehicle_id.clone()),
        (false, true) => Priority::Vehicle(b.vehicle_id.clone()),
        (true, true) => {
            let a_wins = if rec_a.priority_score != rec_b.priority_score {
                rec_a.priority_score > rec_b.priority_score
            } else {
                a.battery_percent < b.battery_percent
            };
            if a_wins {
                Priority::Vehicle(a.vehicle_id.clone())
            } else {
                Priority::Vehicle(b.vehicle_id.clone())
            }
        }
    }
}

/// Recommend for the primary vehicle and, if present, the secondary one.
///
/// With only `a`, the priority goes to `a` solely when its action is CHARGE; an
/// ongoing CONTINUE_CHARGING session alone yields `Priority::None`. With both, the
/// verdict comes from [`compare`]'s rules.
pub fn recommend_both(
    a: &VehicleReading,
    b: Option<&VehicleReading>,
    config: &EngineConfig,
) -> DualRecommendation {
    let now = Utc::now();
    let rec_a = recommend_at(a, config, now);

    match b {
        None => {
            let priority_vehicle = if rec_a.action == ChargeAction::Charge {
                Priority::Vehicle(a.vehicle_id.clone())
            } else {
                Priority::None
            };
            DualRecommendation {
                a: rec_a,
                b: None,
                priority_vehicle,
            }
        }
        Some(b) => {
            let rec_b = recommend_at(b, config, now);
            let priority_vehicle = pick_priority(a, &rec_a, b, &rec_b);
            DualRecommendation {
                a: rec_a,
                b: Some(rec_b),
                priority_vehicle,
            }
        }
    }
}
