use super::*;
use crate::vehicle::VehicleReading;
use chrono::Utc;

fn config() -> EngineConfig {
    EngineConfig {
        charge_threshold: 80.0,
        minimum_charge: 20.0,
    }
}

fn reading(id: &str, battery: f64, charging: bool) -> VehicleReading {
    VehicleReading::new(id, battery, charging, Utc::now())
}

// --- Single-vehicle scenarios ---

#[test]
fn test_critical_low_battery_charges_at_full_priority() {
    let rec = recommend(&reading("tesla", 15.0, false), &config());
    assert_eq!(rec.action, ChargeAction::Charge);
    assert_eq!(rec.priority_score, 100.0);
    assert_eq!(rec.battery_percent, 15.0);
    assert_eq!(rec.threshold, 80.0);
}

#[test]
fn test_above_threshold_no_charge() {
    let rec = recommend(&reading("tesla", 85.0, false), &config());
    assert_eq!(rec.action, ChargeAction::NoCharge);
    assert_eq!(rec.priority_score, 0.0);
}

#[test]
fn test_charging_below_threshold_continues() {
    let rec = recommend(&reading("tesla", 50.0, true), &config());
    assert_eq!(rec.action, ChargeAction::ContinueCharging);
    assert_eq!(rec.priority_score, 50.0);
}

#[test]
fn test_charging_above_threshold_is_complete() {
    let rec = recommend(&reading("tesla", 90.0, true), &config());
    assert_eq!(rec.action, ChargeAction::NoCharge);
    assert_eq!(rec.priority_score, 0.0);
}

#[test]
fn test_below_threshold_priority_ramp() {
    let rec = recommend(&reading("tesla", 60.0, false), &config());
    assert_eq!(rec.action, ChargeAction::Charge);
    assert!((rec.priority_score - 25.0).abs() < 1e-9);
}

#[test]
fn test_critical_floor_overrides_charging_session() {
    let rec = recommend(&reading("tesla", 10.0, true), &config());
    assert_eq!(rec.action, ChargeAction::Charge);
    assert_eq!(rec.priority_score, 100.0);
}

#[test]
fn test_exactly_at_threshold_no_charge() {
    let rec = recommend(&reading("tesla", 80.0, false), &config());
    assert_eq!(rec.action, ChargeAction::NoCharge);
}

#[test]
fn test_exactly_at_minimum_uses_ramp() {
    // 20 is not < 20, so rule 4 applies: (80-20)/80*100 = 75
    let rec = recommend(&reading("tesla", 20.0, false), &config());
    assert_eq!(rec.action, ChargeAction::Charge);
    assert!((rec.priority_score - 75.0).abs() < 1e-9);
}

#[test]
fn test_invariants_across_battery_range() {
    let cfg = config();
    let mut last_score = f64::INFINITY;

    for tenth in 0..=1000 {
        let battery = tenth as f64 / 10.0;
        for charging in [false, true] {
            let rec = recommend(&reading("car", battery, charging), &cfg);
            assert!((0.0..=100.0).contains(&rec.priority_score));

            if battery < cfg.minimum_charge {
                assert_eq!(rec.action, ChargeAction::Charge);
                assert_eq!(rec.priority_score, 100.0);
            } else if battery >= cfg.charge_threshold {
                assert_eq!(rec.action, ChargeAction::NoCharge);
                assert_eq!(rec.priority_score, 0.0);
            }
        }

        if battery > cfg.minimum_charge && battery < cfg.charge_threshold {
            let rec = recommend(&reading("car", battery, false), &cfg);
            assert_eq!(rec.action, ChargeAction::Charge);
            assert!(rec.priority_score > 0.0 && rec.priority_score < 100.0);
            assert!(rec.priority_score < last_score, "score must fall as battery rises");
            last_score = rec.priority_score;
        }
    }
}

#[test]
fn test_recommend_at_uses_given_timestamp() {
    let now = Utc::now() - chrono::Duration::hours(3);
    let rec = recommend_at(&reading("car", 50.0, false), &config(), now);
    assert_eq!(rec.timestamp, now);
}

// --- Boundary configurations: must not panic ---

#[test]
fn test_zero_threshold_never_divides() {
    let cfg = EngineConfig {
        charge_threshold: 0.0,
        minimum_charge: 0.0,
    };
    for battery in [0.0, 0.5, 50.0, 100.0] {
        let rec = recommend(&reading("car", battery, false), &cfg);
        assert_eq!(rec.action, ChargeAction::NoCharge);
        assert!(rec.priority_score.is_finite());
    }
}

#[test]
fn test_inverted_config_runs_cascade_mechanically() {
    // minimum above threshold: everything under 90 is critical
    let cfg = EngineConfig {
        charge_threshold: 50.0,
        minimum_charge: 90.0,
    };
    let rec = recommend(&reading("car", 70.0, false), &cfg);
    assert_eq!(rec.action, ChargeAction::Charge);
    assert_eq!(rec.priority_score, 100.0);

    let rec = recommend(&reading("car", 95.0, false), &cfg);
    assert_eq!(rec.action, ChargeAction::NoCharge);
}

#[test]
fn test_out_of_range_battery_not_clamped() {
    let rec = recommend(&reading("car", -10.0, false), &config());
    assert_eq!(rec.action, ChargeAction::Charge);
    assert_eq!(rec.battery_percent, -10.0);

    let rec = recommend(&reading("car", 140.0, true), &config());
    assert_eq!(rec.action, ChargeAction::NoCharge);
    assert_eq!(rec.battery_percent, 140.0);
}

#[test]
fn test_nan_battery_does_not_panic() {
    let rec = recommend(&reading("car", f64::NAN, false), &config());
    // NaN fails every comparison and lands in the ramp branch
    assert_eq!(rec.action, ChargeAction::Charge);
    // The ramp stays NaN instead of borrowing the critical-floor score
    assert!(rec.priority_score.is_nan());
}

// --- Dual-vehicle comparison ---

#[test]
fn test_compare_lower_battery_scores_higher() {
    let a = reading("A", 60.0, false);
    let b = reading("B", 30.0, false);
    let cfg = config();

    assert!((recommend(&a, &cfg).priority_score - 25.0).abs() < 1e-9);
    assert!((recommend(&b, &cfg).priority_score - 62.5).abs() < 1e-9);
    assert_eq!(compare(&a, &b, &cfg), Priority::Vehicle("B".to_string()));
}

#[test]
fn test_compare_neither_needs_charge() {
    let a = reading("A", 85.0, false);
    let b = reading("B", 85.0, false);
    assert_eq!(compare(&a, &b, &config()), Priority::None);
}

#[test]
fn test_compare_only_one_needs_charge() {
    let a = reading("A", 40.0, false);
    let b = reading("B", 90.0, false);
    assert_eq!(compare(&a, &b, &config()), Priority::Vehicle("A".to_string()));
    assert_eq!(compare(&b, &a, &config()), Priority::Vehicle("A".to_string()));
}

#[test]
fn test_compare_continue_charging_counts_as_needing_power() {
    let a = reading("A", 60.0, true);
    let b = reading("B", 90.0, false);
    assert_eq!(compare(&a, &b, &config()), Priority::Vehicle("A".to_string()));
}

#[test]
fn test_compare_swap_swaps_winner() {
    let cfg = config();
    let a = reading("A", 25.0, false);
    let b = reading("B", 70.0, false);
    assert_eq!(compare(&a, &b, &cfg), Priority::Vehicle("A".to_string()));
    assert_eq!(compare(&b, &a, &cfg), Priority::Vehicle("A".to_string()));
}

#[test]
fn test_compare_equal_score_lower_battery_wins() {
    // Both critical (score 100); the more depleted one wins regardless of order
    let cfg = config();
    let a = reading("A", 5.0, false);
    let b = reading("B", 12.0, false);
    assert_eq!(compare(&a, &b, &cfg), Priority::Vehicle("A".to_string()));
    assert_eq!(compare(&b, &a, &cfg), Priority::Vehicle("A".to_string()));
}

#[test]
fn test_compare_exact_tie_favors_second_vehicle() {
    let cfg = config();
    let a = reading("A", 40.0, false);
    let b = reading("B", 40.0, false);
    assert_eq!(compare(&a, &b, &cfg), Priority::Vehicle("B".to_string()));
    assert_eq!(compare(&b, &a, &cfg), Priority::Vehicle("A".to_string()));
}

#[test]
fn test_compare_critical_beats_charging_session() {
    let a = reading("A", 50.0, true);
    let b = reading("B", 15.0, false);
    assert_eq!(compare(&a, &b, &config()), Priority::Vehicle("B".to_string()));
}

// --- Bundle ---

#[test]
fn test_recommend_both_single_vehicle_charge() {
    let a = reading("A", 50.0, false);
    let bundle = recommend_both(&a, None, &config());
    assert_eq!(bundle.a.action, ChargeAction::Charge);
    assert!(bundle.b.is_none());
    assert_eq!(bundle.priority_vehicle, Priority::Vehicle("A".to_string()));
}

#[test]
fn test_recommend_both_single_vehicle_continue_charging_is_none() {
    let a = reading("A", 50.0, true);
    let bundle = recommend_both(&a, None, &config());
    assert_eq!(bundle.a.action, ChargeAction::ContinueCharging);
    assert_eq!(bundle.priority_vehicle, Priority::None);
}

#[test]
fn test_recommend_both_single_vehicle_no_charge() {
    let a = reading("A", 95.0, false);
    let bundle = recommend_both(&a, None, &config());
    assert_eq!(bundle.priority_vehicle, Priority::None);
}

#[test]
fn test_recommend_both_two_vehicles_delegates_to_compare() {
    let a = reading("A", 50.0, true);
    let b = reading("B", 90.0, false);
    let bundle = recommend_both(&a, Some(&b), &config());

    let b_rec = bundle.b.expect("secondary recommendation");
    assert_eq!(bundle.a.action, ChargeAction::ContinueCharging);
    assert_eq!(b_rec.action, ChargeAction::NoCharge);
    // Two-vehicle path uses needs_charging, so CONTINUE_CHARGING wins here
    assert_eq!(bundle.priority_vehicle, Priority::Vehicle("A".to_string()));
}

// --- Serialization ---

#[test]
fn test_action_and_priority_wire_format() {
    assert_eq!(
        serde_json::to_string(&ChargeAction::ContinueCharging).unwrap(),
        "\"CONTINUE_CHARGING\""
    );
    assert_eq!(serde_json::to_string(&Priority::None).unwrap(), "\"NONE\"");
    assert_eq!(
        serde_json::to_string(&Priority::Vehicle("Tesla Model Y".to_string())).unwrap(),
        "\"Tesla Model Y\""
    );

    let parsed: Priority = serde_json::from_str("\"NONE\"").unwrap();
    assert_eq!(parsed, Priority::None);
}

#[test]
fn test_recommendation_json_shape() {
    let rec = recommend(&reading("A", 60.0, false), &config());
    let json = serde_json::to_value(&rec).unwrap();
    assert_eq!(json["action"], "CHARGE");
    assert_eq!(json["threshold"], 80.0);
    assert!(json["timestamp"].is_string());
    assert!(json["reason"].as_str().unwrap().contains("60"));
}
