use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Possible charging actions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeAction {
    Charge,
    NoCharge,
    ContinueCharging,
}

impl ChargeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeAction::Charge => "CHARGE",
            ChargeAction::NoCharge => "NO_CHARGE",
            ChargeAction::ContinueCharging => "CONTINUE_CHARGING",
        }
    }

    /// True for actions that want power: `CHARGE` and `CONTINUE_CHARGING`
    pub fn needs_charging(&self) -> bool {
        matches!(self, ChargeAction::Charge | ChargeAction::ContinueCharging)
    }
}

impl fmt::Display for ChargeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Charging recommendation for one vehicle
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: ChargeAction,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub battery_percent: f64,
    pub threshold: f64,
    /// 0..=100, higher is more urgent
    pub priority_score: f64,
}

impl Recommendation {
    pub fn should_charge(&self) -> bool {
        self.action == ChargeAction::Charge
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (battery: {}%, threshold: {}%)",
            self.action, self.reason, self.battery_percent, self.threshold
        )
    }
}

/// Which vehicle should get the charger.
///
/// Serialized as the vehicle id, or the literal `"NONE"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    Vehicle(String),
    None,
}

impl Priority {
    pub const NONE_LABEL: &'static str = "NONE";

    pub fn vehicle_id(&self) -> Option<&str> {
        match self {
            Priority::Vehicle(id) => Some(id),
            Priority::None => None,
        }
    }
}

impl From<String> for Priority {
    fn from(value: String) -> Self {
        if value == Priority::NONE_LABEL {
            Priority::None
        } else {
            Priority::Vehicle(value)
        }
    }
}

impl From<Priority> for String {
    fn from(value: Priority) -> Self {
        match value {
            Priority::Vehicle(id) => id,
            Priority::None => Priority::NONE_LABEL.to_string(),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Vehicle(id) => f.write_str(id),
            Priority::None => f.write_str(Priority::NONE_LABEL),
        }
    }
}

/// Recommendations for the primary and optional secondary vehicle plus the priority verdict
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DualRecommendation {
    pub a: Recommendation,
    pub b: Option<Recommendation>,
    pub priority_vehicle: Priority,
}
