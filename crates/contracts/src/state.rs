//! StateSnapshot - StateBridge input
//!
//! Consolidated system state published by the aggregator and served to the
//! external dashboard.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Detection;

/// Current wall-clock time as unix seconds
pub fn unix_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Fill level of one compartment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillLevel {
    /// Compartment name
    pub compartment: String,

    /// Occupancy in percent, `None` until a first good reading exists
    pub percentage: Option<f64>,

    /// Time of the reading the percentage comes from
    pub last_good_at: Option<DateTime<Utc>>,

    /// Whether the latest measurement attempt failed and the cache was used
    #[serde(default)]
    pub stale: bool,
}

impl FillLevel {
    /// Level with no reading yet
    pub fn unknown(compartment: impl Into<String>) -> Self {
        Self {
            compartment: compartment.into(),
            percentage: None,
            last_good_at: None,
            stale: false,
        }
    }
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemState {
    #[default]
    Starting,
    Active,
    Error,
    Inactive,
}

impl SystemState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Error => "error",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System status with a human-readable message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub state: SystemState,
    pub message: String,
    pub timestamp: f64,
}

impl SystemStatus {
    pub fn new(state: SystemState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            timestamp: unix_timestamp(),
        }
    }

    pub fn starting() -> Self {
        Self::new(SystemState::Starting, "initializing")
    }

    pub fn active(message: impl Into<String>) -> Self {
        Self::new(SystemState::Active, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(SystemState::Error, message)
    }

    pub fn inactive(message: impl Into<String>) -> Self {
        Self::new(SystemState::Inactive, message)
    }
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self::starting()
    }
}

/// Last triggered detection as exposed to consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub class_name: String,
    pub confidence: f32,
}

impl From<&Detection> for DetectionSummary {
    fn from(detection: &Detection) -> Self {
        Self {
            class_name: detection.class_name.clone(),
            confidence: detection.confidence,
        }
    }
}

/// Event published by a worker into the state aggregator
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    /// Fresh set of fill levels from the level monitor
    FillLevels(Vec<FillLevel>),

    /// Detection that triggered an actuation
    Detection(DetectionSummary),

    /// Lifecycle transition or worker failure
    Status(SystemStatus),
}

/// Aggregate of the latest published state
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    /// Compartment name -> fill level
    pub fill_levels: BTreeMap<String, FillLevel>,

    /// Last triggered detection
    pub detection: Option<DetectionSummary>,

    /// Current system status
    pub status: SystemStatus,

    /// Time of the last applied event (unix seconds)
    pub updated_at: f64,
}

impl StateSnapshot {
    /// Snapshot with every compartment unknown and status `starting`
    pub fn new<I, S>(compartments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fill_levels = compartments
            .into_iter()
            .map(|name| {
                let name = name.into();
                (name.clone(), FillLevel::unknown(name))
            })
            .collect();
        Self {
            fill_levels,
            detection: None,
            status: SystemStatus::starting(),
            updated_at: unix_timestamp(),
        }
    }

    /// Apply one event in place
    pub fn apply(&mut self, event: StateEvent) {
        match event {
            StateEvent::FillLevels(levels) => {
                for level in levels {
                    self.fill_levels.insert(level.compartment.clone(), level);
                }
            }
            StateEvent::Detection(detection) => self.detection = Some(detection),
            StateEvent::Status(status) => self.status = status,
        }
        self.updated_at = unix_timestamp();
    }

    /// Wire representation served by the state bridge
    pub fn to_wire(&self) -> WireSnapshot {
        WireSnapshot {
            fill_levels: self
                .fill_levels
                .iter()
                .map(|(name, level)| (name.clone(), level.percentage))
                .collect(),
            detection: self.detection.clone(),
            system_status: self.status.state.as_str().to_string(),
            timestamp: self.updated_at,
        }
    }
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

/// JSON body of a `GET_DATA` reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSnapshot {
    pub fill_levels: BTreeMap<String, Option<f64>>,
    pub detection: Option<DetectionSummary>,
    pub system_status: String,
    pub timestamp: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_snapshot_is_starting_with_unknown_levels() {
        let snapshot = StateSnapshot::new(["Metal", "Glass"]);
        assert_eq!(snapshot.status.state, SystemState::Starting);
        assert_eq!(snapshot.fill_levels.len(), 2);
        assert!(snapshot.fill_levels.values().all(|l| l.percentage.is_none()));
        assert!(snapshot.detection.is_none());
    }

    #[test]
    fn apply_replaces_only_reported_compartments() {
        let mut snapshot = StateSnapshot::new(["Metal", "Glass"]);
        snapshot.apply(StateEvent::FillLevels(vec![FillLevel {
            compartment: "Glass".into(),
            percentage: Some(42.5),
            last_good_at: Some(Utc::now()),
            stale: false,
        }]));

        assert_eq!(snapshot.fill_levels["Glass"].percentage, Some(42.5));
        assert_eq!(snapshot.fill_levels["Metal"].percentage, None);
    }

    #[test]
    fn wire_format_matches_bridge_protocol() {
        let mut snapshot = StateSnapshot::new(["Metal"]);
        snapshot.apply(StateEvent::Status(SystemStatus::active("running")));
        snapshot.apply(StateEvent::Detection(DetectionSummary {
            class_name: "Plastic".into(),
            confidence: 0.75,
        }));

        let json = serde_json::to_value(snapshot.to_wire()).unwrap();
        assert_eq!(json["system_status"], "active");
        assert_eq!(json["detection"]["class_name"], "Plastic");
        assert_eq!(json["detection"]["confidence"], 0.75);
        assert!(json["fill_levels"]["Metal"].is_null());
        assert!(json["timestamp"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn wire_detection_is_null_when_absent() {
        let json = serde_json::to_value(StateSnapshot::new(["Metal"]).to_wire()).unwrap();
        assert!(json["detection"].is_null());
        assert_eq!(json["system_status"], "starting");
    }
}
