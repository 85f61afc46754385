use crate::status::StatusThresholds;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A hub as listed on the setup sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubProfile {
    pub hub_name: String,
    pub hub_email: String,
    pub spreadsheet_id: String,
    #[serde(default)]
    pub zipcode: String,
    #[serde(default)]
    pub search_radius: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HubState {
    /// Registered but its Hub HQ has not been seeded yet.
    SetUp,
    /// Seeded; picked up by every scheduled pass.
    Scheduled,
}

impl HubState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HubState::SetUp => "set_up",
            HubState::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for HubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HubState {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "set_up" | "setup" => Ok(HubState::SetUp),
            "scheduled" => Ok(HubState::Scheduled),
            other => Err(format!("Unknown hub state: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hub {
    pub profile: HubProfile,
    pub state: HubState,
    pub thresholds: StatusThresholds,
}

impl Hub {
    pub fn name(&self) -> &str {
        &self.profile.hub_name
    }
}
