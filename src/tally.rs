//! Per-frame vehicle tally and traffic status.
//!
//! Counting is a pure function of one frame's detections: no state carries over
//! between frames, so a vehicle visible in many frames is counted once per frame.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::detect::Detection;

/// Default total at or above which a frame is classified as rush traffic.
pub const DEFAULT_RUSH_THRESHOLD: u32 = 10;

/// The five counted vehicle categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleCategory {
    Car,
    Truck,
    Bus,
    Motorcycle,
    Bicycle,
}

impl VehicleCategory {
    pub const ALL: [VehicleCategory; 5] = [
        VehicleCategory::Car,
        VehicleCategory::Truck,
        VehicleCategory::Bus,
        VehicleCategory::Motorcycle,
        VehicleCategory::Bicycle,
    ];

    /// Detector label for this category.
    pub fn label(self) -> &'static str {
        match self {
            VehicleCategory::Car => "car",
            VehicleCategory::Truck => "truck",
            VehicleCategory::Bus => "bus",
            VehicleCategory::Motorcycle => "motorcycle",
            VehicleCategory::Bicycle => "bicycle",
        }
    }

    /// Exact, case-sensitive label match. No synonyms, no normalization.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for VehicleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for VehicleCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_label(s).ok_or_else(|| {
            anyhow!(
                "'{}' is not a vehicle category (expected one of car, truck, bus, motorcycle, bicycle)",
                s
            )
        })
    }
}

/// Subset of the vehicle categories that count toward the tally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelevantCategories {
    enabled: [bool; 5],
}

impl RelevantCategories {
    pub fn all() -> Self {
        Self { enabled: [true; 5] }
    }

    pub fn from_categories(categories: impl IntoIterator<Item = VehicleCategory>) -> Result<Self> {
        let mut enabled = [false; 5];
        for category in categories {
            enabled[category.index()] = true;
        }
        if !enabled.iter().any(|e| *e) {
            return Err(anyhow!("at least one relevant vehicle category is required"));
        }
        Ok(Self { enabled })
    }

    /// Parse label strings such as `["car", "bus"]`.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let categories = labels
            .iter()
            .map(|l| l.as_ref().parse::<VehicleCategory>())
            .collect::<Result<Vec<_>>>()?;
        Self::from_categories(categories)
    }

    pub fn contains(&self, category: VehicleCategory) -> bool {
        self.enabled[category.index()]
    }

    /// Category for a detection label, if that label is counted.
    pub fn match_label(&self, label: &str) -> Option<VehicleCategory> {
        VehicleCategory::from_label(label).filter(|c| self.contains(*c))
    }

    pub fn categories(&self) -> Vec<VehicleCategory> {
        VehicleCategory::ALL
            .into_iter()
            .filter(|c| self.contains(*c))
            .collect()
    }
}

impl Default for RelevantCategories {
    fn default() -> Self {
        Self::all()
    }
}

/// Per-frame counts for the five vehicle categories.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTally {
    pub car: u32,
    pub truck: u32,
    pub bus: u32,
    pub motorcycle: u32,
    pub bicycle: u32,
}

impl FrameTally {
    pub fn count(&self, category: VehicleCategory) -> u32 {
        match category {
            VehicleCategory::Car => self.car,
            VehicleCategory::Truck => self.truck,
            VehicleCategory::Bus => self.bus,
            VehicleCategory::Motorcycle => self.motorcycle,
            VehicleCategory::Bicycle => self.bicycle,
        }
    }

    pub fn record(&mut self, category: VehicleCategory) {
        let slot = match category {
            VehicleCategory::Car => &mut self.car,
            VehicleCategory::Truck => &mut self.truck,
            VehicleCategory::Bus => &mut self.bus,
            VehicleCategory::Motorcycle => &mut self.motorcycle,
            VehicleCategory::Bicycle => &mut self.bicycle,
        };
        *slot = slot.saturating_add(1);
    }

    /// Sum of all five counters.
    pub fn total(&self) -> u32 {
        VehicleCategory::ALL
            .into_iter()
            .map(|c| self.count(c))
            .fold(0u32, u32::saturating_add)
    }
}

/// Count the detections whose label is a relevant vehicle category.
pub fn tally_detections(detections: &[Detection], relevant: &RelevantCategories) -> FrameTally {
    let mut tally = FrameTally::default();
    for detection in detections {
        if let Some(category) = relevant.match_label(&detection.label) {
            tally.record(category);
        }
    }
    tally
}

/// Binary traffic state derived from one frame's total.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrafficStatus {
    #[serde(rename = "Rush")]
    Rush,
    #[serde(rename = "No Rush")]
    NoRush,
}

impl TrafficStatus {
    /// `Rush` iff `total >= threshold`.
    pub fn classify(total: u32, threshold: RushThreshold) -> Self {
        if total >= threshold.get() {
            TrafficStatus::Rush
        } else {
            TrafficStatus::NoRush
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrafficStatus::Rush => "Rush",
            TrafficStatus::NoRush => "No Rush",
        }
    }

    pub fn is_rush(self) -> bool {
        matches!(self, TrafficStatus::Rush)
    }
}

impl fmt::Display for TrafficStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rush threshold, always >= 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RushThreshold(u32);

impl RushThreshold {
    pub fn new(value: u32) -> Result<Self> {
        if value == 0 {
            return Err(anyhow!("rush threshold must be >= 1"));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn classify(self, tally: &FrameTally) -> TrafficStatus {
        TrafficStatus::classify(tally.total(), self)
    }
}

impl Default for RushThreshold {
    fn default() -> Self {
        Self(DEFAULT_RUSH_THRESHOLD)
    }
}
