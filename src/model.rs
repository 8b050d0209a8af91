//! Layout model: zones, profiles and window match rules
//!
//! Pure data with validation and serde support. Zones use normalized
//! coordinates ([0,1] of a monitor's usable area) so a profile edited on
//! one machine applies cleanly to any monitor size.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Minimum zone edge length in normalized units
pub const MIN_ZONE_SIZE: f64 = 0.02;

/// Tolerance for floating-point coordinate comparison
pub const COORD_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("zone '{name}' has invalid geometry: x={x} y={y} width={width} height={height}")]
    InvalidGeometry {
        name: String,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    #[error("profile '{0}' has no zones")]
    EmptyProfile(String),
    #[error("zone is smaller than the {MIN_ZONE_SIZE}x{MIN_ZONE_SIZE} minimum")]
    ZoneTooSmall,
}

/// How a zone selects its target window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum MatchRule {
    /// Exact window title
    Title(String),
    /// Regex over the window class (second WM_CLASS field)
    Class(String),
    /// Next unmatched window in stacking order
    Any,
}

/// A rectangular region of one monitor slot's usable area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(default)]
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,

    /// Placement order for overlapping zones; higher values are placed
    /// later and therefore end up on top. Defaults to list position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,

    /// Logical monitor slot this zone belongs to (0..monitor_slot_count)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub slot: usize,

    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<MatchRule>,

    /// Command launched for this zone on `apply --launch`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

fn is_zero(slot: &usize) -> bool {
    *slot == 0
}

impl Zone {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            name: String::new(),
            x,
            y,
            width,
            height,
            order: None,
            slot: 0,
            rule: None,
            command: None,
        }
    }

    /// Effective match rule; zones without an explicit rule take the next
    /// unmatched window, like `Any`.
    pub fn rule(&self) -> &MatchRule {
        self.rule.as_ref().unwrap_or(&MatchRule::Any)
    }

    /// Check the rectangle invariant: positive size, contained in [0,1]².
    pub fn validate(&self) -> Result<(), LayoutError> {
        let ok = self.width > 0.0
            && self.height > 0.0
            && self.x >= 0.0
            && self.y >= 0.0
            && self.x + self.width <= 1.0 + COORD_TOLERANCE
            && self.y + self.height <= 1.0 + COORD_TOLERANCE;
        if ok {
            Ok(())
        } else {
            Err(LayoutError::InvalidGeometry {
                name: self.name.clone(),
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
            })
        }
    }

    /// Coordinate-wise comparison within [`COORD_TOLERANCE`]
    pub fn approx_eq(&self, other: &Zone) -> bool {
        (self.x - other.x).abs() <= COORD_TOLERANCE
            && (self.y - other.y).abs() <= COORD_TOLERANCE
            && (self.width - other.width).abs() <= COORD_TOLERANCE
            && (self.height - other.height).abs() <= COORD_TOLERANCE
            && self.name == other.name
            && self.order == other.order
            && self.slot == other.slot
            && self.rule == other.rule
            && self.command == other.command
    }
}

/// A named tiling layout: an ordered set of zones plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default = "default_slot_count")]
    pub monitor_slot_count: usize,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub modified_at: u64,
}

fn default_slot_count() -> usize {
    1
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        let now = unix_now();
        Self {
            name: name.into(),
            monitor_slot_count: 1,
            zones: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Validate every zone plus the non-empty invariant
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.zones.is_empty() {
            return Err(LayoutError::EmptyProfile(self.name.clone()));
        }
        for zone in &self.zones {
            zone.validate()?;
        }
        Ok(())
    }

    /// Update the modification timestamp
    pub fn touch(&mut self) {
        self.modified_at = unix_now();
    }

    pub fn approx_eq(&self, other: &Profile) -> bool {
        self.name == other.name
            && self.monitor_slot_count == other.monitor_slot_count
            && self.zones.len() == other.zones.len()
            && self
                .zones
                .iter()
                .zip(&other.zones)
                .all(|(a, b)| a.approx_eq(b))
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
