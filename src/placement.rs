//! Placement service: resolve a profile against live monitors and windows
//!
//! Consumes frozen `Profile` values only; editor state is never shared with
//! this module. Monitor topology and the open-window list are queried fresh
//! on every apply so monitor hotplug between edit time and apply time is
//! tolerated.

use std::collections::HashSet;
use std::process::Command;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::model::{MatchRule, Profile, Zone};

/// Absolute pixel rectangle handed to the placement sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One physical monitor's usable area in pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monitor {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

pub type WindowId = u32;

/// An open window as reported by the window enumeration provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
    pub class: String,
}

/// Capability interface to the host window manager. `monitors` and
/// `windows` must reflect the live state on every call; `place` is
/// fire-and-forget per window.
pub trait WindowSystem {
    /// Ordered monitors with pixel origin and usable size
    fn monitors(&self) -> Result<Vec<Monitor>>;
    /// Open windows, most recently raised first
    fn windows(&self) -> Result<Vec<WindowInfo>>;
    /// Move and resize one window
    fn place(&self, id: WindowId, rect: PixelRect) -> Result<()>;
}

/// A zone resolved to a window and absolute geometry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub zone: String,
    pub window: WindowId,
    pub rect: PixelRect,
}

/// Computed placement plan, before any command is issued
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Filled zones in the order their placement commands will be issued
    pub placements: Vec<Placement>,
    /// Zones no window matched (not an error)
    pub unfilled: Vec<String>,
    /// Monitor slots dropped because fewer monitors are present
    pub missing_slots: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementFailure {
    pub zone: String,
    pub window: WindowId,
    pub error: String,
}

/// Partial-success result of an apply operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub placed: Vec<Placement>,
    pub failed: Vec<PlacementFailure>,
    pub unfilled: Vec<String>,
    pub missing_slots: Vec<usize>,
}

impl ApplyReport {
    /// True when every filled zone was placed and no slot was dropped
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.missing_slots.is_empty()
    }
}

/// Round to the nearest pixel, halves away from zero
fn round_px(v: f64) -> i32 {
    v.round() as i32
}

/// Convert a zone's normalized rect to absolute pixels on its monitor
fn to_pixels(zone: &Zone, monitor: &Monitor) -> PixelRect {
    PixelRect {
        x: round_px(monitor.x as f64 + zone.x * monitor.width as f64),
        y: round_px(monitor.y as f64 + zone.y * monitor.height as f64),
        width: round_px(zone.width * monitor.width as f64).max(1) as u32,
        height: round_px(zone.height * monitor.height as f64).max(1) as u32,
    }
}

enum CompiledRule<'a> {
    Title(&'a str),
    Class(Regex),
    Any,
    /// Invalid class regex; matches nothing
    Broken,
}

fn compile_rule(rule: &MatchRule) -> CompiledRule<'_> {
    match rule {
        MatchRule::Title(title) => CompiledRule::Title(title),
        MatchRule::Class(pattern) => match Regex::new(pattern) {
            Ok(re) => CompiledRule::Class(re),
            Err(err) => {
                warn!(pattern = %pattern, error = %err, "invalid class pattern, zone left unfilled");
                CompiledRule::Broken
            }
        },
        MatchRule::Any => CompiledRule::Any,
    }
}

impl CompiledRule<'_> {
    fn matches(&self, window: &WindowInfo) -> bool {
        match self {
            CompiledRule::Title(title) => window.title == *title,
            CompiledRule::Class(re) => re.is_match(&window.class),
            CompiledRule::Any => true,
            CompiledRule::Broken => false,
        }
    }
}

pub struct PlacementService<W> {
    system: W,
}

impl<W: WindowSystem> PlacementService<W> {
    pub fn new(system: W) -> Self {
        Self { system }
    }

    /// Compute the placement plan for a profile without issuing commands.
    pub fn plan(&self, profile: &Profile) -> Result<Plan> {
        profile.validate()?;

        let monitors = self.system.monitors()?;
        let windows = self.system.windows()?;
        debug!(
            monitors = monitors.len(),
            windows = windows.len(),
            "planning placement for profile '{}'",
            profile.name
        );

        // Slots beyond the physical monitor count lose their zones
        let mut missing_slots: Vec<usize> = (monitors.len()..profile.monitor_slot_count).collect();
        for zone in &profile.zones {
            if zone.slot >= monitors.len() && !missing_slots.contains(&zone.slot) {
                missing_slots.push(zone.slot);
            }
        }
        missing_slots.sort_unstable();
        for slot in &missing_slots {
            warn!(slot = slot, "monitor slot has no physical monitor, dropping its zones");
        }

        let mut assigned: HashSet<WindowId> = HashSet::new();
        let mut placements: Vec<(u32, Placement)> = Vec::new();
        let mut unfilled = Vec::new();

        for (index, zone) in profile.zones.iter().enumerate() {
            let Some(monitor) = monitors.get(zone.slot) else {
                continue;
            };
            let rule = compile_rule(zone.rule());
            let window = windows
                .iter()
                .find(|w| !assigned.contains(&w.id) && rule.matches(w));
            let Some(window) = window else {
                unfilled.push(zone.name.clone());
                continue;
            };
            assigned.insert(window.id);
            let order = zone.order.unwrap_or(index as u32);
            placements.push((
                order,
                Placement {
                    zone: zone.name.clone(),
                    window: window.id,
                    rect: to_pixels(zone, monitor),
                },
            ));
        }

        // Ascending order index; for overlapping zones the later command
        // lands on top. Stable, so equal orders keep profile order.
        placements.sort_by_key(|(order, _)| *order);

        Ok(Plan {
            placements: placements.into_iter().map(|(_, p)| p).collect(),
            unfilled,
            missing_slots,
        })
    }

    /// Compute and execute a plan. Individual placement failures are
    /// collected into the report; the apply never aborts because of one
    /// bad zone or window.
    pub fn apply(&self, profile: &Profile) -> Result<ApplyReport> {
        let plan = self.plan(profile)?;
        let mut report = ApplyReport {
            unfilled: plan.unfilled,
            missing_slots: plan.missing_slots,
            ..Default::default()
        };

        for placement in plan.placements {
            match self.system.place(placement.window, placement.rect) {
                Ok(()) => {
                    info!(
                        zone = %placement.zone,
                        window = placement.window,
                        rect = ?placement.rect,
                        "placed window"
                    );
                    report.placed.push(placement);
                }
                Err(err) => {
                    warn!(
                        zone = %placement.zone,
                        window = placement.window,
                        error = %err,
                        "placement failed, skipping"
                    );
                    report.failed.push(PlacementFailure {
                        zone: placement.zone,
                        window: placement.window,
                        error: format!("{err:#}"),
                    });
                }
            }
        }

        info!(
            placed = report.placed.len(),
            failed = report.failed.len(),
            unfilled = report.unfilled.len(),
            "apply finished for profile '{}'",
            profile.name
        );
        Ok(report)
    }

    /// Launch the commands configured on the profile's zones. Spawn
    /// failures are logged, not fatal; returns the number launched.
    pub fn launch(&self, profile: &Profile) -> usize {
        let mut launched = 0;
        for zone in &profile.zones {
            let Some(cmd) = zone.command.as_deref().filter(|c| !c.trim().is_empty()) else {
                continue;
            };
            match Command::new("sh").arg("-c").arg(cmd).spawn() {
                Ok(child) => {
                    info!(zone = %zone.name, pid = child.id(), command = %cmd, "launched zone command");
                    launched += 1;
                }
                Err(err) => {
                    warn!(zone = %zone.name, command = %cmd, error = %err, "failed to launch zone command");
                }
            }
        }
        launched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LayoutError;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    struct FakeSystem {
        monitors: Vec<Monitor>,
        windows: Vec<WindowInfo>,
        placed: RefCell<Vec<(WindowId, PixelRect)>>,
        failing: HashSet<WindowId>,
    }

    impl FakeSystem {
        fn new(monitors: Vec<Monitor>, windows: Vec<WindowInfo>) -> Self {
            Self {
                monitors,
                windows,
                placed: RefCell::new(Vec::new()),
                failing: HashSet::new(),
            }
        }
    }

    impl WindowSystem for FakeSystem {
        fn monitors(&self) -> Result<Vec<Monitor>> {
            Ok(self.monitors.clone())
        }

        fn windows(&self) -> Result<Vec<WindowInfo>> {
            Ok(self.windows.clone())
        }

        fn place(&self, id: WindowId, rect: PixelRect) -> Result<()> {
            if self.failing.contains(&id) {
                anyhow::bail!("window {id} no longer exists");
            }
            self.placed.borrow_mut().push((id, rect));
            Ok(())
        }
    }

    fn monitor_1080p() -> Monitor {
        Monitor {
            name: "HDMI-1".to_string(),
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
        }
    }

    fn window(id: WindowId, title: &str, class: &str) -> WindowInfo {
        WindowInfo {
            id,
            title: title.to_string(),
            class: class.to_string(),
        }
    }

    fn named_zone(name: &str, x: f64, y: f64, w: f64, h: f64) -> Zone {
        let mut zone = Zone::new(x, y, w, h);
        zone.name = name.to_string();
        zone
    }

    fn half_split_profile() -> Profile {
        let mut profile = Profile::new("halves");
        profile.zones = vec![
            named_zone("a", 0.0, 0.0, 0.5, 1.0),
            named_zone("b", 0.5, 0.0, 0.5, 1.0),
        ];
        profile
    }

    #[test]
    fn test_half_split_yields_exact_pixel_rects() {
        let system = FakeSystem::new(
            vec![monitor_1080p()],
            vec![window(1, "left", "x"), window(2, "right", "y")],
        );
        let service = PlacementService::new(system);
        let report = service.apply(&half_split_profile()).unwrap();

        assert_eq!(
            report.placed,
            vec![
                Placement {
                    zone: "a".to_string(),
                    window: 1,
                    rect: PixelRect { x: 0, y: 0, width: 960, height: 1080 },
                },
                Placement {
                    zone: "b".to_string(),
                    window: 2,
                    rect: PixelRect { x: 960, y: 0, width: 960, height: 1080 },
                },
            ]
        );
        assert!(report.is_clean());
    }

    #[test]
    fn test_monitor_origin_offsets_second_monitor_zones() {
        let second = Monitor {
            name: "DP-1".to_string(),
            x: 1920,
            y: 0,
            width: 2560,
            height: 1440,
        };
        let system = FakeSystem::new(
            vec![monitor_1080p(), second],
            vec![window(7, "term", "alacritty")],
        );
        let mut profile = Profile::new("right-monitor");
        profile.monitor_slot_count = 2;
        let mut zone = named_zone("z", 0.25, 0.5, 0.5, 0.5);
        zone.slot = 1;
        profile.zones = vec![zone];

        let plan = PlacementService::new(system).plan(&profile).unwrap();
        assert_eq!(
            plan.placements[0].rect,
            PixelRect { x: 1920 + 640, y: 720, width: 1280, height: 720 }
        );
    }

    #[test]
    fn test_missing_monitor_drops_slot_and_reports_it() {
        let system = FakeSystem::new(vec![monitor_1080p()], vec![window(1, "w", "c")]);
        let mut profile = half_split_profile();
        profile.monitor_slot_count = 2;
        profile.zones[1].slot = 1;

        let report = PlacementService::new(system).apply(&profile).unwrap();
        assert_eq!(report.missing_slots, vec![1]);
        assert_eq!(report.placed.len(), 1);
        assert_eq!(report.placed[0].zone, "a");
    }

    #[test]
    fn test_unmatched_zone_is_reported_unfilled_not_an_error() {
        let system = FakeSystem::new(vec![monitor_1080p()], vec![window(1, "browser", "firefox")]);
        let mut profile = half_split_profile();
        profile.zones[0].rule = Some(MatchRule::Class("^firefox$".to_string()));
        profile.zones[1].rule = Some(MatchRule::Title("no such window".to_string()));

        let report = PlacementService::new(system).apply(&profile).unwrap();
        assert_eq!(report.placed.len(), 1);
        assert_eq!(report.unfilled, vec!["b".to_string()]);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_explicit_rules_beat_stacking_order() {
        let system = FakeSystem::new(
            vec![monitor_1080p()],
            vec![
                window(10, "top of stack", "editor"),
                window(11, "Monitoring", "btop-dash"),
            ],
        );
        let mut profile = half_split_profile();
        profile.zones[0].rule = Some(MatchRule::Class("btop".to_string()));

        let plan = PlacementService::new(system).plan(&profile).unwrap();
        assert_eq!(plan.placements[0].window, 11);
        // The `any` zone takes the next unassigned window in stacking order
        assert_eq!(plan.placements[1].window, 10);
    }

    #[test]
    fn test_overlapping_zones_issue_commands_in_order_index() {
        let system = FakeSystem::new(
            vec![monitor_1080p()],
            vec![window(1, "a", ""), window(2, "b", "")],
        );
        let mut profile = Profile::new("stack");
        let mut back = named_zone("back", 0.0, 0.0, 1.0, 1.0);
        back.order = Some(5);
        let mut front = named_zone("front", 0.25, 0.25, 0.5, 0.5);
        front.order = Some(9);
        // Profile order has the topmost zone first; order index must win
        profile.zones = vec![front, back];

        let service = PlacementService::new(system);
        let report = service.apply(&profile).unwrap();
        assert_eq!(report.placed[0].zone, "back");
        assert_eq!(report.placed[1].zone, "front");

        let placed = service.system.placed.borrow();
        assert_eq!(placed.len(), 2);
        // Last write wins: the front zone's command was issued last
        assert_eq!(placed[1].0, report.placed[1].window);
    }

    #[test]
    fn test_placement_failure_is_collected_not_fatal() {
        let mut system = FakeSystem::new(
            vec![monitor_1080p()],
            vec![window(1, "a", ""), window(2, "b", "")],
        );
        system.failing.insert(1);

        let report = PlacementService::new(system)
            .apply(&half_split_profile())
            .unwrap();
        assert_eq!(report.placed.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].window, 1);
        assert!(report.failed[0].error.contains("no longer exists"));
    }

    #[test]
    fn test_no_windows_is_an_empty_success_set() {
        let system = FakeSystem::new(vec![monitor_1080p()], vec![]);
        let report = PlacementService::new(system)
            .apply(&half_split_profile())
            .unwrap();
        assert!(report.placed.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(report.unfilled, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_empty_profile_is_rejected() {
        let system = FakeSystem::new(vec![monitor_1080p()], vec![]);
        let err = PlacementService::new(system)
            .plan(&Profile::new("empty"))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<LayoutError>(),
            Some(&LayoutError::EmptyProfile("empty".to_string()))
        );
    }

    #[test]
    fn test_invalid_class_regex_leaves_zone_unfilled() {
        let system = FakeSystem::new(vec![monitor_1080p()], vec![window(1, "w", "c")]);
        let mut profile = Profile::new("broken");
        let mut zone = named_zone("z", 0.0, 0.0, 1.0, 1.0);
        zone.rule = Some(MatchRule::Class("(unclosed".to_string()));
        profile.zones = vec![zone];

        let report = PlacementService::new(system).apply(&profile).unwrap();
        assert!(report.placed.is_empty());
        assert_eq!(report.unfilled, vec!["z".to_string()]);
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        // 0.5 of a 1001px monitor lands on a .5 pixel boundary
        let monitor = Monitor {
            name: "m".to_string(),
            x: 0,
            y: 0,
            width: 1001,
            height: 1001,
        };
        let rect = to_pixels(&Zone::new(0.5, 0.0, 0.5, 1.0), &monitor);
        assert_eq!(rect.x, 501); // 500.5 rounds away from zero
        assert_eq!(rect.width, 501);
    }
}
