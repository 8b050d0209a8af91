//! Canvas editor: drag-based construction of tiling profiles
//!
//! Headless interaction state machine over one monitor slot's normalized
//! surface. A host UI feeds pointer positions into begin/update/end drag
//! calls and draws the zones plus the in-progress candidate; the editor
//! owns hit testing, snapping and validation so no invalid zone is ever
//! committed.

use tracing::debug;

use crate::model::{LayoutError, Profile, Zone, COORD_TOLERANCE, MIN_ZONE_SIZE};

/// Default grid cell size in normalized units
pub const DEFAULT_GRID_SIZE: f64 = 0.05;

/// Default distance within which a dragged edge snaps to a neighbor edge
pub const DEFAULT_SNAP_TOLERANCE: f64 = 0.02;

/// Distance from a zone edge within which a drag starts a resize
const RESIZE_HANDLE: f64 = 0.015;

/// Pointer position on the normalized canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Normalized rectangle of an in-progress drag
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Stable handle to a zone inside the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneId(u64);

#[derive(Debug, Clone, Copy, Default)]
struct ResizeEdges {
    left: bool,
    right: bool,
    top: bool,
    bottom: bool,
}

impl ResizeEdges {
    fn any(&self) -> bool {
        self.left || self.right || self.top || self.bottom
    }
}

#[derive(Debug, Clone)]
enum DragKind {
    Create { anchor: Point },
    Move { id: ZoneId, grab: Point },
    Resize { id: ZoneId, edges: ResizeEdges },
}

#[derive(Debug, Clone)]
struct DragState {
    kind: DragKind,
    candidate: Rect,
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    X,
    Y,
}

/// Snap a coordinate to the nearest grid line
pub fn snap_to_grid(v: f64, grid: f64) -> f64 {
    (v / grid).round() * grid
}

#[derive(Debug)]
struct SnapCandidate {
    offset: f64,
    distance: f64,
}

fn check_snap(best: &mut Option<SnapCandidate>, edge: f64, target: f64, tolerance: f64) {
    let distance = (edge - target).abs();
    if distance <= tolerance {
        let candidate = SnapCandidate {
            offset: target - edge,
            distance,
        };
        if best.as_ref().map_or(true, |b| candidate.distance < b.distance) {
            *best = Some(candidate);
        }
    }
}

/// Interactive editor for one monitor slot's zones
pub struct CanvasEditor {
    slot: usize,
    zones: Vec<(ZoneId, Zone)>,
    next_id: u64,
    drag: Option<DragState>,
    grid_size: f64,
    snap_tolerance: f64,
}

impl Default for CanvasEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasEditor {
    pub fn new() -> Self {
        Self::for_slot(0)
    }

    pub fn for_slot(slot: usize) -> Self {
        Self {
            slot,
            zones: Vec::new(),
            next_id: 0,
            drag: None,
            grid_size: DEFAULT_GRID_SIZE,
            snap_tolerance: DEFAULT_SNAP_TOLERANCE,
        }
    }

    /// Load an existing profile's zones for the given slot
    pub fn from_profile(profile: &Profile, slot: usize) -> Self {
        let mut editor = Self::for_slot(slot);
        for zone in profile.zones.iter().filter(|z| z.slot == slot) {
            let id = editor.alloc_id();
            editor.zones.push((id, zone.clone()));
        }
        editor
    }

    pub fn with_grid_size(mut self, grid_size: f64) -> Self {
        self.grid_size = grid_size;
        self
    }

    pub fn with_snap_tolerance(mut self, snap_tolerance: f64) -> Self {
        self.snap_tolerance = snap_tolerance;
        self
    }

    fn alloc_id(&mut self) -> ZoneId {
        let id = ZoneId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn zones(&self) -> impl Iterator<Item = (ZoneId, &Zone)> {
        self.zones.iter().map(|(id, z)| (*id, z))
    }

    pub fn zone(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.iter().find(|(zid, _)| *zid == id).map(|(_, z)| z)
    }

    fn zone_mut(&mut self, id: ZoneId) -> Option<&mut Zone> {
        self.zones
            .iter_mut()
            .find(|(zid, _)| *zid == id)
            .map(|(_, z)| z)
    }

    /// Rectangle of the drag in progress, for UI feedback
    pub fn candidate(&self) -> Option<Rect> {
        self.drag.as_ref().map(|d| d.candidate)
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Start a drag interaction. Hits an existing zone's edge to resize it,
    /// its body to move it, or empty space to create a new zone. Topmost
    /// (most recently committed) zones win the hit test.
    pub fn begin_drag(&mut self, pos: Point) {
        if self.drag.is_some() {
            debug!("begin_drag ignored: drag already in progress");
            return;
        }

        let kind = self
            .hit_test(pos)
            .unwrap_or(DragKind::Create { anchor: pos });
        let candidate = self.compute_candidate(&kind, pos);
        self.drag = Some(DragState { kind, candidate });
    }

    /// Recompute the in-progress rectangle for a new pointer position,
    /// applying grid and neighbor-edge snapping.
    pub fn update_drag(&mut self, pos: Point) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        let candidate = self.compute_candidate(&drag.kind, pos);
        self.drag = Some(DragState {
            kind: drag.kind,
            candidate,
        });
    }

    /// Commit the drag. The candidate is validated first: rectangles below
    /// the minimum size are rejected with `ZoneTooSmall` and the zone set is
    /// left unchanged. Returns the committed zone's id, or `Ok(None)` when
    /// no drag was in progress.
    pub fn end_drag(&mut self) -> Result<Option<ZoneId>, LayoutError> {
        let Some(drag) = self.drag.take() else {
            return Ok(None);
        };
        let rect = drag.candidate;

        if rect.width + COORD_TOLERANCE < MIN_ZONE_SIZE
            || rect.height + COORD_TOLERANCE < MIN_ZONE_SIZE
        {
            debug!(
                width = rect.width,
                height = rect.height,
                "discarding drag: below minimum zone size"
            );
            return Err(LayoutError::ZoneTooSmall);
        }

        match drag.kind {
            DragKind::Create { .. } => {
                let id = self.alloc_id();
                let mut zone = Zone::new(rect.x, rect.y, rect.width, rect.height);
                zone.name = format!("zone-{}", id.0);
                zone.slot = self.slot;
                zone.validate()?;
                self.zones.push((id, zone));
                Ok(Some(id))
            }
            DragKind::Move { id, .. } | DragKind::Resize { id, .. } => {
                let Some(zone) = self.zone(id) else {
                    return Ok(None);
                };
                let mut updated = zone.clone();
                updated.x = rect.x;
                updated.y = rect.y;
                updated.width = rect.width;
                updated.height = rect.height;
                updated.validate()?;
                if let Some(zone) = self.zone_mut(id) {
                    *zone = updated;
                }
                Ok(Some(id))
            }
        }
    }

    /// Remove a zone. Unknown ids are ignored.
    pub fn delete_zone(&mut self, id: ZoneId) {
        self.zones.retain(|(zid, _)| *zid != id);
        // A drag on the deleted zone has nothing left to commit
        if let Some(drag) = &self.drag {
            let dragged = match drag.kind {
                DragKind::Move { id: did, .. } | DragKind::Resize { id: did, .. } => Some(did),
                DragKind::Create { .. } => None,
            };
            if dragged == Some(id) {
                self.drag = None;
            }
        }
    }

    /// Immutable snapshot of the edited layout. Fails with `EmptyProfile`
    /// when nothing has been committed yet; the snapshot is detached from
    /// the editor, so later edits never reach a consumer of the export.
    pub fn export_profile(&self, name: &str) -> Result<Profile, LayoutError> {
        if self.zones.is_empty() {
            return Err(LayoutError::EmptyProfile(name.to_string()));
        }
        let mut profile = Profile::new(name);
        profile.zones = self.zones.iter().map(|(_, z)| z.clone()).collect();
        profile.monitor_slot_count = profile
            .zones
            .iter()
            .map(|z| z.slot + 1)
            .max()
            .unwrap_or(1);
        profile.validate()?;
        Ok(profile)
    }

    // --- hit testing and snapping ---

    fn hit_test(&self, pos: Point) -> Option<DragKind> {
        for (id, z) in self.zones.iter().rev() {
            let within_x = pos.x >= z.x - RESIZE_HANDLE && pos.x <= z.x + z.width + RESIZE_HANDLE;
            let within_y = pos.y >= z.y - RESIZE_HANDLE && pos.y <= z.y + z.height + RESIZE_HANDLE;
            if !within_x || !within_y {
                continue;
            }

            let edges = ResizeEdges {
                left: (pos.x - z.x).abs() <= RESIZE_HANDLE,
                right: (pos.x - (z.x + z.width)).abs() <= RESIZE_HANDLE,
                top: (pos.y - z.y).abs() <= RESIZE_HANDLE,
                bottom: (pos.y - (z.y + z.height)).abs() <= RESIZE_HANDLE,
            };
            if edges.any() {
                return Some(DragKind::Resize { id: *id, edges });
            }
            if pos.x > z.x && pos.x < z.x + z.width && pos.y > z.y && pos.y < z.y + z.height {
                return Some(DragKind::Move {
                    id: *id,
                    grab: Point::new(pos.x - z.x, pos.y - z.y),
                });
            }
        }
        None
    }

    fn compute_candidate(&self, kind: &DragKind, pos: Point) -> Rect {
        match kind {
            DragKind::Create { anchor } => {
                let x1 = self.snap_coord(anchor.x, None, Axis::X);
                let x2 = self.snap_coord(pos.x, None, Axis::X);
                let y1 = self.snap_coord(anchor.y, None, Axis::Y);
                let y2 = self.snap_coord(pos.y, None, Axis::Y);
                Rect {
                    x: x1.min(x2),
                    y: y1.min(y2),
                    width: (x2 - x1).abs(),
                    height: (y2 - y1).abs(),
                }
            }
            DragKind::Move { id, grab } => {
                let Some(z) = self.zone(*id) else {
                    return Rect {
                        x: pos.x,
                        y: pos.y,
                        width: 0.0,
                        height: 0.0,
                    };
                };
                let x = self.snap_origin(pos.x - grab.x, z.width, Some(*id), Axis::X);
                let y = self.snap_origin(pos.y - grab.y, z.height, Some(*id), Axis::Y);
                Rect {
                    x,
                    y,
                    width: z.width,
                    height: z.height,
                }
            }
            DragKind::Resize { id, edges } => {
                let Some(z) = self.zone(*id) else {
                    return Rect {
                        x: pos.x,
                        y: pos.y,
                        width: 0.0,
                        height: 0.0,
                    };
                };
                let (mut x1, mut x2) = (z.x, z.x + z.width);
                let (mut y1, mut y2) = (z.y, z.y + z.height);
                if edges.left {
                    x1 = self.snap_coord(pos.x, Some(*id), Axis::X);
                }
                if edges.right {
                    x2 = self.snap_coord(pos.x, Some(*id), Axis::X);
                }
                if edges.top {
                    y1 = self.snap_coord(pos.y, Some(*id), Axis::Y);
                }
                if edges.bottom {
                    y2 = self.snap_coord(pos.y, Some(*id), Axis::Y);
                }
                Rect {
                    x: x1.min(x2),
                    y: y1.min(y2),
                    width: (x2 - x1).abs(),
                    height: (y2 - y1).abs(),
                }
            }
        }
    }

    fn neighbor_edges(&self, exclude: Option<ZoneId>, axis: Axis) -> Vec<f64> {
        self.zones
            .iter()
            .filter(|(id, _)| Some(*id) != exclude)
            .flat_map(|(_, z)| match axis {
                Axis::X => [z.x, z.x + z.width],
                Axis::Y => [z.y, z.y + z.height],
            })
            .collect()
    }

    /// Snap a single coordinate: the closest neighbor edge within tolerance
    /// wins, otherwise the grid does.
    fn snap_coord(&self, v: f64, exclude: Option<ZoneId>, axis: Axis) -> f64 {
        let mut best: Option<SnapCandidate> = None;
        for target in self.neighbor_edges(exclude, axis) {
            check_snap(&mut best, v, target, self.snap_tolerance);
        }
        let snapped = match best {
            Some(s) => v + s.offset,
            None => snap_to_grid(v, self.grid_size),
        };
        snapped.clamp(0.0, 1.0)
    }

    /// Snap a moved rectangle's origin, considering both of its edges on
    /// the axis so either side can land flush against a neighbor.
    fn snap_origin(&self, origin: f64, size: f64, exclude: Option<ZoneId>, axis: Axis) -> f64 {
        let mut best: Option<SnapCandidate> = None;
        for target in self.neighbor_edges(exclude, axis) {
            check_snap(&mut best, origin, target, self.snap_tolerance);
            check_snap(&mut best, origin + size, target, self.snap_tolerance);
        }
        let snapped = match best {
            Some(s) => origin + s.offset,
            None => snap_to_grid(origin, self.grid_size),
        };
        snapped.clamp(0.0, (1.0 - size).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drag(editor: &mut CanvasEditor, from: (f64, f64), to: (f64, f64)) -> Result<Option<ZoneId>, LayoutError> {
        editor.begin_drag(Point::new(from.0, from.1));
        editor.update_drag(Point::new(to.0, to.1));
        editor.end_drag()
    }

    #[test]
    fn test_create_drag_commits_snapped_zone() {
        let mut editor = CanvasEditor::new();
        let id = drag(&mut editor, (0.01, 0.02), (0.48, 0.99))
            .unwrap()
            .unwrap();
        let zone = editor.zone(id).unwrap();
        assert_eq!(zone.x, 0.0);
        assert_eq!(zone.y, 0.0);
        assert_eq!(zone.width, 0.5);
        assert_eq!(zone.height, 1.0);
    }

    #[test]
    fn test_create_below_minimum_is_rejected_and_zone_set_unchanged() {
        let mut editor = CanvasEditor::new().with_grid_size(0.01);
        let result = drag(&mut editor, (0.3, 0.3), (0.31, 0.31));
        assert_eq!(result, Err(LayoutError::ZoneTooSmall));
        assert_eq!(editor.zones().count(), 0);
        assert!(!editor.is_dragging());
    }

    #[test]
    fn test_grid_snapping_is_idempotent() {
        for v in [0.0, 0.03, 0.15, 0.333, 0.4999, 0.72, 1.0] {
            let once = snap_to_grid(v, DEFAULT_GRID_SIZE);
            let twice = snap_to_grid(once, DEFAULT_GRID_SIZE);
            assert_eq!(once, twice, "snapping {v} was not idempotent");
        }
    }

    #[test]
    fn test_edge_snapping_makes_neighbors_flush() {
        let mut editor = CanvasEditor::new();
        drag(&mut editor, (0.0, 0.0), (0.5, 1.0)).unwrap().unwrap();
        // 0.52 is outside the resize handle but within snap tolerance of the
        // first zone's right edge at 0.5
        let id = drag(&mut editor, (0.52, 0.0), (1.0, 1.0)).unwrap().unwrap();
        let zone = editor.zone(id).unwrap();
        assert_eq!(zone.x, 0.5);
        assert_eq!(zone.width, 0.5);
    }

    #[test]
    fn test_body_drag_moves_zone_and_keeps_id() {
        let mut editor = CanvasEditor::new();
        let id = drag(&mut editor, (0.2, 0.2), (0.4, 0.4)).unwrap().unwrap();

        editor.begin_drag(Point::new(0.3, 0.3));
        editor.update_drag(Point::new(0.5, 0.5));
        let moved = editor.end_drag().unwrap().unwrap();
        assert_eq!(moved, id);

        let zone = editor.zone(id).unwrap();
        assert_eq!((zone.x, zone.y), (0.4, 0.4));
        assert_eq!((zone.width, zone.height), (0.2, 0.2));
    }

    #[test]
    fn test_edge_drag_resizes_zone() {
        let mut editor = CanvasEditor::new();
        let id = drag(&mut editor, (0.2, 0.2), (0.4, 0.4)).unwrap().unwrap();

        // Grab the right edge and pull it to 0.6
        editor.begin_drag(Point::new(0.4, 0.3));
        editor.update_drag(Point::new(0.62, 0.3));
        editor.end_drag().unwrap().unwrap();

        let zone = editor.zone(id).unwrap();
        assert_eq!(zone.x, 0.2);
        assert!((zone.width - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_failed_resize_leaves_zone_unchanged() {
        let mut editor = CanvasEditor::new();
        let id = drag(&mut editor, (0.2, 0.2), (0.4, 0.4)).unwrap().unwrap();
        let before = editor.zone(id).unwrap().clone();

        // Collapse the right edge onto the left one
        editor.begin_drag(Point::new(0.4, 0.3));
        editor.update_drag(Point::new(0.2, 0.3));
        assert_eq!(editor.end_drag(), Err(LayoutError::ZoneTooSmall));

        assert_eq!(editor.zone(id).unwrap(), &before);
    }

    #[test]
    fn test_overlapping_zones_are_permitted() {
        let mut editor = CanvasEditor::new();
        drag(&mut editor, (0.0, 0.0), (0.5, 1.0)).unwrap().unwrap();
        // Starts in empty space, drags back over the first zone
        drag(&mut editor, (0.55, 0.2), (0.3, 0.6)).unwrap().unwrap();
        assert_eq!(editor.zones().count(), 2);
    }

    #[test]
    fn test_delete_zone_is_idempotent() {
        let mut editor = CanvasEditor::new();
        let id = drag(&mut editor, (0.0, 0.0), (0.5, 1.0)).unwrap().unwrap();
        editor.delete_zone(id);
        editor.delete_zone(id);
        assert_eq!(editor.zones().count(), 0);
    }

    #[test]
    fn test_export_requires_at_least_one_zone() {
        let editor = CanvasEditor::new();
        assert_eq!(
            editor.export_profile("empty"),
            Err(LayoutError::EmptyProfile("empty".to_string()))
        );
    }

    #[test]
    fn test_export_is_a_detached_snapshot() {
        let mut editor = CanvasEditor::new();
        let id = drag(&mut editor, (0.0, 0.0), (0.5, 1.0)).unwrap().unwrap();
        let exported = editor.export_profile("snapshot").unwrap();
        assert_eq!(exported.zones.len(), 1);
        assert_eq!(exported.monitor_slot_count, 1);

        editor.delete_zone(id);
        assert_eq!(exported.zones.len(), 1);
    }

    #[test]
    fn test_end_drag_without_begin_is_a_no_op() {
        let mut editor = CanvasEditor::new();
        assert_eq!(editor.end_drag(), Ok(None));
    }

    #[test]
    fn test_candidate_tracks_the_drag_in_progress() {
        let mut editor = CanvasEditor::new();
        assert_eq!(editor.candidate(), None);

        editor.begin_drag(Point::new(0.0, 0.0));
        editor.update_drag(Point::new(0.5, 0.5));
        let rect = editor.candidate().unwrap();
        assert_eq!((rect.width, rect.height), (0.5, 0.5));

        editor.end_drag().unwrap();
        assert_eq!(editor.candidate(), None);
    }

    #[test]
    fn test_from_profile_loads_only_the_edited_slot() {
        let mut profile = Profile::new("two-monitor");
        let left = Zone::new(0.0, 0.0, 1.0, 1.0);
        let mut right = Zone::new(0.0, 0.0, 0.5, 1.0);
        right.slot = 1;
        profile.monitor_slot_count = 2;
        profile.zones = vec![left, right];

        let editor = CanvasEditor::from_profile(&profile, 1);
        assert_eq!(editor.zones().count(), 1);
        assert_eq!(editor.zones().next().unwrap().1.slot, 1);
    }

    #[test]
    fn test_snap_tolerance_is_configurable() {
        // 0.58 is outside the default 0.02 tolerance of the neighbor edge
        // at 0.5, but a wider tolerance pulls it flush
        let mut editor = CanvasEditor::new().with_snap_tolerance(0.1);
        drag(&mut editor, (0.0, 0.0), (0.5, 1.0)).unwrap().unwrap();
        let id = drag(&mut editor, (0.58, 0.0), (1.0, 1.0)).unwrap().unwrap();
        assert_eq!(editor.zone(id).unwrap().x, 0.5);
    }
}
