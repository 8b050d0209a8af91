//! X11 implementation of the `WindowSystem` capability
//!
//! Monitor topology comes from RandR intersected with the EWMH workarea,
//! windows from `_NET_CLIENT_LIST_STACKING`, and placement goes through
//! `configure_window`. Topology and window queries hit the server fresh on
//! every call so monitor hotplug between applies is picked up.

use anyhow::{Context, Result};
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::randr::ConnectionExt as RandrExt;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::placement::{Monitor, PixelRect, WindowId, WindowInfo, WindowSystem};

/// Pre-cached X11 atoms to avoid repeated roundtrips
struct Atoms {
    net_client_list_stacking: Atom,
    net_wm_name: Atom,
    utf8_string: Atom,
    net_workarea: Atom,
    net_current_desktop: Atom,
}

impl Atoms {
    fn new(conn: &RustConnection) -> Result<Self> {
        let intern = |name: &'static [u8]| -> Result<Atom> {
            Ok(conn
                .intern_atom(false, name)
                .with_context(|| format!("Failed to intern {} atom", String::from_utf8_lossy(name)))?
                .reply()
                .with_context(|| {
                    format!("Failed to get reply for {} atom", String::from_utf8_lossy(name))
                })?
                .atom)
        };
        Ok(Self {
            net_client_list_stacking: intern(b"_NET_CLIENT_LIST_STACKING")?,
            net_wm_name: intern(b"_NET_WM_NAME")?,
            utf8_string: intern(b"UTF8_STRING")?,
            net_workarea: intern(b"_NET_WORKAREA")?,
            net_current_desktop: intern(b"_NET_CURRENT_DESKTOP")?,
        })
    }
}

pub struct X11WindowSystem {
    conn: RustConnection,
    screen_num: usize,
    atoms: Atoms,
}

impl X11WindowSystem {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X11")?;
        let atoms = Atoms::new(&conn)?;
        Ok(Self {
            conn,
            screen_num,
            atoms,
        })
    }

    fn root(&self) -> Window {
        self.conn.setup().roots[self.screen_num].root
    }

    /// Workarea of the current desktop, if the WM publishes one
    fn current_workarea(&self) -> Result<Option<PixelRect>> {
        let desktop = self
            .conn
            .get_property(
                false,
                self.root(),
                self.atoms.net_current_desktop,
                AtomEnum::CARDINAL,
                0,
                1,
            )
            .context("Failed to query _NET_CURRENT_DESKTOP")?
            .reply()
            .context("Failed to get reply for _NET_CURRENT_DESKTOP")?
            .value32()
            .and_then(|mut v| v.next())
            .unwrap_or(0);

        let prop = self
            .conn
            .get_property(
                false,
                self.root(),
                self.atoms.net_workarea,
                AtomEnum::CARDINAL,
                0,
                u32::MAX,
            )
            .context("Failed to query _NET_WORKAREA")?
            .reply()
            .context("Failed to get reply for _NET_WORKAREA")?;
        let values: Vec<u32> = match prop.value32() {
            Some(iter) => iter.collect(),
            None => return Ok(None),
        };

        let i = desktop as usize * 4;
        if values.len() < i + 4 {
            return Ok(None);
        }
        Ok(Some(PixelRect {
            x: values[i] as i32,
            y: values[i + 1] as i32,
            width: values[i + 2],
            height: values[i + 3],
        }))
    }

    fn window_title(&self, window: Window) -> Result<String> {
        let prop = self
            .conn
            .get_property(
                false,
                window,
                self.atoms.net_wm_name,
                self.atoms.utf8_string,
                0,
                1024,
            )
            .with_context(|| format!("Failed to query _NET_WM_NAME for window {window}"))?
            .reply()
            .with_context(|| format!("Failed to get _NET_WM_NAME reply for window {window}"))?;
        if !prop.value.is_empty() {
            return Ok(String::from_utf8_lossy(&prop.value).into_owned());
        }

        let prop = self
            .conn
            .get_property(false, window, AtomEnum::WM_NAME, AtomEnum::STRING, 0, 1024)
            .with_context(|| format!("Failed to query WM_NAME for window {window}"))?
            .reply()
            .with_context(|| format!("Failed to get WM_NAME reply for window {window}"))?;
        Ok(String::from_utf8_lossy(&prop.value).into_owned())
    }

    fn window_class(&self, window: Window) -> Result<String> {
        let prop = self
            .conn
            .get_property(false, window, AtomEnum::WM_CLASS, AtomEnum::STRING, 0, 1024)
            .with_context(|| format!("Failed to query WM_CLASS for window {window}"))?
            .reply()
            .with_context(|| format!("Failed to get WM_CLASS reply for window {window}"))?;
        Ok(parse_wm_class(&prop.value))
    }
}

/// WM_CLASS holds two null-terminated strings: instance, then class.
/// The class field is what match rules run against.
fn parse_wm_class(value: &[u8]) -> String {
    let mut fields = value
        .split(|b| *b == 0)
        .filter(|f| !f.is_empty())
        .map(|f| String::from_utf8_lossy(f).into_owned());
    let instance = fields.next();
    fields.next().or(instance).unwrap_or_default()
}

fn intersect(a: PixelRect, b: PixelRect) -> Option<PixelRect> {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width as i32).min(b.x + b.width as i32);
    let y2 = (a.y + a.height as i32).min(b.y + b.height as i32);
    if x2 > x1 && y2 > y1 {
        Some(PixelRect {
            x: x1,
            y: y1,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    } else {
        None
    }
}

impl WindowSystem for X11WindowSystem {
    fn monitors(&self) -> Result<Vec<Monitor>> {
        let reply = self
            .conn
            .randr_get_monitors(self.root(), true)
            .context("Failed to query RandR monitors")?
            .reply()
            .context("Failed to get reply for RandR monitor query")?;
        let workarea = self.current_workarea()?;

        let mut monitors = Vec::new();
        for info in reply.monitors {
            let name = self
                .conn
                .get_atom_name(info.name)
                .context("Failed to query monitor name atom")?
                .reply()
                .map(|r| String::from_utf8_lossy(&r.name).into_owned())
                .unwrap_or_default();
            let full = PixelRect {
                x: info.x as i32,
                y: info.y as i32,
                width: info.width as u32,
                height: info.height as u32,
            };
            // Panels and docks are carved out of the EWMH workarea
            let usable = workarea.and_then(|wa| intersect(full, wa)).unwrap_or(full);
            debug!(name = %name, full = ?full, usable = ?usable, "discovered monitor");
            monitors.push(Monitor {
                name,
                x: usable.x,
                y: usable.y,
                width: usable.width,
                height: usable.height,
            });
        }
        Ok(monitors)
    }

    fn windows(&self) -> Result<Vec<WindowInfo>> {
        let prop = self
            .conn
            .get_property(
                false,
                self.root(),
                self.atoms.net_client_list_stacking,
                AtomEnum::WINDOW,
                0,
                u32::MAX,
            )
            .context("Failed to query _NET_CLIENT_LIST_STACKING")?
            .reply()
            .context("Failed to get reply for _NET_CLIENT_LIST_STACKING")?;
        let ids: Vec<u32> = prop
            .value32()
            .ok_or_else(|| anyhow::anyhow!("Invalid return from _NET_CLIENT_LIST_STACKING"))?
            .collect();

        // EWMH lists bottom to top; matching wants most recently raised first
        let mut windows = Vec::new();
        for &id in ids.iter().rev() {
            let (title, class) = match (self.window_title(id), self.window_class(id)) {
                (Ok(title), Ok(class)) => (title, class),
                (Err(err), _) | (_, Err(err)) => {
                    // Window likely destroyed between the list query and now
                    debug!(window = id, error = %err, "skipping window");
                    continue;
                }
            };
            windows.push(WindowInfo { id, title, class });
        }
        Ok(windows)
    }

    fn place(&self, id: WindowId, rect: PixelRect) -> Result<()> {
        let aux = ConfigureWindowAux::new()
            .x(rect.x)
            .y(rect.y)
            .width(rect.width)
            .height(rect.height)
            .stack_mode(StackMode::ABOVE);
        self.conn
            .configure_window(id, &aux)
            .with_context(|| format!("Failed to configure window {id}"))?
            .check()
            .with_context(|| format!("Window {id} rejected placement"))?;
        Ok(())
    }
}
