//! Profile storage
//!
//! All profiles live in a single JSON file under the user config
//! directory. The store is the only writer; the placement service only
//! ever reads profiles loaded from here.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::model::{MatchRule, Profile, Zone};

const APP_DIR: &str = "zonetiler";
const FILENAME: &str = "profiles.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    profiles: Vec<Profile>,
}

pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    /// Store at the default location, `<config dir>/zonetiler/profiles.json`
    pub fn open_default() -> Self {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR);
        path.push(FILENAME);
        Self { path }
    }

    /// Store backed by an explicit file path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_all(&self) -> Result<Vec<Profile>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read profiles from {:?}", self.path))?;
        let config: ConfigFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse JSON from {:?}", self.path))?;
        info!("Loaded {} profile(s) from {:?}", config.profiles.len(), self.path);
        Ok(config.profiles)
    }

    pub fn load(&self, name: &str) -> Result<Profile> {
        let profiles = self.load_all()?;
        match profiles.into_iter().find(|p| p.name == name) {
            Some(profile) => Ok(profile),
            None => bail!("Profile '{name}' not found in {:?}", self.path),
        }
    }

    /// Insert or replace a profile by name
    pub fn save(&self, mut profile: Profile) -> Result<()> {
        profile.touch();
        let mut profiles = self.load_all()?;
        match profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => {
                profile.created_at = existing.created_at;
                *existing = profile;
            }
            None => profiles.push(profile),
        }
        self.write(&ConfigFile { profiles })
    }

    /// Remove a profile by name; returns whether one existed
    pub fn delete(&self, name: &str) -> Result<bool> {
        let mut profiles = self.load_all()?;
        let before = profiles.len();
        profiles.retain(|p| p.name != name);
        let removed = profiles.len() != before;
        if removed {
            self.write(&ConfigFile { profiles })?;
        }
        Ok(removed)
    }

    fn write(&self, config: &ConfigFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {parent:?}"))?;
        }
        let json = serde_json::to_string_pretty(config)
            .context("Failed to serialize profiles to JSON")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write profiles to {:?}", self.path))?;
        info!("Saved {} profile(s) to {:?}", config.profiles.len(), self.path);
        Ok(())
    }

    /// Write a sample three-pane dashboard profile
    pub fn write_example(&self) -> Result<()> {
        self.save(example_profile())
    }
}

fn example_zone(
    name: &str,
    rect: (f64, f64, f64, f64),
    class: &str,
    command: &str,
) -> Zone {
    let mut zone = Zone::new(rect.0, rect.1, rect.2, rect.3);
    zone.name = name.to_string();
    zone.rule = Some(MatchRule::Class(format!("^{class}$")));
    zone.command = Some(command.to_string());
    zone
}

fn example_profile() -> Profile {
    let mut profile = Profile::new("dashboard-3pane");
    profile.zones = vec![
        example_zone(
            "left-btop",
            (0.0, 0.0, 0.5, 1.0),
            "btop-dash",
            "alacritty --class btop-dash --title 'BTOP Dash' -e btop",
        ),
        example_zone(
            "top-right",
            (0.5, 0.0, 0.5, 0.5),
            "info-dash",
            "alacritty --class info-dash --title 'Info Dash' -e bash -lc 'fastfetch; exec $SHELL'",
        ),
        example_zone(
            "bottom-right",
            (0.5, 0.5, 0.5, 0.5),
            "empty-dash",
            "alacritty --class empty-dash --title 'Empty Dash' -e $SHELL",
        ),
    ];
    profile
}
