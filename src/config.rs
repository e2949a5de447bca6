use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::scene::BoxSide;

/// Persisted canvas state: box positions, per-group split choices, the
/// selected theme and the rendering options.
///
/// Split groups store their two boxes under distinct keys so each side keeps
/// its own place: `<name>_o` for the output box, `<name>_i` for the input
/// box, plain `<name>` for a joined group. The split choice itself lives
/// under `<name>_s`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    positions: HashMap<String, Position>,
    #[serde(default)]
    splits: HashMap<String, bool>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub render: RenderOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub bezier_lines: bool,
    pub antialiasing: Aliasing,
    pub auto_hide_groups: bool,
    pub eyecandy: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            bezier_lines: true,
            antialiasing: Aliasing::Full,
            auto_hide_groups: false,
            eyecandy: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Aliasing {
    Off,
    Small,
    #[default]
    Full,
}

fn position_key(group_name: &str, side: BoxSide) -> String {
    match side {
        BoxSide::Both => group_name.to_string(),
        BoxSide::Output => format!("{group_name}_o"),
        BoxSide::Input => format!("{group_name}_i"),
    }
}

fn split_key(group_name: &str) -> String {
    format!("{group_name}_s")
}

impl Settings {
    pub fn load() -> Option<Self> {
        let path = Self::config_path()?;
        let contents = fs::read_to_string(&path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    pub fn save(&self) -> Option<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok()?;
        }
        let contents = serde_json::to_string_pretty(self).ok()?;
        fs::write(&path, &contents).ok()
    }

    pub fn position(&self, group_name: &str, side: BoxSide) -> Option<Position> {
        self.positions.get(&position_key(group_name, side)).copied()
    }

    pub fn set_position(&mut self, group_name: &str, side: BoxSide, pos: Position) {
        self.positions.insert(position_key(group_name, side), pos);
    }

    pub fn split(&self, group_name: &str) -> Option<bool> {
        self.splits.get(&split_key(group_name)).copied()
    }

    pub fn set_split(&mut self, group_name: &str, split: bool) {
        self.splits.insert(split_key(group_name), split);
    }

    /// Take over the position/split memory of another settings instance,
    /// e.g. the layout copy the canvas keeps current while running.
    pub fn absorb_layout(&mut self, other: &Settings) {
        self.positions
            .extend(other.positions.iter().map(|(k, v)| (k.clone(), *v)));
        self.splits
            .extend(other.splits.iter().map(|(k, v)| (k.clone(), *v)));
    }

    fn config_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("", "", "jackfield")?;
        Some(dirs.config_dir().join("settings.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_sides_use_distinct_keys() {
        let mut settings = Settings::default();
        settings.set_position("system", BoxSide::Output, Position { x: 10.0, y: 20.0 });
        settings.set_position("system", BoxSide::Input, Position { x: 500.0, y: 20.0 });

        assert_eq!(
            settings.position("system", BoxSide::Output),
            Some(Position { x: 10.0, y: 20.0 })
        );
        assert_eq!(
            settings.position("system", BoxSide::Input),
            Some(Position { x: 500.0, y: 20.0 })
        );
        assert_eq!(settings.position("system", BoxSide::Both), None);
    }

    #[test]
    fn split_choice_round_trips() {
        let mut settings = Settings::default();
        assert_eq!(settings.split("Firefox"), None);
        settings.set_split("Firefox", true);
        assert_eq!(settings.split("Firefox"), Some(true));
    }

    #[test]
    fn survives_json_round_trip() {
        let mut settings = Settings::default();
        settings.set_position("Firefox", BoxSide::Both, Position { x: 1.5, y: -2.0 });
        settings.set_split("system", true);
        settings.theme = Some("Black Gold".to_string());
        settings.render.bezier_lines = false;

        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.position("Firefox", BoxSide::Both),
            Some(Position { x: 1.5, y: -2.0 })
        );
        assert_eq!(back.split("system"), Some(true));
        assert_eq!(back.theme.as_deref(), Some("Black Gold"));
        assert!(!back.render.bezier_lines);
    }

    #[test]
    fn absorb_layout_merges_both_maps() {
        let mut canvas_copy = Settings::default();
        canvas_copy.set_position("a2j", BoxSide::Both, Position { x: 3.0, y: 4.0 });
        canvas_copy.set_split("a2j", false);

        let mut settings = Settings::default();
        settings.set_position("system", BoxSide::Output, Position { x: 0.0, y: 0.0 });
        settings.absorb_layout(&canvas_copy);

        assert!(settings.position("a2j", BoxSide::Both).is_some());
        assert!(settings.position("system", BoxSide::Output).is_some());
        assert_eq!(settings.split("a2j"), Some(false));
    }
}
