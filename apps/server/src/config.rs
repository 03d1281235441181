use crate::configuration::MAX_ROOMS;
use crate::controller::Intervals;
use crate::home::HomeSettings;
use crate::room::{Pacing, Room, RoomOverrides, DEFAULT_CHANGE_COST, DEFAULT_FAN, DEFAULT_OVERSHOOT};
use crate::schedule::Schedule;
use anyhow::{bail, Context, Result};
use climate_protocol::blaster::Blaster;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_INTERVAL_SECS: u64 = 24 * 3600;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub home: HomeConfig,
    #[serde(rename = "room", default)]
    pub rooms: Vec<RoomConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HomeConfig {
    /// IR codes file, relative to the config file.
    pub codes: PathBuf,
    #[serde(default = "default_sensor_listen")]
    pub sensor_listen: String,
    #[serde(default = "default_status_listen")]
    pub status_listen: String,
    #[serde(default = "default_max_refresh_interval_mins")]
    pub max_refresh_interval_mins: u64,
    #[serde(default = "default_min_delay_between_commands_ms")]
    pub min_delay_between_commands_ms: u64,
    #[serde(default = "default_repeat_delay_ms")]
    pub repeat_delay_ms: u64,
    #[serde(default = "default_light_off_delay_ms")]
    pub light_off_delay_ms: u64,
    #[serde(default = "default_optimize_interval_secs")]
    pub optimize_interval_secs: u64,
    #[serde(default = "default_apply_interval_secs")]
    pub apply_interval_secs: u64,
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
}

fn default_sensor_listen() -> String {
    "0.0.0.0:4000".into()
}
fn default_status_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_max_refresh_interval_mins() -> u64 {
    6 * 60
}
fn default_min_delay_between_commands_ms() -> u64 {
    1000
}
fn default_repeat_delay_ms() -> u64 {
    500
}
fn default_light_off_delay_ms() -> u64 {
    1000
}
fn default_optimize_interval_secs() -> u64 {
    60
}
fn default_apply_interval_secs() -> u64 {
    5 * 60
}
fn default_startup_delay_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomConfig {
    pub name: String,
    #[serde(default)]
    pub sensor_id: String,
    /// host:port of the room's IR blaster.
    pub blaster: String,
    pub ideal: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(default = "default_fan")]
    pub fan_setting: String,
    #[serde(default = "default_priority")]
    pub priority: f64,
    #[serde(default = "default_change_cost")]
    pub change_cost: f64,
    #[serde(default = "default_overshoot")]
    pub overshoot_ideal_temp: f64,
    #[serde(default)]
    pub turn_off_status_light: bool,
    pub copy_mode_from: Option<String>,
    /// Clock time ("6am", "10pm") to the fields it overrides.
    #[serde(default)]
    pub schedule: BTreeMap<String, RoomOverrides>,
}

fn default_fan() -> String {
    DEFAULT_FAN.into()
}
fn default_priority() -> f64 {
    1.0
}
fn default_change_cost() -> f64 {
    DEFAULT_CHANGE_COST
}
fn default_overshoot() -> f64 {
    DEFAULT_OVERSHOOT
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let mut config = Self::from_toml(&text).with_context(|| format!("loading {}", path.display()))?;
        if config.home.codes.is_relative() {
            if let Some(dir) = path.parent() {
                config.home.codes = dir.join(&config.home.codes);
            }
        }
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Config> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let h = &self.home;
        // tokio intervals panic on a zero period.
        if h.optimize_interval_secs == 0 || h.apply_interval_secs == 0 {
            bail!("optimize and apply intervals must be positive");
        }
        for (what, secs) in [
            ("optimize_interval_secs", h.optimize_interval_secs),
            ("apply_interval_secs", h.apply_interval_secs),
            ("startup_delay_secs", h.startup_delay_secs),
        ] {
            if secs > MAX_INTERVAL_SECS {
                bail!("{} is {}; at most {} allowed", what, secs, MAX_INTERVAL_SECS);
            }
        }
        if self.max_refresh_interval().is_none() {
            bail!("max_refresh_interval_mins is out of range: {}", h.max_refresh_interval_mins);
        }
        if self.rooms.is_empty() {
            bail!("no rooms configured");
        }
        // Every optimizer run scores 2^(n+1) - 1 configurations.
        if self.rooms.len() > MAX_ROOMS {
            bail!("too many rooms: {} (at most {})", self.rooms.len(), MAX_ROOMS);
        }
        let mut names = HashSet::new();
        for room in &self.rooms {
            if !names.insert(room.name.as_str()) {
                bail!("duplicate room name: {}", room.name);
            }
        }
        for room in &self.rooms {
            check_room_fields(&room.name, Some(room.priority), Some(room.change_cost), room.min, room.max)?;
            for (time, rule) in &room.schedule {
                let what = format!("{} at {}", room.name, time);
                check_room_fields(&what, rule.priority, rule.change_cost, rule.min, rule.max)?;
            }
            if let Some(other) = &room.copy_mode_from {
                if other == &room.name || !names.contains(other.as_str()) {
                    bail!("{}: copy_mode_from names no other room: {}", room.name, other);
                }
            }
            room.build_schedule()?;
        }
        Ok(())
    }

    fn max_refresh_interval(&self) -> Option<chrono::Duration> {
        i64::try_from(self.home.max_refresh_interval_mins)
            .ok()
            .and_then(chrono::Duration::try_minutes)
    }

    pub fn settings(&self) -> Result<HomeSettings> {
        let h = &self.home;
        let max_refresh_interval = self
            .max_refresh_interval()
            .with_context(|| format!("max_refresh_interval_mins is out of range: {}", h.max_refresh_interval_mins))?;
        Ok(HomeSettings {
            max_refresh_interval,
            pacing: Pacing {
                between_commands: Duration::from_millis(h.min_delay_between_commands_ms),
                repeat: Duration::from_millis(h.repeat_delay_ms),
                light_off: Duration::from_millis(h.light_off_delay_ms),
            },
        })
    }

    pub fn intervals(&self) -> Intervals {
        Intervals {
            optimize: Duration::from_secs(self.home.optimize_interval_secs),
            apply: Duration::from_secs(self.home.apply_interval_secs),
            schedule: Duration::from_secs(1),
            startup_delay: Duration::from_secs(self.home.startup_delay_secs),
        }
    }

    pub fn build_rooms<F>(&self, mut blaster: F) -> Result<Vec<Room>>
    where
        F: FnMut(&RoomConfig) -> Result<Box<dyn Blaster>>,
    {
        self.rooms
            .iter()
            .map(|rc| -> Result<Room> {
                let transport = blaster(rc).with_context(|| format!("{}: blaster", rc.name))?;
                rc.build(transport)
            })
            .collect()
    }
}

// Shared by a room's base values and each of its schedule rules.
fn check_room_fields(
    what: &str,
    priority: Option<f64>,
    change_cost: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<()> {
    if let Some(priority) = priority {
        if priority.is_nan() || priority <= 0.0 {
            bail!("{}: priority must be positive", what);
        }
    }
    if let Some(change_cost) = change_cost {
        if change_cost.is_nan() || change_cost < 0.0 {
            bail!("{}: change_cost must not be negative", what);
        }
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            bail!("{}: min {} is above max {}", what, min, max);
        }
    }
    Ok(())
}

impl RoomConfig {
    fn build_schedule(&self) -> Result<Option<Schedule<RoomOverrides>>> {
        if self.schedule.is_empty() {
            return Ok(None);
        }
        let rules = self.schedule.iter().map(|(time, o)| (time.as_str(), o.clone()));
        let schedule = Schedule::new(rules).with_context(|| format!("{}: bad schedule", self.name))?;
        Ok(Some(schedule))
    }

    pub fn build(&self, blaster: Box<dyn Blaster>) -> Result<Room> {
        let mut room = Room::new(&self.name, self.ideal, blaster);
        room.sensor_id.clone_from(&self.sensor_id);
        room.min = self.min.unwrap_or(f64::NEG_INFINITY);
        room.max = self.max.unwrap_or(f64::INFINITY);
        room.fan_setting.clone_from(&self.fan_setting);
        room.priority = self.priority;
        room.change_cost = self.change_cost;
        room.overshoot_ideal_temp = self.overshoot_ideal_temp;
        room.turn_off_status_light = self.turn_off_status_light;
        room.copy_mode_from.clone_from(&self.copy_mode_from);
        if let Some(schedule) = self.build_schedule()? {
            room.set_schedule(schedule);
        }
        Ok(room)
    }
}
