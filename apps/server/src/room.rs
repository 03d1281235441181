use crate::schedule::{Overrides, Schedule};
use climate_protocol::blaster::{Blaster, TransportError};
use climate_protocol::ir::{CodecError, IrCodes, LIGHT_OFF_CODE};
use climate_protocol::Mode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Score that dominates every ordinary comfort term.
pub const A_LOT: f64 = 10000.0;

pub const DEFAULT_CHANGE_COST: f64 = 1.1;
pub const DEFAULT_OVERSHOOT: f64 = 2.0;
pub const DEFAULT_FAN: &str = "auto";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Fixed pauses around the infrared sends of one room.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub between_commands: Duration,
    pub repeat: Duration,
    pub light_off: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing {
            between_commands: Duration::from_secs(1),
            repeat: Duration::from_millis(500),
            light_off: Duration::from_secs(1),
        }
    }
}

/// Room fields that a schedule rule may override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomOverrides {
    pub ideal: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub fan_setting: Option<String>,
    pub priority: Option<f64>,
    pub change_cost: Option<f64>,
    pub overshoot_ideal_temp: Option<f64>,
    pub turn_off_status_light: Option<bool>,
}

fn take<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
    if src.is_some() {
        dst.clone_from(src);
    }
}

impl Overrides for RoomOverrides {
    fn merge_from(&mut self, other: &Self) {
        take(&mut self.ideal, &other.ideal);
        take(&mut self.min, &other.min);
        take(&mut self.max, &other.max);
        take(&mut self.fan_setting, &other.fan_setting);
        take(&mut self.priority, &other.priority);
        take(&mut self.change_cost, &other.change_cost);
        take(&mut self.overshoot_ideal_temp, &other.overshoot_ideal_temp);
        take(&mut self.turn_off_status_light, &other.turn_off_status_light);
    }
}

pub struct Room {
    pub name: String,
    pub sensor_id: String,

    // Sensed. `None` until the first reading arrives.
    pub current: Option<f64>,
    pub light_level: Option<f64>,

    // Desired.
    pub ideal: f64,
    pub min: f64,
    pub max: f64,
    pub fan_setting: String,
    pub priority: f64,
    pub change_cost: f64,
    pub overshoot_ideal_temp: f64,
    pub turn_off_status_light: bool,

    /// Name of a room whose sensor and comfort bounds drive this room's
    /// score. Looked up through the home on every scoring pass.
    pub copy_mode_from: Option<String>,

    // What was last sent to the hardware.
    pub current_mode: Option<Mode>,
    pub last_sent: Option<Vec<u8>>,
    pub score_of_last_mode_change: Option<f64>,

    schedule: Option<Schedule<RoomOverrides>>,
    blaster: Box<dyn Blaster>,
}

impl Room {
    pub fn new(name: &str, ideal: f64, blaster: Box<dyn Blaster>) -> Self {
        Room {
            name: name.to_owned(),
            sensor_id: String::new(),
            current: None,
            light_level: None,
            ideal,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            fan_setting: DEFAULT_FAN.to_owned(),
            priority: 1.0,
            change_cost: DEFAULT_CHANGE_COST,
            overshoot_ideal_temp: DEFAULT_OVERSHOOT,
            turn_off_status_light: false,
            copy_mode_from: None,
            current_mode: None,
            last_sent: None,
            score_of_last_mode_change: None,
            schedule: None,
            blaster,
        }
    }

    pub fn set_schedule(&mut self, schedule: Schedule<RoomOverrides>) {
        self.schedule = Some(schedule);
    }

    pub fn is_valid(&self) -> bool {
        self.current.is_some_and(f64::is_finite)
    }

    /// Unweighted benefit of running `mode` judged by this room's own
    /// sensor and bounds. Only meaningful for a valid room.
    pub fn comfort_score(&self, mode: Mode) -> f64 {
        let current = self.current.unwrap_or(f64::NAN);

        // Danger first: leaving the safe band outweighs any comfort term.
        if current < self.min && mode == Mode::Heat {
            return A_LOT * (self.min - current);
        }
        if current > self.max && mode == Mode::Cool {
            return A_LOT * (current - self.max);
        }

        // Negative when the room should be cooled.
        let desired_change = self.ideal - current;
        match mode {
            Mode::Cool if desired_change < 0.0 => -desired_change,
            Mode::Heat if desired_change > 0.0 => desired_change,
            Mode::Cool | Mode::Heat => -A_LOT,
            Mode::Off => -desired_change.abs(),
        }
    }

    /// Score for putting this room into `mode`, where `source` is the room
    /// whose readings stand in for this one (itself unless copy-mode).
    ///
    /// The change cost is not weighted by priority, so even an unimportant
    /// room resists flapping.
    pub fn score_mode_change(&self, source: &Room, mode: Mode) -> f64 {
        if !source.is_valid() {
            return if mode == Mode::Off { 0.0 } else { -A_LOT };
        }
        let cost = if mode.is_on() && self.current_mode != Some(mode) {
            self.change_cost
        } else {
            0.0
        };
        self.priority * source.comfort_score(mode) - cost
    }

    /// Setpoint sent to the unit: overshoot the ideal in the direction of travel.
    pub fn setpoint(&self, mode: Mode) -> Option<f64> {
        match mode {
            Mode::Heat => Some(self.ideal + self.overshoot_ideal_temp),
            Mode::Cool => Some(self.ideal - self.overshoot_ideal_temp),
            Mode::Off => None,
        }
    }

    /// The payload to send for `mode`, or `None` when the unit already got
    /// exactly this command and no refresh is forced.
    pub fn plan_command(&self, mode: Mode, force: bool, codes: &IrCodes) -> Result<Option<Vec<u8>>, CodecError> {
        let payload = codes.encode(mode, &self.fan_setting, self.setpoint(mode))?;
        if !force && self.last_sent.as_deref() == Some(payload.as_slice()) {
            return Ok(None);
        }
        Ok(Some(payload))
    }

    /// Record `mode` as current and send `payload`. State is updated before
    /// the sends and is kept even if a send fails.
    pub async fn dispatch(
        &mut self,
        mode: Mode,
        payload: Vec<u8>,
        score: Option<f64>,
        codes: &IrCodes,
        pacing: &Pacing,
    ) -> Result<(), CommandError> {
        info!(
            room = %self.name,
            %mode,
            fan = %self.fan_setting,
            setpoint = ?self.setpoint(mode),
            score = ?score,
            "configuring"
        );
        self.current_mode = Some(mode);
        self.score_of_last_mode_change = score;
        self.last_sent = Some(payload.clone());

        // Infrared gets lost; say everything twice.
        self.blaster.send_data(&payload)?;
        tokio::time::sleep(pacing.repeat).await;
        self.blaster.send_data(&payload)?;

        // Units light their status LED on every command, including off.
        if self.turn_off_status_light {
            tokio::time::sleep(pacing.light_off).await;
            let light_off = codes.special(LIGHT_OFF_CODE)?;
            self.blaster.send_data(light_off)?;
        }
        Ok(())
    }

    /// Logs only when the temperature actually changed.
    pub fn record_temperature(&mut self, value: f64) {
        if self.current != Some(value) {
            info!(room = %self.name, "{} is now {} F", self.name, value);
            self.current = Some(value);
        }
    }

    pub fn record_light_level(&mut self, value: f64) {
        self.light_level = Some(value);
    }

    /// Re-evaluate the schedule for `hour` and apply it if the effective
    /// overrides changed.
    pub fn tick_schedule(&mut self, hour: u32) -> bool {
        let Some(overrides) = self.schedule.as_mut().and_then(|s| s.update(hour).cloned()) else {
            return false;
        };
        info!(room = %self.name, hour, ?overrides, "applying schedule");
        self.apply_overrides(&overrides);
        true
    }

    pub fn apply_overrides(&mut self, o: &RoomOverrides) {
        if let Some(v) = o.ideal {
            self.ideal = v;
        }
        if let Some(v) = o.min {
            self.min = v;
        }
        if let Some(v) = o.max {
            self.max = v;
        }
        if let Some(v) = &o.fan_setting {
            self.fan_setting.clone_from(v);
        }
        if let Some(v) = o.priority {
            self.priority = v;
        }
        if let Some(v) = o.change_cost {
            self.change_cost = v;
        }
        if let Some(v) = o.overshoot_ideal_temp {
            self.overshoot_ideal_temp = v;
        }
        if let Some(v) = o.turn_off_status_light {
            self.turn_off_status_light = v;
        }
    }

    pub fn describe_blaster(&self) -> String {
        self.blaster.describe()
    }
}
