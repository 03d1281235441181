use crate::configuration::{configuration_space, AnnotatedConfiguration, Configuration, TooManyRooms};
use crate::room::{Pacing, Room};
use chrono::{DateTime, Duration, Local};
use climate_protocol::ir::IrCodes;
use climate_protocol::sensor::{ReadingKind, SensorReading};
use climate_protocol::Mode;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error, PartialEq)]
pub enum ApplyError {
    #[error("no optimal configurations")]
    NoOptimalConfiguration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ApplyOutcome {
    /// Already in one of the optimal configurations; nothing sent.
    Unchanged,
    Applied { forced: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct HomeSettings {
    /// Re-send everything at least this often to heal drift from manual
    /// remote use or units that missed a command.
    pub max_refresh_interval: Duration,
    pub pacing: Pacing,
}

impl Default for HomeSettings {
    fn default() -> Self {
        HomeSettings { max_refresh_interval: Duration::hours(6), pacing: Pacing::default() }
    }
}

pub struct Home {
    rooms: Vec<Room>,
    configurations: Vec<Configuration>,
    optimal: Vec<AnnotatedConfiguration>,
    current: Option<AnnotatedConfiguration>,
    last_refresh: Option<DateTime<Local>>,
    settings: HomeSettings,
    codes: IrCodes,
}

impl Home {
    pub fn new(rooms: Vec<Room>, codes: IrCodes, settings: HomeSettings) -> Result<Self, TooManyRooms> {
        for room in &rooms {
            if let Some(name) = &room.copy_mode_from {
                if !rooms.iter().any(|r| &r.name == name) {
                    warn!(room = %room.name, copy_mode_from = %name, "no such room; scoring from own sensor");
                }
            }
        }
        let configurations = configuration_space(rooms.len())?;
        info!(rooms = rooms.len(), configurations = configurations.len(), "home ready");
        Ok(Home {
            rooms,
            configurations,
            optimal: Vec::new(),
            current: None,
            last_refresh: None,
            settings,
            codes,
        })
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn room_mut(&mut self, name: &str) -> Option<&mut Room> {
        self.rooms.iter_mut().find(|r| r.name == name)
    }

    pub fn optimal(&self) -> &[AnnotatedConfiguration] {
        &self.optimal
    }

    pub fn current(&self) -> Option<&AnnotatedConfiguration> {
        self.current.as_ref()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Local>> {
        self.last_refresh
    }

    /// The room whose readings drive `room`'s score.
    pub fn score_source<'a>(&'a self, room: &'a Room) -> &'a Room {
        room.copy_mode_from
            .as_ref()
            .and_then(|name| self.rooms.iter().find(|r| &r.name == name))
            .unwrap_or(room)
    }

    pub fn is_valid(&self, room: &Room) -> bool {
        self.score_source(room).is_valid()
    }

    /// Score every legal configuration and keep all of those tied for best.
    pub fn compute_optimal_state(&mut self) -> &[AnnotatedConfiguration] {
        let mut annotated: Vec<AnnotatedConfiguration> = self
            .configurations
            .iter()
            .map(|configuration| {
                let scores = configuration
                    .modes()
                    .iter()
                    .zip(&self.rooms)
                    .map(|(&mode, room)| room.score_mode_change(self.score_source(room), mode))
                    .collect();
                let a = AnnotatedConfiguration::new(configuration.clone(), scores);
                debug!("{} ({:?}) <-- {}", a.total, a.scores, a.configuration);
                a
            })
            .collect();
        annotated.sort_by(AnnotatedConfiguration::rank);

        let best = annotated.first().map_or(0.0, |a| a.total);
        annotated.retain(|a| a.total == best);
        info!(
            best,
            optimal = ?annotated.iter().map(|a| a.configuration.to_string()).collect::<Vec<_>>(),
            "computed optimal state"
        );
        self.optimal = annotated;
        &self.optimal
    }

    /// Drive the hardware towards an optimal configuration.
    ///
    /// Offs always go out before any heat or cool so the shared system never
    /// sees both at once. Takes `&mut self`, so one home never runs two
    /// cycles at the same time.
    pub async fn apply_optimal_state(&mut self, now: DateTime<Local>) -> Result<ApplyOutcome, ApplyError> {
        if self.optimal.is_empty() {
            error!("no optimal configurations");
            return Err(ApplyError::NoOptimalConfiguration);
        }

        let force = match self.last_refresh {
            None => true,
            Some(last) => now - last >= self.settings.max_refresh_interval,
        };

        // Among tied configurations stick with the one already applied.
        let still_optimal = self
            .current
            .as_ref()
            .and_then(|current| self.optimal.iter().find(|a| a.configuration == current.configuration));
        if still_optimal.is_some() && !force {
            info!("already in an optimal configuration; not changing anything");
            return Ok(ApplyOutcome::Unchanged);
        }
        let target = still_optimal.unwrap_or(&self.optimal[0]).clone();
        info!(configuration = %target.configuration, score = target.total, force, "applying configuration");

        let mut sent_any = false;
        if force {
            info!("turning everything off before refreshing");
            for i in 0..self.rooms.len() {
                self.configure(i, Mode::Off, true, None, &mut sent_any).await;
            }
        }
        for pass_on in [false, true] {
            for (i, &mode) in target.configuration.modes().iter().enumerate() {
                if mode.is_on() == pass_on {
                    self.configure(i, mode, force, Some(target.scores[i]), &mut sent_any).await;
                }
            }
        }

        self.current = Some(target);
        self.last_refresh = Some(now);
        Ok(ApplyOutcome::Applied { forced: force })
    }

    // Per-room failures are logged and never stop the other rooms.
    async fn configure(&mut self, i: usize, mode: Mode, force: bool, score: Option<f64>, sent_any: &mut bool) {
        let valid = self.is_valid(&self.rooms[i]);
        let room = &self.rooms[i];
        if !valid {
            info!(room = %room.name, %mode, "no valid temperature; not configuring");
            return;
        }
        let payload = match room.plan_command(mode, force, &self.codes) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                info!(room = %room.name, %mode, "command already sent; skipping");
                return;
            }
            Err(e) => {
                error!(room = %room.name, %mode, "not configuring: {}", e);
                return;
            }
        };

        if *sent_any {
            tokio::time::sleep(self.settings.pacing.between_commands).await;
        }
        *sent_any = true;

        let pacing = self.settings.pacing;
        let room = &mut self.rooms[i];
        if let Err(e) = room.dispatch(mode, payload, score, &self.codes, &pacing).await {
            error!(room = %room.name, %mode, blaster = %room.describe_blaster(), "failed to configure: {}", e);
        }
    }

    /// Route a reading to every room bound to its sensor. Returns false for
    /// sensors no room uses.
    pub fn record_reading(&mut self, reading: &SensorReading) -> bool {
        let mut matched = false;
        for room in self.rooms.iter_mut().filter(|r| r.sensor_id == reading.sensor_id) {
            match reading.kind {
                ReadingKind::Temperature => room.record_temperature(reading.value),
                ReadingKind::LightLevel => room.record_light_level(reading.value),
            }
            matched = true;
        }
        if !matched {
            info!(sensor = %reading.sensor_id, kind = ?reading.kind, value = reading.value, "there's a sensor we're not using");
        }
        matched
    }

    pub fn tick_schedules(&mut self, hour: u32) -> usize {
        let mut changed = 0;
        for room in &mut self.rooms {
            if room.tick_schedule(hour) {
                changed += 1;
            }
        }
        changed
    }

    /// Make the next apply cycle a full refresh.
    pub fn request_refresh(&mut self) {
        info!("refresh requested");
        self.last_refresh = None;
    }
}
