//! The task that owns a [`Home`].
//!
//! Sensor readings, schedule ticks, optimizer runs and apply cycles all go
//! through this one task, so an apply cycle (with its paced sends) always
//! finishes before anything else touches the rooms.

use crate::home::Home;
use crate::web::StatusSnapshot;
use chrono::{Local, Timelike};
use climate_protocol::sensor::SensorReading;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::info;

#[derive(Debug)]
pub enum HomeCommand {
    /// Make the next apply cycle re-send everything.
    ForceRefresh,
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
pub struct Intervals {
    pub optimize: Duration,
    pub apply: Duration,
    pub schedule: Duration,
    /// Time for the first readings to arrive before the first decision.
    pub startup_delay: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Intervals {
            optimize: Duration::from_secs(60),
            apply: Duration::from_secs(5 * 60),
            schedule: Duration::from_secs(1),
            startup_delay: Duration::from_secs(15),
        }
    }
}

async fn publish(status: &RwLock<StatusSnapshot>, home: &Home, record_history: bool) {
    status.write().await.update(home, Local::now(), record_history);
}

async fn optimize_and_apply(home: &mut Home, status: &RwLock<StatusSnapshot>) {
    home.compute_optimal_state();
    publish(status, home, true).await;
    // Failures are logged inside; the next tick tries again.
    let _ = home.apply_optimal_state(Local::now()).await;
    publish(status, home, false).await;
}

/// Run until told to shut down, then hand the home back.
pub async fn run(
    mut home: Home,
    intervals: Intervals,
    mut readings: mpsc::Receiver<SensorReading>,
    mut commands: mpsc::Receiver<HomeCommand>,
    status: Arc<RwLock<StatusSnapshot>>,
) -> Home {
    let startup = tokio::time::sleep(intervals.startup_delay);
    tokio::pin!(startup);
    loop {
        tokio::select! {
            _ = &mut startup => break,
            Some(reading) = readings.recv() => {
                home.record_reading(&reading);
            }
            Some(command) = commands.recv() => match command {
                HomeCommand::ForceRefresh => home.request_refresh(),
                HomeCommand::Shutdown => return home,
            },
        }
    }

    home.tick_schedules(Local::now().hour());
    optimize_and_apply(&mut home, &status).await;

    let start = Instant::now();
    let mut optimize = interval_at(start + intervals.optimize, intervals.optimize);
    let mut apply = interval_at(start + intervals.apply, intervals.apply);
    let mut schedule = interval(intervals.schedule);
    for timer in [&mut optimize, &mut apply, &mut schedule] {
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    }

    loop {
        tokio::select! {
            Some(reading) = readings.recv() => {
                home.record_reading(&reading);
            }
            Some(command) = commands.recv() => match command {
                HomeCommand::ForceRefresh => home.request_refresh(),
                HomeCommand::Shutdown => break,
            },
            _ = schedule.tick() => {
                if home.tick_schedules(Local::now().hour()) > 0 {
                    publish(&status, &home, false).await;
                }
            }
            _ = optimize.tick() => {
                home.compute_optimal_state();
                publish(&status, &home, true).await;
            }
            _ = apply.tick() => {
                let _ = home.apply_optimal_state(Local::now()).await;
                publish(&status, &home, false).await;
            }
        }
    }
    info!("home controller stopped");
    home
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::home::HomeSettings;
    use crate::room::Room;
    use crate::testing::{test_codes, Recorder};
    use climate_protocol::sensor::ReadingKind;
    use climate_protocol::Mode;

    fn reading(sensor: &str, value: f64) -> SensorReading {
        SensorReading { sensor_id: sensor.into(), kind: ReadingKind::Temperature, value }
    }

    fn home(recorder: &Recorder) -> Home {
        let mut a = Room::new("A", 70.0, recorder.blaster("A"));
        a.sensor_id = "s-a".into();
        Home::new(vec![a], test_codes(), HomeSettings::default()).expect("one room fits")
    }

    #[tokio::test(start_paused = true)]
    async fn decides_after_startup_and_on_every_apply_tick() -> anyhow::Result<()> {
        let recorder = Recorder::new();
        let (reading_tx, reading_rx) = mpsc::channel(8);
        let (command_tx, command_rx) = mpsc::channel(8);
        let status = Arc::new(RwLock::new(StatusSnapshot::default()));
        let intervals = Intervals::default();

        reading_tx.send(reading("s-a", 72.0)).await?;
        let task = tokio::spawn(run(home(&recorder), intervals, reading_rx, command_rx, status.clone()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(recorder.sent().is_empty(), "nothing is sent during the startup delay");

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(recorder.commands(), vec!["A:off", "A:cool-auto-68"]);
        assert_eq!(status.read().await.rooms[0].current_mode, Some(Mode::Cool));

        recorder.clear();
        reading_tx.send(reading("s-a", 68.0)).await?;
        tokio::time::sleep(intervals.apply).await;
        assert_eq!(recorder.commands(), vec!["A:heat-auto-72"]);

        command_tx.send(HomeCommand::Shutdown).await?;
        let home = task.await?;
        assert_eq!(home.rooms()[0].current, Some(68.0));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_request_forces_next_apply() -> anyhow::Result<()> {
        let recorder = Recorder::new();
        let (reading_tx, reading_rx) = mpsc::channel(8);
        let (command_tx, command_rx) = mpsc::channel(8);
        let status = Arc::new(RwLock::new(StatusSnapshot::default()));
        let intervals = Intervals::default();

        reading_tx.send(reading("s-a", 72.0)).await?;
        let task = tokio::spawn(run(home(&recorder), intervals, reading_rx, command_rx, status));
        tokio::time::sleep(intervals.startup_delay + Duration::from_secs(5)).await;

        recorder.clear();
        command_tx.send(HomeCommand::ForceRefresh).await?;
        tokio::time::sleep(intervals.apply).await;
        assert_eq!(recorder.commands(), vec!["A:off", "A:cool-auto-68"]);

        command_tx.send(HomeCommand::Shutdown).await?;
        task.await?;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_startup() -> anyhow::Result<()> {
        let recorder = Recorder::new();
        let (_reading_tx, reading_rx) = mpsc::channel(8);
        let (command_tx, command_rx) = mpsc::channel(8);
        let task = tokio::spawn(run(home(&recorder), Intervals::default(), reading_rx, command_rx, Arc::default()));
        command_tx.send(HomeCommand::Shutdown).await?;
        let home = task.await?;
        assert!(home.current().is_none());
        assert!(recorder.sent().is_empty());
        Ok(())
    }
}
