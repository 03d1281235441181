use crate::configuration::AnnotatedConfiguration;
use crate::controller::HomeCommand;
use crate::home::Home;
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Local};
use climate_protocol::Mode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tracing::info;

const HISTORY_SECS: i64 = 6 * 3600;

// Shared between the home controller and the web server
#[derive(Clone)]
pub struct WebState {
    pub status: Arc<RwLock<StatusSnapshot>>,
    pub commands: mpsc::Sender<HomeCommand>,
}

#[derive(Default, Clone, Serialize)]
pub struct StatusSnapshot {
    pub rooms: Vec<RoomStatus>,
    pub current: Option<AnnotatedConfiguration>,
    pub optimal: Vec<AnnotatedConfiguration>,
    pub last_refresh: Option<i64>,
}

#[derive(Default, Clone, Serialize)]
pub struct RoomStatus {
    pub name: String,
    pub valid: bool,
    pub current: Option<f64>,
    pub light_level: Option<f64>,
    pub ideal: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub fan_setting: String,
    pub current_mode: Option<Mode>,
    pub score_of_last_mode_change: Option<f64>,
    pub temperature_history: Vec<TemperaturePoint>,
}

#[derive(Default, Clone, Serialize)]
pub struct TemperaturePoint {
    pub timestamp: i64,
    pub temperature: f64,
    pub ideal: f64,
    pub mode: Option<Mode>,
}

#[derive(Deserialize)]
pub struct StatusQuery {
    last_update: Option<i64>,
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

impl StatusSnapshot {
    /// Copy the home's state; with `record_history` also append one
    /// temperature point per valid room.
    pub fn update(&mut self, home: &Home, now: DateTime<Local>, record_history: bool) {
        let timestamp = now.timestamp();
        let mut rooms = Vec::with_capacity(home.rooms().len());
        for room in home.rooms() {
            let mut temperature_history = self
                .rooms
                .iter()
                .find(|r| r.name == room.name)
                .map(|r| r.temperature_history.clone())
                .unwrap_or_default();
            if record_history {
                if let Some(temperature) = room.current.filter(|_| room.is_valid()) {
                    temperature_history.push(TemperaturePoint {
                        timestamp,
                        temperature,
                        ideal: room.ideal,
                        mode: room.current_mode,
                    });
                }
            }
            temperature_history.retain(|p| p.timestamp >= timestamp - HISTORY_SECS);

            rooms.push(RoomStatus {
                name: room.name.clone(),
                valid: home.is_valid(room),
                current: room.current.and_then(finite),
                light_level: room.light_level,
                ideal: room.ideal,
                min: finite(room.min),
                max: finite(room.max),
                fan_setting: room.fan_setting.clone(),
                current_mode: room.current_mode,
                score_of_last_mode_change: room.score_of_last_mode_change,
                temperature_history,
            });
        }
        self.rooms = rooms;
        self.current = home.current().cloned();
        self.optimal = home.optimal().to_vec();
        self.last_refresh = home.last_refresh().map(|t| t.timestamp());
    }
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/refresh", post(request_refresh))
        .with_state(state)
}

pub async fn create_web_server(listener: TcpListener, state: WebState) -> anyhow::Result<()> {
    info!("Starting web server on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn get_status(State(state): State<WebState>, Query(query): Query<StatusQuery>) -> Json<StatusSnapshot> {
    let mut response = state.status.read().await.clone();

    // If last_update timestamp is provided, only send newer history
    if let Some(last_update) = query.last_update {
        for room in &mut response.rooms {
            room.temperature_history.retain(|point| point.timestamp > last_update);
        }
    }
    Json(response)
}

async fn request_refresh(State(state): State<WebState>) -> Json<serde_json::Value> {
    match state.commands.send(HomeCommand::ForceRefresh).await {
        Ok(()) => Json(serde_json::json!({ "success": true })),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "error": e.to_string()
        })),
    }
}
