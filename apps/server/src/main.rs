pub mod config;
pub mod configuration;
pub mod controller;
pub mod home;
pub mod room;
pub mod schedule;
pub mod web;

#[cfg(test)]
mod testing;

use crate::config::{Config, HomeConfig};
use crate::controller::HomeCommand;
use crate::home::Home;
use crate::web::{create_web_server, StatusSnapshot, WebState};
use anyhow::{Context, Result};
use clap::Parser;
use climate_protocol::blaster::{Blaster, UdpBlaster};
use climate_protocol::ir::IrCodes;
use climate_protocol::sensor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Multi-room heat pump controller")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "climate.toml")]
    config: PathBuf,
}

/// Bind the sensor and status sockets before anything runs, so a bad
/// address stops the server instead of leaving it blind.
async fn bind_listeners(home: &HomeConfig) -> Result<(UdpSocket, TcpListener)> {
    let sensors = UdpSocket::bind(&home.sensor_listen)
        .await
        .with_context(|| format!("binding sensor listener on {}", home.sensor_listen))?;
    let status = TcpListener::bind(&home.status_listen)
        .await
        .with_context(|| format!("binding status server on {}", home.status_listen))?;
    Ok((sensors, status))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;
    let codes = IrCodes::load(&config.home.codes)
        .with_context(|| format!("loading IR codes from {}", config.home.codes.display()))?;
    info!(codes = codes.len(), "loaded IR codes");

    let rooms = config.build_rooms(|rc| -> Result<Box<dyn Blaster>> { Ok(Box::new(UdpBlaster::new(&rc.blaster)?)) })?;
    let home = Home::new(rooms, codes, config.settings()?)?;
    let (sensor_socket, status_listener) = bind_listeners(&config.home).await?;
    info!(addr = %sensor_socket.local_addr()?, "listening for sensor readings");

    let (reading_tx, reading_rx) = mpsc::channel(64);
    let (command_tx, command_rx) = mpsc::channel(8);
    let status = Arc::new(RwLock::new(StatusSnapshot::default()));

    tokio::spawn(async move {
        if let Err(e) = sensor::serve(sensor_socket, reading_tx).await {
            error!("sensor listener stopped: {:#}", e);
        }
    });

    let web_state = WebState { status: status.clone(), commands: command_tx.clone() };
    tokio::spawn(async move {
        if let Err(e) = create_web_server(status_listener, web_state).await {
            error!("web server stopped: {:#}", e);
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted; shutting down");
            let _ = command_tx.send(HomeCommand::Shutdown).await;
        }
    });

    controller::run(home, config.intervals(), reading_rx, command_rx, status).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn home_config(sensor_listen: String, status_listen: String) -> anyhow::Result<HomeConfig> {
        let mut config = Config::from_toml(
            "[home]\ncodes = \"codes.toml\"\n[[room]]\nname = \"A\"\nblaster = \"127.0.0.1:9\"\nideal = 70\n",
        )?
        .home;
        config.sensor_listen = sensor_listen;
        config.status_listen = status_listen;
        Ok(config)
    }

    #[tokio::test]
    async fn binds_both_listeners() -> anyhow::Result<()> {
        let home = home_config("127.0.0.1:0".into(), "127.0.0.1:0".into())?;
        let (sensors, status) = bind_listeners(&home).await?;
        assert!(sensors.local_addr()?.port() > 0);
        assert!(status.local_addr()?.port() > 0);
        Ok(())
    }

    #[tokio::test]
    async fn taken_sensor_port_is_a_startup_error() -> anyhow::Result<()> {
        let taken = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = taken.local_addr()?.to_string();
        let home = home_config(addr.clone(), "127.0.0.1:0".into())?;
        let err = bind_listeners(&home).await.err().map(|e| format!("{:#}", e));
        assert!(err.is_some_and(|e| e.contains(&addr) && e.contains("sensor")));
        Ok(())
    }

    #[tokio::test]
    async fn bad_status_address_is_a_startup_error() -> anyhow::Result<()> {
        let home = home_config("127.0.0.1:0".into(), "not an address".into())?;
        let err = bind_listeners(&home).await.err().map(|e| format!("{:#}", e));
        assert!(err.is_some_and(|e| e.contains("status server")));
        Ok(())
    }
}
