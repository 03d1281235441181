use anyhow::{bail, Result};
use clap::Parser;
use climate_protocol::blaster::{Blaster, UdpBlaster};
use climate_protocol::ir::IrCodes;
use climate_protocol::Mode;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Send one learned IR command to a blaster, by hand.
#[derive(Parser, Debug)]
struct Args {
    /// host:port of the blaster
    host: String,
    /// IR codes file
    #[arg(short, long, default_value = "codes.toml")]
    codes: PathBuf,
    /// Special code to send ("off", "lightoff", ...)
    #[arg(short, long, conflicts_with_all = ["mode", "temperature"])]
    special: Option<String>,
    /// heat or cool
    #[arg(short, long)]
    mode: Option<Mode>,
    #[arg(short, long, default_value = "auto")]
    fan: String,
    /// Setpoint in whole degrees
    #[arg(short, long)]
    temperature: Option<f64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    let codes = IrCodes::load(&args.codes)?;

    let data = match (&args.special, args.mode) {
        (Some(name), _) => codes.special(name)?.to_vec(),
        (None, Some(mode)) => codes.encode(mode, &args.fan, args.temperature)?,
        (None, None) => bail!("Usage: host (--special NAME | --mode MODE [--fan FAN] --temperature T)"),
    };

    let mut blaster = UdpBlaster::new(&args.host)?;
    info!(host = %args.host, bytes = data.len(), "sending");
    blaster.send_data(&data)?;
    Ok(())
}
