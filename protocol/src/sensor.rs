use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::warn;

const MAX_UDP: usize = 1460;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingKind {
    Temperature,
    LightLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_id: String,
    pub kind: ReadingKind,
    pub value: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Datagram {
    One(SensorReading),
    Many(Vec<SensorReading>),
}

/// A datagram carries a single reading or a whole bridge poll.
pub fn parse_datagram(buf: &[u8]) -> Result<Vec<SensorReading>> {
    if buf.is_empty() {
        bail!("empty datagram");
    }
    Ok(match serde_json::from_slice::<Datagram>(buf)? {
        Datagram::One(reading) => vec![reading],
        Datagram::Many(readings) => readings,
    })
}

/// Forward readings arriving on `socket` until the receiving side goes
/// away.
pub async fn serve(socket: UdpSocket, tx: mpsc::Sender<SensorReading>) -> Result<()> {
    let mut buf = [0; MAX_UDP];
    loop {
        let (sz, src) = socket.recv_from(&mut buf).await?;
        let readings = match parse_datagram(&buf[..sz]) {
            Ok(readings) => readings,
            Err(e) => {
                warn!(%src, "bad sensor datagram: {:#}", e);
                continue;
            }
        };
        for reading in readings {
            if tx.send(reading).await.is_err() {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_reading() -> anyhow::Result<()> {
        let readings = parse_datagram(br#"{"sensor_id":"s1","kind":"temperature","value":71.5}"#)?;
        assert_eq!(
            readings,
            vec![SensorReading { sensor_id: "s1".into(), kind: ReadingKind::Temperature, value: 71.5 }]
        );
        Ok(())
    }

    #[test]
    fn batch_of_readings() -> anyhow::Result<()> {
        let readings = parse_datagram(
            br#"[{"sensor_id":"s1","kind":"temperature","value":70},
                 {"sensor_id":"s2","kind":"light_level","value":12000}]"#,
        )?;
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[1].kind, ReadingKind::LightLevel);
        Ok(())
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_datagram(b"").is_err());
        assert!(parse_datagram(b"not json").is_err());
        assert!(parse_datagram(br#"{"sensor_id":"s1","kind":"humidity","value":1}"#).is_err());
    }

    #[tokio::test]
    async fn forwards_readings_and_skips_bad_datagrams() -> anyhow::Result<()> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = socket.local_addr()?;
        let (tx, mut rx) = mpsc::channel(8);
        let server = tokio::spawn(serve(socket, tx));

        let sender = UdpSocket::bind("127.0.0.1:0").await?;
        sender.send_to(b"garbage", addr).await?;
        sender
            .send_to(br#"{"sensor_id":"s1","kind":"temperature","value":69}"#, addr)
            .await?;

        let reading = rx.recv().await.expect("reading forwarded");
        assert_eq!(reading.sensor_id, "s1");
        assert_eq!(reading.value, 69.0);

        drop(rx);
        server.abort();
        Ok(())
    }
}
