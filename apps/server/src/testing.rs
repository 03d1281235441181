use climate_protocol::blaster::{Blaster, TransportError};
use climate_protocol::ir::{IrCodes, LIGHT_OFF_CODE, OFF_CODE};
use climate_protocol::Mode;
use std::sync::{Arc, Mutex};

/// Shared log of everything the test blasters sent, as "room:payload".
#[derive(Clone, Default)]
pub struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blaster(&self, room: &str) -> Box<dyn Blaster> {
        Box::new(RecordingBlaster { room: room.to_owned(), log: self.log.clone(), fail: false })
    }

    pub fn failing_blaster(&self, room: &str) -> Box<dyn Blaster> {
        Box::new(RecordingBlaster { room: room.to_owned(), log: self.log.clone(), fail: true })
    }

    pub fn sent(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Sends with the repeats and light-off commands folded away.
    pub fn commands(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for s in self.sent() {
            if s.ends_with(":lightoff") || out.last() == Some(&s) {
                continue;
            }
            out.push(s);
        }
        out
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

struct RecordingBlaster {
    room: String,
    log: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl Blaster for RecordingBlaster {
    fn send_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.fail {
            return Err(TransportError {
                addr: self.room.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "blaster unplugged"),
            });
        }
        let payload = String::from_utf8_lossy(data);
        self.log.lock().unwrap().push(format!("{}:{}", self.room, payload));
        Ok(())
    }
}

/// Codes whose payload is their own readable name, e.g. "cool-auto-68".
pub fn test_codes() -> IrCodes {
    let mut codes = IrCodes::new();
    codes.insert_special(OFF_CODE, OFF_CODE.as_bytes().to_vec());
    codes.insert_special(LIGHT_OFF_CODE, LIGHT_OFF_CODE.as_bytes().to_vec());
    for mode in [Mode::Heat, Mode::Cool] {
        for fan in ["auto", "high", "low"] {
            for t in 55..=90 {
                codes.insert(mode, fan, t, format!("{}-{}-{}", mode, fan, t).into_bytes());
            }
        }
    }
    codes
}
