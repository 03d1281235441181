use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub const OFF_CODE: &str = "off";
pub const LIGHT_OFF_CODE: &str = "lightoff";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Off,
    Heat,
    Cool,
}

impl Mode {
    pub fn is_on(self) -> bool {
        self != Mode::Off
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Off => "off",
            Mode::Heat => "heat",
            Mode::Cool => "cool",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(Mode::Off),
            "heat" => Ok(Mode::Heat),
            "cool" => Ok(Mode::Cool),
            _ => Err(CodecError::Parse(format!("unknown mode: {}", s))),
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("could not find IR code for {0}")]
    EncodingNotFound(String),
    #[error("bad IR codes: {0}")]
    Parse(String),
}

/// Registry of learned infrared codes.
///
/// Heat and cool codes are keyed by fan setting and a whole-degree setpoint;
/// everything else ("off", "lightoff", ...) is a named special code.
#[derive(Debug, Clone, Default)]
pub struct IrCodes {
    special: HashMap<String, Vec<u8>>,
    modes: HashMap<(Mode, String, i32), Vec<u8>>,
}

// On-disk layout: [special] name = "hex", [heat.<fan>] <temp> = "hex", [cool.<fan>] ...
#[derive(Deserialize)]
struct CodesFile {
    #[serde(default)]
    special: HashMap<String, String>,
    #[serde(default)]
    heat: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    cool: HashMap<String, HashMap<String, String>>,
}

fn decode_hex(what: &str, text: &str) -> Result<Vec<u8>, CodecError> {
    hex::decode(text.trim()).map_err(|e| CodecError::Parse(format!("{}: {}", what, e)))
}

impl IrCodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(Self::from_toml(&text)?)
    }

    pub fn from_toml(text: &str) -> Result<Self, CodecError> {
        let file: CodesFile = toml::from_str(text).map_err(|e| CodecError::Parse(e.to_string()))?;
        let mut codes = IrCodes::new();
        for (name, hex) in &file.special {
            codes.insert_special(name, decode_hex(name, hex)?);
        }
        for (mode, table) in [(Mode::Heat, &file.heat), (Mode::Cool, &file.cool)] {
            for (fan, temps) in table {
                for (temp, hex) in temps {
                    let what = format!("{}-{}-{}", mode, fan, temp);
                    let degrees: i32 = temp
                        .parse()
                        .map_err(|_| CodecError::Parse(format!("{}: temperature is not a whole number", what)))?;
                    codes.insert(mode, fan, degrees, decode_hex(&what, hex)?);
                }
            }
        }
        Ok(codes)
    }

    pub fn insert(&mut self, mode: Mode, fan: &str, temperature: i32, data: Vec<u8>) {
        self.modes.insert((mode, fan.to_string(), temperature), data);
    }

    pub fn insert_special(&mut self, name: &str, data: Vec<u8>) {
        self.special.insert(name.to_string(), data);
    }

    pub fn special(&self, name: &str) -> Result<&[u8], CodecError> {
        self.special
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| CodecError::EncodingNotFound(name.to_string()))
    }

    pub fn encode(&self, mode: Mode, fan: &str, temperature: Option<f64>) -> Result<Vec<u8>, CodecError> {
        if mode == Mode::Off {
            return self.special(OFF_CODE).map(<[u8]>::to_vec);
        }
        let key = || format!("{},{},{:?}", mode, fan, temperature);
        let degrees = match temperature {
            Some(t) if t.is_finite() => t.round() as i32,
            _ => return Err(CodecError::EncodingNotFound(key())),
        };
        self.modes
            .get(&(mode, fan.to_string(), degrees))
            .cloned()
            .ok_or_else(|| CodecError::EncodingNotFound(format!("{},{},{}", mode, fan, degrees)))
    }

    pub fn len(&self) -> usize {
        self.special.len() + self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODES: &str = r#"
[special]
off = "0a0b"
lightoff = "ff"

[cool.auto]
68 = "c068"

[heat.auto]
72 = "4872"
"#;

    #[test]
    fn loads_codes_file() -> anyhow::Result<()> {
        let codes = IrCodes::from_toml(CODES)?;
        assert_eq!(codes.len(), 4);
        assert_eq!(codes.special(LIGHT_OFF_CODE)?, &[0xff]);
        assert_eq!(codes.encode(Mode::Cool, "auto", Some(68.0))?, vec![0xc0, 0x68]);
        assert_eq!(codes.encode(Mode::Heat, "auto", Some(72.0))?, vec![0x48, 0x72]);
        Ok(())
    }

    #[test]
    fn off_ignores_fan_and_temperature() -> anyhow::Result<()> {
        let codes = IrCodes::from_toml(CODES)?;
        assert_eq!(codes.encode(Mode::Off, "high", None)?, vec![0x0a, 0x0b]);
        Ok(())
    }

    #[test]
    fn rounds_setpoint_to_whole_degree() -> anyhow::Result<()> {
        let codes = IrCodes::from_toml(CODES)?;
        assert_eq!(codes.encode(Mode::Cool, "auto", Some(67.6))?, vec![0xc0, 0x68]);
        Ok(())
    }

    #[test]
    fn missing_code_is_encoding_not_found() -> anyhow::Result<()> {
        let codes = IrCodes::from_toml(CODES)?;
        let err = codes.encode(Mode::Cool, "high", Some(68.0)).unwrap_err();
        assert!(matches!(err, CodecError::EncodingNotFound(_)));
        assert!(matches!(codes.encode(Mode::Heat, "auto", None), Err(CodecError::EncodingNotFound(_))));
        assert!(matches!(IrCodes::new().special(OFF_CODE), Err(CodecError::EncodingNotFound(_))));
        Ok(())
    }

    #[test]
    fn bad_hex_is_rejected() {
        let err = IrCodes::from_toml("[special]\noff = \"zz\"\n").unwrap_err();
        assert!(matches!(err, CodecError::Parse(_)));
        let err = IrCodes::from_toml("[cool.auto]\nwarm = \"00\"\n").unwrap_err();
        assert!(matches!(err, CodecError::Parse(_)));
    }

    #[test]
    fn mode_strings() -> anyhow::Result<()> {
        assert_eq!("cool".parse::<Mode>()?, Mode::Cool);
        assert_eq!(Mode::Heat.to_string(), "heat");
        assert!("fan".parse::<Mode>().is_err());
        assert!(!Mode::Off.is_on());
        Ok(())
    }
}
