use climate_protocol::Mode;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// One proposed mode per room, in room order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Configuration(Vec<Mode>);

impl Configuration {
    pub fn new(modes: Vec<Mode>) -> Self {
        Configuration(modes)
    }

    pub fn all_off(rooms: usize) -> Self {
        Configuration(vec![Mode::Off; rooms])
    }

    pub fn modes(&self) -> &[Mode] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn units_on(&self) -> usize {
        self.0.iter().filter(|m| m.is_on()).count()
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, mode) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", mode)?;
        }
        Ok(())
    }
}

// Every off/`mode` sequence with at least one room on.
fn permute(mode: Mode, rooms: usize) -> impl Iterator<Item = Configuration> {
    (1u64..(1u64 << rooms)).map(move |mask| {
        Configuration(
            (0..rooms)
                .map(|i| if mask >> i & 1 == 1 { mode } else { Mode::Off })
                .collect(),
        )
    })
}

/// Largest home the optimizer handles; each run scores 2^(n+1) - 1
/// configurations.
pub const MAX_ROOMS: usize = 16;

#[derive(Debug, Error, PartialEq)]
#[error("too many rooms: {0} (at most {MAX_ROOMS})")]
pub struct TooManyRooms(pub usize);

/// All legal assignments for `rooms` rooms sharing one compressor: never
/// heat and cool at once, plus the all-off assignment exactly once.
pub fn configuration_space(rooms: usize) -> Result<Vec<Configuration>, TooManyRooms> {
    if rooms > MAX_ROOMS {
        return Err(TooManyRooms(rooms));
    }
    Ok(permute(Mode::Cool, rooms)
        .chain(permute(Mode::Heat, rooms))
        .chain(std::iter::once(Configuration::all_off(rooms)))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedConfiguration {
    pub configuration: Configuration,
    pub scores: Vec<f64>,
    pub total: f64,
}

impl AnnotatedConfiguration {
    pub fn new(configuration: Configuration, scores: Vec<f64>) -> Self {
        let total = scores.iter().sum();
        Self { configuration, scores, total }
    }

    /// Best first: higher total, then fewer units running, then the string
    /// form so that the result is deterministic.
    pub fn rank(a: &Self, b: &Self) -> Ordering {
        b.total
            .total_cmp(&a.total)
            .then_with(|| a.configuration.units_on().cmp(&b.configuration.units_on()))
            .then_with(|| a.configuration.to_string().cmp(&b.configuration.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_size() -> anyhow::Result<()> {
        for rooms in 0..8 {
            let space = configuration_space(rooms)?;
            assert_eq!(space.len(), 2 * ((1 << rooms) - 1) + 1, "rooms: {}", rooms);
        }
        Ok(())
    }

    #[test]
    fn refuses_oversized_homes() {
        assert!(configuration_space(MAX_ROOMS).is_ok());
        assert_eq!(configuration_space(MAX_ROOMS + 1), Err(TooManyRooms(MAX_ROOMS + 1)));
        assert_eq!(configuration_space(64), Err(TooManyRooms(64)));
    }

    #[test]
    fn never_mixes_heat_and_cool() -> anyhow::Result<()> {
        for rooms in 1..7 {
            let space = configuration_space(rooms)?;
            let mut all_off = 0;
            for c in &space {
                assert_eq!(c.len(), rooms);
                let on: Vec<Mode> = c.modes().iter().copied().filter(|m| m.is_on()).collect();
                if on.is_empty() {
                    all_off += 1;
                } else {
                    assert!(on.iter().all(|m| *m == on[0]), "mixed: {}", c);
                }
            }
            assert_eq!(all_off, 1);
        }
        Ok(())
    }

    #[test]
    fn no_duplicates() -> anyhow::Result<()> {
        let space = configuration_space(4)?;
        for (i, a) in space.iter().enumerate() {
            assert!(!space[i + 1..].contains(a), "duplicate: {}", a);
        }
        Ok(())
    }

    #[test]
    fn display_matches_list_form() {
        let c = Configuration::new(vec![Mode::Cool, Mode::Off, Mode::Cool]);
        assert_eq!(c.to_string(), "cool,off,cool");
        assert_eq!(c.units_on(), 2);
    }

    #[test]
    fn ranking_prefers_score_then_fewer_units_then_name() {
        let a = AnnotatedConfiguration::new(Configuration::new(vec![Mode::Off, Mode::Heat]), vec![-1.0, 0.5]);
        let b = AnnotatedConfiguration::new(Configuration::new(vec![Mode::Cool, Mode::Off]), vec![0.5, -1.0]);
        let c = AnnotatedConfiguration::new(Configuration::new(vec![Mode::Cool, Mode::Cool]), vec![-0.25, -0.25]);
        let d = AnnotatedConfiguration::new(Configuration::new(vec![Mode::Off, Mode::Off]), vec![0.0, 0.0]);

        let mut ranked = vec![a.clone(), b.clone(), c.clone(), d.clone()];
        ranked.sort_by(AnnotatedConfiguration::rank);
        assert_eq!(ranked, vec![d, b, a, c]);
    }
}
