use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("invalid time of day: {0:?} (expected something like \"6am\" or \"11 pm\")")]
    InvalidTime(String),
    #[error("schedule has no rules")]
    Empty,
}

/// A set of optional fields that a schedule rule can override.
pub trait Overrides: Clone + Default + PartialEq {
    /// Copy every field that `other` defines over the fields of `self`.
    fn merge_from(&mut self, other: &Self);
}

/// Parse "5am", "12pm", "7 PM", "9a" into an hour of the day.
pub fn parse_time(text: &str) -> Result<u32, ScheduleError> {
    let invalid = || ScheduleError::InvalidTime(text.to_string());
    let lower = text.trim().to_ascii_lowercase();
    let digits_end = lower.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
    let hour: u32 = lower[..digits_end].parse().map_err(|_| invalid())?;
    let pm = match lower[digits_end..].trim_start() {
        "am" | "a" => false,
        "pm" | "p" => true,
        _ => return Err(invalid()),
    };
    if !(1..=12).contains(&hour) {
        return Err(invalid());
    }
    Ok(match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    })
}

#[derive(Debug, Clone)]
struct Rule<O> {
    hour: u32,
    values: O,
}

/// Time-of-day rule table.
///
/// At any hour the effective value of each field comes from the closest
/// rule at or before that hour which sets it, wrapping around midnight to
/// the previous day's rules when needed.
#[derive(Debug, Clone)]
pub struct Schedule<O> {
    rules: Vec<Rule<O>>,
    applied: Option<O>,
}

impl<O: Overrides> Schedule<O> {
    pub fn new<'a, I>(rules: I) -> Result<Self, ScheduleError>
    where
        I: IntoIterator<Item = (&'a str, O)>,
    {
        let mut rules = rules
            .into_iter()
            .map(|(time, values)| -> Result<Rule<O>, ScheduleError> {
                Ok(Rule { hour: parse_time(time)?, values })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if rules.is_empty() {
            return Err(ScheduleError::Empty);
        }
        rules.sort_by_key(|r| r.hour);
        Ok(Self { rules, applied: None })
    }

    fn active_index(&self, hour: u32) -> usize {
        // Before the first rule of the day we are still in yesterday's last slot.
        match self.rules.iter().rposition(|r| r.hour <= hour) {
            Some(i) => i,
            None => self.rules.len() - 1,
        }
    }

    /// The override set in effect at `hour`.
    pub fn effective(&self, hour: u32) -> O {
        let active = self.active_index(hour);
        let n = self.rules.len();
        let mut merged = O::default();
        for j in 1..=n {
            merged.merge_from(&self.rules[(active + j) % n].values);
        }
        merged
    }

    /// Returns the override set to apply when it differs from the one last
    /// returned, and remembers it.
    pub fn update(&mut self, hour: u32) -> Option<&O> {
        let merged = self.effective(hour);
        if self.applied.as_ref() == Some(&merged) {
            return None;
        }
        self.applied = Some(merged);
        self.applied.as_ref()
    }
}
