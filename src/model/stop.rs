use chrono::{NaiveTime, Timelike};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_json::Value;
use std::{fmt, str::FromStr, sync::LazyLock};
use tracing::debug;

const MINUTES_PER_DAY: i64 = 24 * 60;

static HH_MM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").expect("HH:MM pattern is valid"));

/// A scheduled time of day in 24-hour "HH:MM" form.
///
/// Always holds a valid time, so anything that reaches the wire or the page is
/// well formed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StopTime(NaiveTime);

impl StopTime {
    pub fn minutes_of_day(&self) -> i64 {
        i64::from(self.0.hour()) * 60 + i64::from(self.0.minute())
    }

    /// The time shown once `delay` minutes are applied.
    ///
    /// Wraps around midnight in both directions and never rolls into another day.
    pub fn with_delay(&self, delay: i32) -> StopTime {
        let total = (self.minutes_of_day() + i64::from(delay)).rem_euclid(MINUTES_PER_DAY);

        // rem_euclid keeps total in 0..1440
        let hour = (total / 60) as u32;
        let minute = (total % 60) as u32;

        StopTime(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("\"{0}\" is not a 24-hour HH:MM time")]
pub struct InvalidStopTime(pub String);

impl FromStr for StopTime {
    type Err = InvalidStopTime;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !HH_MM.is_match(s) {
            return Err(InvalidStopTime(s.to_string()));
        }

        NaiveTime::parse_from_str(s, "%H:%M")
            .map(StopTime)
            .map_err(|_| InvalidStopTime(s.to_string()))
    }
}

impl fmt::Display for StopTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl Serialize for StopTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StopTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;

        s.parse().map_err(de::Error::custom)
    }
}

/// One scheduled point on a route.
///
/// Missing fields take the values of a newly added stop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stop {
    #[serde(deserialize_with = "lenient_name")]
    pub name: String,
    #[serde(deserialize_with = "lenient_time")]
    pub time: StopTime,
    /// Minutes, can be negative
    #[serde(deserialize_with = "lenient_delay")]
    pub delay: i32,
}

impl Default for Stop {
    fn default() -> Self {
        Stop {
            name: "New stop".to_string(),
            time: StopTime::default(),
            delay: 0,
        }
    }
}

impl Stop {
    pub fn new(name: impl Into<String>, time: StopTime, delay: i32) -> Self {
        Stop {
            name: name.into(),
            time,
            delay,
        }
    }

    pub fn updated_time(&self) -> StopTime {
        self.time.with_delay(self.delay)
    }

    pub fn is_delayed(&self) -> bool {
        self.delay != 0
    }
}

/// "(+5 min)" or "(-3 min)"
pub fn delay_label(delay: i32) -> String {
    if delay >= 0 {
        format!("(+{delay} min)")
    } else {
        format!("({delay} min)")
    }
}

/// Reads a delay typed by a user. Empty or non-numeric text counts as 0 and
/// fractional values are truncated.
pub fn parse_delay(text: &str) -> i32 {
    let text = text.trim();

    if let Ok(delay) = text.parse::<i64>() {
        return clamp_delay(delay);
    }

    match text.parse::<f64>() {
        Ok(delay) if delay.is_finite() => clamp_delay(delay.trunc() as i64),
        _ => {
            debug!(text, "unreadable delay, using 0");
            0
        }
    }
}

fn clamp_delay(delay: i64) -> i32 {
    delay.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

// Pages and older clients send names, times and delays in whatever shape the
// form held, so the wire format accepts anything and falls back to defaults.
fn lenient_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Value = Deserialize::deserialize(deserializer)?;

    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_time<'de, D>(deserializer: D) -> Result<StopTime, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Value = Deserialize::deserialize(deserializer)?;

    let time = match &value {
        Value::String(s) => s.parse().ok(),
        _ => None,
    };

    Ok(time.unwrap_or_else(|| {
        debug!(%value, "invalid stop time, using 00:00");
        StopTime::default()
    }))
}

fn lenient_delay<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Value = Deserialize::deserialize(deserializer)?;

    Ok(match value {
        Value::Number(n) => match n.as_i64() {
            Some(delay) => clamp_delay(delay),
            None => n
                .as_f64()
                .filter(|d| d.is_finite())
                .map(|d| clamp_delay(d.trunc() as i64))
                .unwrap_or(0),
        },
        Value::String(s) => parse_delay(&s),
        _ => 0,
    })
}
