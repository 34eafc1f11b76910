use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// A screenplay duration literal.
///
/// Accepts exactly the grammar `^\d+(ms|s)$`. The literal text is kept so
/// directive programs can emit it verbatim; the parsed value is monotonic
/// nanoseconds (negative durations are unrepresentable by the grammar).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DurationSpec {
    text: String,
    value: Duration,
}

impl DurationSpec {
    /// Parse a duration literal.
    pub fn parse(text: &str) -> Result<Self, String> {
        let (digits, unit): (&str, &str) = if let Some(stripped) = text.strip_suffix("ms") {
            (stripped, "ms")
        } else if let Some(stripped) = text.strip_suffix('s') {
            (stripped, "s")
        } else {
            return Err(format!("duration '{text}' must match '<number>ms' or '<number>s'"));
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("duration '{text}' must match '<number>ms' or '<number>s'"));
        }
        let amount: u64 = digits
            .parse()
            .map_err(|_| format!("duration '{text}' is out of range"))?;
        let value = match unit {
            "ms" => Duration::from_millis(amount),
            _ => Duration::from_secs(amount),
        };
        Ok(Self {
            text: text.to_string(),
            value,
        })
    }

    #[must_use]
    pub fn as_duration(&self) -> Duration {
        self.value
    }

    /// The literal as written in the screenplay.
    #[must_use]
    pub fn literal(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for DurationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for DurationSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for DurationSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(D::Error::custom)
    }
}
