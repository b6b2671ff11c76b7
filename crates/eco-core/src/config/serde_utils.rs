//! Serde helpers for configuration values

/// Durations written as a number of seconds
///
/// Whole seconds are written back as integers. Fractional values such as
/// `0.25` are accepted on input so short intervals can be configured.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Secs {
        Whole(u64),
        Fractional(f64),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_f64(duration.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Secs::deserialize(deserializer)? {
            Secs::Whole(secs) => Ok(Duration::from_secs(secs)),
            Secs::Fractional(secs) => Duration::try_from_secs_f64(secs).map_err(|e| {
                serde::de::Error::custom(format!("invalid duration: {} seconds ({})", secs, e))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Intervals {
        #[serde(with = "duration_secs")]
        poll: Duration,
    }

    #[test]
    fn test_whole_seconds() {
        let parsed: Intervals = toml::from_str("poll = 30").unwrap();
        assert_eq!(parsed.poll, Duration::from_secs(30));
        assert_eq!(toml::to_string(&parsed).unwrap().trim(), "poll = 30");
    }

    #[test]
    fn test_fractional_seconds() {
        let parsed: Intervals = toml::from_str("poll = 0.25").unwrap();
        assert_eq!(parsed.poll, Duration::from_millis(250));
    }

    #[test]
    fn test_negative_rejected() {
        assert!(toml::from_str::<Intervals>("poll = -1.5").is_err());
    }

    #[test]
    fn test_overflow_rejected() {
        assert!(toml::from_str::<Intervals>("poll = 1e30").is_err());
        assert!(toml::from_str::<Intervals>("poll = inf").is_err());
    }
}
