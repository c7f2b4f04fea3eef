//! Small serde helpers shared across the crate.

/// (De)serializes a [`std::time::Duration`] as whole milliseconds.
///
/// The wire format for timeouts and runtimes is milliseconds everywhere
/// (configuration files, result snapshots), matching what probe consumers
/// expect.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Same as [`duration_ms`], for optional deserialize-only fields.
pub mod opt_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super::duration_ms")]
        timeout: Duration,
    }

    #[test]
    fn test_millis_round_trip() {
        let w = Wrapper {
            timeout: Duration::from_millis(5000),
        };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"timeout":5000}"#);

        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.timeout, Duration::from_millis(5000));
    }
}
