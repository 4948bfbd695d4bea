//! Serde helpers for byte payloads and durations in JSON documents.

/// Serialize `Bytes` as a standard base64 string.
pub mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(D::Error::custom)
    }
}

/// Serialize a `Duration` as whole milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        #[serde(with = "super::base64_bytes")]
        payload: Bytes,
        #[serde(with = "super::duration_ms")]
        delay: Duration,
    }

    #[test]
    fn test_json_shape() {
        let doc = Doc {
            payload: Bytes::from_static(b"\x16\x03\x01"),
            delay: Duration::from_millis(2000),
        };
        let json = serde_json::to_string(&doc).unwrap();
        assert_eq!(json, r#"{"payload":"FgMB","delay":2000}"#);

        let parsed: Doc = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_rejects_invalid_base64() {
        let result = serde_json::from_str::<Doc>(r#"{"payload":"!!","delay":1}"#);
        assert!(result.is_err());
    }
}
