/// Identifier for a message flowing through a channel
///
/// This is a globally unique identifier (ULID) assigned exactly once, when a
/// message first enters a channel. ULIDs are lexicographically sortable by
/// creation time and collision-resistant, which also makes them usable as
/// store filenames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId {
    id: ulid::Ulid,
}

impl MessageId {
    /// Create a new message ID from a ULID
    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self { id }
    }

    /// Generate a new unique message ID
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }

    /// Get the underlying ULID
    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.id
    }

    /// Get the timestamp (milliseconds since Unix epoch) encoded in this ID
    #[must_use]
    pub const fn timestamp_ms(&self) -> u64 {
        self.id.timestamp_ms()
    }
}

impl std::str::FromStr for MessageId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(|id| Self { id })
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl serde::Serialize for MessageId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
        Ok(Self { id })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: HashSet<_> = (0..1000).map(|_| MessageId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_ids_sort_by_creation_time() {
        let earlier = MessageId::new(ulid::Ulid::from_parts(1_000, 42));
        let later = MessageId::new(ulid::Ulid::from_parts(2_000, 7));
        assert!(earlier < later);
        assert!(earlier.to_string() < later.to_string());
    }

    #[test]
    fn test_round_trip_through_string() {
        let id = MessageId::generate();
        let parsed: MessageId = id.to_string().parse().expect("valid ULID string");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_round_trip_through_serde() {
        let id = MessageId::generate();
        let json = serde_json::to_string(&id).expect("serialize");
        let parsed: MessageId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_rejects_invalid_strings() {
        assert!("not-a-ulid".parse::<MessageId>().is_err());
        assert!(serde_json::from_str::<MessageId>("\"1234\"").is_err());
    }
}
