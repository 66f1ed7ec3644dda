use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Strongly typed batch identifier backed by ULID.
///
/// One `BatchId` is minted per dispatched batch and appears on every log
/// line produced while that batch is in flight; individual entries are
/// correlated by `(batch_id, index)`.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct BatchId(pub ulid::Ulid);

impl BatchId {
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BatchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BatchId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(BatchId(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for BatchId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BatchId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<BatchId>()
            .map_err(|_| serde::de::Error::custom("invalid batch id"))
    }
}
