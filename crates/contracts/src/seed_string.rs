//! Engine seeds travel as JSON strings. Config and snapshot files end up in
//! JavaScript widget tooling, where numbers above 2^53 silently lose
//! precision, so the seed is written as a decimal string and read back from
//! either spelling.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};

pub fn serialize<S>(seed: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(seed)
}

struct SeedVisitor;

impl<'de> Visitor<'de> for SeedVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an engine seed as a decimal string or unsigned integer")
    }

    fn visit_str<E>(self, raw: &str) -> Result<u64, E>
    where
        E: de::Error,
    {
        raw.parse::<u64>()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(raw), &self))
    }

    fn visit_u64<E>(self, value: u64) -> Result<u64, E>
    where
        E: de::Error,
    {
        Ok(value)
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(SeedVisitor)
}
