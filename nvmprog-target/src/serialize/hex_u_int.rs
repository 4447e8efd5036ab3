use super::serialize_u_int::SerializeUnsignedInt;
use serde::{
    de::{self, Visitor},
    Deserializer, Serializer,
};
use std::{fmt, marker::PhantomData};

pub(crate) fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: std::fmt::LowerHex + SerializeUnsignedInt,
{
    // Addresses read a lot better as hex in YAML and JSON.
    if serializer.is_human_readable() {
        serializer.serialize_str(format!("{:#x}", value).as_str())
    } else {
        value.serialize_int(serializer)
    }
}

/// Accepts either a plain integer or a string in decimal or `0x` prefixed hex notation.
pub(crate) fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: SerializeUnsignedInt,
{
    struct HexVisitor<T>(PhantomData<T>);

    impl<'de, T: SerializeUnsignedInt> Visitor<'de> for HexVisitor<T> {
        type Value = T;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "an unsigned integer or a hex string")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<T, E> {
            T::from_u64(value).ok_or_else(|| E::custom(format!("{value:#x} is out of range")))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<T, E> {
            let value = u64::try_from(value).map_err(|_| E::custom("negative address"))?;
            self.visit_u64(value)
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<T, E> {
            let parsed = match value
                .strip_prefix("0x")
                .or_else(|| value.strip_prefix("0X"))
            {
                Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
                None => value.replace('_', "").parse::<u64>(),
            }
            .map_err(|e| E::custom(format!("invalid number '{value}': {e}")))?;
            self.visit_u64(parsed)
        }
    }

    deserializer.deserialize_any(HexVisitor(PhantomData))
}
