use serde::Serializer;

/// Constrains the hex helpers to the unsigned integer widths used in device descriptions.
pub trait SerializeUnsignedInt: Sized {
    fn serialize_int<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer;

    /// Narrows a parsed value, returning `None` if it does not fit.
    fn from_u64(value: u64) -> Option<Self>;
}

impl SerializeUnsignedInt for u32 {
    fn serialize_int<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u32(*self)
    }

    fn from_u64(value: u64) -> Option<Self> {
        u32::try_from(value).ok()
    }
}

impl SerializeUnsignedInt for u64 {
    fn serialize_int<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(*self)
    }

    fn from_u64(value: u64) -> Option<Self> {
        Some(value)
    }
}
