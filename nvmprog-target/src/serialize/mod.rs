mod hex_u_int;
mod serialize_u_int;

pub(crate) mod hex {
    pub(crate) use super::hex_u_int::{deserialize, serialize};
}
