#![forbid(unsafe_code)]

mod int;
mod key;
mod timestamp;

pub use int::{decode_i64, encode_i64};
pub use key::{CompositeKey, MAX_VARINT_LEN, get_uvarint, put_uvarint};
pub use timestamp::{TIMESTAMP_LEN, decode_timestamp, encode_timestamp};
