//! Serialize-and-measure utility
//!
//! The canonical size of any structure is the byte length of its JSON
//! form. Measurements are only compared within a single compaction run,
//! so the exact key ordering does not matter as long as it is consistent,
//! which `serde_json` with `preserve_order` guarantees.

use serde::Serialize;

use crate::error::Result;

/// Byte length of the serialized form of `value`.
pub fn serialized_size<T: Serialize>(value: &T) -> Result<usize> {
    Ok(serde_json::to_vec(value)?.len())
}
