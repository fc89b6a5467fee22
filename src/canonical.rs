//! Canonical serialization for fingerprints and policy hashes.
//!
//! - Struct fields serialize in declaration order
//! - Maps in hashed data are `BTreeMap`, never `HashMap`
//! - Identifiers serialize as their URI strings

use std::io;

use serde::Serialize;
use xxhash_rust::xxh64::Xxh64;

const SEED: u64 = 0;

/// Serialize a value to canonical JSON bytes.
///
/// # Panics
///
/// Panics if `value` cannot be represented as JSON (a map with non-string
/// keys); every hashed type in this crate keys its maps by strings.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("canonical serialization of string-keyed data")
}

/// Feeds serialized bytes straight into the hasher, so large subgraphs are
/// hashed without materializing their JSON.
struct HashWriter(Xxh64);

impl io::Write for HashWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compute canonical hash of a serializable value.
///
/// Equal to `xxh64(to_canonical_bytes(value), 0)`.
///
/// # Panics
///
/// Same conditions as [`to_canonical_bytes`].
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    let mut writer = HashWriter(Xxh64::new(SEED));
    serde_json::to_writer(&mut writer, value)
        .expect("canonical serialization of string-keyed data");
    writer.0.digest()
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}
