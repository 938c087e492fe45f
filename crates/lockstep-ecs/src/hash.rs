//! Streaming state hasher.
//!
//! Every component and system feeds its logical state into a [`StateHasher`]
//! as raw bytes; the resulting digest is a pure function of that state, with
//! no dependence on pointers, hash-map iteration order, or wall-clock values.
//! `hash()` on a [`crate::manager::Manager`] or anything built on top of it
//! compares byte-equal across peers that applied the same command history.

use std::fmt;

/// Wraps a `blake3::Hasher`, exposing fixed-width primitive writes so
/// component/system hash contributions read the same way their packetize
/// implementations do.
#[derive(Default)]
pub struct StateHasher(blake3::Hasher);

impl StateHasher {
    pub fn new() -> Self {
        Self(blake3::Hasher::new())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_bytes(&[v as u8]);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.write_bytes(&v.to_be_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write_bytes(&v.to_be_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_be_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.write_bytes(&v.to_be_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_be_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.write_bytes(&v.to_bits().to_be_bytes());
    }

    pub fn write_str(&mut self, v: &str) {
        self.write_u32(v.len() as u32);
        self.write_bytes(v.as_bytes());
    }

    pub fn finish(self) -> StateHash {
        StateHash(*self.0.finalize().as_bytes())
    }
}

/// A 256-bit content hash of some simulation state.
///
/// The `HashCheck` wire message only has room for a 32-bit hash;
/// [`StateHash::as_wire_i32`] derives that value by
/// taking the first four bytes of the digest, big-endian. The full 256-bit
/// value is what local equality checks (tests, `copy_into` verification)
/// compare, since it is cheap to compute and collision-proof enough that
/// truncating it is a wire-format concession, not a weakening of the
/// internal invariant.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateHash([u8; 32]);

impl StateHash {
    pub fn as_wire_i32(&self) -> i32 {
        i32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateHash({})", hex(&self.0))
    }
}

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_writes_same_hash() {
        let mut a = StateHasher::new();
        a.write_i64(7);
        a.write_str("position");
        a.write_f64(1.5);

        let mut b = StateHasher::new();
        b.write_i64(7);
        b.write_str("position");
        b.write_f64(1.5);

        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn different_writes_different_hash() {
        let mut a = StateHasher::new();
        a.write_i64(7);
        let mut b = StateHasher::new();
        b.write_i64(8);
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn wire_i32_is_deterministic() {
        let mut a = StateHasher::new();
        a.write_str("frame-42");
        let hash = a.finish();
        assert_eq!(hash.as_wire_i32(), hash.as_wire_i32());
    }
}
