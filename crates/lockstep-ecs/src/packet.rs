//! Length-prefixed binary packet codec.
//!
//! A [`Packet`] is a growable byte buffer with a read cursor. It is the only
//! sanctioned way state crosses the wire or a snapshot boundary. All integer
//! writes are big-endian; byte strings and UTF-8 strings are `u32` length
//! prefixed.

use std::collections::HashMap;
use std::sync::OnceLock;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet read ran past the buffer end ({requested} bytes requested, {remaining} remaining)")]
    UnexpectedEof { requested: usize, remaining: usize },

    #[error("declared length {declared} exceeds remaining packet data ({remaining} bytes)")]
    LengthOutOfBounds { declared: u32, remaining: usize },

    #[error("string bytes at cursor are not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown type tag '{0}' (not present in the packetizer registry)")]
    UnknownTypeTag(String),
}

/// A growable byte buffer with a read cursor.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Packet {
    buf: Vec<u8>,
    cursor: usize,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(buf: Vec<u8>) -> Self {
        Self { buf, cursor: 0 }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    fn take(&mut self, n: usize) -> Result<&[u8], PacketError> {
        if self.remaining() < n {
            return Err(PacketError::UnexpectedEof {
                requested: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.cursor..self.cursor + n];
        self.cursor += n;
        Ok(slice)
    }

    // -- primitive writes ----------------------------------------------

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_bits().to_be_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_bits().to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    // -- primitive reads -------------------------------------------------

    pub fn read_bool(&mut self) -> Result<bool, PacketError> {
        Ok(self.take(1)?[0] != 0)
    }

    pub fn read_u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, PacketError> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_i16(&mut self) -> Result<i16, PacketError> {
        let bytes: [u8; 2] = self.take(2)?.try_into().expect("length checked above");
        Ok(i16::from_be_bytes(bytes))
    }

    pub fn read_u16(&mut self) -> Result<u16, PacketError> {
        let bytes: [u8; 2] = self.take(2)?.try_into().expect("length checked above");
        Ok(u16::from_be_bytes(bytes))
    }

    pub fn read_i32(&mut self) -> Result<i32, PacketError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("length checked above");
        Ok(i32::from_be_bytes(bytes))
    }

    pub fn read_u32(&mut self) -> Result<u32, PacketError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().expect("length checked above");
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn read_i64(&mut self) -> Result<i64, PacketError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("length checked above");
        Ok(i64::from_be_bytes(bytes))
    }

    pub fn read_u64(&mut self) -> Result<u64, PacketError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("length checked above");
        Ok(u64::from_be_bytes(bytes))
    }

    pub fn read_f32(&mut self) -> Result<f32, PacketError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, PacketError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, PacketError> {
        let declared = self.read_u32()?;
        if declared as usize > self.remaining() {
            return Err(PacketError::LengthOutOfBounds {
                declared,
                remaining: self.remaining(),
            });
        }
        Ok(self.take(declared as usize)?.to_vec())
    }

    pub fn read_string(&mut self) -> Result<String, PacketError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| PacketError::InvalidUtf8)
    }

    /// Consumes every byte left in the packet, unprefixed. Used at the
    /// outermost framing layer where a message's tail is implicitly
    /// "whatever is left in this payload" rather than length-prefixed
    /// (e.g. a snapshot embedded in `GameStateResponse`).
    pub fn read_remaining_bytes(&mut self) -> Result<Vec<u8>, PacketError> {
        let remaining = self.remaining();
        Ok(self.take(remaining)?.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Packetizer type registry
// ---------------------------------------------------------------------------

/// Process-wide registry from a stable string tag to a constructor for `T`.
///
/// Written once (lazily, on first access -- equivalent to a startup
/// routine) and read-only thereafter, matching the resource-sharing
/// contract of the core: the only process-wide mutable state is this
/// registry, and it never changes after that first population.
pub struct TypeRegistry<T> {
    by_tag: HashMap<&'static str, fn(&mut Packet) -> Result<T, PacketError>>,
}

impl<T> TypeRegistry<T> {
    pub fn build(entries: &[(&'static str, fn(&mut Packet) -> Result<T, PacketError>)]) -> Self {
        let mut by_tag = HashMap::with_capacity(entries.len());
        for (tag, ctor) in entries {
            if by_tag.insert(*tag, *ctor).is_some() {
                panic!("duplicate packetizer tag registered: '{tag}'");
            }
        }
        Self { by_tag }
    }

    /// Write a stable type tag followed by the value's packetize output.
    pub fn write_with_type_info(&self, packet: &mut Packet, tag: &'static str, write: impl FnOnce(&mut Packet)) {
        debug_assert!(
            self.by_tag.contains_key(tag),
            "writing an unregistered type tag '{tag}'"
        );
        packet.write_string(tag);
        write(packet);
    }

    /// Read a type tag and dispatch to its registered constructor.
    pub fn read_with_type_info(&self, packet: &mut Packet) -> Result<T, PacketError> {
        let tag = packet.read_string()?;
        self.read_with_type_info_tagged(&tag, packet)
    }

    /// Dispatch to the constructor for an already-read tag. Callers that
    /// need to read other fields interleaved with the tag (e.g. the
    /// component record's `entity_id`/`enabled` flag) read the tag
    /// themselves and call this directly.
    pub fn read_with_type_info_tagged(&self, tag: &str, packet: &mut Packet) -> Result<T, PacketError> {
        let ctor = self
            .by_tag
            .get(tag)
            .ok_or_else(|| PacketError::UnknownTypeTag(tag.to_owned()))?;
        ctor(packet)
    }
}

/// Lazily builds and caches a [`TypeRegistry`] behind a [`OnceLock`].
///
/// Call sites pass a `build` closure that enumerates the known
/// component/system constructors; it runs exactly once per process.
pub fn registry_of<T: 'static>(
    cell: &'static OnceLock<TypeRegistry<T>>,
    build: impl FnOnce() -> TypeRegistry<T>,
) -> &'static TypeRegistry<T> {
    cell.get_or_init(build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_primitives() {
        let mut p = Packet::new();
        p.write_bool(true);
        p.write_i64(-42);
        p.write_u32(7);
        p.write_f64(1.25);
        p.write_string("hello");

        assert!(p.read_bool().unwrap());
        assert_eq!(p.read_i64().unwrap(), -42);
        assert_eq!(p.read_u32().unwrap(), 7);
        assert_eq!(p.read_f64().unwrap(), 1.25);
        assert_eq!(p.read_string().unwrap(), "hello");
    }

    #[test]
    fn read_past_end_is_malformed() {
        let mut p = Packet::new();
        p.write_u8(1);
        let _ = p.read_u8().unwrap();
        assert!(matches!(p.read_u8(), Err(PacketError::UnexpectedEof { .. })));
    }

    #[test]
    fn declared_length_past_buffer_is_malformed() {
        let mut p = Packet::new();
        p.write_u32(1_000_000);
        assert!(matches!(
            p.read_bytes(),
            Err(PacketError::LengthOutOfBounds { .. })
        ));
    }

    #[derive(Debug, PartialEq)]
    struct Thing(i32);

    fn thing_ctor(p: &mut Packet) -> Result<Thing, PacketError> {
        Ok(Thing(p.read_i32()?))
    }

    #[test]
    fn type_registry_roundtrip() {
        let registry = TypeRegistry::build(&[("thing", thing_ctor as fn(&mut Packet) -> Result<Thing, PacketError>)]);

        let mut p = Packet::new();
        registry.write_with_type_info(&mut p, "thing", |p| p.write_i32(9));

        let value = registry.read_with_type_info(&mut p).unwrap();
        assert_eq!(value, Thing(9));
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let registry: TypeRegistry<Thing> = TypeRegistry::build(&[]);
        let mut p = Packet::new();
        p.write_string("nope");
        assert!(matches!(
            registry.read_with_type_info(&mut p),
            Err(PacketError::UnknownTypeTag(tag)) if tag == "nope"
        ));
    }
}
