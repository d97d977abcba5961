//! Sequential cursors over packet payloads.
//!
//! All multi-byte integers are little-endian. Strings occupy a fixed
//! 16-byte slot on the wire regardless of their actual length: a 1-byte
//! length prefix, the content bytes, then padding up to the slot size.
//! The reader must consume the padding too, or every later field shifts.
//! Addresses are NOT padded; they are 6 raw bytes.

use crate::bdaddr::Bdaddr;
use crate::error::{FlicError, Result};

/// Fixed wire slot size for string fields (names, colors, serials).
const STRING_SLOT_SIZE: usize = 16;

/// Forward-only reader over a received payload.
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        PayloadReader { buf, pos: 0 }
    }

    /// Bytes left to read. Zero means the payload is exhausted, which the
    /// get-button-info decoder uses to detect the older protocol revision.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(FlicError::UnexpectedEndOfPayload);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    pub fn read_bdaddr(&mut self) -> Result<Bdaddr> {
        Bdaddr::from_bytes(self.take(6)?)
    }

    /// Reads one enum byte and converts it, mapping unknown values to
    /// [`FlicError::MalformedPayload`].
    pub fn read_enum<T>(&mut self) -> Result<T>
    where
        T: TryFrom<u8, Error = FlicError>,
    {
        T::try_from(self.read_u8()?)
    }

    /// Reads a string field: length byte, content, then the padding that
    /// fills the rest of the 16-byte slot. Always consumes exactly
    /// 1 + 16 bytes. A declared length above the slot size is malformed.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u8()? as usize;
        if len > STRING_SLOT_SIZE {
            return Err(FlicError::MalformedPayload(format!(
                "string length {} exceeds the {}-byte slot",
                len, STRING_SLOT_SIZE
            )));
        }

        let content = self.take(len)?.to_vec();
        self.take(STRING_SLOT_SIZE - len)?;

        Ok(String::from_utf8_lossy(&content).into_owned())
    }
}

/// Builder for outbound payloads. Commands carry only fixed-size fields,
/// so there is no string writer.
#[derive(Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bdaddr(&mut self, addr: Bdaddr) {
        self.buf.extend_from_slice(&addr.to_bytes());
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_little_endian() {
        let buf = [0x34, 0x12, 0xFF, 0xFF, 0x78, 0x56, 0x34, 0x12];
        let mut reader = PayloadReader::new(&buf);

        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_i16().unwrap(), -1);
        assert_eq!(reader.read_u32().unwrap(), 0x12345678);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_bool_nonzero_is_true() {
        let mut reader = PayloadReader::new(&[0, 1, 42]);
        assert!(!reader.read_bool().unwrap());
        assert!(reader.read_bool().unwrap());
        assert!(reader.read_bool().unwrap());
    }

    #[test]
    fn test_string_slot_always_consumes_slot_size() {
        for len in 0..=16usize {
            let mut buf = vec![len as u8];
            buf.extend(std::iter::repeat(b'x').take(len));
            buf.resize(1 + 16, 0);
            buf.push(0xEE); // marker after the slot

            let mut reader = PayloadReader::new(&buf);
            let s = reader.read_string().unwrap();
            assert_eq!(s.len(), len);
            assert_eq!(reader.read_u8().unwrap(), 0xEE, "padding not consumed for len {}", len);
        }
    }

    #[test]
    fn test_string_content_is_preserved() {
        let mut buf = vec![5u8];
        buf.extend_from_slice(b"hello");
        buf.resize(1 + 16, 0);

        let mut reader = PayloadReader::new(&buf);
        assert_eq!(reader.read_string().unwrap(), "hello");
    }

    #[test]
    fn test_string_over_slot_size_is_malformed() {
        let buf = [17u8; 32];
        let mut reader = PayloadReader::new(&buf);
        assert!(matches!(
            reader.read_string(),
            Err(FlicError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_truncated_string_slot_underruns() {
        // Length 3 but only the content arrives, no padding.
        let buf = [3u8, b'a', b'b', b'c'];
        let mut reader = PayloadReader::new(&buf);
        assert!(matches!(
            reader.read_string(),
            Err(FlicError::UnexpectedEndOfPayload)
        ));
    }

    #[test]
    fn test_bdaddr_has_no_padding() {
        let buf = [0x12, 0x34, 0x56, 0x78, 0x90, 0xAA, 0x07];
        let mut reader = PayloadReader::new(&buf);

        let addr = reader.read_bdaddr().unwrap();
        assert_eq!(addr.to_string(), "aa:90:78:56:34:12");
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_underrun_fails() {
        let mut reader = PayloadReader::new(&[1, 2, 3]);
        assert!(matches!(
            reader.read_u32(),
            Err(FlicError::UnexpectedEndOfPayload)
        ));
    }

    #[test]
    fn test_writer_layout() {
        let mut writer = PayloadWriter::new();
        writer.write_u32(0x01020304);
        writer.write_bdaddr(Bdaddr::new([1, 2, 3, 4, 5, 6]));
        writer.write_u8(2);
        writer.write_i16(511);

        assert_eq!(
            writer.into_bytes(),
            vec![0x04, 0x03, 0x02, 0x01, 1, 2, 3, 4, 5, 6, 2, 0xFF, 0x01]
        );
    }
}
