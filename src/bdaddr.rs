//! Bluetooth device addresses as used on the flicd wire.
//!
//! The wire carries the 6 raw bytes in transmission order, while the
//! canonical string form prints them reversed: byte 5 comes first, so
//! `"AA:90:78:56:34:12"` stores `[0x12, 0x34, 0x56, 0x78, 0x90, 0xAA]`.

use std::fmt;
use std::str::FromStr;

use crate::error::{FlicError, Result};

/// A 6-byte Bluetooth device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Bdaddr([u8; 6]);

impl Bdaddr {
    /// The all-zero address, used by the server to mean "no address".
    pub const BLANK: Bdaddr = Bdaddr([0; 6]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        Bdaddr(bytes)
    }

    /// Builds an address from a slice, which must be exactly 6 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 6] = bytes
            .try_into()
            .map_err(|_| FlicError::InvalidAddressLength(bytes.len()))?;
        Ok(Bdaddr(bytes))
    }

    pub fn to_bytes(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_blank(&self) -> bool {
        *self == Self::BLANK
    }
}

impl FromStr for Bdaddr {
    type Err = FlicError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || FlicError::InvalidAddressFormat(s.to_string());

        if s.len() != 17 || !s.is_ascii() {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        for (i, group) in s.split(':').enumerate() {
            if i >= 6 || group.len() != 2 {
                return Err(invalid());
            }
            // First group in the string is the last stored byte.
            bytes[5 - i] = u8::from_str_radix(group, 16).map_err(|_| invalid())?;
        }

        Ok(Bdaddr(bytes))
    }
}

impl fmt::Display for Bdaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR_BYTES: [u8; 6] = [0x12, 0x34, 0x56, 0x78, 0x90, 0xAA];

    #[test]
    fn test_parse_reverses_byte_order() {
        let addr: Bdaddr = "AA:90:78:56:34:12".parse().unwrap();
        assert_eq!(addr, Bdaddr::new(ADDR_BYTES));
    }

    #[test]
    fn test_display_round_trip() {
        let addr = Bdaddr::new(ADDR_BYTES);
        assert_eq!(addr.to_string(), "aa:90:78:56:34:12");

        let parsed: Bdaddr = addr.to_string().parse().unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn test_parse_rejects_malformed_strings() {
        for s in [
            "",
            "AA:90:78:56:34",
            "AA:90:78:56:34:12:00",
            "AA:90:78:56:34:1",
            "AA-90-78-56-34-12",
            "GG:90:78:56:34:12",
            "AA:90:78:56:34:12 ",
        ] {
            assert!(
                matches!(s.parse::<Bdaddr>(), Err(FlicError::InvalidAddressFormat(_))),
                "expected parse failure for {:?}",
                s
            );
        }
    }

    #[test]
    fn test_from_bytes_length_check() {
        assert!(Bdaddr::from_bytes(&ADDR_BYTES).is_ok());
        assert!(matches!(
            Bdaddr::from_bytes(&[1, 2, 3]),
            Err(FlicError::InvalidAddressLength(3))
        ));
    }

    #[test]
    fn test_blank() {
        assert!(Bdaddr::BLANK.is_blank());
        assert!(!Bdaddr::new(ADDR_BYTES).is_blank());
    }
}
