//! Bluetooth device addresses as carried on the management wire.
//!
//! The kernel transmits addresses least-significant byte first; that is the
//! order stored here. `Display` and `FromStr` use the usual colon-separated
//! notation with the most significant byte on the left.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// A 48-bit Bluetooth device address in wire (little-endian) byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Address(pub [u8; 6]);

impl Address {
   /// The all-zero address (`00:00:00:00:00:00`).
   pub const ANY: Self = Self([0; 6]);

   pub const fn new(bytes: [u8; 6]) -> Self {
      Self(bytes)
   }

   pub const fn as_bytes(&self) -> &[u8; 6] {
      &self.0
   }

   pub fn is_any(&self) -> bool {
      *self == Self::ANY
   }
}

impl fmt::Display for Address {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let b = &self.0;
      write!(
         f,
         "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
         b[5], b[4], b[3], b[2], b[1], b[0]
      )
   }
}

/// Error returned when parsing a textual Bluetooth address fails.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid Bluetooth address")]
pub struct InvalidAddress;

impl FromStr for Address {
   type Err = InvalidAddress;

   fn from_str(s: &str) -> Result<Self, Self::Err> {
      let mut bytes = [0u8; 6];
      let mut parts = s.split(':');
      // Display order is reversed relative to wire order.
      for slot in bytes.iter_mut().rev() {
         let part = parts.next().ok_or(InvalidAddress)?;
         if part.len() != 2 {
            return Err(InvalidAddress);
         }
         *slot = u8::from_str_radix(part, 16).map_err(|_| InvalidAddress)?;
      }
      if parts.next().is_some() {
         return Err(InvalidAddress);
      }
      Ok(Self(bytes))
   }
}

/// Address type discriminator used by `mgmt_addr_info` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::FromRepr, strum::Display, Default)]
#[repr(u8)]
pub enum AddressType {
   #[default]
   #[strum(serialize = "BR/EDR")]
   BrEdr = 0x00,
   #[strum(serialize = "LE public")]
   LePublic = 0x01,
   #[strum(serialize = "LE random")]
   LeRandom = 0x02,
}

impl AddressType {
   /// Lenient conversion: unknown discriminators map to BR/EDR so a single
   /// bad byte never drops an otherwise valid event.
   pub fn from_wire(raw: u8) -> Self {
      Self::from_repr(raw).unwrap_or_default()
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_address_display_reverses_wire_order() {
      let addr = Address::new([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
      assert_eq!(addr.to_string(), "06:05:04:03:02:01");
   }

   #[test]
   fn test_address_parse_round_trip() {
      let addr: Address = "AA:BB:CC:DD:EE:FF".parse().unwrap();
      assert_eq!(addr.0, [0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]);
      assert_eq!(addr.to_string(), "AA:BB:CC:DD:EE:FF");
   }

   #[test]
   fn test_address_parse_rejects_garbage() {
      assert!("AA:BB:CC".parse::<Address>().is_err());
      assert!("AA:BB:CC:DD:EE:GG".parse::<Address>().is_err());
      assert!("AA:BB:CC:DD:EE:FF:00".parse::<Address>().is_err());
   }

   #[test]
   fn test_address_type_from_wire_is_lenient() {
      assert_eq!(AddressType::from_wire(1), AddressType::LePublic);
      assert_eq!(AddressType::from_wire(0x7F), AddressType::BrEdr);
   }
}
