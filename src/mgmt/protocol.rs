//! Management protocol definitions.
//!
//! Wire constants, opcode/event/status enumerations, the controller settings
//! bitmask and the key records shared between the command issuer and the
//! key-store collaborator. All multi-byte integers on this channel are
//! little-endian.

use std::fmt;

use uuid::Uuid;

use crate::address::{Address, AddressType};

/// Fixed frame header size: opcode, controller index, payload length.
pub const MGMT_HDR_SIZE: usize = 6;

/// Controller index meaning "no specific controller"; only valid for the
/// version and index-list queries.
pub const INDEX_NONE: u16 = 0xFFFF;

/// Largest datagram the kernel will send on the control channel.
pub const MGMT_BUF_SIZE: usize = 1024;

/// Longest local name accepted by `SetLocalName` (excluding the NUL).
pub const MAX_NAME_LENGTH: usize = 248;

/// Wire size of `mgmt_cp_set_local_name::name`.
pub const NAME_FIELD_SIZE: usize = 249;

/// Wire size of the short-name field in the read-info reply.
pub const SHORT_NAME_FIELD_SIZE: usize = 11;

/// Maximum PIN code length.
pub const MAX_PIN_LENGTH: usize = 16;

/// Commands understood by the kernel controller manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::FromRepr, strum::Display)]
#[repr(u16)]
pub enum MgmtOpcode {
   ReadVersion = 0x0001,
   ReadCommands = 0x0002,
   ReadIndexList = 0x0003,
   ReadInfo = 0x0004,
   SetPowered = 0x0005,
   SetDiscoverable = 0x0006,
   SetConnectable = 0x0007,
   SetFastConnectable = 0x0008,
   SetPairable = 0x0009,
   SetLinkSecurity = 0x000A,
   SetSsp = 0x000B,
   SetHighSpeed = 0x000C,
   SetLowEnergy = 0x000D,
   SetDevClass = 0x000E,
   SetLocalName = 0x000F,
   AddUuid = 0x0010,
   RemoveUuid = 0x0011,
   LoadLinkKeys = 0x0012,
   LoadLongTermKeys = 0x0013,
   Disconnect = 0x0014,
   GetConnections = 0x0015,
   PinCodeReply = 0x0016,
   PinCodeNegReply = 0x0017,
   SetIoCapability = 0x0018,
   PairDevice = 0x0019,
   CancelPairDevice = 0x001A,
   UnpairDevice = 0x001B,
   UserConfirmReply = 0x001C,
   UserConfirmNegReply = 0x001D,
   UserPasskeyReply = 0x001E,
   UserPasskeyNegReply = 0x001F,
   ReadLocalOobData = 0x0020,
   AddRemoteOobData = 0x0021,
   RemoveRemoteOobData = 0x0022,
   StartDiscovery = 0x0023,
   StopDiscovery = 0x0024,
   ConfirmName = 0x0025,
   BlockDevice = 0x0026,
   UnblockDevice = 0x0027,
   SetDeviceId = 0x0028,
}

/// Unsolicited event codes delivered by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::FromRepr, strum::Display)]
#[repr(u16)]
pub enum MgmtEventCode {
   CommandComplete = 0x0001,
   CommandStatus = 0x0002,
   ControllerError = 0x0003,
   IndexAdded = 0x0004,
   IndexRemoved = 0x0005,
   NewSettings = 0x0006,
   ClassOfDeviceChanged = 0x0007,
   LocalNameChanged = 0x0008,
   NewLinkKey = 0x0009,
   NewLongTermKey = 0x000A,
   DeviceConnected = 0x000B,
   DeviceDisconnected = 0x000C,
   ConnectFailed = 0x000D,
   PinCodeRequest = 0x000E,
   UserConfirmRequest = 0x000F,
   UserPasskeyRequest = 0x0010,
   AuthFailed = 0x0011,
   DeviceFound = 0x0012,
   Discovering = 0x0013,
   DeviceBlocked = 0x0014,
   DeviceUnblocked = 0x0015,
   DeviceUnpaired = 0x0016,
   PasskeyNotify = 0x0017,
}

/// Command status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::FromRepr, strum::Display)]
#[repr(u8)]
pub enum MgmtStatus {
   Success = 0x00,
   UnknownCommand = 0x01,
   NotConnected = 0x02,
   Failed = 0x03,
   ConnectFailed = 0x04,
   AuthFailed = 0x05,
   NotPaired = 0x06,
   NoResources = 0x07,
   Timeout = 0x08,
   AlreadyConnected = 0x09,
   Busy = 0x0A,
   Rejected = 0x0B,
   NotSupported = 0x0C,
   InvalidParams = 0x0D,
   Disconnected = 0x0E,
   NotPowered = 0x0F,
   Cancelled = 0x10,
   InvalidIndex = 0x11,
}

/// A status byte straight off the wire; displays the symbolic name when the
/// value is known and the raw hex otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct RawStatus(pub u8);

impl RawStatus {
   pub fn is_success(self) -> bool {
      self.0 == MgmtStatus::Success as u8
   }

   pub fn is_busy(self) -> bool {
      self.0 == MgmtStatus::Busy as u8
   }
}

impl fmt::Display for RawStatus {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match MgmtStatus::from_repr(self.0) {
         Some(status) => write!(f, "{status} (0x{:02x})", self.0),
         None => write!(f, "unknown status 0x{:02x}", self.0),
      }
   }
}

/// Controller settings bitmask shared by `supported_settings` and
/// `current_settings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Settings(pub u32);

impl Settings {
   pub const POWERED: u32 = 1 << 0;
   pub const CONNECTABLE: u32 = 1 << 1;
   pub const FAST_CONNECTABLE: u32 = 1 << 2;
   pub const DISCOVERABLE: u32 = 1 << 3;
   pub const PAIRABLE: u32 = 1 << 4;
   pub const LINK_SECURITY: u32 = 1 << 5;
   pub const SSP: u32 = 1 << 6;
   pub const BREDR: u32 = 1 << 7;
   pub const HIGH_SPEED: u32 = 1 << 8;
   pub const LOW_ENERGY: u32 = 1 << 9;

   pub const fn contains(self, bits: u32) -> bool {
      self.0 & bits != 0
   }

   pub const fn powered(self) -> bool {
      self.contains(Self::POWERED)
   }
   pub const fn connectable(self) -> bool {
      self.contains(Self::CONNECTABLE)
   }
   pub const fn fast_connectable(self) -> bool {
      self.contains(Self::FAST_CONNECTABLE)
   }
   pub const fn discoverable(self) -> bool {
      self.contains(Self::DISCOVERABLE)
   }
   pub const fn pairable(self) -> bool {
      self.contains(Self::PAIRABLE)
   }
   pub const fn ssp(self) -> bool {
      self.contains(Self::SSP)
   }
   pub const fn bredr(self) -> bool {
      self.contains(Self::BREDR)
   }
   pub const fn high_speed(self) -> bool {
      self.contains(Self::HIGH_SPEED)
   }
   pub const fn low_energy(self) -> bool {
      self.contains(Self::LOW_ENERGY)
   }

   /// Discovery address-type bitmask derived from the enabled transports.
   /// Bit positions are the `AddressType` discriminators.
   pub const fn discovery_type(self) -> u8 {
      let mut bits = 0u8;
      if self.bredr() {
         bits |= 1 << AddressType::BrEdr as u8;
      }
      if self.low_energy() {
         bits |= 1 << AddressType::LePublic as u8;
         bits |= 1 << AddressType::LeRandom as u8;
      }
      bits
   }
}

impl fmt::Display for Settings {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "0x{:08x}", self.0)
   }
}

/// Disconnect reason when the event payload predates the reason byte.
pub const DISCONN_REASON_UNKNOWN: u8 = 0x00;

/// `DeviceFound` flag bit: the kernel wants the name resolved and confirmed.
pub const DEV_FOUND_CONFIRM_NAME: u32 = 1 << 0;
/// `DeviceFound` flag bit: the remote is a legacy-pairing device.
pub const DEV_FOUND_LEGACY_PAIRING: u32 = 1 << 1;

/// A BR/EDR link key as stored and as loaded in bulk at power-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkKeyInfo {
   pub address: Address,
   pub address_type: AddressType,
   pub kind: u8,
   pub value: [u8; 16],
   pub pin_len: u8,
}

/// An LE long-term key as stored and as loaded in bulk at power-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongTermKeyInfo {
   pub address: Address,
   pub address_type: AddressType,
   pub authenticated: u8,
   pub master: u8,
   pub enc_size: u8,
   pub ediv: u16,
   pub rand: [u8; 8],
   pub value: [u8; 16],
}

/// Local out-of-band pairing material read back from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OobData {
   pub hash: [u8; 16],
   pub randomizer: [u8; 16],
}

/// Sentinel 128-bit UUID meaning "every service record" in a remove command.
pub const UUID_ANY: Uuid = Uuid::nil();

/// Tail of the Bluetooth base UUID, `xxxxxxxx-0000-1000-8000-00805F9B34FB`.
const BASE_UUID_TAIL: [u8; 12] = [
   0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5F, 0x9B, 0x34, 0xFB,
];

/// Returns the 16-bit service class when `uuid` is an alias of the Bluetooth
/// base UUID with a 16-bit value, `None` otherwise. The management protocol
/// only tracks 16-bit service records.
pub fn service_class_16(uuid: &Uuid) -> Option<u16> {
   let b = uuid.as_bytes();
   if b[4..16] != BASE_UUID_TAIL {
      return None;
   }
   if b[0] != 0 || b[1] != 0 {
      return None;
   }
   Some(u16::from_be_bytes([b[2], b[3]]))
}

/// Serializes a UUID for the wire: the RFC byte order reversed, matching the
/// kernel's little-endian 128-bit representation.
pub fn uuid_to_wire(uuid: &Uuid) -> [u8; 16] {
   let mut bytes = *uuid.as_bytes();
   bytes.reverse();
   bytes
}
