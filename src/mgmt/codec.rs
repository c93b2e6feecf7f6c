//! Frame codec for the management control channel.
//!
//! Pure and stateless: the fixed six-byte header plus one typed decoder per
//! event payload, and a builder that serializes outbound command payloads
//! without manual offset arithmetic. Every decoder checks its own minimum
//! size and never trusts an embedded length field beyond the bytes actually
//! delivered.

use smallvec::SmallVec;
use smol_str::SmolStr;
use thiserror::Error;
use uuid::Uuid;

use crate::{
   address::{Address, AddressType},
   mgmt::protocol::{
      DISCONN_REASON_UNKNOWN, LinkKeyInfo, LongTermKeyInfo, MGMT_HDR_SIZE, MgmtEventCode,
      MgmtOpcode, NAME_FIELD_SIZE, OobData, RawStatus, SHORT_NAME_FIELD_SIZE, Settings,
      uuid_to_wire,
   },
};

/// An outbound frame. Sized so that every fixed-size command fits inline.
pub type Packet = SmallVec<[u8; 64]>;

/// Error type for frame and payload decoding.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
   /// Fewer bytes than the fixed header.
   #[error("short header: got {actual} bytes, need {MGMT_HDR_SIZE}")]
   ShortHeader { actual: usize },

   /// The header declares more payload than was delivered.
   #[error("truncated body: header declares {declared} bytes, got {actual}")]
   TruncatedBody { declared: usize, actual: usize },

   /// More bytes than header plus declared payload.
   #[error("oversized frame: header declares {declared} payload bytes, got {actual}")]
   OversizedFrame { declared: usize, actual: usize },

   /// A typed payload below its minimum size.
   #[error("{what} payload too small: need {expected} bytes, got {actual}")]
   PayloadTooSmall {
      what: &'static str,
      expected: usize,
      actual: usize,
   },

   /// A typed payload whose size must match exactly and does not.
   #[error("{what} size mismatch: expected {expected} bytes, got {actual}")]
   SizeMismatch {
      what: &'static str,
      expected: usize,
      actual: usize,
   },
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
   pub opcode: u16,
   pub index: u16,
   pub payload_len: u16,
}

/// A decoded frame borrowing its payload from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
   pub header: FrameHeader,
   pub payload: &'a [u8],
}

pub fn encode_header(opcode: MgmtOpcode, index: u16, payload_len: u16) -> [u8; MGMT_HDR_SIZE] {
   let mut hdr = [0u8; MGMT_HDR_SIZE];
   hdr[0..2].copy_from_slice(&(opcode as u16).to_le_bytes());
   hdr[2..4].copy_from_slice(&index.to_le_bytes());
   hdr[4..6].copy_from_slice(&payload_len.to_le_bytes());
   hdr
}

pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader, FrameError> {
   if bytes.len() < MGMT_HDR_SIZE {
      return Err(FrameError::ShortHeader {
         actual: bytes.len(),
      });
   }
   Ok(FrameHeader {
      opcode: u16::from_le_bytes([bytes[0], bytes[1]]),
      index: u16::from_le_bytes([bytes[2], bytes[3]]),
      payload_len: u16::from_le_bytes([bytes[4], bytes[5]]),
   })
}

/// Splits one datagram into header and payload. The channel delivers whole
/// frames, so the byte count must match the header exactly.
pub fn split_frame(bytes: &[u8]) -> Result<Frame<'_>, FrameError> {
   let header = decode_header(bytes)?;
   let declared = header.payload_len as usize;
   let body = &bytes[MGMT_HDR_SIZE..];
   if body.len() < declared {
      return Err(FrameError::TruncatedBody {
         declared,
         actual: body.len(),
      });
   }
   if body.len() > declared {
      return Err(FrameError::OversizedFrame {
         declared,
         actual: body.len(),
      });
   }
   Ok(Frame {
      header,
      payload: body,
   })
}

// === Payload reader ===

/// Bounds-checked cursor over a payload; every read reports the payload name
/// on failure.
struct Reader<'a> {
   what: &'static str,
   buf: &'a [u8],
   pos: usize,
}

impl<'a> Reader<'a> {
   fn new(what: &'static str, buf: &'a [u8]) -> Self {
      Self { what, buf, pos: 0 }
   }

   fn take(&mut self, n: usize) -> Result<&'a [u8], FrameError> {
      let end = self.pos.saturating_add(n);
      if end > self.buf.len() {
         return Err(FrameError::PayloadTooSmall {
            what: self.what,
            expected: end,
            actual: self.buf.len(),
         });
      }
      let out = &self.buf[self.pos..end];
      self.pos = end;
      Ok(out)
   }

   fn u8(&mut self) -> Result<u8, FrameError> {
      Ok(self.take(1)?[0])
   }

   fn i8(&mut self) -> Result<i8, FrameError> {
      Ok(self.take(1)?[0] as i8)
   }

   fn le16(&mut self) -> Result<u16, FrameError> {
      let b = self.take(2)?;
      Ok(u16::from_le_bytes([b[0], b[1]]))
   }

   fn le32(&mut self) -> Result<u32, FrameError> {
      let b = self.take(4)?;
      Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
   }

   fn array<const N: usize>(&mut self) -> Result<[u8; N], FrameError> {
      let mut out = [0u8; N];
      out.copy_from_slice(self.take(N)?);
      Ok(out)
   }

   fn address(&mut self) -> Result<Address, FrameError> {
      Ok(Address::new(self.array::<6>()?))
   }

   fn addr_info(&mut self) -> Result<AddrInfo, FrameError> {
      let address = self.address()?;
      let address_type = AddressType::from_wire(self.u8()?);
      Ok(AddrInfo {
         address,
         address_type,
      })
   }

   /// NUL-terminated UTF-8 inside a fixed-width field.
   fn name(&mut self, width: usize) -> Result<SmolStr, FrameError> {
      let field = self.take(width)?;
      let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
      Ok(SmolStr::new(String::from_utf8_lossy(&field[..end])))
   }

   fn remaining(&self) -> usize {
      self.buf.len() - self.pos
   }

   fn rest(&mut self) -> &'a [u8] {
      let out = &self.buf[self.pos..];
      self.pos = self.buf.len();
      out
   }

   /// For payloads whose total size must match exactly.
   fn expect_consumed(&self) -> Result<(), FrameError> {
      if self.remaining() != 0 {
         return Err(FrameError::SizeMismatch {
            what: self.what,
            expected: self.pos,
            actual: self.buf.len(),
         });
      }
      Ok(())
   }
}

/// An address plus its type discriminator, the `mgmt_addr_info` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrInfo {
   pub address: Address,
   pub address_type: AddressType,
}

// === Typed event payloads ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionReply {
   pub version: u8,
   pub revision: u16,
}

impl VersionReply {
   pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
      let mut r = Reader::new("read_version", payload);
      let version = r.u8()?;
      let revision = r.le16()?;
      Ok(Self { version, revision })
   }
}

pub fn decode_index_list(payload: &[u8]) -> Result<Vec<u16>, FrameError> {
   let mut r = Reader::new("read_index_list", payload);
   let num = r.le16()? as usize;
   if payload.len() != 2 + num * 2 {
      return Err(FrameError::SizeMismatch {
         what: "read_index_list",
         expected: 2 + num * 2,
         actual: payload.len(),
      });
   }
   let mut indices = Vec::with_capacity(num);
   for _ in 0..num {
      indices.push(r.le16()?);
   }
   Ok(indices)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoReply {
   pub address: Address,
   pub version: u8,
   pub manufacturer: u16,
   pub supported_settings: Settings,
   pub current_settings: Settings,
   pub dev_class: [u8; 3],
   pub name: SmolStr,
   pub short_name: SmolStr,
}

impl InfoReply {
   pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
      let mut r = Reader::new("read_info", payload);
      let address = r.address()?;
      let version = r.u8()?;
      let manufacturer = r.le16()?;
      let supported_settings = Settings(r.le32()?);
      let current_settings = Settings(r.le32()?);
      let dev_class = r.array::<3>()?;
      let name = r.name(NAME_FIELD_SIZE)?;
      let short_name = r.name(SHORT_NAME_FIELD_SIZE)?;
      Ok(Self {
         address,
         version,
         manufacturer,
         supported_settings,
         current_settings,
         dev_class,
         name,
         short_name,
      })
   }
}

/// Class of device: three bytes, least significant first.
pub fn decode_class_of_device(payload: &[u8]) -> Result<u32, FrameError> {
   let mut r = Reader::new("class_of_device", payload);
   let b = r.array::<3>()?;
   Ok(u32::from_le_bytes([b[0], b[1], b[2], 0]))
}

pub fn decode_connections(payload: &[u8]) -> Result<Vec<AddrInfo>, FrameError> {
   let mut r = Reader::new("get_connections", payload);
   let count = r.le16()? as usize;
   let mut conns = Vec::with_capacity(count);
   for _ in 0..count {
      conns.push(r.addr_info()?);
   }
   Ok(conns)
}

impl OobData {
   pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
      let mut r = Reader::new("read_local_oob_data", payload);
      let hash = r.array::<16>()?;
      let randomizer = r.array::<16>()?;
      r.expect_consumed()?;
      Ok(Self { hash, randomizer })
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewLinkKey {
   pub store_hint: bool,
   pub key: LinkKeyInfo,
}

impl NewLinkKey {
   pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
      let mut r = Reader::new("new_link_key", payload);
      let store_hint = r.u8()? != 0;
      let addr = r.addr_info()?;
      let kind = r.u8()?;
      let value = r.array::<16>()?;
      let pin_len = r.u8()?;
      r.expect_consumed()?;
      Ok(Self {
         store_hint,
         key: LinkKeyInfo {
            address: addr.address,
            address_type: addr.address_type,
            kind,
            value,
            pin_len,
         },
      })
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewLongTermKey {
   pub store_hint: bool,
   pub key: LongTermKeyInfo,
}

impl NewLongTermKey {
   pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
      let mut r = Reader::new("new_long_term_key", payload);
      let store_hint = r.u8()? != 0;
      let addr = r.addr_info()?;
      let authenticated = r.u8()?;
      let master = r.u8()?;
      let enc_size = r.u8()?;
      let ediv = r.le16()?;
      let rand = r.array::<8>()?;
      let value = r.array::<16>()?;
      r.expect_consumed()?;
      Ok(Self {
         store_hint,
         key: LongTermKeyInfo {
            address: addr.address,
            address_type: addr.address_type,
            authenticated,
            master,
            enc_size,
            ediv,
            rand,
            value,
         },
      })
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConnected<'a> {
   pub addr: AddrInfo,
   pub flags: u32,
   pub eir: &'a [u8],
}

impl<'a> DeviceConnected<'a> {
   pub fn decode(payload: &'a [u8]) -> Result<Self, FrameError> {
      let mut r = Reader::new("device_connected", payload);
      let addr = r.addr_info()?;
      let flags = r.le32()?;
      let eir_len = r.le16()? as usize;
      let eir = r.take(eir_len)?;
      Ok(Self { addr, flags, eir })
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDisconnected {
   pub addr: AddrInfo,
   pub reason: u8,
}

impl DeviceDisconnected {
   pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
      let mut r = Reader::new("device_disconnected", payload);
      let addr = r.addr_info()?;
      // Older kernels omit the reason byte.
      let reason = if r.remaining() >= 1 {
         r.u8()?
      } else {
         DISCONN_REASON_UNKNOWN
      };
      Ok(Self { addr, reason })
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrWithStatus {
   pub addr: AddrInfo,
   pub status: RawStatus,
}

impl AddrWithStatus {
   pub fn decode(what: &'static str, payload: &[u8]) -> Result<Self, FrameError> {
      let mut r = Reader::new(what, payload);
      let addr = r.addr_info()?;
      let status = RawStatus(r.u8()?);
      Ok(Self { addr, status })
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinCodeRequest {
   pub addr: AddrInfo,
   pub secure: bool,
}

impl PinCodeRequest {
   pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
      let mut r = Reader::new("pin_code_request", payload);
      let addr = r.addr_info()?;
      let secure = r.u8()? != 0;
      Ok(Self { addr, secure })
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserConfirmRequest {
   pub addr: AddrInfo,
   pub confirm_hint: u8,
   pub value: u32,
}

impl UserConfirmRequest {
   pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
      let mut r = Reader::new("user_confirm_request", payload);
      let addr = r.addr_info()?;
      let confirm_hint = r.u8()?;
      let value = r.le32()?;
      Ok(Self {
         addr,
         confirm_hint,
         value,
      })
   }
}

pub fn decode_addr_only(what: &'static str, payload: &[u8]) -> Result<AddrInfo, FrameError> {
   Reader::new(what, payload).addr_info()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasskeyNotify {
   pub addr: AddrInfo,
   pub passkey: u32,
   pub entered: u8,
}

impl PasskeyNotify {
   pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
      let mut r = Reader::new("passkey_notify", payload);
      let addr = r.addr_info()?;
      let passkey = r.le32()?;
      let entered = r.u8()?;
      Ok(Self {
         addr,
         passkey,
         entered,
      })
   }
}

pub fn decode_local_name(payload: &[u8]) -> Result<SmolStr, FrameError> {
   Reader::new("local_name", payload).name(NAME_FIELD_SIZE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFound<'a> {
   pub addr: AddrInfo,
   pub rssi: i8,
   pub flags: u32,
   pub eir: &'a [u8],
}

impl<'a> DeviceFound<'a> {
   /// The declared length must match the fixed prefix plus `eir_len`
   /// exactly; mismatches are rejected, never partially processed.
   pub fn decode(payload: &'a [u8]) -> Result<Self, FrameError> {
      let mut r = Reader::new("device_found", payload);
      let addr = r.addr_info()?;
      let rssi = r.i8()?;
      let flags = r.le32()?;
      let eir_len = r.le16()? as usize;
      let eir = r.take(eir_len)?;
      r.expect_consumed()?;
      Ok(Self {
         addr,
         rssi,
         flags,
         eir,
      })
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discovering {
   pub addr_type_mask: u8,
   pub discovering: bool,
}

impl Discovering {
   pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
      let mut r = Reader::new("discovering", payload);
      let addr_type_mask = r.u8()?;
      let discovering = r.u8()? != 0;
      Ok(Self {
         addr_type_mask,
         discovering,
      })
   }
}

/// The start-discovery completion carries the address-type mask back.
pub fn decode_discovery_type(payload: &[u8]) -> Result<u8, FrameError> {
   let mut r = Reader::new("start_discovery", payload);
   let kind = r.u8()?;
   r.expect_consumed()?;
   Ok(kind)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandComplete<'a> {
   pub opcode: u16,
   pub status: RawStatus,
   pub data: &'a [u8],
}

impl<'a> CommandComplete<'a> {
   pub fn decode(payload: &'a [u8]) -> Result<Self, FrameError> {
      let mut r = Reader::new("command_complete", payload);
      let opcode = r.le16()?;
      let status = RawStatus(r.u8()?);
      let data = r.rest();
      Ok(Self {
         opcode,
         status,
         data,
      })
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
   pub opcode: u16,
   pub status: RawStatus,
}

impl CommandStatus {
   pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
      let mut r = Reader::new("command_status", payload);
      let opcode = r.le16()?;
      let status = RawStatus(r.u8()?);
      Ok(Self { opcode, status })
   }
}

// === Decoded frames ===

/// A fully decoded inbound frame, matched exhaustively by the dispatcher.
#[derive(Debug, Clone, Copy)]
pub enum MgmtEvent<'a> {
   CommandComplete(CommandComplete<'a>),
   CommandStatus(CommandStatus),
   ControllerError(u8),
   IndexAdded,
   IndexRemoved,
   NewSettings(Settings),
   ClassOfDeviceChanged(u32),
   LocalNameChanged(&'a [u8]),
   NewLinkKey(NewLinkKey),
   NewLongTermKey(NewLongTermKey),
   DeviceConnected(DeviceConnected<'a>),
   DeviceDisconnected(DeviceDisconnected),
   ConnectFailed(AddrWithStatus),
   PinCodeRequest(PinCodeRequest),
   UserConfirmRequest(UserConfirmRequest),
   UserPasskeyRequest(AddrInfo),
   AuthFailed(AddrWithStatus),
   DeviceFound(DeviceFound<'a>),
   Discovering(Discovering),
   DeviceBlocked(AddrInfo),
   DeviceUnblocked(AddrInfo),
   DeviceUnpaired(AddrInfo),
   PasskeyNotify(PasskeyNotify),
   /// Event code this engine does not know; logged and dropped upstream.
   Unknown(u16),
}

pub fn parse_event(code: u16, payload: &[u8]) -> Result<MgmtEvent<'_>, FrameError> {
   let Some(code) = MgmtEventCode::from_repr(code) else {
      return Ok(MgmtEvent::Unknown(code));
   };
   let event = match code {
      MgmtEventCode::CommandComplete => {
         MgmtEvent::CommandComplete(CommandComplete::decode(payload)?)
      },
      MgmtEventCode::CommandStatus => MgmtEvent::CommandStatus(CommandStatus::decode(payload)?),
      MgmtEventCode::ControllerError => {
         MgmtEvent::ControllerError(Reader::new("controller_error", payload).u8()?)
      },
      MgmtEventCode::IndexAdded => MgmtEvent::IndexAdded,
      MgmtEventCode::IndexRemoved => MgmtEvent::IndexRemoved,
      MgmtEventCode::NewSettings => {
         MgmtEvent::NewSettings(Settings(Reader::new("new_settings", payload).le32()?))
      },
      MgmtEventCode::ClassOfDeviceChanged => {
         MgmtEvent::ClassOfDeviceChanged(decode_class_of_device(payload)?)
      },
      MgmtEventCode::LocalNameChanged => {
         if payload.len() < NAME_FIELD_SIZE {
            return Err(FrameError::PayloadTooSmall {
               what: "local_name_changed",
               expected: NAME_FIELD_SIZE,
               actual: payload.len(),
            });
         }
         MgmtEvent::LocalNameChanged(payload)
      },
      MgmtEventCode::NewLinkKey => MgmtEvent::NewLinkKey(NewLinkKey::decode(payload)?),
      MgmtEventCode::NewLongTermKey => {
         MgmtEvent::NewLongTermKey(NewLongTermKey::decode(payload)?)
      },
      MgmtEventCode::DeviceConnected => {
         MgmtEvent::DeviceConnected(DeviceConnected::decode(payload)?)
      },
      MgmtEventCode::DeviceDisconnected => {
         MgmtEvent::DeviceDisconnected(DeviceDisconnected::decode(payload)?)
      },
      MgmtEventCode::ConnectFailed => {
         MgmtEvent::ConnectFailed(AddrWithStatus::decode("connect_failed", payload)?)
      },
      MgmtEventCode::PinCodeRequest => {
         MgmtEvent::PinCodeRequest(PinCodeRequest::decode(payload)?)
      },
      MgmtEventCode::UserConfirmRequest => {
         MgmtEvent::UserConfirmRequest(UserConfirmRequest::decode(payload)?)
      },
      MgmtEventCode::UserPasskeyRequest => {
         MgmtEvent::UserPasskeyRequest(decode_addr_only("user_passkey_request", payload)?)
      },
      MgmtEventCode::AuthFailed => {
         MgmtEvent::AuthFailed(AddrWithStatus::decode("auth_failed", payload)?)
      },
      MgmtEventCode::DeviceFound => MgmtEvent::DeviceFound(DeviceFound::decode(payload)?),
      MgmtEventCode::Discovering => MgmtEvent::Discovering(Discovering::decode(payload)?),
      MgmtEventCode::DeviceBlocked => {
         MgmtEvent::DeviceBlocked(decode_addr_only("device_blocked", payload)?)
      },
      MgmtEventCode::DeviceUnblocked => {
         MgmtEvent::DeviceUnblocked(decode_addr_only("device_unblocked", payload)?)
      },
      MgmtEventCode::DeviceUnpaired => {
         MgmtEvent::DeviceUnpaired(decode_addr_only("device_unpaired", payload)?)
      },
      MgmtEventCode::PasskeyNotify => {
         MgmtEvent::PasskeyNotify(PasskeyNotify::decode(payload)?)
      },
   };
   Ok(event)
}

// === Outbound frame builder ===

/// Serializes one command frame; the length field is patched in `finish`.
pub struct FrameBuilder {
   buf: Packet,
}

impl FrameBuilder {
   pub fn new(opcode: MgmtOpcode, index: u16) -> Self {
      let mut buf = Packet::new();
      buf.extend_from_slice(&encode_header(opcode, index, 0));
      Self { buf }
   }

   pub fn u8(mut self, v: u8) -> Self {
      self.buf.push(v);
      self
   }

   pub fn le16(mut self, v: u16) -> Self {
      self.buf.extend_from_slice(&v.to_le_bytes());
      self
   }

   pub fn le32(mut self, v: u32) -> Self {
      self.buf.extend_from_slice(&v.to_le_bytes());
      self
   }

   pub fn bytes(mut self, v: &[u8]) -> Self {
      self.buf.extend_from_slice(v);
      self
   }

   /// Zero padding up to a fixed field width.
   pub fn zeros(mut self, n: usize) -> Self {
      self.buf.extend(std::iter::repeat_n(0u8, n));
      self
   }

   pub fn address(self, address: &Address) -> Self {
      self.bytes(address.as_bytes())
   }

   pub fn addr_info(self, address: &Address, address_type: AddressType) -> Self {
      self.address(address).u8(address_type as u8)
   }

   pub fn uuid(self, uuid: &Uuid) -> Self {
      self.bytes(&uuid_to_wire(uuid))
   }

   pub fn finish(mut self) -> Packet {
      let len = (self.buf.len() - MGMT_HDR_SIZE) as u16;
      self.buf[4..6].copy_from_slice(&len.to_le_bytes());
      self.buf
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::mgmt::protocol::INDEX_NONE;

   #[test]
   fn test_header_round_trip() {
      let hdr = encode_header(MgmtOpcode::ReadInfo, 3, 17);
      let decoded = decode_header(&hdr).unwrap();
      assert_eq!(decoded.opcode, MgmtOpcode::ReadInfo as u16);
      assert_eq!(decoded.index, 3);
      assert_eq!(decoded.payload_len, 17);
   }

   #[test]
   fn test_header_too_short() {
      assert_eq!(
         decode_header(&[1, 0, 2, 0, 3]),
         Err(FrameError::ShortHeader { actual: 5 })
      );
   }

   #[test]
   fn test_split_frame_rejects_truncated_body() {
      let mut frame = encode_header(MgmtOpcode::ReadVersion, INDEX_NONE, 4).to_vec();
      frame.extend_from_slice(&[0xAA, 0xBB]);
      assert_eq!(
         split_frame(&frame),
         Err(FrameError::TruncatedBody {
            declared: 4,
            actual: 2
         })
      );
   }

   #[test]
   fn test_split_frame_rejects_trailing_bytes() {
      let mut frame = encode_header(MgmtOpcode::ReadVersion, INDEX_NONE, 1).to_vec();
      frame.extend_from_slice(&[0xAA, 0xBB]);
      assert!(matches!(
         split_frame(&frame),
         Err(FrameError::OversizedFrame { .. })
      ));
   }

   #[test]
   fn test_builder_round_trip() {
      let packet = FrameBuilder::new(MgmtOpcode::SetPowered, 0).u8(1).finish();
      let frame = split_frame(&packet).unwrap();
      assert_eq!(frame.header.opcode, MgmtOpcode::SetPowered as u16);
      assert_eq!(frame.header.index, 0);
      assert_eq!(frame.header.payload_len, 1);
      assert_eq!(frame.payload, &[1]);
   }

   #[test]
   fn test_declared_eir_longer_than_body_is_rejected() {
      // device_found with eir_len = 10 but only 8 bytes supplied.
      let mut payload = Vec::new();
      payload.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x00]);
      payload.push(0xC8u8); // rssi
      payload.extend_from_slice(&0u32.to_le_bytes());
      payload.extend_from_slice(&10u16.to_le_bytes());
      payload.extend_from_slice(&[0u8; 8]);
      assert!(matches!(
         DeviceFound::decode(&payload),
         Err(FrameError::PayloadTooSmall { .. })
      ));
   }

   #[test]
   fn test_device_found_requires_exact_length() {
      let mut payload = Vec::new();
      payload.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x01]);
      payload.push(0xC8u8);
      payload.extend_from_slice(&3u32.to_le_bytes());
      payload.extend_from_slice(&2u16.to_le_bytes());
      payload.extend_from_slice(&[0xAB, 0xCD, 0xEF]); // one trailing byte
      assert!(matches!(
         DeviceFound::decode(&payload),
         Err(FrameError::SizeMismatch { .. })
      ));

      payload.pop();
      let found = DeviceFound::decode(&payload).unwrap();
      assert_eq!(found.eir, &[0xAB, 0xCD]);
      assert_eq!(found.rssi, -56);
   }

   #[test]
   fn test_index_list_count_must_match() {
      let mut payload = 2u16.to_le_bytes().to_vec();
      payload.extend_from_slice(&0u16.to_le_bytes());
      assert!(matches!(
         decode_index_list(&payload),
         Err(FrameError::SizeMismatch { .. })
      ));

      payload.extend_from_slice(&5u16.to_le_bytes());
      assert_eq!(decode_index_list(&payload).unwrap(), vec![0, 5]);
   }

   #[test]
   fn test_new_link_key_exact_size() {
      let mut payload = vec![1u8];
      payload.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x00]);
      payload.push(4); // key type
      payload.extend_from_slice(&[0x5A; 16]);
      payload.push(6); // pin_len
      let ev = NewLinkKey::decode(&payload).unwrap();
      assert!(ev.store_hint);
      assert_eq!(ev.key.kind, 4);
      assert_eq!(ev.key.pin_len, 6);

      payload.push(0);
      assert!(matches!(
         NewLinkKey::decode(&payload),
         Err(FrameError::SizeMismatch { .. })
      ));
   }

   #[test]
   fn test_device_disconnected_tolerates_missing_reason() {
      let payload = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x00];
      let ev = DeviceDisconnected::decode(&payload).unwrap();
      assert_eq!(ev.reason, DISCONN_REASON_UNKNOWN);

      let mut with_reason = payload.to_vec();
      with_reason.push(0x13);
      assert_eq!(DeviceDisconnected::decode(&with_reason).unwrap().reason, 0x13);
   }

   #[test]
   fn test_read_info_decode() {
      let mut payload = Vec::new();
      payload.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
      payload.push(6); // hci version
      payload.extend_from_slice(&2u16.to_le_bytes()); // manufacturer
      payload.extend_from_slice(&0x03FFu32.to_le_bytes()); // supported
      payload.extend_from_slice(&(Settings::POWERED | Settings::SSP).to_le_bytes());
      payload.extend_from_slice(&[0x0C, 0x01, 0x04]); // class
      let mut name = [0u8; NAME_FIELD_SIZE];
      name[..5].copy_from_slice(b"cubie");
      payload.extend_from_slice(&name);
      payload.extend_from_slice(&[0u8; SHORT_NAME_FIELD_SIZE]);

      let info = InfoReply::decode(&payload).unwrap();
      assert_eq!(info.address.to_string(), "FF:EE:DD:CC:BB:AA");
      assert!(info.current_settings.powered());
      assert!(info.supported_settings.low_energy());
      assert_eq!(info.name, "cubie");
      assert_eq!(info.short_name, "");

      assert!(matches!(
         InfoReply::decode(&payload[..100]),
         Err(FrameError::PayloadTooSmall { .. })
      ));
   }

   #[test]
   fn test_class_of_device_is_three_bytes_le() {
      assert_eq!(decode_class_of_device(&[0x0C, 0x01, 0x1F]).unwrap(), 0x1F010C);
      assert!(decode_class_of_device(&[0x0C, 0x01]).is_err());
   }

   #[test]
   fn test_parse_event_unknown_code() {
      assert!(matches!(
         parse_event(0x7777, &[]).unwrap(),
         MgmtEvent::Unknown(0x7777)
      ));
   }

   #[test]
   fn test_command_complete_splits_inner_payload() {
      let mut payload = (MgmtOpcode::ReadVersion as u16).to_le_bytes().to_vec();
      payload.push(0);
      payload.extend_from_slice(&[1, 3, 0]);
      let ev = CommandComplete::decode(&payload).unwrap();
      assert_eq!(ev.opcode, MgmtOpcode::ReadVersion as u16);
      assert!(ev.status.is_success());
      assert_eq!(ev.data, &[1, 3, 0]);
   }
}
