//! Interfaces to the host stack sitting above the protocol engine.
//!
//! The engine never owns adapters, devices, or stored keys; it reports what
//! the kernel said and asks these collaborators what the host wants. Handles
//! are opaque tokens minted by the collaborator, valid until the matching
//! unregister or remove call.

use smol_str::SmolStr;
use thiserror::Error;

use crate::{
   address::{Address, AddressType},
   mgmt::protocol::{LinkKeyInfo, LongTermKeyInfo, OobData, RawStatus},
};

/// Opaque handle to a host-side adapter object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdapterRef(pub u64);

/// Opaque handle to a host-side remote-device object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceRef(pub u64);

/// Failure to obtain user input for a pairing exchange. The engine answers
/// the kernel with the matching negative reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
   #[error("no agent registered")]
   NoAgent,
   #[error("request rejected")]
   Rejected,
   #[error("agent failed: {0}")]
   Failed(SmolStr),
}

/// A PIN the host keeps on file for a peer. `display` asks for the code to
/// be shown to the user instead of answered silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPin {
   pub code: SmolStr,
   pub display: bool,
}

/// One discovery result, passed through to the host after flag decoding.
#[derive(Debug, Clone, Copy)]
pub struct FoundDevice<'a> {
   pub address: Address,
   pub address_type: AddressType,
   pub rssi: i8,
   /// The kernel asks for a name-resolution confirmation round.
   pub confirm_name: bool,
   pub legacy_pairing: bool,
   pub eir: &'a [u8],
}

/// Host-side adapter lifecycle and settings sink.
pub trait AdapterManager {
   /// Announces a controller whose identity is fully known. `None` means
   /// the host refuses the controller; the engine keeps its table entry but
   /// performs no further setup.
   fn register_adapter(&mut self, index: u16, powered: bool) -> Option<AdapterRef>;
   fn unregister_adapter(&mut self, index: u16);
   fn find_adapter(&mut self, address: &Address) -> Option<AdapterRef>;

   /// The name the host wants this adapter to carry, if it has an opinion.
   fn local_name(&mut self, adapter: AdapterRef) -> Option<SmolStr>;
   /// Major and minor device class configured for this adapter.
   fn local_class(&mut self, adapter: AdapterRef) -> (u8, u8);
   /// A fixed PIN for the given peer, when one is configured.
   fn local_pin(&mut self, adapter: AdapterRef, peer: &Address) -> Option<LocalPin>;

   fn start(&mut self, adapter: AdapterRef);
   fn stop(&mut self, adapter: AdapterRef);

   fn set_connectable(&mut self, adapter: AdapterRef, enabled: bool);
   fn set_discoverable(&mut self, adapter: AdapterRef, enabled: bool);
   fn set_pairable(&mut self, adapter: AdapterRef, enabled: bool);
   fn set_name(&mut self, adapter: AdapterRef, name: &str);
   fn set_class(&mut self, adapter: AdapterRef, class: u32);

   fn add_connection(&mut self, adapter: AdapterRef, device: DeviceRef);
   fn remove_connection(&mut self, adapter: AdapterRef, device: DeviceRef);
   fn bonding_complete(&mut self, adapter: AdapterRef, peer: &Address, status: RawStatus);

   fn set_discovering(&mut self, adapter: AdapterRef, discovering: bool);
   fn update_found_device(&mut self, adapter: AdapterRef, found: &FoundDevice<'_>);

   /// Out-of-band pairing material, or `None` when the read failed.
   fn local_oob_data_ready(&mut self, adapter: AdapterRef, data: Option<&OobData>);
   /// Name learned passively from EIR, stored without a discovery session.
   fn store_cached_name(&mut self, adapter: AdapterRef, peer: &Address, name: &str);
}

/// Host-side remote-device table and pairing agent.
pub trait DeviceManager {
   fn get_or_create(
      &mut self,
      adapter: AdapterRef,
      address: &Address,
      address_type: AddressType,
   ) -> DeviceRef;
   fn find(&mut self, adapter: AdapterRef, address: &Address) -> Option<DeviceRef>;
   fn remove(&mut self, adapter: AdapterRef, device: DeviceRef);

   fn set_bonded(&mut self, device: DeviceRef, bonded: bool);
   fn set_temporary(&mut self, device: DeviceRef, temporary: bool);
   fn is_temporary(&mut self, device: DeviceRef) -> bool;
   fn is_connected(&mut self, device: DeviceRef) -> bool;
   fn is_bonding(&mut self, device: DeviceRef) -> bool;
   fn cancel_bonding(&mut self, device: DeviceRef);

   fn set_class(&mut self, device: DeviceRef, class: u32);
   fn set_name(&mut self, device: DeviceRef, name: &str);
   fn set_blocked(&mut self, device: DeviceRef, blocked: bool);
   /// Asks the host to wind the link down; the disconnect event follows.
   fn request_disconnect(&mut self, device: DeviceRef);

   /// Forwards a PIN request to the pairing agent. The agent answers later
   /// through the command issuer; an error here means no agent will answer
   /// and the kernel gets a negative reply at once.
   fn request_pincode(&mut self, device: DeviceRef, secure: bool) -> Result<(), AgentError>;
   /// Shows a fixed PIN to the user while the device is bonding. The reply
   /// to the kernel follows through the command issuer once the agent
   /// acknowledges the display.
   fn notify_pincode(&mut self, device: DeviceRef, secure: bool, pin: &str)
      -> Result<(), AgentError>;
   fn request_passkey(&mut self, device: DeviceRef) -> Result<(), AgentError>;
   fn confirm_passkey(
      &mut self,
      device: DeviceRef,
      passkey: u32,
      confirm_hint: u8,
   ) -> Result<(), AgentError>;
   fn notify_passkey(
      &mut self,
      device: DeviceRef,
      passkey: u32,
      entered: u8,
   ) -> Result<(), AgentError>;
}

/// Persistent storage for keys announced by the kernel.
pub trait KeyStore {
   fn store_link_key(&mut self, adapter: AdapterRef, key: &LinkKeyInfo) -> std::io::Result<()>;
   fn store_long_term_key(
      &mut self,
      adapter: AdapterRef,
      key: &LongTermKeyInfo,
   ) -> std::io::Result<()>;
}

/// What the engine extracts from extended-inquiry-response data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EirRecord {
   pub device_class: Option<u32>,
   pub name: Option<SmolStr>,
}

/// Decoder for the EIR blobs attached to connect and found events.
pub trait EirDecoder {
   fn parse(&self, eir: &[u8]) -> EirRecord;
}

const EIR_NAME_SHORT: u8 = 0x08;
const EIR_NAME_COMPLETE: u8 = 0x09;
const EIR_CLASS_OF_DEV: u8 = 0x0D;

/// Structure-only EIR decoder: walks the length-type-value chain and picks
/// out the device class and name. A complete name wins over a shortened one.
#[derive(Debug, Default)]
pub struct BasicEirDecoder;

impl EirDecoder for BasicEirDecoder {
   fn parse(&self, eir: &[u8]) -> EirRecord {
      let mut record = EirRecord::default();
      let mut short_name: Option<SmolStr> = None;
      let mut rest = eir;
      while let [len, tail @ ..] = rest {
         let len = *len as usize;
         // A zero length field terminates the chain.
         if len == 0 || len > tail.len() {
            break;
         }
         let (field, next) = tail.split_at(len);
         let (kind, value) = (field[0], &field[1..]);
         match kind {
            EIR_NAME_COMPLETE => {
               record.name = Some(SmolStr::new(String::from_utf8_lossy(value)));
            },
            EIR_NAME_SHORT => {
               short_name = Some(SmolStr::new(String::from_utf8_lossy(value)));
            },
            EIR_CLASS_OF_DEV if value.len() == 3 => {
               record.device_class =
                  Some(u32::from_le_bytes([value[0], value[1], value[2], 0]));
            },
            _ => {},
         }
         rest = next;
      }
      if record.name.is_none() {
         record.name = short_name;
      }
      record
   }
}
