//! Shared fixtures: a recording transport, scriptable host collaborators
//! and kernel-frame builders for driving the dispatcher.

use std::{
   collections::HashMap,
   io,
   sync::{Arc, Mutex},
};

use smol_str::SmolStr;

use crate::{
   address::{Address, AddressType},
   config::Config,
   mgmt::{
      protocol::{
         LinkKeyInfo, LongTermKeyInfo, MGMT_HDR_SIZE, MgmtEventCode, MgmtOpcode, NAME_FIELD_SIZE,
         OobData, RawStatus, SHORT_NAME_FIELD_SIZE,
      },
      session::{MgmtSession, Transport},
   },
   upstream::{
      AdapterManager, AdapterRef, AgentError, DeviceManager, DeviceRef, FoundDevice, KeyStore,
      LocalPin,
   },
};

pub(crate) type SentFrames = Arc<Mutex<Vec<Vec<u8>>>>;
pub(crate) type SharedState = Arc<Mutex<MockState>>;
/// While `true`, every write on the test transport fails.
pub(crate) type FailFlag = Arc<Mutex<bool>>;

pub(crate) struct TestTransport {
   sent: SentFrames,
   fail: FailFlag,
}

impl Transport for TestTransport {
   fn send(&mut self, frame: &[u8]) -> io::Result<()> {
      if *self.fail.lock().unwrap() {
         return Err(io::Error::other("write failed"));
      }
      self.sent.lock().unwrap().push(frame.to_vec());
      Ok(())
   }
}

/// Scriptable host stack shared by the adapter, device and key mocks.
/// Every observable call lands in `calls` as a readable string.
#[derive(Default)]
pub(crate) struct MockState {
   pub calls: Vec<String>,
   pub refuse_register: bool,
   pub refuse_find_adapter: bool,
   pub local_name: Option<SmolStr>,
   pub local_class: (u8, u8),
   pub local_pin: Option<SmolStr>,
   pub local_pin_display: bool,
   pub agent_fail: bool,
   pub key_store_fail: bool,
   pub is_temporary: bool,
   pub is_connected: bool,
   pub is_bonding: bool,
   pub link_keys: Vec<LinkKeyInfo>,
   pub long_term_keys: Vec<LongTermKeyInfo>,
   adapters_by_index: HashMap<u16, u64>,
   adapters_by_addr: HashMap<Address, u64>,
   devices: HashMap<Address, u64>,
   device_addr: HashMap<u64, Address>,
   next_ref: u64,
}

impl MockState {
   fn log(&mut self, call: impl Into<String>) {
      self.calls.push(call.into());
   }

   fn mint(&mut self) -> u64 {
      self.next_ref += 1;
      self.next_ref
   }

   fn device_label(&self, device: DeviceRef) -> String {
      match self.device_addr.get(&device.0) {
         Some(addr) => addr.to_string(),
         None => format!("dev{}", device.0),
      }
   }

   pub fn has_call(&self, needle: &str) -> bool {
      self.calls.iter().any(|call| call.contains(needle))
   }

   pub fn count_calls(&self, needle: &str) -> usize {
      self.calls.iter().filter(|call| call.contains(needle)).count()
   }
}

pub(crate) struct MockAdapters(pub SharedState);
pub(crate) struct MockDevices(pub SharedState);
pub(crate) struct MockKeys(pub SharedState);

impl AdapterManager for MockAdapters {
   fn register_adapter(&mut self, index: u16, powered: bool) -> Option<AdapterRef> {
      let mut state = self.0.lock().unwrap();
      state.log(format!("register_adapter hci{index} powered={powered}"));
      if state.refuse_register {
         return None;
      }
      let adapter = state
         .adapters_by_index
         .get(&index)
         .copied()
         .unwrap_or_else(|| {
            let id = state.mint();
            state.adapters_by_index.insert(index, id);
            id
         });
      Some(AdapterRef(adapter))
   }

   fn unregister_adapter(&mut self, index: u16) {
      let mut state = self.0.lock().unwrap();
      state.log(format!("unregister_adapter hci{index}"));
      state.adapters_by_index.remove(&index);
   }

   fn find_adapter(&mut self, address: &Address) -> Option<AdapterRef> {
      let mut state = self.0.lock().unwrap();
      if state.refuse_find_adapter {
         return None;
      }
      let adapter = state
         .adapters_by_addr
         .get(address)
         .copied()
         .unwrap_or_else(|| {
            let id = state.mint();
            state.adapters_by_addr.insert(*address, id);
            id
         });
      Some(AdapterRef(adapter))
   }

   fn local_name(&mut self, _adapter: AdapterRef) -> Option<SmolStr> {
      self.0.lock().unwrap().local_name.clone()
   }

   fn local_class(&mut self, _adapter: AdapterRef) -> (u8, u8) {
      self.0.lock().unwrap().local_class
   }

   fn local_pin(&mut self, _adapter: AdapterRef, peer: &Address) -> Option<LocalPin> {
      let mut state = self.0.lock().unwrap();
      state.log(format!("local_pin {peer}"));
      let display = state.local_pin_display;
      state.local_pin.clone().map(|code| LocalPin { code, display })
   }

   fn start(&mut self, _adapter: AdapterRef) {
      self.0.lock().unwrap().log("start");
   }

   fn stop(&mut self, _adapter: AdapterRef) {
      self.0.lock().unwrap().log("stop");
   }

   fn set_connectable(&mut self, _adapter: AdapterRef, enabled: bool) {
      self.0.lock().unwrap().log(format!("set_connectable {enabled}"));
   }

   fn set_discoverable(&mut self, _adapter: AdapterRef, enabled: bool) {
      self.0.lock().unwrap().log(format!("set_discoverable {enabled}"));
   }

   fn set_pairable(&mut self, _adapter: AdapterRef, enabled: bool) {
      self.0.lock().unwrap().log(format!("set_pairable {enabled}"));
   }

   fn set_name(&mut self, _adapter: AdapterRef, name: &str) {
      self.0.lock().unwrap().log(format!("adapter_set_name {name}"));
   }

   fn set_class(&mut self, _adapter: AdapterRef, class: u32) {
      self.0.lock().unwrap().log(format!("adapter_set_class {class:#08x}"));
   }

   fn add_connection(&mut self, _adapter: AdapterRef, device: DeviceRef) {
      let mut state = self.0.lock().unwrap();
      let label = state.device_label(device);
      state.log(format!("add_connection {label}"));
   }

   fn remove_connection(&mut self, _adapter: AdapterRef, device: DeviceRef) {
      let mut state = self.0.lock().unwrap();
      let label = state.device_label(device);
      state.log(format!("remove_connection {label}"));
   }

   fn bonding_complete(&mut self, _adapter: AdapterRef, peer: &Address, status: RawStatus) {
      self
         .0
         .lock()
         .unwrap()
         .log(format!("bonding_complete {peer} status {:#04x}", status.0));
   }

   fn set_discovering(&mut self, _adapter: AdapterRef, discovering: bool) {
      self.0.lock().unwrap().log(format!("set_discovering {discovering}"));
   }

   fn update_found_device(&mut self, _adapter: AdapterRef, found: &FoundDevice<'_>) {
      self.0.lock().unwrap().log(format!(
         "update_found_device {} rssi {} confirm_name {} legacy {}",
         found.address, found.rssi, found.confirm_name, found.legacy_pairing
      ));
   }

   fn local_oob_data_ready(&mut self, _adapter: AdapterRef, data: Option<&OobData>) {
      let tag = if data.is_some() { "some" } else { "none" };
      self.0.lock().unwrap().log(format!("local_oob_data_ready {tag}"));
   }

   fn store_cached_name(&mut self, _adapter: AdapterRef, peer: &Address, name: &str) {
      self
         .0
         .lock()
         .unwrap()
         .log(format!("store_cached_name {peer} {name}"));
   }
}

impl DeviceManager for MockDevices {
   fn get_or_create(
      &mut self,
      _adapter: AdapterRef,
      address: &Address,
      _address_type: AddressType,
   ) -> DeviceRef {
      let mut state = self.0.lock().unwrap();
      let id = state.devices.get(address).copied().unwrap_or_else(|| {
         let id = state.mint();
         state.devices.insert(*address, id);
         state.device_addr.insert(id, *address);
         id
      });
      DeviceRef(id)
   }

   fn find(&mut self, _adapter: AdapterRef, address: &Address) -> Option<DeviceRef> {
      self.0.lock().unwrap().devices.get(address).copied().map(DeviceRef)
   }

   fn remove(&mut self, _adapter: AdapterRef, device: DeviceRef) {
      let mut state = self.0.lock().unwrap();
      let label = state.device_label(device);
      state.log(format!("device_remove {label}"));
      if let Some(addr) = state.device_addr.remove(&device.0) {
         state.devices.remove(&addr);
      }
   }

   fn set_bonded(&mut self, device: DeviceRef, bonded: bool) {
      let mut state = self.0.lock().unwrap();
      let label = state.device_label(device);
      state.log(format!("set_bonded {label} {bonded}"));
   }

   fn set_temporary(&mut self, device: DeviceRef, temporary: bool) {
      let mut state = self.0.lock().unwrap();
      let label = state.device_label(device);
      state.log(format!("set_temporary {label} {temporary}"));
   }

   fn is_temporary(&mut self, _device: DeviceRef) -> bool {
      self.0.lock().unwrap().is_temporary
   }

   fn is_connected(&mut self, _device: DeviceRef) -> bool {
      self.0.lock().unwrap().is_connected
   }

   fn is_bonding(&mut self, _device: DeviceRef) -> bool {
      self.0.lock().unwrap().is_bonding
   }

   fn cancel_bonding(&mut self, device: DeviceRef) {
      let mut state = self.0.lock().unwrap();
      let label = state.device_label(device);
      state.log(format!("cancel_bonding {label}"));
   }

   fn set_class(&mut self, device: DeviceRef, class: u32) {
      let mut state = self.0.lock().unwrap();
      let label = state.device_label(device);
      state.log(format!("device_set_class {label} {class:#08x}"));
   }

   fn set_name(&mut self, device: DeviceRef, name: &str) {
      let mut state = self.0.lock().unwrap();
      let label = state.device_label(device);
      state.log(format!("device_set_name {label} {name}"));
   }

   fn set_blocked(&mut self, device: DeviceRef, blocked: bool) {
      let mut state = self.0.lock().unwrap();
      let label = state.device_label(device);
      state.log(format!("set_blocked {label} {blocked}"));
   }

   fn request_disconnect(&mut self, device: DeviceRef) {
      let mut state = self.0.lock().unwrap();
      let label = state.device_label(device);
      state.log(format!("request_disconnect {label}"));
   }

   fn request_pincode(&mut self, device: DeviceRef, secure: bool) -> Result<(), AgentError> {
      let mut state = self.0.lock().unwrap();
      let label = state.device_label(device);
      state.log(format!("request_pincode {label} secure={secure}"));
      if state.agent_fail {
         Err(AgentError::NoAgent)
      } else {
         Ok(())
      }
   }

   fn notify_pincode(
      &mut self,
      device: DeviceRef,
      secure: bool,
      pin: &str,
   ) -> Result<(), AgentError> {
      let mut state = self.0.lock().unwrap();
      let label = state.device_label(device);
      state.log(format!("notify_pincode {label} secure={secure} {pin}"));
      if state.agent_fail {
         Err(AgentError::NoAgent)
      } else {
         Ok(())
      }
   }

   fn request_passkey(&mut self, device: DeviceRef) -> Result<(), AgentError> {
      let mut state = self.0.lock().unwrap();
      let label = state.device_label(device);
      state.log(format!("request_passkey {label}"));
      if state.agent_fail {
         Err(AgentError::NoAgent)
      } else {
         Ok(())
      }
   }

   fn confirm_passkey(
      &mut self,
      device: DeviceRef,
      passkey: u32,
      confirm_hint: u8,
   ) -> Result<(), AgentError> {
      let mut state = self.0.lock().unwrap();
      let label = state.device_label(device);
      state.log(format!("confirm_passkey {label} {passkey} hint {confirm_hint}"));
      if state.agent_fail {
         Err(AgentError::NoAgent)
      } else {
         Ok(())
      }
   }

   fn notify_passkey(
      &mut self,
      device: DeviceRef,
      passkey: u32,
      entered: u8,
   ) -> Result<(), AgentError> {
      let mut state = self.0.lock().unwrap();
      let label = state.device_label(device);
      state.log(format!("notify_passkey {label} {passkey} entered {entered}"));
      if state.agent_fail {
         Err(AgentError::NoAgent)
      } else {
         Ok(())
      }
   }
}

impl KeyStore for MockKeys {
   fn store_link_key(&mut self, _adapter: AdapterRef, key: &LinkKeyInfo) -> io::Result<()> {
      let mut state = self.0.lock().unwrap();
      state.log(format!("store_link_key {}", key.address));
      if state.key_store_fail {
         return Err(io::Error::other("store failed"));
      }
      state.link_keys.push(*key);
      Ok(())
   }

   fn store_long_term_key(
      &mut self,
      _adapter: AdapterRef,
      key: &LongTermKeyInfo,
   ) -> io::Result<()> {
      let mut state = self.0.lock().unwrap();
      state.log(format!("store_long_term_key {}", key.address));
      if state.key_store_fail {
         return Err(io::Error::other("store failed"));
      }
      state.long_term_keys.push(*key);
      Ok(())
   }
}

/// A session over a recording transport, with the given controller indices
/// pre-registered.
pub(crate) fn test_session(indices: &[u16]) -> (MgmtSession, SentFrames, SharedState) {
   let (session, sent, state, _fail) = test_session_with_fail_flag(indices);
   (session, sent, state)
}

/// Like `test_session`, but also hands out the flag that makes transport
/// writes fail.
pub(crate) fn test_session_with_fail_flag(
   indices: &[u16],
) -> (MgmtSession, SentFrames, SharedState, FailFlag) {
   let sent: SentFrames = Arc::default();
   let state: SharedState = Arc::default();
   let fail: FailFlag = Arc::default();
   let mut session = MgmtSession::new(
      Box::new(TestTransport {
         sent: sent.clone(),
         fail: fail.clone(),
      }),
      Box::new(MockAdapters(state.clone())),
      Box::new(MockDevices(state.clone())),
      Box::new(MockKeys(state.clone())),
      Config::default(),
   );
   for &index in indices {
      session.controllers.add(index);
   }
   (session, sent, state, fail)
}

pub(crate) fn sent_opcodes(sent: &SentFrames) -> Vec<u16> {
   sent
      .lock()
      .unwrap()
      .iter()
      .map(|frame| u16::from_le_bytes([frame[0], frame[1]]))
      .collect()
}

fn raw_frame(code: u16, index: u16, payload: &[u8]) -> Vec<u8> {
   let mut frame = Vec::with_capacity(MGMT_HDR_SIZE + payload.len());
   frame.extend_from_slice(&code.to_le_bytes());
   frame.extend_from_slice(&index.to_le_bytes());
   frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
   frame.extend_from_slice(payload);
   frame
}

pub(crate) fn event_frame(code: MgmtEventCode, index: u16, payload: &[u8]) -> Vec<u8> {
   raw_frame(code as u16, index, payload)
}

pub(crate) fn cmd_complete_frame(
   index: u16,
   opcode: MgmtOpcode,
   status: u8,
   data: &[u8],
) -> Vec<u8> {
   let mut payload = (opcode as u16).to_le_bytes().to_vec();
   payload.push(status);
   payload.extend_from_slice(data);
   raw_frame(MgmtEventCode::CommandComplete as u16, index, &payload)
}

pub(crate) fn cmd_status_frame(index: u16, opcode: MgmtOpcode, status: u8) -> Vec<u8> {
   let mut payload = (opcode as u16).to_le_bytes().to_vec();
   payload.push(status);
   raw_frame(MgmtEventCode::CommandStatus as u16, index, &payload)
}

pub(crate) fn addr_info_bytes(address: &Address, address_type: AddressType) -> Vec<u8> {
   let mut bytes = address.as_bytes().to_vec();
   bytes.push(address_type as u8);
   bytes
}

pub(crate) fn read_info_payload(
   address: &Address,
   supported: u32,
   current: u32,
   name: &str,
) -> Vec<u8> {
   let mut payload = Vec::with_capacity(280);
   payload.extend_from_slice(address.as_bytes());
   payload.push(6); // hci version
   payload.extend_from_slice(&29u16.to_le_bytes()); // manufacturer
   payload.extend_from_slice(&supported.to_le_bytes());
   payload.extend_from_slice(&current.to_le_bytes());
   payload.extend_from_slice(&[0, 0, 0]); // dev class
   let mut name_field = [0u8; NAME_FIELD_SIZE];
   name_field[..name.len()].copy_from_slice(name.as_bytes());
   payload.extend_from_slice(&name_field);
   payload.extend_from_slice(&[0u8; SHORT_NAME_FIELD_SIZE]);
   payload
}
