//! Command issuers.
//!
//! Serializes and sends every command the engine supports. Commands that
//! race the single-flight UUID sequencer (power-up, class changes, further
//! UUID updates) are deferred here and replayed by `handle_pending_uuids`
//! once the in-flight command completes.

use log::{debug, warn};
use uuid::Uuid;

use crate::{
   address::{Address, AddressType},
   config::DeviceId,
   error::{MgmtError, Result},
   mgmt::{
      codec::{AddrInfo, FrameBuilder, Packet},
      protocol::{
         LinkKeyInfo, LongTermKeyInfo, MAX_NAME_LENGTH, MAX_PIN_LENGTH, MgmtOpcode,
         NAME_FIELD_SIZE, OobData, UUID_ANY, service_class_16,
      },
      registry::PendingUuidOp,
      session::MgmtSession,
   },
};

impl MgmtSession {
   pub(super) fn send_frame(&mut self, packet: Packet) -> Result<()> {
      debug!("→ {}", hex::encode(&packet));
      self.transport.send(&packet)?;
      Ok(())
   }

   pub(super) fn send_command(
      &mut self,
      opcode: MgmtOpcode,
      index: u16,
      payload: &[u8],
   ) -> Result<()> {
      self.send_frame(FrameBuilder::new(opcode, index).bytes(payload).finish())
   }

   fn ensure_index(&self, index: u16) -> Result<()> {
      if self.controllers.contains(index) {
         Ok(())
      } else {
         Err(MgmtError::UnknownIndex(index))
      }
   }

   fn set_mode(&mut self, opcode: MgmtOpcode, index: u16, on: bool) -> Result<()> {
      debug!("hci{index} {opcode} {on}");
      self.send_command(opcode, index, &[u8::from(on)])
   }

   /// Powers the controller up or down. Power-up waits for the UUID queue
   /// to drain; the kernel would answer Busy otherwise.
   pub fn set_powered(&mut self, index: u16, powered: bool) -> Result<()> {
      self.ensure_index(index)?;
      let info = self
         .controllers
         .get_mut(index)
         .ok_or(MgmtError::UnknownIndex(index))?;
      if powered {
         if info.pending_uuid {
            debug!("hci{index} power-up deferred until UUID queue drains");
            info.pending_powered = true;
            return Ok(());
         }
      } else {
         info.pending_powered = false;
      }
      self.set_mode(MgmtOpcode::SetPowered, index, powered)
   }

   pub fn set_connectable(&mut self, index: u16, connectable: bool) -> Result<()> {
      self.ensure_index(index)?;
      self.set_mode(MgmtOpcode::SetConnectable, index, connectable)
   }

   pub fn set_fast_connectable(&mut self, index: u16, enabled: bool) -> Result<()> {
      self.ensure_index(index)?;
      self.set_mode(MgmtOpcode::SetFastConnectable, index, enabled)
   }

   pub fn set_pairable(&mut self, index: u16, pairable: bool) -> Result<()> {
      self.ensure_index(index)?;
      self.set_mode(MgmtOpcode::SetPairable, index, pairable)
   }

   pub fn set_ssp(&mut self, index: u16, enabled: bool) -> Result<()> {
      self.ensure_index(index)?;
      self.set_mode(MgmtOpcode::SetSsp, index, enabled)
   }

   pub fn set_low_energy(&mut self, index: u16, enabled: bool) -> Result<()> {
      self.ensure_index(index)?;
      self.set_mode(MgmtOpcode::SetLowEnergy, index, enabled)
   }

   /// Opens or closes the discoverable window. The timeout is in seconds;
   /// zero keeps the window open until further notice.
   pub fn set_discoverable(&mut self, index: u16, discoverable: bool, timeout: u16) -> Result<()> {
      self.ensure_index(index)?;
      debug!("hci{index} SetDiscoverable {discoverable} timeout {timeout}");
      self.send_frame(
         FrameBuilder::new(MgmtOpcode::SetDiscoverable, index)
            .u8(u8::from(discoverable))
            .le16(timeout)
            .finish(),
      )
   }

   pub fn set_name(&mut self, index: u16, name: &str) -> Result<()> {
      self.ensure_index(index)?;
      if name.len() > MAX_NAME_LENGTH {
         return Err(MgmtError::InvalidArgument("local name too long"));
      }
      debug!("hci{index} SetLocalName {name:?}");
      self.send_frame(
         FrameBuilder::new(MgmtOpcode::SetLocalName, index)
            .bytes(name.as_bytes())
            .zeros(NAME_FIELD_SIZE - name.len())
            .finish(),
      )
   }

   /// Sets the class of device. Deferred while a UUID command is in flight
   /// since the kernel folds service bits into the class on its own.
   pub fn set_device_class(&mut self, index: u16, major: u8, minor: u8) -> Result<()> {
      let info = self
         .controllers
         .get_mut(index)
         .ok_or(MgmtError::UnknownIndex(index))?;
      if info.pending_uuid {
         debug!("hci{index} class change deferred until UUID queue drains");
         info.pending_class = true;
         info.pending_major = major;
         info.pending_minor = minor;
         return Ok(());
      }
      debug!("hci{index} SetDevClass {major:#04x} {minor:#04x}");
      self.send_command(MgmtOpcode::SetDevClass, index, &[major, minor])
   }

   fn send_uuid_op(&mut self, index: u16, op: &PendingUuidOp) -> Result<()> {
      let frame = if op.add {
         FrameBuilder::new(MgmtOpcode::AddUuid, index)
            .uuid(&op.uuid)
            .u8(op.service_hint)
            .finish()
      } else {
         FrameBuilder::new(MgmtOpcode::RemoveUuid, index)
            .uuid(&op.uuid)
            .finish()
      };
      self.send_frame(frame)
   }

   fn queue_uuid_op(&mut self, index: u16, op: PendingUuidOp) -> Result<()> {
      let info = self
         .controllers
         .get_mut(index)
         .ok_or(MgmtError::UnknownIndex(index))?;
      if info.pending_uuid {
         info.pending_uuids.push_back(op);
         return Ok(());
      }
      // The in-flight flag is raised only once the write went through; a
      // failed send leaves nothing pending.
      self.send_uuid_op(index, &op)?;
      if let Some(info) = self.controllers.get_mut(index) {
         info.pending_uuid = true;
      }
      Ok(())
   }

   /// Publishes a service record. Only 16-bit aliases of the base UUID are
   /// tracked on this channel; anything else is ignored with a warning.
   pub fn add_uuid(&mut self, index: u16, uuid: &Uuid, service_hint: u8) -> Result<()> {
      self.ensure_index(index)?;
      if service_class_16(uuid).is_none() {
         warn!("hci{index} ignoring non-16-bit service UUID {uuid}");
         return Ok(());
      }
      self.queue_uuid_op(
         index,
         PendingUuidOp {
            add: true,
            uuid: *uuid,
            service_hint,
         },
      )
   }

   /// Withdraws a service record. The nil UUID removes every record.
   pub fn remove_uuid(&mut self, index: u16, uuid: &Uuid) -> Result<()> {
      self.ensure_index(index)?;
      if *uuid != UUID_ANY && service_class_16(uuid).is_none() {
         warn!("hci{index} ignoring non-16-bit service UUID {uuid}");
         return Ok(());
      }
      self.queue_uuid_op(
         index,
         PendingUuidOp {
            add: false,
            uuid: *uuid,
            service_hint: 0,
         },
      )
   }

   pub fn clear_uuids(&mut self, index: u16) -> Result<()> {
      self.remove_uuid(index, &UUID_ANY)
   }

   /// Advances the UUID sequencer after the in-flight command finished:
   /// either reissues the next queued update or, with the queue drained,
   /// replays the deferred class change and power-up.
   pub(super) fn handle_pending_uuids(&mut self, index: u16) -> Result<()> {
      let Some(info) = self.controllers.get_mut(index) else {
         return Ok(());
      };
      info.pending_uuid = false;
      match info.pending_uuids.pop_front() {
         Some(op) => {
            self.send_uuid_op(index, &op)?;
            if let Some(info) = self.controllers.get_mut(index) {
               info.pending_uuid = true;
            }
            Ok(())
         },
         None => {
            let class = info
               .pending_class
               .then_some((info.pending_major, info.pending_minor));
            let powered = info.pending_powered;
            info.pending_class = false;
            info.pending_powered = false;
            if let Some((major, minor)) = class {
               self.set_device_class(index, major, minor)?;
            }
            if powered {
               self.set_powered(index, true)?;
            }
            Ok(())
         },
      }
   }

   /// Answers a PIN request. `None` rejects the request.
   pub fn pincode_reply(
      &mut self,
      index: u16,
      peer: &Address,
      address_type: AddressType,
      pin: Option<&[u8]>,
   ) -> Result<()> {
      self.ensure_index(index)?;
      match pin {
         Some(pin) => {
            if pin.is_empty() || pin.len() > MAX_PIN_LENGTH {
               return Err(MgmtError::InvalidArgument("PIN length out of range"));
            }
            self.send_frame(
               FrameBuilder::new(MgmtOpcode::PinCodeReply, index)
                  .addr_info(peer, address_type)
                  .u8(pin.len() as u8)
                  .bytes(pin)
                  .zeros(MAX_PIN_LENGTH - pin.len())
                  .finish(),
            )
         },
         None => self.send_frame(
            FrameBuilder::new(MgmtOpcode::PinCodeNegReply, index)
               .addr_info(peer, address_type)
               .finish(),
         ),
      }
   }

   /// Answers a user-confirmation request.
   pub fn confirm_reply(
      &mut self,
      index: u16,
      peer: &Address,
      address_type: AddressType,
      confirmed: bool,
   ) -> Result<()> {
      self.ensure_index(index)?;
      let opcode = if confirmed {
         MgmtOpcode::UserConfirmReply
      } else {
         MgmtOpcode::UserConfirmNegReply
      };
      self.send_frame(
         FrameBuilder::new(opcode, index)
            .addr_info(peer, address_type)
            .finish(),
      )
   }

   /// Answers a passkey request. `None` rejects the request.
   pub fn passkey_reply(
      &mut self,
      index: u16,
      peer: &Address,
      address_type: AddressType,
      passkey: Option<u32>,
   ) -> Result<()> {
      self.ensure_index(index)?;
      match passkey {
         Some(passkey) => self.send_frame(
            FrameBuilder::new(MgmtOpcode::UserPasskeyReply, index)
               .addr_info(peer, address_type)
               .le32(passkey)
               .finish(),
         ),
         None => self.send_frame(
            FrameBuilder::new(MgmtOpcode::UserPasskeyNegReply, index)
               .addr_info(peer, address_type)
               .finish(),
         ),
      }
   }

   fn addr_command(
      &mut self,
      opcode: MgmtOpcode,
      index: u16,
      peer: &Address,
      address_type: AddressType,
   ) -> Result<()> {
      self.ensure_index(index)?;
      debug!("hci{index} {opcode} {peer}");
      self.send_frame(
         FrameBuilder::new(opcode, index)
            .addr_info(peer, address_type)
            .finish(),
      )
   }

   pub fn block_device(
      &mut self,
      index: u16,
      peer: &Address,
      address_type: AddressType,
   ) -> Result<()> {
      self.addr_command(MgmtOpcode::BlockDevice, index, peer, address_type)
   }

   pub fn unblock_device(
      &mut self,
      index: u16,
      peer: &Address,
      address_type: AddressType,
   ) -> Result<()> {
      self.addr_command(MgmtOpcode::UnblockDevice, index, peer, address_type)
   }

   pub fn disconnect(
      &mut self,
      index: u16,
      peer: &Address,
      address_type: AddressType,
   ) -> Result<()> {
      self.addr_command(MgmtOpcode::Disconnect, index, peer, address_type)
   }

   pub fn cancel_pair_device(&mut self, index: u16, peer: &Address) -> Result<()> {
      self.addr_command(MgmtOpcode::CancelPairDevice, index, peer, AddressType::BrEdr)
   }

   pub fn pair_device(
      &mut self,
      index: u16,
      peer: &Address,
      address_type: AddressType,
      io_capability: u8,
   ) -> Result<()> {
      self.ensure_index(index)?;
      debug!("hci{index} PairDevice {peer} io_cap {io_capability:#04x}");
      self.send_frame(
         FrameBuilder::new(MgmtOpcode::PairDevice, index)
            .addr_info(peer, address_type)
            .u8(io_capability)
            .finish(),
      )
   }

   /// Removes a bond. The link, if up, is always taken down with it.
   pub fn unpair_device(
      &mut self,
      index: u16,
      peer: &Address,
      address_type: AddressType,
   ) -> Result<()> {
      self.ensure_index(index)?;
      self.send_frame(
         FrameBuilder::new(MgmtOpcode::UnpairDevice, index)
            .addr_info(peer, address_type)
            .u8(1)
            .finish(),
      )
   }

   fn start_discovery_with(&mut self, index: u16, addr_type_mask: u8) -> Result<()> {
      if addr_type_mask == 0 {
         return Err(MgmtError::InvalidArgument(
            "no transport enabled for discovery",
         ));
      }
      let info = self
         .controllers
         .get_mut(index)
         .ok_or(MgmtError::UnknownIndex(index))?;
      // Remembered so the stop command matches what was started.
      info.discovery_type = addr_type_mask;
      debug!("hci{index} StartDiscovery mask {addr_type_mask:#04x}");
      self.send_command(MgmtOpcode::StartDiscovery, index, &[addr_type_mask])
   }

   /// Starts discovery on every transport the controller has enabled.
   pub fn start_discovery(&mut self, index: u16) -> Result<()> {
      let info = self
         .controllers
         .get(index)
         .ok_or(MgmtError::UnknownIndex(index))?;
      let mask = info.current_settings.discovery_type();
      self.start_discovery_with(index, mask)
   }

   /// Starts an LE-only scan.
   pub fn start_le_discovery(&mut self, index: u16) -> Result<()> {
      let info = self
         .controllers
         .get(index)
         .ok_or(MgmtError::UnknownIndex(index))?;
      if !info.supported_settings.low_energy() {
         return Err(MgmtError::InvalidArgument("low energy not supported"));
      }
      let mask = (1 << AddressType::LePublic as u8) | (1 << AddressType::LeRandom as u8);
      self.start_discovery_with(index, mask)
   }

   pub fn stop_discovery(&mut self, index: u16) -> Result<()> {
      let info = self
         .controllers
         .get(index)
         .ok_or(MgmtError::UnknownIndex(index))?;
      let mask = info.discovery_type;
      debug!("hci{index} StopDiscovery mask {mask:#04x}");
      self.send_command(MgmtOpcode::StopDiscovery, index, &[mask])
   }

   /// Confirms (or gives up on) resolving the name of a found device.
   pub fn confirm_name(
      &mut self,
      index: u16,
      peer: &Address,
      address_type: AddressType,
      name_known: bool,
   ) -> Result<()> {
      self.ensure_index(index)?;
      self.send_frame(
         FrameBuilder::new(MgmtOpcode::ConfirmName, index)
            .addr_info(peer, address_type)
            .u8(u8::from(name_known))
            .finish(),
      )
   }

   pub fn set_device_id(&mut self, index: u16, id: &DeviceId) -> Result<()> {
      self.ensure_index(index)?;
      self.send_frame(
         FrameBuilder::new(MgmtOpcode::SetDeviceId, index)
            .le16(id.source)
            .le16(id.vendor)
            .le16(id.product)
            .le16(id.version)
            .finish(),
      )
   }

   pub fn set_io_capability(&mut self, index: u16, io_capability: u8) -> Result<()> {
      self.ensure_index(index)?;
      debug!("hci{index} SetIoCapability {io_capability:#04x}");
      self.send_command(MgmtOpcode::SetIoCapability, index, &[io_capability])
   }

   /// Hands the stored BR/EDR keys to the kernel, typically before power-up.
   pub fn load_link_keys(
      &mut self,
      index: u16,
      keys: &[LinkKeyInfo],
      debug_keys: bool,
   ) -> Result<()> {
      self.ensure_index(index)?;
      debug!("hci{index} LoadLinkKeys {} keys", keys.len());
      let mut frame = FrameBuilder::new(MgmtOpcode::LoadLinkKeys, index)
         .u8(u8::from(debug_keys))
         .le16(keys.len() as u16);
      for key in keys {
         frame = frame
            .addr_info(&key.address, key.address_type)
            .u8(key.kind)
            .bytes(&key.value)
            .u8(key.pin_len);
      }
      self.send_frame(frame.finish())
   }

   /// Hands the stored LE long-term keys to the kernel.
   pub fn load_long_term_keys(&mut self, index: u16, keys: &[LongTermKeyInfo]) -> Result<()> {
      self.ensure_index(index)?;
      debug!("hci{index} LoadLongTermKeys {} keys", keys.len());
      let mut frame = FrameBuilder::new(MgmtOpcode::LoadLongTermKeys, index).le16(keys.len() as u16);
      for key in keys {
         frame = frame
            .addr_info(&key.address, key.address_type)
            .u8(key.authenticated)
            .u8(key.master)
            .u8(key.enc_size)
            .le16(key.ediv)
            .bytes(&key.rand)
            .bytes(&key.value);
      }
      self.send_frame(frame.finish())
   }

   /// Asks the controller for fresh out-of-band pairing material; the
   /// result arrives through `AdapterManager::local_oob_data_ready`.
   pub fn read_local_oob_data(&mut self, index: u16) -> Result<()> {
      self.ensure_index(index)?;
      self.send_command(MgmtOpcode::ReadLocalOobData, index, &[])
   }

   pub fn add_remote_oob_data(
      &mut self,
      index: u16,
      peer: &Address,
      address_type: AddressType,
      data: &OobData,
   ) -> Result<()> {
      self.ensure_index(index)?;
      self.send_frame(
         FrameBuilder::new(MgmtOpcode::AddRemoteOobData, index)
            .addr_info(peer, address_type)
            .bytes(&data.hash)
            .bytes(&data.randomizer)
            .finish(),
      )
   }

   pub fn remove_remote_oob_data(
      &mut self,
      index: u16,
      peer: &Address,
      address_type: AddressType,
   ) -> Result<()> {
      self.addr_command(MgmtOpcode::RemoveRemoteOobData, index, peer, address_type)
   }

   pub(super) fn read_info(&mut self, index: u16) -> Result<()> {
      self.send_command(MgmtOpcode::ReadInfo, index, &[])
   }

   pub(super) fn get_connections(&mut self, index: u16) -> Result<()> {
      self.send_command(MgmtOpcode::GetConnections, index, &[])
   }

   /// Public address of the controller, once known.
   pub fn controller_address(&self, index: u16) -> Result<Address> {
      self
         .controllers
         .get(index)
         .map(|info| info.address)
         .ok_or(MgmtError::UnknownIndex(index))
   }

   pub fn powered(&self, index: u16) -> Result<bool> {
      self
         .controllers
         .get(index)
         .map(|info| info.current_settings.powered())
         .ok_or(MgmtError::UnknownIndex(index))
   }

   pub fn ssp_enabled(&self, index: u16) -> Result<bool> {
      self
         .controllers
         .get(index)
         .map(|info| info.current_settings.ssp())
         .ok_or(MgmtError::UnknownIndex(index))
   }

   /// Takes the connection list accumulated for this controller. Entries
   /// are consumed; a second call returns an empty list until new
   /// connections arrive.
   pub fn drain_connections(&mut self, index: u16) -> Result<Vec<AddrInfo>> {
      let info = self
         .controllers
         .get_mut(index)
         .ok_or(MgmtError::UnknownIndex(index))?;
      Ok(std::mem::take(&mut info.connections))
   }
}
