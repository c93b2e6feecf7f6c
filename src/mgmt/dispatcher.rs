//! Inbound frame dispatch.
//!
//! Every datagram off the control socket lands in `process_frame`. Malformed
//! frames and unknown events are logged and dropped; the only errors that
//! propagate are the ones that end the session, a failed version handshake
//! or a dead transport. Handlers mirror kernel state into the controller
//! table and report the rest to the host collaborators.

use log::{debug, error, info, warn};

use crate::{
   error::{MgmtError, Result},
   mgmt::{
      codec::{
         AddrInfo, AddrWithStatus, CommandComplete, CommandStatus, DeviceConnected,
         DeviceDisconnected, DeviceFound, Discovering, InfoReply, MgmtEvent, NewLinkKey,
         NewLongTermKey, PasskeyNotify, PinCodeRequest, UserConfirmRequest, VersionReply,
         decode_class_of_device, decode_connections, decode_discovery_type, decode_index_list,
         decode_local_name, parse_event, split_frame,
      },
      protocol::{
         DEV_FOUND_CONFIRM_NAME, DEV_FOUND_LEGACY_PAIRING, INDEX_NONE, MAX_PIN_LENGTH,
         MgmtOpcode, MgmtStatus, OobData, RawStatus, Settings,
      },
      session::MgmtSession,
   },
   upstream::{AdapterRef, FoundDevice},
};

impl MgmtSession {
   /// Handles one datagram. Returns an error only when the session cannot
   /// continue.
   pub fn process_frame(&mut self, bytes: &[u8]) -> Result<()> {
      let frame = match split_frame(bytes) {
         Ok(frame) => frame,
         Err(e) => {
            warn!("Dropping malformed frame: {e}");
            return Ok(());
         },
      };
      let index = frame.header.index;
      let event = match parse_event(frame.header.opcode, frame.payload) {
         Ok(event) => event,
         Err(e) => {
            warn!(
               "Dropping undecodable event {:#06x} for hci{index}: {e}",
               frame.header.opcode
            );
            return Ok(());
         },
      };
      match event {
         MgmtEvent::CommandComplete(cc) => self.cmd_complete(index, cc),
         MgmtEvent::CommandStatus(cs) => self.cmd_status(index, cs),
         MgmtEvent::ControllerError(code) => {
            error!("hci{index} controller error {code:#04x}");
            Ok(())
         },
         MgmtEvent::IndexAdded => self.index_added(index),
         MgmtEvent::IndexRemoved => {
            self.index_removed(index);
            Ok(())
         },
         MgmtEvent::NewSettings(settings) => {
            self.new_settings(index, settings);
            Ok(())
         },
         MgmtEvent::ClassOfDeviceChanged(class) => self.cod_changed(index, class),
         MgmtEvent::LocalNameChanged(payload) => {
            self.local_name_changed(index, payload);
            Ok(())
         },
         MgmtEvent::NewLinkKey(ev) => {
            self.new_link_key(index, ev);
            Ok(())
         },
         MgmtEvent::NewLongTermKey(ev) => {
            self.new_long_term_key(index, ev);
            Ok(())
         },
         MgmtEvent::DeviceConnected(ev) => {
            self.device_connected(index, ev);
            Ok(())
         },
         MgmtEvent::DeviceDisconnected(ev) => {
            self.device_disconnected(index, ev);
            Ok(())
         },
         MgmtEvent::ConnectFailed(ev) => {
            self.connect_failed(index, ev);
            Ok(())
         },
         MgmtEvent::PinCodeRequest(ev) => self.pin_code_request(index, ev),
         MgmtEvent::UserConfirmRequest(ev) => self.user_confirm_request(index, ev),
         MgmtEvent::UserPasskeyRequest(addr) => self.user_passkey_request(index, addr),
         MgmtEvent::AuthFailed(ev) => {
            self.auth_failed(index, ev);
            Ok(())
         },
         MgmtEvent::DeviceFound(ev) => {
            self.device_found(index, ev);
            Ok(())
         },
         MgmtEvent::Discovering(ev) => {
            self.discovering(index, ev);
            Ok(())
         },
         MgmtEvent::DeviceBlocked(addr) => {
            self.device_block_state(index, addr, true);
            Ok(())
         },
         MgmtEvent::DeviceUnblocked(addr) => {
            self.device_block_state(index, addr, false);
            Ok(())
         },
         MgmtEvent::DeviceUnpaired(addr) => {
            self.device_unpaired(index, addr);
            Ok(())
         },
         MgmtEvent::PasskeyNotify(ev) => {
            self.passkey_notify(index, ev);
            Ok(())
         },
         MgmtEvent::Unknown(code) => {
            warn!("hci{index} unknown event {code:#06x}");
            Ok(())
         },
      }
   }

   /// Resolves the host adapter behind a controller index.
   fn adapter_for(&mut self, index: u16) -> Option<AdapterRef> {
      let address = self.controllers.get(index)?.address;
      self.adapters.find_adapter(&address)
   }

   fn update_class(&mut self, index: u16, class: u32) {
      if let Some(adapter) = self.adapter_for(index) {
         self.adapters.set_class(adapter, class);
      }
   }

   // === Command replies ===

   fn cmd_complete(&mut self, index: u16, cc: CommandComplete<'_>) -> Result<()> {
      let Some(opcode) = MgmtOpcode::from_repr(cc.opcode) else {
         warn!("hci{index} completion for unknown command {:#06x}", cc.opcode);
         return Ok(());
      };
      debug!("hci{index} {opcode} complete, status {}", cc.status);
      match opcode {
         MgmtOpcode::ReadVersion => self.read_version_complete(cc),
         MgmtOpcode::ReadIndexList => self.read_index_list_complete(cc),
         MgmtOpcode::ReadInfo => self.read_info_complete(index, cc),
         MgmtOpcode::SetPowered
         | MgmtOpcode::SetDiscoverable
         | MgmtOpcode::SetConnectable
         | MgmtOpcode::SetFastConnectable
         | MgmtOpcode::SetPairable
         | MgmtOpcode::SetSsp
         | MgmtOpcode::SetLowEnergy => {
            if !cc.status.is_success() {
               error!("hci{index} {opcode} failed: {}", cc.status);
               return Ok(());
            }
            match cc.data.try_into().map(u32::from_le_bytes) {
               Ok(bits) => self.new_settings(index, Settings(bits)),
               Err(_) => warn!("hci{index} short settings reply for {opcode}"),
            }
            Ok(())
         },
         MgmtOpcode::AddUuid | MgmtOpcode::RemoveUuid => {
            if cc.status.is_success() {
               if let Ok(class) = decode_class_of_device(cc.data) {
                  self.update_class(index, class);
               }
            } else {
               error!("hci{index} {opcode} failed: {}", cc.status);
            }
            // Completion, successful or not, frees the single-flight slot.
            self.handle_pending_uuids(index)
         },
         MgmtOpcode::SetDevClass => {
            if cc.status.is_success() {
               if let Ok(class) = decode_class_of_device(cc.data) {
                  self.update_class(index, class);
               }
            } else {
               error!("hci{index} SetDevClass failed: {}", cc.status);
            }
            Ok(())
         },
         MgmtOpcode::SetLocalName => {
            if cc.status.is_success() {
               self.local_name_changed(index, cc.data);
            } else {
               error!("hci{index} SetLocalName failed: {}", cc.status);
            }
            Ok(())
         },
         MgmtOpcode::Disconnect => {
            self.disconnect_complete(index, cc);
            Ok(())
         },
         MgmtOpcode::GetConnections => {
            self.get_connections_complete(index, cc);
            Ok(())
         },
         MgmtOpcode::PairDevice => {
            self.pair_device_complete(index, cc);
            Ok(())
         },
         MgmtOpcode::ReadLocalOobData => {
            self.read_local_oob_data_complete(index, cc);
            Ok(())
         },
         MgmtOpcode::StartDiscovery => {
            self.start_discovery_complete(index, cc);
            Ok(())
         },
         _ => {
            debug!("hci{index} ignoring completion for {opcode}");
            Ok(())
         },
      }
   }

   fn read_version_complete(&mut self, cc: CommandComplete<'_>) -> Result<()> {
      if !cc.status.is_success() {
         return Err(MgmtError::KernelRejected {
            opcode: MgmtOpcode::ReadVersion,
            status: cc.status,
         });
      }
      let reply = VersionReply::decode(cc.data)?;
      if reply.version < 1 {
         error!(
            "Version {}.{} not supported",
            reply.version, reply.revision
         );
         return Err(MgmtError::UnsupportedVersion(reply.version));
      }
      info!(
         "Kernel management interface {}.{}",
         reply.version, reply.revision
      );
      self.version = Some((reply.version, reply.revision));
      self.send_command(MgmtOpcode::ReadIndexList, INDEX_NONE, &[])
   }

   fn read_index_list_complete(&mut self, cc: CommandComplete<'_>) -> Result<()> {
      if !cc.status.is_success() {
         error!("ReadIndexList failed: {}", cc.status);
         return Ok(());
      }
      let indices = match decode_index_list(cc.data) {
         Ok(indices) => indices,
         Err(e) => {
            warn!("Dropping bad index list: {e}");
            return Ok(());
         },
      };
      for index in indices {
         info!("Adding controller hci{index}");
         self.controllers.add(index);
         self.read_info(index)?;
      }
      Ok(())
   }

   fn read_info_complete(&mut self, index: u16, cc: CommandComplete<'_>) -> Result<()> {
      if !cc.status.is_success() {
         error!("hci{index} ReadInfo failed: {}", cc.status);
         return Ok(());
      }
      let reply = match InfoReply::decode(cc.data) {
         Ok(reply) => reply,
         Err(e) => {
            warn!("hci{index} dropping bad info reply: {e}");
            return Ok(());
         },
      };
      let Some(ctrl) = self.controllers.get_mut(index) else {
         warn!("hci{index} info reply for unregistered controller");
         return Ok(());
      };
      ctrl.address = reply.address;
      ctrl.supported_settings = reply.supported_settings;
      ctrl.current_settings = reply.current_settings;
      info!(
         "hci{index} {} name {:?} settings {}",
         reply.address, reply.name, reply.current_settings
      );

      // Start from a clean service-record slate.
      self.clear_uuids(index)?;

      let powered = reply.current_settings.powered();
      let Some(adapter) = self.adapters.register_adapter(index, powered) else {
         error!("Unable to register hci{index} with the host");
         return Ok(());
      };

      self.project_modes(adapter, reply.current_settings);

      match self.adapters.local_name(adapter) {
         Some(name) => self.set_name(index, &name)?,
         None => self.adapters.set_name(adapter, &reply.name),
      }

      let (major, minor) = self.adapters.local_class(adapter);
      self.set_device_class(index, major, minor)?;

      if !reply.current_settings.pairable() {
         self.set_pairable(index, true)?;
      }
      if reply.supported_settings.ssp() && !reply.current_settings.ssp() {
         self.set_ssp(index, true)?;
      }
      if reply.supported_settings.low_energy() && !reply.current_settings.low_energy() {
         self.set_low_energy(index, true)?;
      }

      self.set_io_capability(index, self.config.io_capability)?;
      if let Some(id) = self.config.device_id {
         self.set_device_id(index, &id)?;
      }

      if powered {
         self.get_connections(index)?;
         self.adapters.start(adapter);
      }
      Ok(())
   }

   fn disconnect_complete(&mut self, index: u16, cc: CommandComplete<'_>) {
      let Ok(addr) = crate::mgmt::codec::decode_addr_only("disconnect_complete", cc.data)
      else {
         warn!("hci{index} short disconnect reply");
         return;
      };
      if !cc.status.is_success() {
         error!("hci{index} disconnecting {} failed: {}", addr.address, cc.status);
         return;
      }
      let Some(adapter) = self.adapter_for(index) else {
         return;
      };
      if let Some(device) = self.devices.find(adapter, &addr.address) {
         self.adapters.remove_connection(adapter, device);
      }
      self.adapters.bonding_complete(
         adapter,
         &addr.address,
         RawStatus(MgmtStatus::Disconnected as u8),
      );
   }

   fn get_connections_complete(&mut self, index: u16, cc: CommandComplete<'_>) {
      if !cc.status.is_success() {
         error!("hci{index} GetConnections failed: {}", cc.status);
         return;
      }
      let conns = match decode_connections(cc.data) {
         Ok(conns) => conns,
         Err(e) => {
            warn!("hci{index} dropping bad connection list: {e}");
            return;
         },
      };
      debug!("hci{index} {} open connections", conns.len());
      if let Some(ctrl) = self.controllers.get_mut(index) {
         ctrl.connections.extend(conns);
      }
   }

   fn pair_device_complete(&mut self, index: u16, cc: CommandComplete<'_>) {
      let Ok(addr) = crate::mgmt::codec::decode_addr_only("pair_device_complete", cc.data)
      else {
         warn!("hci{index} short pairing reply");
         return;
      };
      debug!("hci{index} pairing with {} finished, status {}", addr.address, cc.status);
      if let Some(adapter) = self.adapter_for(index) {
         self.adapters.bonding_complete(adapter, &addr.address, cc.status);
      }
   }

   fn read_local_oob_data_complete(&mut self, index: u16, cc: CommandComplete<'_>) {
      let Some(adapter) = self.adapter_for(index) else {
         return;
      };
      if cc.status.is_success() {
         match OobData::decode(cc.data) {
            Ok(data) => self.adapters.local_oob_data_ready(adapter, Some(&data)),
            Err(e) => {
               warn!("hci{index} bad OOB reply: {e}");
               self.adapters.local_oob_data_ready(adapter, None);
            },
         }
      } else {
         error!("hci{index} ReadLocalOobData failed: {}", cc.status);
         self.adapters.local_oob_data_ready(adapter, None);
      }
   }

   fn start_discovery_complete(&mut self, index: u16, cc: CommandComplete<'_>) {
      let mask = match decode_discovery_type(cc.data) {
         Ok(mask) => mask,
         Err(e) => {
            warn!("hci{index} bad discovery reply: {e}");
            return;
         },
      };
      debug!("hci{index} discovery on mask {mask:#04x}, status {}", cc.status);
      if !cc.status.is_success() {
         // The scan never started; take the host out of discovering state.
         if let Some(adapter) = self.adapter_for(index) {
            self.adapters.set_discovering(adapter, false);
         }
      }
   }

   fn cmd_status(&mut self, index: u16, cs: CommandStatus) -> Result<()> {
      let Some(opcode) = MgmtOpcode::from_repr(cs.opcode) else {
         warn!("hci{index} status for unknown command {:#06x}", cs.opcode);
         return Ok(());
      };
      if cs.status.is_success() {
         debug!("hci{index} {opcode} in progress");
         return Ok(());
      }
      match opcode {
         MgmtOpcode::AddUuid if cs.status.is_busy() => {
            // The controller is still folding the previous change into its
            // class of device; the class-changed event resumes the queue.
            debug!("hci{index} AddUuid busy, waiting for class change");
            if let Some(ctrl) = self.controllers.get_mut(index) {
               ctrl.pending_cod_change = true;
            }
            Ok(())
         },
         MgmtOpcode::AddUuid | MgmtOpcode::RemoveUuid => {
            error!("hci{index} {opcode} rejected: {}", cs.status);
            // Free the single-flight slot anyway so queued updates and the
            // deferred power-up never stall behind a dead command.
            self.handle_pending_uuids(index)
         },
         MgmtOpcode::ReadLocalOobData => {
            error!("hci{index} ReadLocalOobData failed: {}", cs.status);
            if let Some(adapter) = self.adapter_for(index) {
               self.adapters.local_oob_data_ready(adapter, None);
            }
            Ok(())
         },
         _ => {
            error!("hci{index} {opcode} failed: {}", cs.status);
            Ok(())
         },
      }
   }

   // === Controller lifecycle ===

   fn index_added(&mut self, index: u16) -> Result<()> {
      info!("Index added hci{index}");
      self.controllers.add(index);
      self.read_info(index)
   }

   fn index_removed(&mut self, index: u16) {
      info!("Index removed hci{index}");
      if !self.controllers.contains(index) {
         return;
      }
      self.adapters.unregister_adapter(index);
      self.controllers.remove(index);
   }

   fn new_settings(&mut self, index: u16, settings: Settings) {
      let Some(ctrl) = self.controllers.get(index) else {
         warn!("hci{index} settings for unknown controller");
         return;
      };
      let address = ctrl.address;
      let old = ctrl.current_settings;
      debug!("hci{index} settings {old} -> {settings}");

      // Identity not known yet; the info reply will seed everything.
      let Some(adapter) = self.adapters.find_adapter(&address) else {
         return;
      };

      if settings.powered() && !old.powered() {
         self.adapters.start(adapter);
         self.project_modes(adapter, settings);
      } else if !settings.powered() && old.powered() {
         self.adapters.stop(adapter);
         // Power loss voids everything queued behind the radio.
         if let Some(ctrl) = self.controllers.get_mut(index) {
            ctrl.clear_pending();
         }
      } else {
         self.project_modes(adapter, settings);
      }

      if let Some(ctrl) = self.controllers.get_mut(index) {
         ctrl.current_settings = settings;
      }
   }

   fn project_modes(&mut self, adapter: AdapterRef, settings: Settings) {
      self.adapters.set_connectable(adapter, settings.connectable());
      self.adapters.set_discoverable(adapter, settings.discoverable());
      self.adapters.set_pairable(adapter, settings.pairable());
   }

   fn cod_changed(&mut self, index: u16, class: u32) -> Result<()> {
      debug!("hci{index} class of device {class:#08x}");
      let Some(ctrl) = self.controllers.get_mut(index) else {
         return Ok(());
      };
      let resume = std::mem::replace(&mut ctrl.pending_cod_change, false);
      if resume {
         self.handle_pending_uuids(index)?;
      }
      self.update_class(index, class);
      Ok(())
   }

   fn local_name_changed(&mut self, index: u16, payload: &[u8]) {
      let name = match decode_local_name(payload) {
         Ok(name) => name,
         Err(e) => {
            warn!("hci{index} bad name payload: {e}");
            return;
         },
      };
      debug!("hci{index} local name {name:?}");
      if let Some(adapter) = self.adapter_for(index) {
         self.adapters.set_name(adapter, &name);
      }
   }

   // === Keys ===

   fn new_link_key(&mut self, index: u16, ev: NewLinkKey) {
      if ev.key.pin_len as usize > MAX_PIN_LENGTH {
         error!("hci{index} link key with invalid PIN length {}", ev.key.pin_len);
         return;
      }
      let Some(adapter) = self.adapter_for(index) else {
         return;
      };
      let device = self
         .devices
         .get_or_create(adapter, &ev.key.address, ev.key.address_type);
      if ev.store_hint {
         if let Err(e) = self.keys.store_link_key(adapter, &ev.key) {
            error!("hci{index} storing link key for {} failed: {e}", ev.key.address);
         }
         self.devices.set_bonded(device, true);
         self.devices.set_temporary(device, false);
      }
      self
         .adapters
         .bonding_complete(adapter, &ev.key.address, RawStatus(0));
   }

   fn new_long_term_key(&mut self, index: u16, ev: NewLongTermKey) {
      let Some(adapter) = self.adapter_for(index) else {
         return;
      };
      let device = self
         .devices
         .get_or_create(adapter, &ev.key.address, ev.key.address_type);
      if ev.store_hint {
         if let Err(e) = self.keys.store_long_term_key(adapter, &ev.key) {
            error!(
               "hci{index} storing long-term key for {} failed: {e}",
               ev.key.address
            );
         }
         self.devices.set_bonded(device, true);
         self.devices.set_temporary(device, false);
      }
      // Only the initiating side concludes the bond.
      if ev.key.master != 0 {
         self
            .adapters
            .bonding_complete(adapter, &ev.key.address, RawStatus(0));
      }
   }

   // === Connection events ===

   fn device_connected(&mut self, index: u16, ev: DeviceConnected<'_>) {
      debug!(
         "hci{index} {} connected, flags {:#010x}",
         ev.addr.address, ev.flags
      );
      let Some(adapter) = self.adapter_for(index) else {
         return;
      };
      let device = self
         .devices
         .get_or_create(adapter, &ev.addr.address, ev.addr.address_type);
      let record = self.eir.parse(ev.eir);
      if let Some(class) = record.device_class {
         self.devices.set_class(device, class);
      }
      self.adapters.add_connection(adapter, device);
      if let Some(name) = record.name {
         self
            .adapters
            .store_cached_name(adapter, &ev.addr.address, &name);
         self.devices.set_name(device, &name);
      }
   }

   fn device_disconnected(&mut self, index: u16, ev: DeviceDisconnected) {
      debug!(
         "hci{index} {} disconnected, reason {:#04x}",
         ev.addr.address, ev.reason
      );
      let Some(adapter) = self.adapter_for(index) else {
         return;
      };
      if let Some(device) = self.devices.find(adapter, &ev.addr.address) {
         self.adapters.remove_connection(adapter, device);
      }
   }

   fn connect_failed(&mut self, index: u16, ev: AddrWithStatus) {
      warn!(
         "hci{index} connecting {} failed: {}",
         ev.addr.address, ev.status
      );
      let Some(adapter) = self.adapter_for(index) else {
         return;
      };
      if let Some(device) = self.devices.find(adapter, &ev.addr.address) {
         if self.devices.is_bonding(device) {
            self.devices.cancel_bonding(device);
         }
         // Never-seen-again devices do not linger in the host table.
         if self.devices.is_temporary(device) {
            self.devices.remove(adapter, device);
         }
      }
      self.adapters.bonding_complete(adapter, &ev.addr.address, ev.status);
   }

   // === Pairing input ===

   fn pin_code_request(&mut self, index: u16, ev: PinCodeRequest) -> Result<()> {
      debug!("hci{index} PIN request from {} secure={}", ev.addr.address, ev.secure);
      let Some(adapter) = self.adapter_for(index) else {
         return Ok(());
      };
      let device = self
         .devices
         .get_or_create(adapter, &ev.addr.address, ev.addr.address_type);
      // A configured fixed PIN answers without prompting. Only a 16-digit
      // one satisfies a secure authentication request.
      if let Some(pin) = self.adapters.local_pin(adapter, &ev.addr.address) {
         if !ev.secure || pin.code.len() == MAX_PIN_LENGTH {
            if pin.display && self.devices.is_bonding(device) {
               if let Err(e) = self.devices.notify_pincode(device, ev.secure, &pin.code) {
                  error!("hci{index} PIN display failed: {e}");
                  return self.pincode_reply(
                     index,
                     &ev.addr.address,
                     ev.addr.address_type,
                     None,
                  );
               }
               return Ok(());
            }
            return self.pincode_reply(
               index,
               &ev.addr.address,
               ev.addr.address_type,
               Some(pin.code.as_bytes()),
            );
         }
      }
      if let Err(e) = self.devices.request_pincode(device, ev.secure) {
         error!("hci{index} PIN request failed: {e}");
         return self.pincode_reply(index, &ev.addr.address, ev.addr.address_type, None);
      }
      Ok(())
   }

   fn user_confirm_request(&mut self, index: u16, ev: UserConfirmRequest) -> Result<()> {
      debug!(
         "hci{index} confirm request from {} value {:06}",
         ev.addr.address, ev.value
      );
      let Some(adapter) = self.adapter_for(index) else {
         return Ok(());
      };
      let device = self
         .devices
         .get_or_create(adapter, &ev.addr.address, ev.addr.address_type);
      if let Err(e) = self.devices.confirm_passkey(device, ev.value, ev.confirm_hint) {
         error!("hci{index} confirmation request failed: {e}");
         return self.confirm_reply(index, &ev.addr.address, ev.addr.address_type, false);
      }
      Ok(())
   }

   fn user_passkey_request(&mut self, index: u16, addr: AddrInfo) -> Result<()> {
      debug!("hci{index} passkey request from {}", addr.address);
      let Some(adapter) = self.adapter_for(index) else {
         return Ok(());
      };
      let device = self
         .devices
         .get_or_create(adapter, &addr.address, addr.address_type);
      if let Err(e) = self.devices.request_passkey(device) {
         error!("hci{index} passkey request failed: {e}");
         return self.passkey_reply(index, &addr.address, addr.address_type, None);
      }
      Ok(())
   }

   fn passkey_notify(&mut self, index: u16, ev: PasskeyNotify) {
      debug!(
         "hci{index} passkey {:06} for {} entered {}",
         ev.passkey, ev.addr.address, ev.entered
      );
      let Some(adapter) = self.adapter_for(index) else {
         return;
      };
      let device = self
         .devices
         .get_or_create(adapter, &ev.addr.address, ev.addr.address_type);
      if let Err(e) = self.devices.notify_passkey(device, ev.passkey, ev.entered) {
         error!("hci{index} passkey notification failed: {e}");
      }
   }

   fn auth_failed(&mut self, index: u16, ev: AddrWithStatus) {
      warn!(
         "hci{index} authenticating {} failed: {}",
         ev.addr.address, ev.status
      );
      if let Some(adapter) = self.adapter_for(index) {
         self.adapters.bonding_complete(adapter, &ev.addr.address, ev.status);
      }
   }

   // === Discovery ===

   fn device_found(&mut self, index: u16, ev: DeviceFound<'_>) {
      let Some(adapter) = self.adapter_for(index) else {
         return;
      };
      let found = FoundDevice {
         address: ev.addr.address,
         address_type: ev.addr.address_type,
         rssi: ev.rssi,
         confirm_name: ev.flags & DEV_FOUND_CONFIRM_NAME != 0,
         legacy_pairing: ev.flags & DEV_FOUND_LEGACY_PAIRING != 0,
         eir: ev.eir,
      };
      self.adapters.update_found_device(adapter, &found);
   }

   fn discovering(&mut self, index: u16, ev: Discovering) {
      debug!(
         "hci{index} discovering {} mask {:#04x}",
         ev.discovering, ev.addr_type_mask
      );
      if let Some(adapter) = self.adapter_for(index) {
         self.adapters.set_discovering(adapter, ev.discovering);
      }
   }

   // === Device policy ===

   fn device_block_state(&mut self, index: u16, addr: AddrInfo, blocked: bool) {
      debug!("hci{index} {} blocked={blocked}", addr.address);
      let Some(adapter) = self.adapter_for(index) else {
         return;
      };
      if let Some(device) = self.devices.find(adapter, &addr.address) {
         self.devices.set_blocked(device, blocked);
      }
   }

   fn device_unpaired(&mut self, index: u16, addr: AddrInfo) {
      info!("hci{index} {} unpaired", addr.address);
      let Some(adapter) = self.adapter_for(index) else {
         return;
      };
      let Some(device) = self.devices.find(adapter, &addr.address) else {
         return;
      };
      self.devices.set_temporary(device, true);
      if self.devices.is_connected(device) {
         // Forget it once the link goes down.
         self.devices.request_disconnect(device);
      } else {
         self.devices.remove(adapter, device);
      }
   }
}
