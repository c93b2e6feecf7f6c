//! Controller state table.
//!
//! One slot per kernel controller index, grown on demand and never shrunk.
//! A removed controller leaves an invalid slot behind so stale indices fail
//! lookup instead of aliasing a neighbour. The slot also carries the
//! single-flight service-record sequencer: the kernel rejects overlapping
//! UUID commands, so updates queue here and drain one at a time.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::{
   address::Address,
   mgmt::protocol::Settings,
};

/// One queued service-record update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingUuidOp {
   pub add: bool,
   pub uuid: Uuid,
   pub service_hint: u8,
}

/// Per-controller state mirrored from the kernel plus in-flight bookkeeping.
#[derive(Debug, Default)]
pub struct ControllerInfo {
   valid: bool,
   pub address: Address,
   pub supported_settings: Settings,
   pub current_settings: Settings,
   /// Open links, appended on connect events and drained by the consumer.
   pub connections: Vec<crate::mgmt::codec::AddrInfo>,
   /// Address-type mask of the discovery session in flight, echoed back on
   /// stop so it matches what was started.
   pub discovery_type: u8,
   /// A UUID command is in flight; further ones queue in `pending_uuids`.
   pub pending_uuid: bool,
   pub pending_uuids: VecDeque<PendingUuidOp>,
   /// Class change deferred until the UUID queue drains.
   pub pending_class: bool,
   pub pending_major: u8,
   pub pending_minor: u8,
   /// Power-up deferred until the UUID queue drains.
   pub pending_powered: bool,
   /// The kernel answered a UUID command with Busy; the class-of-device
   /// event signals when it caught up.
   pub pending_cod_change: bool,
}

impl ControllerInfo {
   fn reset(&mut self) {
      *self = Self {
         valid: true,
         ..Self::default()
      };
   }

   /// Clears every deferred operation, used when the controller powers down
   /// with work still queued.
   pub fn clear_pending(&mut self) {
      self.pending_uuid = false;
      self.pending_uuids.clear();
      self.pending_class = false;
      self.pending_powered = false;
      self.pending_cod_change = false;
   }
}

/// The controller table, indexed by kernel controller index.
#[derive(Debug, Default)]
pub struct ControllerRegistry {
   slots: Vec<ControllerInfo>,
}

impl ControllerRegistry {
   pub fn new() -> Self {
      Self::default()
   }

   /// Registers `index`, growing the table as needed. Re-adding an existing
   /// index resets its slot; the kernel re-announces controllers across
   /// resets and stale state must not leak through.
   pub fn add(&mut self, index: u16) -> &mut ControllerInfo {
      let index = index as usize;
      if index >= self.slots.len() {
         self.slots.resize_with(index + 1, ControllerInfo::default);
      }
      let slot = &mut self.slots[index];
      slot.reset();
      slot
   }

   /// Marks `index` invalid. Unknown indices are ignored.
   pub fn remove(&mut self, index: u16) {
      if let Some(slot) = self.slots.get_mut(index as usize) {
         slot.valid = false;
      }
   }

   pub fn get(&self, index: u16) -> Option<&ControllerInfo> {
      self.slots.get(index as usize).filter(|slot| slot.valid)
   }

   pub fn get_mut(&mut self, index: u16) -> Option<&mut ControllerInfo> {
      self
         .slots
         .get_mut(index as usize)
         .filter(|slot| slot.valid)
   }

   /// Finds the index of the controller with the given public address.
   pub fn find_by_address(&self, address: &Address) -> Option<u16> {
      self
         .slots
         .iter()
         .position(|slot| slot.valid && slot.address == *address)
         .map(|index| index as u16)
   }

   pub fn contains(&self, index: u16) -> bool {
      self.get(index).is_some()
   }

   /// Drops every slot, used at session teardown.
   pub fn clear(&mut self) {
      self.slots.clear();
   }

   pub fn iter_valid(&self) -> impl Iterator<Item = (u16, &ControllerInfo)> {
      self
         .slots
         .iter()
         .enumerate()
         .filter(|(_, slot)| slot.valid)
         .map(|(index, slot)| (index as u16, slot))
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{address::AddressType, mgmt::codec::AddrInfo};

   #[test]
   fn test_add_grows_sparse_table() {
      let mut reg = ControllerRegistry::new();
      reg.add(4);
      assert!(reg.get(4).is_some());
      assert!(reg.get(0).is_none());
      assert!(reg.get(3).is_none());
      assert!(reg.get(5).is_none());
   }

   #[test]
   fn test_remove_invalidates_without_shrinking() {
      let mut reg = ControllerRegistry::new();
      reg.add(0);
      reg.add(1);
      reg.remove(0);
      assert!(reg.get(0).is_none());
      assert!(reg.get(1).is_some());
      // Unknown index is a no-op.
      reg.remove(9);
   }

   #[test]
   fn test_re_add_resets_state() {
      let mut reg = ControllerRegistry::new();
      let info = reg.add(0);
      info.pending_uuid = true;
      info.pending_uuids.push_back(PendingUuidOp {
         add: true,
         uuid: Uuid::nil(),
         service_hint: 0,
      });
      info.connections.push(AddrInfo {
         address: Address::ANY,
         address_type: AddressType::BrEdr,
      });

      let info = reg.add(0);
      assert!(!info.pending_uuid);
      assert!(info.pending_uuids.is_empty());
      assert!(info.connections.is_empty());
   }

   #[test]
   fn test_find_by_address() {
      let mut reg = ControllerRegistry::new();
      let addr: Address = "AA:BB:CC:DD:EE:FF".parse().unwrap();
      reg.add(2).address = addr;
      assert_eq!(reg.find_by_address(&addr), Some(2));
      assert_eq!(reg.find_by_address(&Address::ANY), None);
      reg.remove(2);
      assert_eq!(reg.find_by_address(&addr), None);
   }

   #[test]
   fn test_clear_pending_discards_queue() {
      let mut reg = ControllerRegistry::new();
      let info = reg.add(0);
      info.pending_uuid = true;
      info.pending_class = true;
      info.pending_powered = true;
      info.pending_cod_change = true;
      info.pending_uuids.push_back(PendingUuidOp {
         add: false,
         uuid: Uuid::nil(),
         service_hint: 0,
      });
      info.clear_pending();
      assert!(!info.pending_uuid);
      assert!(!info.pending_class);
      assert!(!info.pending_powered);
      assert!(!info.pending_cod_change);
      assert!(info.pending_uuids.is_empty());
   }
}
