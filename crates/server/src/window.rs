//! Client-visible window bookkeeping for remote (tile-entity) inventories.
//!
//! A remote window combines the tile entity's slots with the player's main
//! storage and hotbar, in that order. Clicks on the remote region defer to
//! the owning shard; clicks on the player region resolve locally in the
//! session.

use shardcraft_core::{BlockXyz, InvTypeId, SlotId, TxId, WindowId};
use shardcraft_proto::{ItemSlotVec, Packet};
use shardcraft_world::{PlayerInventory, Slot};
use tokio::time::Instant;

/// Player-region geometry shared by every window.
const PLAYER_MAIN_SLOTS: usize = 27;
const PLAYER_HOTBAR_SLOTS: usize = 9;
/// Window index of the first main-storage slot in the player inventory.
const PLAYER_MAIN_START: usize = 9;
/// Window index of the first hotbar slot in the player inventory.
const PLAYER_HOTBAR_START: usize = 36;

/// Where a combined-window slot index points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSlot {
    /// A slot of the remote inventory.
    Remote(usize),
    /// A window index into the player inventory.
    Player(usize),
    /// Out of range for this window.
    Invalid,
}

/// An open window onto a tile-entity inventory.
pub struct RemoteWindow {
    pub window_id: WindowId,
    pub block: BlockXyz,
    pub inv_type: InvTypeId,
    /// Snapshot of the remote slots, kept current via slot updates.
    pub contents: Vec<Slot>,
    /// A deferred click awaiting its outcome from the shard.
    pub pending_tx: Option<(TxId, Instant)>,
}

impl RemoteWindow {
    /// Open over a snapshot of the remote inventory.
    pub fn new(
        window_id: WindowId,
        block: BlockXyz,
        inv_type: InvTypeId,
        contents: Vec<Slot>,
    ) -> RemoteWindow {
        RemoteWindow {
            window_id,
            block,
            inv_type,
            contents,
            pending_tx: None,
        }
    }

    fn title(&self) -> &'static str {
        match self.inv_type {
            InvTypeId::CHEST => "Chest",
            InvTypeId::WORKBENCH => "Crafting",
            InvTypeId::FURNACE => "Furnace",
            _ => "Container",
        }
    }

    /// Slots in the remote region.
    pub fn remote_slots(&self) -> usize {
        self.contents.len()
    }

    /// Total combined window size.
    pub fn total_slots(&self) -> usize {
        self.remote_slots() + PLAYER_MAIN_SLOTS + PLAYER_HOTBAR_SLOTS
    }

    /// Classify a clicked slot index.
    pub fn classify(&self, slot: SlotId) -> WindowSlot {
        let index = slot.0;
        if index < 0 {
            return WindowSlot::Invalid;
        }
        let index = index as usize;
        if index < self.remote_slots() {
            WindowSlot::Remote(index)
        } else if index < self.remote_slots() + PLAYER_MAIN_SLOTS {
            WindowSlot::Player(PLAYER_MAIN_START + index - self.remote_slots())
        } else if index < self.total_slots() {
            WindowSlot::Player(
                PLAYER_HOTBAR_START + index - self.remote_slots() - PLAYER_MAIN_SLOTS,
            )
        } else {
            WindowSlot::Invalid
        }
    }

    /// The window-open and full window-items packets for this window.
    pub fn open_packets(&self, inventory: &PlayerInventory) -> Vec<Packet> {
        let mut slots: Vec<shardcraft_proto::ItemSlot> = self
            .contents
            .iter()
            .map(Slot::to_item_slot)
            .collect();
        for index in PLAYER_MAIN_START..PLAYER_MAIN_START + PLAYER_MAIN_SLOTS {
            slots.push(inventory.inventory().slot(index).to_item_slot());
        }
        for index in PLAYER_HOTBAR_START..PLAYER_HOTBAR_START + PLAYER_HOTBAR_SLOTS {
            slots.push(inventory.inventory().slot(index).to_item_slot());
        }

        vec![
            Packet::WindowOpen {
                window_id: self.window_id,
                inventory: self.inv_type,
                title: self.title().to_string(),
                num_slots: self.remote_slots() as u8,
            },
            Packet::WindowItems {
                window_id: self.window_id,
                slots: ItemSlotVec(slots),
            },
        ]
    }

    /// Apply a remote slot update to the snapshot.
    pub fn update_slot(&mut self, slot_id: SlotId, slot: Slot) {
        if let Some(entry) = self.contents.get_mut(slot_id.0.max(0) as usize) {
            *entry = slot;
        }
    }
}

/// The combined-window index a player-inventory window index maps to, for
/// forwarding local changes while a remote window is open.
pub fn combined_index_for_player_slot(remote_slots: usize, window_index: usize) -> Option<usize> {
    if (PLAYER_MAIN_START..PLAYER_MAIN_START + PLAYER_MAIN_SLOTS).contains(&window_index) {
        Some(remote_slots + window_index - PLAYER_MAIN_START)
    } else if (PLAYER_HOTBAR_START..PLAYER_HOTBAR_START + PLAYER_HOTBAR_SLOTS)
        .contains(&window_index)
    {
        Some(remote_slots + PLAYER_MAIN_SLOTS + window_index - PLAYER_HOTBAR_START)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chest_window() -> RemoteWindow {
        RemoteWindow::new(
            WindowId(1),
            BlockXyz::new(1, 64, 1),
            InvTypeId::CHEST,
            vec![Slot::empty(); 27],
        )
    }

    #[test]
    fn classify_regions() {
        let window = chest_window();
        assert_eq!(window.classify(SlotId(0)), WindowSlot::Remote(0));
        assert_eq!(window.classify(SlotId(26)), WindowSlot::Remote(26));
        // First player-main slot.
        assert_eq!(window.classify(SlotId(27)), WindowSlot::Player(9));
        assert_eq!(window.classify(SlotId(53)), WindowSlot::Player(35));
        // Hotbar.
        assert_eq!(window.classify(SlotId(54)), WindowSlot::Player(36));
        assert_eq!(window.classify(SlotId(62)), WindowSlot::Player(44));
        assert_eq!(window.classify(SlotId(63)), WindowSlot::Invalid);
        assert_eq!(window.classify(SlotId(-1)), WindowSlot::Invalid);
        assert_eq!(window.classify(SlotId(999)), WindowSlot::Invalid);
    }

    #[test]
    fn open_packets_have_combined_contents() {
        let window = chest_window();
        let inventory = PlayerInventory::new();
        let packets = window.open_packets(&inventory);

        match &packets[0] {
            Packet::WindowOpen {
                num_slots,
                inventory: inv_type,
                ..
            } => {
                assert_eq!(*num_slots, 27);
                assert_eq!(*inv_type, InvTypeId::CHEST);
            }
            other => panic!("expected WindowOpen, got {other:?}"),
        }
        match &packets[1] {
            Packet::WindowItems { slots, .. } => assert_eq!(slots.0.len(), 63),
            other => panic!("expected WindowItems, got {other:?}"),
        }
    }

    #[test]
    fn player_slot_mapping_round_trips() {
        let window = chest_window();
        for combined in 27i16..63 {
            let WindowSlot::Player(window_index) = window.classify(SlotId(combined)) else {
                panic!("slot {combined} should map to the player inventory");
            };
            assert_eq!(
                combined_index_for_player_slot(27, window_index),
                Some(combined as usize)
            );
        }
        assert_eq!(combined_index_for_player_slot(27, 0), None);
        assert_eq!(combined_index_for_player_slot(27, 5), None);
    }
}
