//! Inventories and click handling.
//!
//! An [`Inventory`] is a fixed-length ordered sequence of slots. Clicks
//! carry the cursor slot with them and mutate both the clicked slot and the
//! cursor; the outcome feeds the window-transaction reply. The player's own
//! inventory (main + armour + 2x2 crafting + hotbar, window id 0) is a
//! specialization with the classic window slot mapping.

use crate::crafting::RecipeSet;
use crate::slot::Slot;
use shardcraft_core::{ItemTypeId, SlotId, TxId};
use shardcraft_nbt::{Compound, Tag};

/// Result of applying a window click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// The click was applied.
    Accepted,
    /// The click was refused; client state should be resynced.
    Rejected,
    /// A remote inventory will deliver the outcome later.
    Deferred,
}

/// A window click as received from the wire, with the player's cursor.
#[derive(Debug, Clone)]
pub struct Click {
    pub slot_id: SlotId,
    pub cursor: Slot,
    pub right_click: bool,
    pub shift_click: bool,
    pub tx_id: TxId,
    /// What the client believed the slot held; informational only.
    pub expected_slot: Slot,
}

/// Outcome of a click against a concrete inventory.
#[derive(Debug)]
pub struct ClickOutcome {
    pub state: TxState,
    pub cursor: Slot,
    /// Indices of slots whose contents changed.
    pub changed: Vec<usize>,
}

/// A fixed-length ordered sequence of slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    slots: Vec<Slot>,
}

impl Inventory {
    /// An inventory of `size` empty slots.
    pub fn new(size: usize) -> Inventory {
        Inventory {
            slots: vec![Slot::empty(); size],
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether every slot is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Slot::is_empty)
    }

    /// Borrow a slot.
    pub fn slot(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    /// Borrow a slot mutably.
    pub fn slot_mut(&mut self, index: usize) -> &mut Slot {
        &mut self.slots[index]
    }

    /// Replace a slot wholesale.
    pub fn set_slot(&mut self, index: usize, slot: Slot) {
        self.slots[index] = slot;
    }

    /// Snapshot every slot, for window-items packets.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Apply a click with cursor semantics:
    /// left click swaps or merges the cursor with the slot; right click
    /// takes half from the slot into an empty cursor, or places one item
    /// from the cursor.
    pub fn click(&mut self, click: &Click, max_stack: impl Fn(ItemTypeId) -> i8) -> ClickOutcome {
        let index = click.slot_id.0;
        if index < 0 || index as usize >= self.slots.len() {
            return ClickOutcome {
                state: TxState::Rejected,
                cursor: click.cursor.clone(),
                changed: Vec::new(),
            };
        }
        let index = index as usize;

        let mut cursor = click.cursor.clone();
        let slot = &mut self.slots[index];
        let before = slot.clone();

        if click.right_click {
            if cursor.is_empty() {
                slot.split_half(&mut cursor);
            } else if slot.is_empty() || slot.is_same_type(&cursor) {
                let limit = max_stack(cursor.item_type);
                slot.add_one(&mut cursor, limit);
            } else {
                slot.swap(&mut cursor);
            }
        } else if cursor.is_empty() {
            slot.swap(&mut cursor);
        } else if slot.is_same_type(&cursor) {
            let limit = max_stack(cursor.item_type);
            if !slot.add(&mut cursor, limit) {
                slot.swap(&mut cursor);
            }
        } else {
            slot.swap(&mut cursor);
        }

        let changed = if *slot == before { Vec::new() } else { vec![index] };
        ClickOutcome {
            state: TxState::Accepted,
            cursor,
            changed,
        }
    }

    /// Merge an item stack into the inventory: existing stacks first, then
    /// the first empty slot. Mutates `src` in place; anything left over did
    /// not fit. Returns the indices of slots that changed.
    pub fn put_item(&mut self, src: &mut Slot, max_stack: i8) -> Vec<usize> {
        let mut changed = Vec::new();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            if src.is_empty() {
                break;
            }
            if !slot.is_empty() && slot.is_same_type(src) && slot.add(src, max_stack) {
                changed.push(index);
            }
        }

        if !src.is_empty() {
            for (index, slot) in self.slots.iter_mut().enumerate() {
                if slot.is_empty() {
                    slot.swap(src);
                    changed.push(index);
                    break;
                }
            }
        }

        changed
    }

    /// Whether `item` could be at least partially absorbed.
    pub fn can_take_item(&self, item: &Slot, max_stack: i8) -> bool {
        if item.is_empty() {
            return false;
        }
        self.slots.iter().any(|slot| {
            slot.is_empty() || (slot.is_same_type(item) && slot.count.0 < max_stack)
        })
    }

    /// Persist slots under their indices; only non-empty slots get entries.
    pub fn marshal_nbt(&self, offset: i32) -> Vec<Tag> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.is_empty())
            .map(|(index, slot)| {
                let mut tag = Compound::new();
                slot.marshal_nbt(&mut tag);
                tag.set("Slot", Tag::Byte((index as i32 + offset) as i8));
                Tag::Compound(tag)
            })
            .collect()
    }
}

/// Window slot layout of the player inventory (window id 0): crafting
/// output, 2x2 crafting grid, armour, main storage, hotbar.
pub const PLAYER_WINDOW_SLOTS: usize = 45;
const CRAFT_OUTPUT_SLOT: usize = 0;
const CRAFT_GRID_START: usize = 1; // 4 slots
const ARMOR_START: usize = 5; // 4 slots
const MAIN_START: usize = 9; // 27 slots
const HOTBAR_START: usize = 36; // 9 slots

/// Number of hotbar slots.
pub const HOTBAR_SIZE: usize = 9;

/// The player's own inventory with held-item tracking.
#[derive(Debug, Clone)]
pub struct PlayerInventory {
    /// Window-mapped slots, `PLAYER_WINDOW_SLOTS` long.
    inv: Inventory,
    holding: usize,
}

impl Default for PlayerInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerInventory {
    /// An empty player inventory holding hotbar slot 0.
    pub fn new() -> PlayerInventory {
        PlayerInventory {
            inv: Inventory::new(PLAYER_WINDOW_SLOTS),
            holding: 0,
        }
    }

    /// The whole window-mapped inventory.
    pub fn inventory(&self) -> &Inventory {
        &self.inv
    }

    /// The whole window-mapped inventory, mutably.
    pub fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inv
    }

    /// Select the held hotbar slot. Out-of-range ids are refused.
    pub fn set_holding(&mut self, slot_id: SlotId) -> bool {
        if (0..HOTBAR_SIZE as i16).contains(&slot_id.0) {
            self.holding = slot_id.0 as usize;
            true
        } else {
            false
        }
    }

    /// The currently held slot.
    pub fn held_item(&self) -> &Slot {
        self.inv.slot(HOTBAR_START + self.holding)
    }

    /// The window index of the currently held hotbar slot.
    pub fn held_window_index(&self) -> usize {
        HOTBAR_START + self.holding
    }

    /// The held item's type, or null when empty.
    pub fn held_item_type(&self) -> ItemTypeId {
        let held = self.held_item();
        if held.is_empty() {
            ItemTypeId(0)
        } else {
            held.item_type
        }
    }

    /// Take a single item off the held stack.
    pub fn take_one_held(&mut self) -> Slot {
        self.inv.slot_mut(HOTBAR_START + self.holding).take_one()
    }

    /// Put back one previously taken held item (failed placement).
    pub fn return_one_held(&mut self, mut item: Slot, max_stack: i8) -> bool {
        self.inv
            .slot_mut(HOTBAR_START + self.holding)
            .add(&mut item, max_stack)
    }

    /// Absorb an item stack, hotbar first then main storage. Mutates the
    /// source; returns changed window slot indices.
    pub fn put_item(&mut self, src: &mut Slot, max_stack: i8) -> Vec<usize> {
        let mut changed = Vec::new();

        for merge_only in [true, false] {
            for index in (HOTBAR_START..HOTBAR_START + HOTBAR_SIZE).chain(MAIN_START..HOTBAR_START)
            {
                if src.is_empty() {
                    return changed;
                }
                let slot = self.inv.slot_mut(index);
                if merge_only {
                    if !slot.is_empty() && slot.is_same_type(src) && slot.add(src, max_stack) {
                        changed.push(index);
                    }
                } else if slot.is_empty() {
                    slot.swap(src);
                    changed.push(index);
                    return changed;
                }
            }
        }

        changed
    }

    /// Whether an offered item would fit anywhere in hotbar or main
    /// storage.
    pub fn can_take_item(&self, item: &Slot, max_stack: i8) -> bool {
        if item.is_empty() {
            return false;
        }
        (MAIN_START..HOTBAR_START + HOTBAR_SIZE).any(|index| {
            let slot = self.inv.slot(index);
            slot.is_empty() || (slot.is_same_type(item) && slot.count.0 < max_stack)
        })
    }

    /// Refresh the 2x2 crafting output from the grid contents.
    pub fn update_craft_output(&mut self, recipes: &RecipeSet) -> bool {
        let grid: Vec<Slot> = (CRAFT_GRID_START..CRAFT_GRID_START + 4)
            .map(|i| self.inv.slot(i).clone())
            .collect();
        let output = recipes.matching_output(2, &grid).unwrap_or_else(Slot::empty);
        if *self.inv.slot(CRAFT_OUTPUT_SLOT) != output {
            self.inv.set_slot(CRAFT_OUTPUT_SLOT, output);
            true
        } else {
            false
        }
    }

    /// Consume one of each crafting ingredient after the output was taken.
    pub fn consume_craft_ingredients(&mut self) -> Vec<usize> {
        let mut changed = Vec::new();
        for index in CRAFT_GRID_START..CRAFT_GRID_START + 4 {
            let slot = self.inv.slot_mut(index);
            if !slot.is_empty() {
                slot.decrement();
                changed.push(index);
            }
        }
        changed
    }

    /// The crafting output window slot index.
    pub fn craft_output_slot() -> usize {
        CRAFT_OUTPUT_SLOT
    }

    /// Whether a window slot index is in the 2x2 crafting grid.
    pub fn is_craft_grid_slot(index: usize) -> bool {
        (CRAFT_GRID_START..CRAFT_GRID_START + 4).contains(&index)
    }

    /// Persist to the player compound's inventory list. On-disk slot
    /// numbering: hotbar 0-8, main 9-35, armour 100-103.
    pub fn marshal_nbt(&self, tag: &mut Compound) {
        let mut items = Vec::new();
        for (window_index, disk_slot) in Self::disk_slot_mapping() {
            let slot = self.inv.slot(window_index);
            if slot.is_empty() {
                continue;
            }
            let mut item = Compound::new();
            slot.marshal_nbt(&mut item);
            item.set("Slot", Tag::Byte(disk_slot));
            items.push(Tag::Compound(item));
        }
        tag.set("Inventory", Tag::List(items));
    }

    /// Restore from the player compound's inventory list; unknown disk
    /// slots are ignored.
    pub fn unmarshal_nbt(&mut self, tag: &Compound) {
        let Some(Tag::List(items)) = tag.get("Inventory") else {
            return;
        };

        for item in items {
            let Tag::Compound(item) = item else { continue };
            let Some(disk_slot) = item.get_byte("Slot") else {
                continue;
            };
            if let Some(window_index) = Self::window_index_for_disk_slot(disk_slot) {
                self.inv.set_slot(window_index, Slot::unmarshal_nbt(item));
            }
        }
    }

    fn disk_slot_mapping() -> impl Iterator<Item = (usize, i8)> {
        let hotbar = (0..HOTBAR_SIZE).map(|i| (HOTBAR_START + i, i as i8));
        let main = (0..27).map(|i| (MAIN_START + i, (9 + i) as i8));
        let armor = (0..4).map(|i| (ARMOR_START + i, (100 + i) as i8));
        hotbar.chain(main).chain(armor)
    }

    fn window_index_for_disk_slot(disk_slot: i8) -> Option<usize> {
        match disk_slot {
            0..=8 => Some(HOTBAR_START + disk_slot as usize),
            9..=35 => Some(MAIN_START + disk_slot as usize - 9),
            100..=103 => Some(ARMOR_START + disk_slot as usize - 100),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardcraft_core::ItemData;

    fn slot(ty: i16, n: i8) -> Slot {
        Slot::new(ItemTypeId(ty), ItemCount(n), ItemData(0))
    }

    fn click(slot_id: i16, cursor: Slot, right: bool) -> Click {
        Click {
            slot_id: SlotId(slot_id),
            cursor,
            right_click: right,
            shift_click: false,
            tx_id: TxId(1),
            expected_slot: Slot::empty(),
        }
    }

    fn stack64(_: ItemTypeId) -> i8 {
        64
    }

    #[test]
    fn left_click_picks_up_stack() {
        let mut inv = Inventory::new(9);
        inv.set_slot(3, slot(1, 10));

        let outcome = inv.click(&click(3, Slot::empty(), false), stack64);
        assert_eq!(outcome.state, TxState::Accepted);
        assert_eq!(outcome.cursor, slot(1, 10));
        assert!(inv.slot(3).is_empty());
        assert_eq!(outcome.changed, vec![3]);
    }

    #[test]
    fn left_click_merges_cursor_into_slot() {
        let mut inv = Inventory::new(9);
        inv.set_slot(0, slot(1, 60));

        let outcome = inv.click(&click(0, slot(1, 10), false), stack64);
        assert_eq!(inv.slot(0).count, ItemCount(64));
        assert_eq!(outcome.cursor, slot(1, 6));
    }

    #[test]
    fn left_click_swaps_mismatched_types() {
        let mut inv = Inventory::new(9);
        inv.set_slot(0, slot(1, 5));

        let outcome = inv.click(&click(0, slot(2, 7), false), stack64);
        assert_eq!(*inv.slot(0), slot(2, 7));
        assert_eq!(outcome.cursor, slot(1, 5));
    }

    #[test]
    fn right_click_takes_half() {
        let mut inv = Inventory::new(9);
        inv.set_slot(0, slot(1, 9));

        let outcome = inv.click(&click(0, Slot::empty(), true), stack64);
        assert_eq!(outcome.cursor, slot(1, 5));
        assert_eq!(inv.slot(0).count, ItemCount(4));
    }

    #[test]
    fn right_click_places_one() {
        let mut inv = Inventory::new(9);

        let outcome = inv.click(&click(0, slot(1, 5), true), stack64);
        assert_eq!(*inv.slot(0), slot(1, 1));
        assert_eq!(outcome.cursor, slot(1, 4));
    }

    #[test]
    fn out_of_range_click_rejected() {
        let mut inv = Inventory::new(9);
        let outcome = inv.click(&click(99, slot(1, 5), false), stack64);
        assert_eq!(outcome.state, TxState::Rejected);
        assert_eq!(outcome.cursor, slot(1, 5));
        assert!(outcome.changed.is_empty());
    }

    #[test]
    fn put_item_merges_then_fills() {
        let mut inv = Inventory::new(4);
        inv.set_slot(1, slot(1, 60));

        let mut src = slot(1, 10);
        let changed = inv.put_item(&mut src, 64);
        assert!(src.is_empty());
        assert_eq!(inv.slot(1).count, ItemCount(64));
        assert_eq!(inv.slot(0).count, ItemCount(6));
        assert_eq!(changed, vec![1, 0]);
    }

    #[test]
    fn put_item_reports_overflow() {
        let mut inv = Inventory::new(1);
        inv.set_slot(0, slot(1, 64));

        let mut src = slot(2, 5);
        let changed = inv.put_item(&mut src, 64);
        assert!(changed.is_empty());
        assert_eq!(src, slot(2, 5));
        assert!(!inv.can_take_item(&src, 64));
    }

    #[test]
    fn player_inventory_held_item() {
        let mut inv = PlayerInventory::new();
        assert!(inv.held_item().is_empty());
        assert_eq!(inv.held_item_type(), ItemTypeId(0));

        inv.inventory_mut().set_slot(36, slot(277, 1));
        assert_eq!(inv.held_item_type(), ItemTypeId(277));

        assert!(inv.set_holding(SlotId(3)));
        assert!(inv.held_item().is_empty());
        assert!(!inv.set_holding(SlotId(9)));
        assert!(!inv.set_holding(SlotId(-1)));
    }

    #[test]
    fn take_one_held_drains_stack() {
        let mut inv = PlayerInventory::new();
        inv.inventory_mut().set_slot(36, slot(3, 2));

        assert_eq!(inv.take_one_held(), slot(3, 1));
        assert_eq!(inv.take_one_held(), slot(3, 1));
        assert!(inv.take_one_held().is_empty());
    }

    #[test]
    fn player_put_item_prefers_hotbar() {
        let mut inv = PlayerInventory::new();
        let mut src = slot(1, 10);
        let changed = inv.put_item(&mut src, 64);
        assert_eq!(changed, vec![36]);
        assert!(src.is_empty());
    }

    #[test]
    fn craft_output_follows_grid() {
        let recipes = RecipeSet::default_set();
        let mut inv = PlayerInventory::new();

        inv.inventory_mut().set_slot(1, slot(17, 1));
        assert!(inv.update_craft_output(&recipes));
        assert_eq!(inv.inventory().slot(0).item_type, ItemTypeId(5));

        inv.consume_craft_ingredients();
        assert!(inv.inventory().slot(1).is_empty());
        assert!(inv.update_craft_output(&recipes));
        assert!(inv.inventory().slot(0).is_empty());
    }

    #[test]
    fn nbt_round_trip_preserves_layout() {
        let mut inv = PlayerInventory::new();
        inv.inventory_mut().set_slot(36, slot(277, 1)); // hotbar 0
        inv.inventory_mut().set_slot(9, slot(4, 32)); // main 9
        inv.inventory_mut().set_slot(5, slot(310, 1)); // armour 100

        let mut tag = Compound::new();
        inv.marshal_nbt(&mut tag);

        let mut restored = PlayerInventory::new();
        restored.unmarshal_nbt(&tag);
        assert_eq!(*restored.inventory().slot(36), slot(277, 1));
        assert_eq!(*restored.inventory().slot(9), slot(4, 32));
        assert_eq!(*restored.inventory().slot(5), slot(310, 1));
    }
}
