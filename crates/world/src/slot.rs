//! Inventory slots.
//!
//! A slot is a value type: item type, count, metadata, and the optional NBT
//! compound that damageable items carry on the wire. Count zero or item
//! type -1 both mean "empty"; slot merging requires matching type and data.

use shardcraft_core::{ItemCount, ItemData, ItemTypeId, SlotId, WindowId};
use shardcraft_nbt::{Compound, Tag};
use shardcraft_proto::{ItemSlot, Packet};

/// Stack limit applied when the item registry has no specific entry.
pub const DEFAULT_MAX_STACK: i8 = 64;

/// A typed inventory cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Slot {
    pub item_type: ItemTypeId,
    pub count: ItemCount,
    pub data: ItemData,
    pub nbt: Option<Compound>,
}

impl Slot {
    /// The empty slot.
    pub fn empty() -> Slot {
        Slot {
            item_type: ItemTypeId::NULL,
            count: ItemCount(0),
            data: ItemData(0),
            nbt: None,
        }
    }

    /// A plain slot without NBT.
    pub fn new(item_type: ItemTypeId, count: ItemCount, data: ItemData) -> Slot {
        Slot {
            item_type,
            count,
            data,
            nbt: None,
        }
    }

    /// Whether this slot holds no items.
    pub fn is_empty(&self) -> bool {
        self.count.0 == 0 || self.item_type == ItemTypeId::NULL
    }

    /// Slots merge only when item type and data both match.
    pub fn is_same_type(&self, other: &Slot) -> bool {
        self.item_type == other.item_type && self.data == other.data
    }

    /// Reset to the canonical empty representation once drained.
    fn normalize(&mut self) {
        if self.count.0 <= 0 {
            *self = Slot::empty();
        }
    }

    /// Move as many items as fit from `src` into this slot. Returns true
    /// when anything moved.
    pub fn add(&mut self, src: &mut Slot, max_stack: i8) -> bool {
        if src.is_empty() {
            return false;
        }
        if !self.is_empty() && !self.is_same_type(src) {
            return false;
        }
        if self.count.0 >= max_stack {
            return false;
        }

        let space = max_stack - self.count.0;
        let moved = space.min(src.count.0);
        if moved <= 0 {
            return false;
        }

        if self.is_empty() {
            self.item_type = src.item_type;
            self.data = src.data;
            self.nbt = src.nbt.clone();
        }
        self.count.0 += moved;
        src.count.0 -= moved;
        src.normalize();
        true
    }

    /// Move exactly one item from `src` into this slot if types allow.
    pub fn add_one(&mut self, src: &mut Slot, max_stack: i8) -> bool {
        if src.is_empty() || self.count.0 >= max_stack {
            return false;
        }
        if !self.is_empty() && !self.is_same_type(src) {
            return false;
        }

        if self.is_empty() {
            self.item_type = src.item_type;
            self.data = src.data;
            self.nbt = src.nbt.clone();
        }
        self.count.0 += 1;
        src.count.0 -= 1;
        src.normalize();
        true
    }

    /// Take roughly half the stack (round up) into `dst`. `dst` must be
    /// empty.
    pub fn split_half(&mut self, dst: &mut Slot) -> bool {
        if self.is_empty() || !dst.is_empty() {
            return false;
        }

        let taken = (self.count.0 + 1) / 2;
        *dst = Slot {
            item_type: self.item_type,
            count: ItemCount(taken),
            data: self.data,
            nbt: self.nbt.clone(),
        };
        self.count.0 -= taken;
        self.normalize();
        true
    }

    /// Take a single item into a new slot.
    pub fn take_one(&mut self) -> Slot {
        if self.is_empty() {
            return Slot::empty();
        }
        let single = Slot {
            item_type: self.item_type,
            count: ItemCount(1),
            data: self.data,
            nbt: self.nbt.clone(),
        };
        self.count.0 -= 1;
        self.normalize();
        single
    }

    /// Remove one item in place.
    pub fn decrement(&mut self) {
        if !self.is_empty() {
            self.count.0 -= 1;
            self.normalize();
        }
    }

    /// Exchange contents with another slot.
    pub fn swap(&mut self, other: &mut Slot) {
        std::mem::swap(self, other);
    }

    /// The wire representation of this slot.
    pub fn to_item_slot(&self) -> ItemSlot {
        if self.is_empty() {
            ItemSlot::empty()
        } else {
            ItemSlot {
                item_type: self.item_type,
                count: self.count,
                data: self.data,
                nbt: self.nbt.clone(),
            }
        }
    }

    /// Build from the wire representation.
    pub fn from_item_slot(slot: &ItemSlot) -> Slot {
        if slot.is_empty() {
            Slot::empty()
        } else {
            Slot {
                item_type: slot.item_type,
                count: slot.count,
                data: slot.data,
                nbt: slot.nbt.clone(),
            }
        }
    }

    /// The window-set-slot packet describing this slot.
    pub fn update_packet(&self, window_id: WindowId, slot_id: SlotId) -> Packet {
        Packet::WindowSetSlot {
            window_id,
            slot_index: slot_id,
            item: self.to_item_slot(),
        }
    }

    /// Persist into an item compound (`id`/`Count`/`Damage`).
    pub fn marshal_nbt(&self, tag: &mut Compound) {
        tag.set("id", Tag::Short(self.item_type.0));
        tag.set("Count", Tag::Byte(self.count.0));
        tag.set("Damage", Tag::Short(self.data.0));
    }

    /// Restore from an item compound; absent keys produce an empty slot.
    pub fn unmarshal_nbt(tag: &Compound) -> Slot {
        let mut slot = Slot::new(
            ItemTypeId(tag.get_short("id").unwrap_or(-1)),
            ItemCount(tag.get_byte("Count").unwrap_or(0)),
            ItemData(tag.get_short("Damage").unwrap_or(0)),
        );
        slot.normalize();
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(ty: i16, count: i8) -> Slot {
        Slot::new(ItemTypeId(ty), ItemCount(count), ItemData(0))
    }

    #[test]
    fn empty_forms_are_equivalent() {
        assert!(Slot::empty().is_empty());
        assert!(stack(1, 0).is_empty());
        let drained = Slot::new(ItemTypeId::NULL, ItemCount(5), ItemData(0));
        assert!(drained.is_empty());
    }

    #[test]
    fn add_merges_matching_types() {
        let mut dst = stack(1, 30);
        let mut src = stack(1, 20);
        assert!(dst.add(&mut src, 64));
        assert_eq!(dst.count, ItemCount(50));
        assert!(src.is_empty());
    }

    #[test]
    fn add_respects_max_stack() {
        let mut dst = stack(1, 60);
        let mut src = stack(1, 20);
        assert!(dst.add(&mut src, 64));
        assert_eq!(dst.count, ItemCount(64));
        assert_eq!(src.count, ItemCount(16));
    }

    #[test]
    fn add_rejects_type_mismatch() {
        let mut dst = stack(1, 5);
        let mut mismatched = stack(2, 5);
        assert!(!dst.add(&mut mismatched, 64));

        let mut data_mismatch = Slot::new(ItemTypeId(1), ItemCount(5), ItemData(3));
        assert!(!dst.add(&mut data_mismatch, 64));
        assert_eq!(dst.count, ItemCount(5));
    }

    #[test]
    fn split_half_rounds_up() {
        let mut slot = stack(1, 5);
        let mut half = Slot::empty();
        assert!(slot.split_half(&mut half));
        assert_eq!(half.count, ItemCount(3));
        assert_eq!(slot.count, ItemCount(2));

        let mut one = stack(1, 1);
        let mut dst = Slot::empty();
        assert!(one.split_half(&mut dst));
        assert!(one.is_empty());
        assert_eq!(dst.count, ItemCount(1));
    }

    #[test]
    fn take_one_drains() {
        let mut slot = stack(4, 2);
        let first = slot.take_one();
        assert_eq!(first.count, ItemCount(1));
        assert_eq!(slot.count, ItemCount(1));
        let second = slot.take_one();
        assert_eq!(second.count, ItemCount(1));
        assert!(slot.is_empty());
        assert!(slot.take_one().is_empty());
    }

    #[test]
    fn nbt_round_trip() {
        let slot = Slot::new(ItemTypeId(276), ItemCount(1), ItemData(12));
        let mut tag = Compound::new();
        slot.marshal_nbt(&mut tag);
        assert_eq!(Slot::unmarshal_nbt(&tag), slot);
    }

    #[test]
    fn wire_round_trip() {
        let slot = stack(3, 7);
        assert_eq!(Slot::from_item_slot(&slot.to_item_slot()), slot);
        assert!(Slot::from_item_slot(&ItemSlot::empty()).is_empty());
    }
}
