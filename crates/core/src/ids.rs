//! Identifier newtypes shared between the wire protocol and the world state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A world entity (player, mob, item or object). Allocated monotonically by
/// [`crate::EntityIdAllocator`]; never zero for a live entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct EntityId(pub i32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Block type id. The block grid stores one of these per cell.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct BlockId(pub u8);

impl BlockId {
    /// Air, the empty block.
    pub const AIR: BlockId = BlockId(0);
}

/// Item type id. `-1` encodes "no item" in wire slots.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ItemTypeId(pub i16);

impl ItemTypeId {
    /// The null item type used to encode empty slots.
    pub const NULL: ItemTypeId = ItemTypeId(-1);

    /// Item ids below 256 double as block ids. Returns the block id when
    /// this item is a placeable block.
    pub fn to_block_id(self) -> Option<BlockId> {
        if (0..256).contains(&self.0) {
            Some(BlockId(self.0 as u8))
        } else {
            None
        }
    }
}

/// Item metadata; for tools and armour this is wear, for others a variant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ItemData(pub i16);

/// Number of items in a stack or slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ItemCount(pub i8);

/// A client-visible inventory window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct WindowId(pub i8);

impl WindowId {
    /// The pseudo-window holding the item on the mouse cursor.
    pub const CURSOR: WindowId = WindowId(-1);
    /// The player's own inventory window.
    pub const INVENTORY: WindowId = WindowId(0);
    /// First id usable for transient (chest/workbench/furnace) windows.
    pub const FREE_MIN: WindowId = WindowId(1);
    /// Last id usable for transient windows.
    pub const FREE_MAX: WindowId = WindowId(127);
}

/// A slot index within a window.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct SlotId(pub i16);

impl SlotId {
    /// The cursor pseudo-slot.
    pub const CURSOR: SlotId = SlotId(-1);
    /// Sent by clients that clicked outside any window.
    pub const NULL: SlotId = SlotId(999);
}

/// Window transaction id, echoed back in window-transaction replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct TxId(pub i16);

/// Progress bar selector within a window (furnace smelt/fire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct PrgBarId(pub i16);

impl PrgBarId {
    /// Furnace smelting progress.
    pub const FURNACE_PROGRESS: PrgBarId = PrgBarId(0);
    /// Furnace remaining fuel.
    pub const FURNACE_FIRE: PrgBarId = PrgBarId(1);
}

/// Progress bar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct PrgBarValue(pub i16);

/// The kind of inventory shown by a window-open packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvTypeId(pub i8);

impl InvTypeId {
    /// A chest window.
    pub const CHEST: InvTypeId = InvTypeId(0);
    /// A workbench (3x3 crafting) window.
    pub const WORKBENCH: InvTypeId = InvTypeId(1);
    /// A furnace window.
    pub const FURNACE: InvTypeId = InvTypeId(2);
    /// A dispenser window.
    pub const DISPENSER: InvTypeId = InvTypeId(3);
}

/// Which world a position refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct DimensionId(pub i8);

impl DimensionId {
    /// The nether.
    pub const NETHER: DimensionId = DimensionId(-1);
    /// The normal overworld.
    pub const NORMAL: DimensionId = DimensionId(0);
}

/// Server difficulty as sent in login/respawn packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct GameDifficulty(pub i8);

impl GameDifficulty {
    /// The default difficulty used by this server.
    pub const NORMAL: GameDifficulty = GameDifficulty(2);
}

/// Mob type id as carried in mob-spawn packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MobType(pub u8);

impl MobType {
    /// Creeper.
    pub const CREEPER: MobType = MobType(50);
    /// Skeleton.
    pub const SKELETON: MobType = MobType(51);
    /// Zombie.
    pub const ZOMBIE: MobType = MobType(54);
    /// Pig.
    pub const PIG: MobType = MobType(90);
    /// Sheep.
    pub const SHEEP: MobType = MobType(91);
    /// Cow.
    pub const COW: MobType = MobType(92);
    /// Hen.
    pub const HEN: MobType = MobType(93);
}

/// Object (vehicle/projectile/falling block) type id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjTypeId(pub i8);

impl ObjTypeId {
    /// A boat.
    pub const BOAT: ObjTypeId = ObjTypeId(1);
    /// A minecart.
    pub const MINECART: ObjTypeId = ObjTypeId(10);
    /// Primed TNT.
    pub const ACTIVATED_TNT: ObjTypeId = ObjTypeId(50);
    /// A fired arrow.
    pub const ARROW: ObjTypeId = ObjTypeId(60);
    /// Falling sand.
    pub const FALLING_SAND: ObjTypeId = ObjTypeId(70);
    /// Falling gravel.
    pub const FALLING_GRAVEL: ObjTypeId = ObjTypeId(71);
}

/// A block face. `NULL` is sent when no face applies to the interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Face(pub i8);

impl Face {
    /// No face; block location data present but not meaningful.
    pub const NULL: Face = Face(-1);
    /// The underside of a block.
    pub const BOTTOM: Face = Face(0);
    /// The top of a block.
    pub const TOP: Face = Face(1);
    /// -Z.
    pub const WEST: Face = Face(2);
    /// +Z.
    pub const EAST: Face = Face(3);
    /// -X.
    pub const NORTH: Face = Face(4);
    /// +X.
    pub const SOUTH: Face = Face(5);

    /// Whether this is one of the six real faces.
    pub fn is_valid(self) -> bool {
        (0..=5).contains(&self.0)
    }

    /// The unit offset from a block to its neighbour through this face.
    /// `NULL` and out-of-range values yield a zero offset.
    pub fn dxyz(self) -> (i32, i8, i32) {
        match self {
            Face::BOTTOM => (0, -1, 0),
            Face::TOP => (0, 1, 0),
            Face::WEST => (0, 0, -1),
            Face::EAST => (0, 0, 1),
            Face::NORTH => (-1, 0, 0),
            Face::SOUTH => (1, 0, 0),
            _ => (0, 0, 0),
        }
    }
}

/// Digging status reported by player-block-hit packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DigStatus(pub u8);

impl DigStatus {
    /// Player started digging a block.
    pub const STARTED: DigStatus = DigStatus(0);
    /// Player finished digging; the block broke client-side.
    pub const BLOCK_BROKE: DigStatus = DigStatus(2);
    /// Player pressed the drop-item key; no block involved.
    pub const DROP_ITEM: DigStatus = DigStatus(4);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_type_to_block_id() {
        assert_eq!(ItemTypeId(1).to_block_id(), Some(BlockId(1)));
        assert_eq!(ItemTypeId(255).to_block_id(), Some(BlockId(255)));
        assert_eq!(ItemTypeId(256).to_block_id(), None);
        assert_eq!(ItemTypeId::NULL.to_block_id(), None);
    }

    #[test]
    fn face_offsets() {
        assert_eq!(Face::TOP.dxyz(), (0, 1, 0));
        assert_eq!(Face::BOTTOM.dxyz(), (0, -1, 0));
        assert_eq!(Face::NORTH.dxyz(), (-1, 0, 0));
        assert_eq!(Face::NULL.dxyz(), (0, 0, 0));
        assert!(!Face::NULL.is_valid());
        assert!(Face::SOUTH.is_valid());
    }
}
