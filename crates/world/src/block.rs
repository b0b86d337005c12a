//! Block types, the block registry and the item registry.
//!
//! Registries load from JSON definitions with compiled-in defaults for the
//! classic id assignments, and become read-only once the server starts.
//! Unknown block ids behave as solid, non-interactive blocks.

use serde::Deserialize;
use shardcraft_core::{BlockId, ItemCount, ItemTypeId};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Well-known block ids used by the built-in rules.
pub mod ids {
    use shardcraft_core::BlockId;

    pub const AIR: BlockId = BlockId(0);
    pub const STONE: BlockId = BlockId(1);
    pub const GRASS: BlockId = BlockId(2);
    pub const DIRT: BlockId = BlockId(3);
    pub const COBBLESTONE: BlockId = BlockId(4);
    pub const PLANKS: BlockId = BlockId(5);
    pub const BEDROCK: BlockId = BlockId(7);
    pub const WATER: BlockId = BlockId(8);
    pub const WATER_STILL: BlockId = BlockId(9);
    pub const LAVA: BlockId = BlockId(10);
    pub const LAVA_STILL: BlockId = BlockId(11);
    pub const SAND: BlockId = BlockId(12);
    pub const GRAVEL: BlockId = BlockId(13);
    pub const GOLD_ORE: BlockId = BlockId(14);
    pub const IRON_ORE: BlockId = BlockId(15);
    pub const COAL_ORE: BlockId = BlockId(16);
    pub const LOG: BlockId = BlockId(17);
    pub const LEAVES: BlockId = BlockId(18);
    pub const GLASS: BlockId = BlockId(20);
    pub const TORCH: BlockId = BlockId(50);
    pub const CHEST: BlockId = BlockId(54);
    pub const DIAMOND_ORE: BlockId = BlockId(56);
    pub const WORKBENCH: BlockId = BlockId(58);
    pub const FARMLAND: BlockId = BlockId(60);
    pub const FURNACE: BlockId = BlockId(61);
    pub const FURNACE_LIT: BlockId = BlockId(62);
    pub const SIGN_POST: BlockId = BlockId(63);
    pub const WALL_SIGN: BlockId = BlockId(68);
    pub const SNOW_LAYER: BlockId = BlockId(78);
}

/// The behavioural capability a block id maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AspectKind {
    /// Air-like: no interaction, nothing to destroy.
    Void,
    /// Plain destructible block spawning its drops when broken.
    #[default]
    Standard,
    /// Opens a chest tile-entity window.
    Chest,
    /// Opens a 3x3 crafting window.
    Workbench,
    /// Opens a furnace window; ticks fuel and smelting state.
    Furnace,
    /// Carries four lines of editable text.
    Sign,
}

impl AspectKind {
    /// Whether blocks of this aspect carry a tile entity.
    pub fn has_tile_entity(self) -> bool {
        matches!(
            self,
            AspectKind::Chest | AspectKind::Workbench | AspectKind::Furnace | AspectKind::Sign
        )
    }
}

/// An item dropped when a block is destroyed.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockDrop {
    pub item_type: i16,
    #[serde(default = "one")]
    pub count: i8,
    /// Drop chance in percent.
    #[serde(default = "always")]
    pub probability: u8,
}

fn one() -> i8 {
    1
}

fn always() -> u8 {
    100
}

/// Static per-block-id rules.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockType {
    pub id: u8,
    pub name: String,
    #[serde(default = "yes")]
    pub solid: bool,
    #[serde(default = "yes")]
    pub destructable: bool,
    /// Blocks may be placed against this block's faces.
    #[serde(default = "yes")]
    pub attachable: bool,
    /// Placing a block here overwrites this block.
    #[serde(default)]
    pub replaceable: bool,
    #[serde(default)]
    pub transparent: bool,
    #[serde(default)]
    pub drops: Vec<BlockDrop>,
    #[serde(default)]
    pub aspect: AspectKind,
}

fn yes() -> bool {
    true
}

impl BlockType {
    fn simple(id: BlockId, name: &str, aspect: AspectKind) -> BlockType {
        BlockType {
            id: id.0,
            name: name.to_string(),
            solid: true,
            destructable: true,
            attachable: true,
            replaceable: false,
            transparent: false,
            drops: Vec::new(),
            aspect,
        }
    }

    fn dropping(id: BlockId, name: &str, drop_item: ItemTypeId) -> BlockType {
        let mut block = BlockType::simple(id, name, AspectKind::Standard);
        block.drops.push(BlockDrop {
            item_type: drop_item.0,
            count: 1,
            probability: 100,
        });
        block
    }

    fn fluid(id: BlockId, name: &str) -> BlockType {
        BlockType {
            id: id.0,
            name: name.to_string(),
            solid: false,
            destructable: false,
            attachable: false,
            replaceable: true,
            transparent: true,
            drops: Vec::new(),
            aspect: AspectKind::Void,
        }
    }
}

/// Immutable block registry keyed by block id.
#[derive(Debug)]
pub struct BlockRegistry {
    types: Vec<Option<BlockType>>,
}

impl BlockRegistry {
    /// Build from a descriptor list; later duplicates override earlier ones.
    pub fn new(types: Vec<BlockType>) -> BlockRegistry {
        let mut slots: Vec<Option<BlockType>> = std::iter::repeat_with(|| None).take(256).collect();
        for block in types {
            let id = block.id as usize;
            slots[id] = Some(block);
        }
        BlockRegistry { types: slots }
    }

    /// Look up a block type.
    pub fn get(&self, id: BlockId) -> Option<&BlockType> {
        self.types[id.0 as usize].as_ref()
    }

    /// Solidity with the safe default: unknown block ids are solid so
    /// physics cannot escape the world through them.
    pub fn is_solid(&self, id: BlockId) -> bool {
        self.get(id).map(|b| b.solid).unwrap_or(true)
    }

    /// The aspect for a block id; unknown ids act as solid non-interactive
    /// standard blocks.
    pub fn aspect(&self, id: BlockId) -> AspectKind {
        self.get(id).map(|b| b.aspect).unwrap_or(AspectKind::Standard)
    }

    /// The built-in classic id assignments.
    pub fn default_registry() -> BlockRegistry {
        let mut air = BlockType::simple(ids::AIR, "air", AspectKind::Void);
        air.solid = false;
        air.destructable = false;
        air.attachable = false;
        air.replaceable = true;
        air.transparent = true;

        let mut torch = BlockType::dropping(ids::TORCH, "torch", ItemTypeId(50));
        torch.solid = false;
        torch.transparent = true;
        torch.attachable = false;

        let mut leaves = BlockType::simple(ids::LEAVES, "leaves", AspectKind::Standard);
        leaves.transparent = true;

        let mut bedrock = BlockType::simple(ids::BEDROCK, "bedrock", AspectKind::Standard);
        bedrock.destructable = false;

        let mut snow = BlockType::dropping(ids::SNOW_LAYER, "snow layer", ItemTypeId(332));
        snow.solid = false;
        snow.replaceable = true;
        snow.transparent = true;

        let mut sign_post = BlockType::dropping(ids::SIGN_POST, "sign post", ItemTypeId(323));
        sign_post.solid = false;
        sign_post.attachable = false;
        sign_post.aspect = AspectKind::Sign;

        let mut wall_sign = BlockType::dropping(ids::WALL_SIGN, "wall sign", ItemTypeId(323));
        wall_sign.solid = false;
        wall_sign.attachable = false;
        wall_sign.aspect = AspectKind::Sign;

        BlockRegistry::new(vec![
            air,
            BlockType::dropping(ids::STONE, "stone", ItemTypeId(ids::COBBLESTONE.0 as i16)),
            BlockType::dropping(ids::GRASS, "grass", ItemTypeId(ids::DIRT.0 as i16)),
            BlockType::dropping(ids::DIRT, "dirt", ItemTypeId(ids::DIRT.0 as i16)),
            BlockType::dropping(
                ids::COBBLESTONE,
                "cobblestone",
                ItemTypeId(ids::COBBLESTONE.0 as i16),
            ),
            BlockType::dropping(ids::PLANKS, "planks", ItemTypeId(ids::PLANKS.0 as i16)),
            bedrock,
            BlockType::fluid(ids::WATER, "water"),
            BlockType::fluid(ids::WATER_STILL, "still water"),
            BlockType::fluid(ids::LAVA, "lava"),
            BlockType::fluid(ids::LAVA_STILL, "still lava"),
            BlockType::dropping(ids::SAND, "sand", ItemTypeId(ids::SAND.0 as i16)),
            BlockType::dropping(ids::GRAVEL, "gravel", ItemTypeId(ids::GRAVEL.0 as i16)),
            BlockType::dropping(ids::GOLD_ORE, "gold ore", ItemTypeId(ids::GOLD_ORE.0 as i16)),
            BlockType::dropping(ids::IRON_ORE, "iron ore", ItemTypeId(ids::IRON_ORE.0 as i16)),
            BlockType::dropping(ids::COAL_ORE, "coal ore", ItemTypeId(263)),
            BlockType::dropping(ids::LOG, "log", ItemTypeId(ids::LOG.0 as i16)),
            leaves,
            BlockType::simple(ids::GLASS, "glass", AspectKind::Standard),
            torch,
            BlockType::dropping(ids::CHEST, "chest", ItemTypeId(ids::CHEST.0 as i16)),
            BlockType::dropping(ids::DIAMOND_ORE, "diamond ore", ItemTypeId(264)),
            BlockType::dropping(
                ids::WORKBENCH,
                "workbench",
                ItemTypeId(ids::WORKBENCH.0 as i16),
            ),
            BlockType::simple(ids::FARMLAND, "farmland", AspectKind::Standard),
            BlockType::dropping(ids::FURNACE, "furnace", ItemTypeId(ids::FURNACE.0 as i16)),
            BlockType::dropping(
                ids::FURNACE_LIT,
                "lit furnace",
                ItemTypeId(ids::FURNACE.0 as i16),
            ),
            sign_post,
            wall_sign,
        ])
        .with_tile_aspects()
    }

    fn with_tile_aspects(mut self) -> BlockRegistry {
        for (id, aspect) in [
            (ids::CHEST, AspectKind::Chest),
            (ids::WORKBENCH, AspectKind::Workbench),
            (ids::FURNACE, AspectKind::Furnace),
            (ids::FURNACE_LIT, AspectKind::Furnace),
        ] {
            if let Some(block) = self.types[id.0 as usize].as_mut() {
                block.aspect = aspect;
            }
        }
        self
    }

    /// Load from a JSON descriptor file, falling back to the defaults on
    /// any error.
    pub fn load_or_default(path: &Path) -> BlockRegistry {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Vec<BlockType>>(&contents) {
                Ok(types) => BlockRegistry::new(types),
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    BlockRegistry::default_registry()
                }
            },
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                }
                BlockRegistry::default_registry()
            }
        }
    }
}

/// Static per-item-type rules.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemType {
    pub id: i16,
    pub name: String,
    #[serde(default = "default_stack")]
    pub max_stack: i8,
}

fn default_stack() -> i8 {
    crate::slot::DEFAULT_MAX_STACK
}

/// Immutable item registry keyed by item type id.
#[derive(Debug, Default)]
pub struct ItemRegistry {
    types: HashMap<i16, ItemType>,
}

impl ItemRegistry {
    /// Build from a descriptor list.
    pub fn new(types: Vec<ItemType>) -> ItemRegistry {
        ItemRegistry {
            types: types.into_iter().map(|t| (t.id, t)).collect(),
        }
    }

    /// Look up an item type.
    pub fn get(&self, id: ItemTypeId) -> Option<&ItemType> {
        self.types.get(&id.0)
    }

    /// Stack limit for an item; unknown items stack to the default.
    pub fn max_stack(&self, id: ItemTypeId) -> i8 {
        self.get(id)
            .map(|t| t.max_stack)
            .unwrap_or(crate::slot::DEFAULT_MAX_STACK)
    }

    /// A registry with sensible entries for the built-in block set plus the
    /// handful of non-block items the default rules reference.
    pub fn default_registry() -> ItemRegistry {
        let mut types = vec![
            ItemType { id: 263, name: "coal".into(), max_stack: 64 },
            ItemType { id: 264, name: "diamond".into(), max_stack: 64 },
            ItemType { id: 265, name: "iron ingot".into(), max_stack: 64 },
            ItemType { id: 266, name: "gold ingot".into(), max_stack: 64 },
            ItemType { id: 280, name: "stick".into(), max_stack: 64 },
            ItemType { id: 323, name: "sign".into(), max_stack: 16 },
            ItemType { id: 332, name: "snowball".into(), max_stack: 16 },
            ItemType { id: 270, name: "wooden pickaxe".into(), max_stack: 1 },
            ItemType { id: 271, name: "wooden axe".into(), max_stack: 1 },
            ItemType { id: 269, name: "wooden shovel".into(), max_stack: 1 },
        ];
        for (id, name) in [
            (1i16, "stone"),
            (2, "grass"),
            (3, "dirt"),
            (4, "cobblestone"),
            (5, "planks"),
            (12, "sand"),
            (13, "gravel"),
            (17, "log"),
            (20, "glass"),
            (50, "torch"),
            (54, "chest"),
            (58, "workbench"),
            (61, "furnace"),
        ] {
            types.push(ItemType {
                id,
                name: name.into(),
                max_stack: 64,
            });
        }
        ItemRegistry::new(types)
    }
}

/// Tool item ids matched against `ItemCount(amount)` quantities when
/// computing item counts; the number of items a block drop yields.
#[derive(Debug, Clone, Copy)]
pub struct DropRoll {
    pub item_type: ItemTypeId,
    pub count: ItemCount,
}

impl BlockDrop {
    /// Roll this drop entry; `roll` is a percentage sample in `0..100`.
    pub fn roll(&self, roll: u8) -> Option<DropRoll> {
        if roll < self.probability {
            Some(DropRoll {
                item_type: ItemTypeId(self.item_type),
                count: ItemCount(self.count),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_classic_ids() {
        let registry = BlockRegistry::default_registry();
        assert_eq!(registry.get(ids::AIR).unwrap().name, "air");
        assert!(!registry.get(ids::AIR).unwrap().solid);
        assert!(registry.get(ids::AIR).unwrap().replaceable);
        assert!(registry.get(ids::STONE).unwrap().solid);
        assert!(!registry.get(ids::BEDROCK).unwrap().destructable);
        assert_eq!(registry.aspect(ids::CHEST), AspectKind::Chest);
        assert_eq!(registry.aspect(ids::FURNACE_LIT), AspectKind::Furnace);
        assert_eq!(registry.aspect(ids::WORKBENCH), AspectKind::Workbench);
        assert_eq!(registry.aspect(ids::WALL_SIGN), AspectKind::Sign);
    }

    #[test]
    fn unknown_blocks_are_solid_and_standard() {
        let registry = BlockRegistry::default_registry();
        assert!(registry.get(BlockId(200)).is_none());
        assert!(registry.is_solid(BlockId(200)));
        assert_eq!(registry.aspect(BlockId(200)), AspectKind::Standard);
    }

    #[test]
    fn stone_drops_cobblestone() {
        let registry = BlockRegistry::default_registry();
        let stone = registry.get(ids::STONE).unwrap();
        assert_eq!(stone.drops.len(), 1);
        let roll = stone.drops[0].roll(0).unwrap();
        assert_eq!(roll.item_type, ItemTypeId(4));
        assert_eq!(roll.count, ItemCount(1));
        // Probability 100 never misses.
        assert!(stone.drops[0].roll(99).is_some());
    }

    #[test]
    fn json_descriptors_parse() {
        let json = r#"[
            {"id": 1, "name": "stone", "drops": [{"item_type": 4}]},
            {"id": 54, "name": "chest", "aspect": "chest"}
        ]"#;
        let types: Vec<BlockType> = serde_json::from_str(json).unwrap();
        let registry = BlockRegistry::new(types);
        assert_eq!(registry.aspect(BlockId(54)), AspectKind::Chest);
        assert_eq!(registry.get(BlockId(1)).unwrap().drops[0].count, 1);
    }

    #[test]
    fn item_registry_stack_limits() {
        let items = ItemRegistry::default_registry();
        assert_eq!(items.max_stack(ItemTypeId(270)), 1);
        assert_eq!(items.max_stack(ItemTypeId(332)), 16);
        assert_eq!(
            items.max_stack(ItemTypeId(9999)),
            crate::slot::DEFAULT_MAX_STACK
        );
    }
}
