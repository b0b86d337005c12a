//! The immutable rule set shared by every shard.
//!
//! Built once at startup from JSON definition files (with compiled-in
//! defaults) and never mutated afterwards, so shards read it without
//! locking.

use crate::block::{BlockRegistry, ItemRegistry};
use crate::crafting::RecipeSet;
use crate::furnace::FurnaceRecipes;
use std::path::Path;

/// Block, item, crafting and smelting rules.
#[derive(Debug)]
pub struct GameRules {
    pub blocks: BlockRegistry,
    pub items: ItemRegistry,
    pub recipes: RecipeSet,
    pub furnace: FurnaceRecipes,
}

impl GameRules {
    /// The compiled-in defaults.
    pub fn default_rules() -> GameRules {
        GameRules {
            blocks: BlockRegistry::default_registry(),
            items: ItemRegistry::default_registry(),
            recipes: RecipeSet::default_set(),
            furnace: FurnaceRecipes::default_set(),
        }
    }

    /// Load from a config directory (`blocks.json`, `recipes.json`);
    /// missing or malformed files fall back to the defaults per registry.
    pub fn load(config_dir: &Path) -> GameRules {
        GameRules {
            blocks: BlockRegistry::load_or_default(&config_dir.join("blocks.json")),
            items: ItemRegistry::default_registry(),
            recipes: RecipeSet::load_or_default(&config_dir.join("recipes.json")),
            furnace: FurnaceRecipes::default_set(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let rules = GameRules::default_rules();
        assert!(rules.blocks.get(crate::block::ids::CHEST).is_some());
        assert!(!rules.recipes.is_empty());
        assert!(rules
            .furnace
            .output_for(shardcraft_core::ItemTypeId(15))
            .is_some());
    }

    #[test]
    fn load_from_missing_dir_uses_defaults() {
        let rules = GameRules::load(Path::new("/nonexistent-config-dir"));
        assert!(rules.blocks.get(crate::block::ids::STONE).is_some());
    }
}
