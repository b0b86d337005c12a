//! Shaped crafting recipes and the crafting grid.
//!
//! Recipes are shape-normalized: a 1x2 recipe matches wherever it sits in a
//! 2x2 or 3x3 grid. The recipe set loads from JSON with compiled-in
//! defaults and is read-only after startup.

use crate::block;
use crate::slot::Slot;
use serde::Deserialize;
use shardcraft_core::{ItemCount, ItemData, ItemTypeId};
use std::path::Path;
use tracing::warn;

/// One cell of a recipe shape; `None` means the cell must be empty.
pub type RecipeCell = Option<(ItemTypeId, Option<ItemData>)>;

/// A shaped recipe.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub name: String,
    pub width: u8,
    pub height: u8,
    /// Row-major cells, `width * height` long.
    pub cells: Vec<RecipeCell>,
    pub output: Slot,
}

#[derive(Debug, Deserialize)]
struct RecipeDescriptor {
    name: String,
    /// Rows of space-separated item ids; `_` marks an empty cell.
    rows: Vec<String>,
    output: i16,
    #[serde(default = "one")]
    count: i8,
}

fn one() -> i8 {
    1
}

impl Recipe {
    fn from_descriptor(desc: &RecipeDescriptor) -> Option<Recipe> {
        let height = desc.rows.len() as u8;
        let width = desc.rows.first()?.split_whitespace().count() as u8;
        if height == 0 || width == 0 {
            return None;
        }

        let mut cells = Vec::with_capacity((width * height) as usize);
        for row in &desc.rows {
            let row_cells: Vec<&str> = row.split_whitespace().collect();
            if row_cells.len() != width as usize {
                return None;
            }
            for cell in row_cells {
                if cell == "_" {
                    cells.push(None);
                } else {
                    cells.push(Some((ItemTypeId(cell.parse().ok()?), None)));
                }
            }
        }

        Some(Recipe {
            name: desc.name.clone(),
            width,
            height,
            cells,
            output: Slot::new(ItemTypeId(desc.output), ItemCount(desc.count), ItemData(0)),
        })
    }
}

/// The immutable set of known recipes.
#[derive(Debug, Default)]
pub struct RecipeSet {
    recipes: Vec<Recipe>,
}

impl RecipeSet {
    /// Build from a recipe list.
    pub fn new(recipes: Vec<Recipe>) -> RecipeSet {
        RecipeSet { recipes }
    }

    /// Number of known recipes.
    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Match a crafting grid (given as row-major slots of `width` columns)
    /// against the recipe set and return the crafted output, if any.
    pub fn matching_output(&self, width: u8, slots: &[Slot]) -> Option<Slot> {
        let height = if width == 0 {
            return None;
        } else {
            (slots.len() as u8) / width
        };

        // Normalize the grid: find the bounding box of non-empty cells.
        let mut min_x = width;
        let mut max_x = 0u8;
        let mut min_y = height;
        let mut max_y = 0u8;
        for y in 0..height {
            for x in 0..width {
                if !slots[(y * width + x) as usize].is_empty() {
                    min_x = min_x.min(x);
                    max_x = max_x.max(x);
                    min_y = min_y.min(y);
                    max_y = max_y.max(y);
                }
            }
        }
        if min_x > max_x {
            return None; // grid is empty
        }

        let used_w = max_x - min_x + 1;
        let used_h = max_y - min_y + 1;

        'recipe: for recipe in &self.recipes {
            if recipe.width != used_w || recipe.height != used_h {
                continue;
            }
            for y in 0..used_h {
                for x in 0..used_w {
                    let slot = &slots[((min_y + y) * width + min_x + x) as usize];
                    let cell = &recipe.cells[(y * recipe.width + x) as usize];
                    match cell {
                        None => {
                            if !slot.is_empty() {
                                continue 'recipe;
                            }
                        }
                        Some((item_type, data)) => {
                            if slot.is_empty() || slot.item_type != *item_type {
                                continue 'recipe;
                            }
                            if let Some(data) = data {
                                if slot.data != *data {
                                    continue 'recipe;
                                }
                            }
                        }
                    }
                }
            }
            return Some(recipe.output.clone());
        }
        None
    }

    /// The built-in recipe list.
    pub fn default_set() -> RecipeSet {
        let planks = ItemTypeId(block::ids::PLANKS.0 as i16);
        let cobble = ItemTypeId(block::ids::COBBLESTONE.0 as i16);
        let log = ItemTypeId(block::ids::LOG.0 as i16);
        let stick = ItemTypeId(280);
        let coal = ItemTypeId(263);

        fn shaped(name: &str, width: u8, height: u8, cells: Vec<RecipeCell>, output: Slot) -> Recipe {
            Recipe {
                name: name.to_string(),
                width,
                height,
                cells,
                output,
            }
        }

        let all = |item: ItemTypeId, n: usize| -> Vec<RecipeCell> {
            std::iter::repeat_with(|| Some((item, None))).take(n).collect()
        };

        RecipeSet::new(vec![
            shaped(
                "planks",
                1,
                1,
                all(log, 1),
                Slot::new(planks, ItemCount(4), ItemData(0)),
            ),
            shaped(
                "sticks",
                1,
                2,
                all(planks, 2),
                Slot::new(stick, ItemCount(4), ItemData(0)),
            ),
            shaped(
                "torches",
                1,
                2,
                vec![Some((coal, None)), Some((stick, None))],
                Slot::new(ItemTypeId(block::ids::TORCH.0 as i16), ItemCount(4), ItemData(0)),
            ),
            shaped(
                "workbench",
                2,
                2,
                all(planks, 4),
                Slot::new(
                    ItemTypeId(block::ids::WORKBENCH.0 as i16),
                    ItemCount(1),
                    ItemData(0),
                ),
            ),
            shaped(
                "chest",
                3,
                3,
                vec![
                    Some((planks, None)), Some((planks, None)), Some((planks, None)),
                    Some((planks, None)), None, Some((planks, None)),
                    Some((planks, None)), Some((planks, None)), Some((planks, None)),
                ],
                Slot::new(ItemTypeId(block::ids::CHEST.0 as i16), ItemCount(1), ItemData(0)),
            ),
            shaped(
                "furnace",
                3,
                3,
                vec![
                    Some((cobble, None)), Some((cobble, None)), Some((cobble, None)),
                    Some((cobble, None)), None, Some((cobble, None)),
                    Some((cobble, None)), Some((cobble, None)), Some((cobble, None)),
                ],
                Slot::new(ItemTypeId(block::ids::FURNACE.0 as i16), ItemCount(1), ItemData(0)),
            ),
            shaped(
                "wooden pickaxe",
                3,
                3,
                vec![
                    Some((planks, None)), Some((planks, None)), Some((planks, None)),
                    None, Some((stick, None)), None,
                    None, Some((stick, None)), None,
                ],
                Slot::new(ItemTypeId(270), ItemCount(1), ItemData(0)),
            ),
        ])
    }

    /// Load from a JSON descriptor file, falling back to the defaults on
    /// any error.
    pub fn load_or_default(path: &Path) -> RecipeSet {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Vec<RecipeDescriptor>>(&contents) {
                Ok(descriptors) => {
                    let recipes: Vec<Recipe> = descriptors
                        .iter()
                        .filter_map(Recipe::from_descriptor)
                        .collect();
                    if recipes.len() != descriptors.len() {
                        warn!(
                            "Ignored {} malformed recipes in {}",
                            descriptors.len() - recipes.len(),
                            path.display()
                        );
                    }
                    RecipeSet::new(recipes)
                }
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    RecipeSet::default_set()
                }
            },
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                }
                RecipeSet::default_set()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(ty: i16, n: i8) -> Slot {
        Slot::new(ItemTypeId(ty), ItemCount(n), ItemData(0))
    }

    #[test]
    fn planks_from_log_anywhere_in_grid() {
        let recipes = RecipeSet::default_set();

        // 2x2 grid, log in the top-left.
        let mut grid = vec![Slot::empty(); 4];
        grid[0] = slot(17, 1);
        let output = recipes.matching_output(2, &grid).unwrap();
        assert_eq!(output.item_type, ItemTypeId(5));
        assert_eq!(output.count, ItemCount(4));

        // Same recipe, bottom-right of a 3x3 grid.
        let mut grid = vec![Slot::empty(); 9];
        grid[8] = slot(17, 1);
        assert!(recipes.matching_output(3, &grid).is_some());
    }

    #[test]
    fn sticks_need_vertical_planks() {
        let recipes = RecipeSet::default_set();

        let mut grid = vec![Slot::empty(); 4];
        grid[0] = slot(5, 1);
        grid[2] = slot(5, 1); // column in a 2x2 grid
        let output = recipes.matching_output(2, &grid).unwrap();
        assert_eq!(output.item_type, ItemTypeId(280));

        // Horizontal placement matches nothing.
        let mut grid = vec![Slot::empty(); 4];
        grid[0] = slot(5, 1);
        grid[1] = slot(5, 1);
        assert!(recipes.matching_output(2, &grid).is_none());
    }

    #[test]
    fn workbench_needs_full_square() {
        let recipes = RecipeSet::default_set();

        let grid = vec![slot(5, 1), slot(5, 1), slot(5, 1), slot(5, 1)];
        let output = recipes.matching_output(2, &grid).unwrap();
        assert_eq!(output.item_type, ItemTypeId(58));

        let grid = vec![slot(5, 1), slot(5, 1), slot(5, 1), Slot::empty()];
        assert!(recipes.matching_output(2, &grid).is_none());
    }

    #[test]
    fn chest_ring_in_3x3() {
        let recipes = RecipeSet::default_set();
        let mut grid = vec![slot(5, 1); 9];
        grid[4] = Slot::empty();
        let output = recipes.matching_output(3, &grid).unwrap();
        assert_eq!(output.item_type, ItemTypeId(54));
    }

    #[test]
    fn pickaxe_shape_is_position_sensitive() {
        let recipes = RecipeSet::default_set();
        let mut grid = vec![Slot::empty(); 9];
        grid[0] = slot(5, 1);
        grid[1] = slot(5, 1);
        grid[2] = slot(5, 1);
        grid[4] = slot(280, 1);
        grid[7] = slot(280, 1);
        let output = recipes.matching_output(3, &grid).unwrap();
        assert_eq!(output.item_type, ItemTypeId(270));
    }

    #[test]
    fn empty_grid_matches_nothing() {
        let recipes = RecipeSet::default_set();
        assert!(recipes.matching_output(2, &vec![Slot::empty(); 4]).is_none());
        assert!(recipes.matching_output(0, &[]).is_none());
    }

    #[test]
    fn descriptor_parsing() {
        let json = r#"[
            {"name": "planks", "rows": ["17"], "output": 5, "count": 4},
            {"name": "bad", "rows": ["17 17", "17"], "output": 5}
        ]"#;
        let descriptors: Vec<RecipeDescriptor> = serde_json::from_str(json).unwrap();
        assert!(Recipe::from_descriptor(&descriptors[0]).is_some());
        // Ragged rows are rejected.
        assert!(Recipe::from_descriptor(&descriptors[1]).is_none());
    }
}
