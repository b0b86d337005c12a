//! Furnace smelting state.
//!
//! A furnace owns a three-slot inventory (input, fuel, output) and two
//! progress bars (smelt progress and remaining fire). It ticks inside its
//! chunk's block tick and reports the slots and bars that changed so the
//! tile entity can fan updates out to window subscribers.

use crate::inventory::Inventory;
use crate::slot::Slot;
use shardcraft_core::{ItemCount, ItemData, ItemTypeId, PrgBarId, PrgBarValue};
use std::collections::HashMap;

/// Furnace slot indices within its window.
pub const FURNACE_SLOT_INPUT: usize = 0;
pub const FURNACE_SLOT_FUEL: usize = 1;
pub const FURNACE_SLOT_OUTPUT: usize = 2;

/// Ticks of smelting required per item (10 seconds at 20 day-ticks/s,
/// counted in internal ticks).
const SMELT_TICKS: i64 = 50;

/// Smelting recipes and fuel burn durations.
#[derive(Debug)]
pub struct FurnaceRecipes {
    outputs: HashMap<i16, ItemTypeId>,
    /// Burn duration in internal ticks per fuel item type.
    fuels: HashMap<i16, i64>,
}

impl FurnaceRecipes {
    /// The built-in smelting table.
    pub fn default_set() -> FurnaceRecipes {
        let mut outputs = HashMap::new();
        outputs.insert(15, ItemTypeId(265)); // iron ore -> iron ingot
        outputs.insert(14, ItemTypeId(266)); // gold ore -> gold ingot
        outputs.insert(12, ItemTypeId(20)); // sand -> glass
        outputs.insert(4, ItemTypeId(1)); // cobblestone -> stone
        outputs.insert(17, ItemTypeId(263)); // log -> coal (charcoal)

        let mut fuels = HashMap::new();
        fuels.insert(263, 400i64); // coal: 80 s
        fuels.insert(5, 75); // planks: 15 s
        fuels.insert(280, 25); // stick: 5 s
        fuels.insert(17, 75); // log

        FurnaceRecipes { outputs, fuels }
    }

    /// The product for an input item, if it smelts.
    pub fn output_for(&self, input: ItemTypeId) -> Option<ItemTypeId> {
        self.outputs.get(&input.0).copied()
    }

    /// Burn duration for a fuel item, if it burns.
    pub fn burn_ticks(&self, fuel: ItemTypeId) -> Option<i64> {
        self.fuels.get(&fuel.0).copied()
    }
}

/// What changed during one furnace tick.
#[derive(Debug, Default)]
pub struct FurnaceTickResult {
    pub changed_slots: Vec<usize>,
    pub changed_bars: Vec<(PrgBarId, PrgBarValue)>,
    /// Lit state flipped; the owning chunk swaps the block id.
    pub lit_changed: Option<bool>,
}

/// The mutable state of one furnace.
#[derive(Debug)]
pub struct FurnaceState {
    inv: Inventory,
    fire_remaining: i64,
    fire_total: i64,
    smelt_progress: i64,
}

impl Default for FurnaceState {
    fn default() -> Self {
        Self::new()
    }
}

impl FurnaceState {
    /// A cold, empty furnace.
    pub fn new() -> FurnaceState {
        FurnaceState {
            inv: Inventory::new(3),
            fire_remaining: 0,
            fire_total: 0,
            smelt_progress: 0,
        }
    }

    /// The furnace inventory.
    pub fn inventory(&self) -> &Inventory {
        &self.inv
    }

    /// The furnace inventory, mutably. Callers tick afterwards, which
    /// re-evaluates lighting and progress.
    pub fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inv
    }

    /// Whether the furnace currently burns.
    pub fn is_lit(&self) -> bool {
        self.fire_remaining > 0
    }

    fn can_smelt(&self, recipes: &FurnaceRecipes) -> bool {
        let input = self.inv.slot(FURNACE_SLOT_INPUT);
        if input.is_empty() {
            return false;
        }
        let Some(product) = recipes.output_for(input.item_type) else {
            return false;
        };
        let output = self.inv.slot(FURNACE_SLOT_OUTPUT);
        output.is_empty()
            || (output.item_type == product && output.count.0 < crate::slot::DEFAULT_MAX_STACK)
    }

    /// Advance one internal tick.
    pub fn tick(&mut self, recipes: &FurnaceRecipes) -> FurnaceTickResult {
        let mut result = FurnaceTickResult::default();
        let was_lit = self.is_lit();

        if self.fire_remaining > 0 {
            self.fire_remaining -= 1;
            result.changed_bars.push((
                PrgBarId::FURNACE_FIRE,
                PrgBarValue(self.fire_bar_value()),
            ));
        }

        if self.can_smelt(recipes) {
            // Consume fuel when the fire is out.
            if self.fire_remaining == 0 {
                let fuel = self.inv.slot_mut(FURNACE_SLOT_FUEL);
                if let Some(burn) = (!fuel.is_empty())
                    .then(|| recipes.burn_ticks(fuel.item_type))
                    .flatten()
                {
                    fuel.decrement();
                    self.fire_remaining = burn;
                    self.fire_total = burn;
                    result.changed_slots.push(FURNACE_SLOT_FUEL);
                    result.changed_bars.push((
                        PrgBarId::FURNACE_FIRE,
                        PrgBarValue(self.fire_bar_value()),
                    ));
                }
            }

            if self.fire_remaining > 0 {
                self.smelt_progress += 1;
                if self.smelt_progress >= SMELT_TICKS {
                    self.smelt_progress = 0;
                    let input = self.inv.slot_mut(FURNACE_SLOT_INPUT);
                    if let Some(product) = recipes.output_for(input.item_type) {
                        input.decrement();
                        let mut one = Slot::new(product, ItemCount(1), ItemData(0));
                        self.inv
                            .slot_mut(FURNACE_SLOT_OUTPUT)
                            .add(&mut one, crate::slot::DEFAULT_MAX_STACK);
                        result.changed_slots.push(FURNACE_SLOT_INPUT);
                        result.changed_slots.push(FURNACE_SLOT_OUTPUT);
                    }
                }
                result.changed_bars.push((
                    PrgBarId::FURNACE_PROGRESS,
                    PrgBarValue(self.progress_bar_value()),
                ));
            }
        } else if self.smelt_progress != 0 {
            self.smelt_progress = 0;
            result
                .changed_bars
                .push((PrgBarId::FURNACE_PROGRESS, PrgBarValue(0)));
        }

        if self.is_lit() != was_lit {
            result.lit_changed = Some(self.is_lit());
        }
        result
    }

    /// Smelt progress scaled to the client's 0..180 bar range.
    fn progress_bar_value(&self) -> i16 {
        (self.smelt_progress * 180 / SMELT_TICKS) as i16
    }

    /// Remaining fire scaled to the client's 0..250 bar range.
    fn fire_bar_value(&self) -> i16 {
        if self.fire_total == 0 {
            0
        } else {
            (self.fire_remaining * 250 / self.fire_total) as i16
        }
    }

    /// Current progress bar values, sent when a window opens.
    pub fn bar_values(&self) -> [(PrgBarId, PrgBarValue); 2] {
        [
            (
                PrgBarId::FURNACE_PROGRESS,
                PrgBarValue(self.progress_bar_value()),
            ),
            (PrgBarId::FURNACE_FIRE, PrgBarValue(self.fire_bar_value())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(ty: i16, n: i8) -> Slot {
        Slot::new(ItemTypeId(ty), ItemCount(n), ItemData(0))
    }

    #[test]
    fn cold_furnace_does_nothing() {
        let recipes = FurnaceRecipes::default_set();
        let mut furnace = FurnaceState::new();
        let result = furnace.tick(&recipes);
        assert!(result.changed_slots.is_empty());
        assert!(result.lit_changed.is_none());
        assert!(!furnace.is_lit());
    }

    #[test]
    fn lights_when_fuel_and_input_present() {
        let recipes = FurnaceRecipes::default_set();
        let mut furnace = FurnaceState::new();
        furnace.inventory_mut().set_slot(FURNACE_SLOT_INPUT, slot(15, 1));
        furnace.inventory_mut().set_slot(FURNACE_SLOT_FUEL, slot(263, 1));

        let result = furnace.tick(&recipes);
        assert_eq!(result.lit_changed, Some(true));
        assert!(furnace.is_lit());
        assert!(furnace.inventory().slot(FURNACE_SLOT_FUEL).is_empty());
    }

    #[test]
    fn smelts_after_enough_ticks() {
        let recipes = FurnaceRecipes::default_set();
        let mut furnace = FurnaceState::new();
        furnace.inventory_mut().set_slot(FURNACE_SLOT_INPUT, slot(15, 2));
        furnace.inventory_mut().set_slot(FURNACE_SLOT_FUEL, slot(263, 1));

        let mut produced = false;
        for _ in 0..60 {
            let result = furnace.tick(&recipes);
            if result.changed_slots.contains(&FURNACE_SLOT_OUTPUT) {
                produced = true;
                break;
            }
        }
        assert!(produced);
        let output = furnace.inventory().slot(FURNACE_SLOT_OUTPUT);
        assert_eq!(output.item_type, ItemTypeId(265));
        assert_eq!(output.count, ItemCount(1));
        assert_eq!(
            furnace.inventory().slot(FURNACE_SLOT_INPUT).count,
            ItemCount(1)
        );
    }

    #[test]
    fn fire_goes_out_without_input() {
        let recipes = FurnaceRecipes::default_set();
        let mut furnace = FurnaceState::new();
        furnace.inventory_mut().set_slot(FURNACE_SLOT_INPUT, slot(4, 1));
        // Sticks burn for just 25 ticks.
        furnace.inventory_mut().set_slot(FURNACE_SLOT_FUEL, slot(280, 1));

        assert_eq!(furnace.tick(&recipes).lit_changed, Some(true));
        furnace.inventory_mut().set_slot(FURNACE_SLOT_INPUT, Slot::empty());

        let mut went_out = false;
        for _ in 0..30 {
            if furnace.tick(&recipes).lit_changed == Some(false) {
                went_out = true;
                break;
            }
        }
        assert!(went_out);
        assert!(!furnace.is_lit());
    }

    #[test]
    fn unsmeltable_input_never_lights() {
        let recipes = FurnaceRecipes::default_set();
        let mut furnace = FurnaceState::new();
        furnace.inventory_mut().set_slot(FURNACE_SLOT_INPUT, slot(264, 1));
        furnace.inventory_mut().set_slot(FURNACE_SLOT_FUEL, slot(263, 1));

        for _ in 0..10 {
            furnace.tick(&recipes);
        }
        assert!(!furnace.is_lit());
        assert_eq!(furnace.inventory().slot(FURNACE_SLOT_FUEL).count, ItemCount(1));
    }
}
