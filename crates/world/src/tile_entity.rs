//! Tile entities: persistent per-block state.
//!
//! A chunk maps block indices to tile entities. Chests, workbenches and
//! furnaces carry inventories that players subscribe windows to; signs
//! carry text. A tile entity dies with its block.

use crate::client::PlayerHandle;
use crate::furnace::{FurnaceRecipes, FurnaceState, FurnaceTickResult};
use crate::inventory::{Click, ClickOutcome, Inventory, TxState};
use crate::rules::GameRules;
use crate::slot::Slot;
use shardcraft_core::{BlockXyz, EntityId, InvTypeId, SlotId};
use shardcraft_nbt::{Compound, Tag};
use std::collections::HashMap;
use tracing::debug;

/// Chest window size.
pub const CHEST_SLOTS: usize = 27;
/// Workbench window: 3x3 grid plus the output at slot 0.
pub const WORKBENCH_SLOTS: usize = 10;
const WORKBENCH_OUTPUT: usize = 0;

/// The state variants a block position can carry.
#[derive(Debug)]
pub enum TileState {
    Chest { inv: Inventory },
    Workbench { inv: Inventory },
    Furnace { state: FurnaceState },
    Sign { lines: [String; 4] },
}

impl TileState {
    /// Fresh state for a block aspect, if that aspect carries one.
    pub fn for_aspect(aspect: crate::block::AspectKind) -> Option<TileState> {
        match aspect {
            crate::block::AspectKind::Chest => Some(TileState::Chest {
                inv: Inventory::new(CHEST_SLOTS),
            }),
            crate::block::AspectKind::Workbench => Some(TileState::Workbench {
                inv: Inventory::new(WORKBENCH_SLOTS),
            }),
            crate::block::AspectKind::Furnace => Some(TileState::Furnace {
                state: FurnaceState::new(),
            }),
            crate::block::AspectKind::Sign => Some(TileState::Sign {
                lines: Default::default(),
            }),
            _ => None,
        }
    }

    /// The window descriptor for this state, if it opens a window.
    pub fn window_params(&self) -> Option<(InvTypeId, usize)> {
        match self {
            TileState::Chest { .. } => Some((InvTypeId::CHEST, CHEST_SLOTS)),
            TileState::Workbench { .. } => Some((InvTypeId::WORKBENCH, WORKBENCH_SLOTS)),
            TileState::Furnace { .. } => Some((InvTypeId::FURNACE, 3)),
            TileState::Sign { .. } => None,
        }
    }

    fn slots_snapshot(&self) -> Vec<Slot> {
        match self {
            TileState::Chest { inv } | TileState::Workbench { inv } => inv.slots().to_vec(),
            TileState::Furnace { state } => state.inventory().slots().to_vec(),
            TileState::Sign { .. } => Vec::new(),
        }
    }
}

/// A tile entity with its window subscribers.
pub struct TileEntity {
    pub block: BlockXyz,
    pub state: TileState,
    subscribers: HashMap<EntityId, PlayerHandle>,
}

impl std::fmt::Debug for TileEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileEntity")
            .field("block", &self.block)
            .field("state", &self.state)
            .field("subscribers", &self.subscribers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TileEntity {
    /// Wrap fresh state at a block position.
    pub fn new(block: BlockXyz, state: TileState) -> TileEntity {
        TileEntity {
            block,
            state,
            subscribers: HashMap::new(),
        }
    }

    /// Open this tile entity's window for a player: record the
    /// subscription and send the current contents (and furnace bars).
    pub fn subscribe(&mut self, player: PlayerHandle) {
        let Some((inv_type, _)) = self.state.window_params() else {
            return;
        };

        player.inventory_subscribed(self.block, inv_type, self.state.slots_snapshot());
        if let TileState::Furnace { state } = &self.state {
            for (bar, value) in state.bar_values() {
                player.inventory_progress_update(self.block, bar, value);
            }
        }
        self.subscribers.insert(player.entity_id(), player);
    }

    /// Drop a player's window subscription. Workbench grids return their
    /// contents to the player when the last subscriber leaves.
    pub fn unsubscribe(&mut self, entity_id: EntityId) -> Vec<Slot> {
        let leaving = self.subscribers.remove(&entity_id);

        if self.subscribers.is_empty() {
            if let TileState::Workbench { inv } = &mut self.state {
                let mut returned = Vec::new();
                for index in 1..WORKBENCH_SLOTS {
                    let slot = inv.slot_mut(index);
                    if !slot.is_empty() {
                        let mut taken = Slot::empty();
                        slot.swap(&mut taken);
                        returned.push(taken);
                    }
                }
                inv.set_slot(WORKBENCH_OUTPUT, Slot::empty());
                if let (Some(player), false) = (&leaving, returned.is_empty()) {
                    for slot in &returned {
                        player.give_item(self.block.mid_point_to_abs_xyz(), slot.clone());
                    }
                    return Vec::new();
                }
                return returned;
            }
        }
        Vec::new()
    }

    /// Whether any player has this window open.
    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    /// Notify the block's destruction: close every window. Returns the
    /// contents to scatter as drops.
    pub fn destroyed(&mut self) -> Vec<Slot> {
        for player in self.subscribers.values() {
            player.inventory_unsubscribed(self.block);
        }
        self.subscribers.clear();

        let mut contents = Vec::new();
        let inv = match &mut self.state {
            TileState::Chest { inv } | TileState::Workbench { inv } => inv,
            TileState::Furnace { state } => state.inventory_mut(),
            TileState::Sign { .. } => return contents,
        };
        for index in 0..inv.len() {
            let slot = inv.slot_mut(index);
            if !slot.is_empty() {
                let mut taken = Slot::empty();
                slot.swap(&mut taken);
                contents.push(taken);
            }
        }
        contents
    }

    /// Apply a remote window click and fan the results out to every
    /// subscriber. The clicking player also receives the cursor update and
    /// the transaction outcome.
    pub fn click(&mut self, player: &PlayerHandle, click: &Click, rules: &GameRules) {
        let outcome = self.apply_click(click, rules);

        // Slot updates go to everyone with the window open.
        for index in &outcome.changed {
            let slot = self.slot_snapshot(*index);
            for subscriber in self.subscribers.values() {
                subscriber.inventory_slot_update(self.block, SlotId(*index as i16), slot.clone());
            }
        }

        player.inventory_cursor_update(self.block, outcome.cursor.clone());
        player.inventory_tx_state(self.block, click.tx_id, outcome.state == TxState::Accepted);
    }

    fn slot_snapshot(&self, index: usize) -> Slot {
        match &self.state {
            TileState::Chest { inv } | TileState::Workbench { inv } => inv.slot(index).clone(),
            TileState::Furnace { state } => state.inventory().slot(index).clone(),
            TileState::Sign { .. } => Slot::empty(),
        }
    }

    fn apply_click(&mut self, click: &Click, rules: &GameRules) -> ClickOutcome {
        match &mut self.state {
            TileState::Chest { inv } => {
                inv.click(click, |item| rules.items.max_stack(item))
            }
            TileState::Workbench { inv } => {
                if click.slot_id.0 as usize == WORKBENCH_OUTPUT {
                    Self::take_craft_output(inv, click, &rules.recipes)
                } else {
                    let mut outcome = inv.click(click, |item| rules.items.max_stack(item));
                    if Self::refresh_workbench_output(inv, &rules.recipes) {
                        outcome.changed.push(WORKBENCH_OUTPUT);
                    }
                    outcome
                }
            }
            TileState::Furnace { state } => {
                state.inventory_mut().click(click, |item| rules.items.max_stack(item))
            }
            TileState::Sign { .. } => ClickOutcome {
                state: TxState::Rejected,
                cursor: click.cursor.clone(),
                changed: Vec::new(),
            },
        }
    }

    fn refresh_workbench_output(inv: &mut Inventory, recipes: &crate::crafting::RecipeSet) -> bool {
        let grid: Vec<Slot> = (1..WORKBENCH_SLOTS).map(|i| inv.slot(i).clone()).collect();
        let output = recipes.matching_output(3, &grid).unwrap_or_else(Slot::empty);
        if *inv.slot(WORKBENCH_OUTPUT) != output {
            inv.set_slot(WORKBENCH_OUTPUT, output);
            true
        } else {
            false
        }
    }

    fn take_craft_output(
        inv: &mut Inventory,
        click: &Click,
        recipes: &crate::crafting::RecipeSet,
    ) -> ClickOutcome {
        let output = inv.slot(WORKBENCH_OUTPUT).clone();
        if output.is_empty() || (!click.cursor.is_empty() && !click.cursor.is_same_type(&output)) {
            return ClickOutcome {
                state: TxState::Rejected,
                cursor: click.cursor.clone(),
                changed: Vec::new(),
            };
        }

        let mut cursor = click.cursor.clone();
        let mut produced = output.clone();
        if !cursor.add(&mut produced, crate::slot::DEFAULT_MAX_STACK) || !produced.is_empty() {
            return ClickOutcome {
                state: TxState::Rejected,
                cursor: click.cursor.clone(),
                changed: Vec::new(),
            };
        }

        let mut changed = Vec::new();
        for index in 1..WORKBENCH_SLOTS {
            let slot = inv.slot_mut(index);
            if !slot.is_empty() {
                slot.decrement();
                changed.push(index);
            }
        }
        Self::refresh_workbench_output(inv, recipes);
        changed.push(WORKBENCH_OUTPUT);

        ClickOutcome {
            state: TxState::Accepted,
            cursor,
            changed,
        }
    }

    /// Tick furnace state; other tile entities are inert. Returns whether
    /// the furnace wants to stay in the active-block set.
    pub fn tick(&mut self, recipes: &FurnaceRecipes) -> Option<FurnaceTickResult> {
        let TileState::Furnace { state } = &mut self.state else {
            return None;
        };

        let result = state.tick(recipes);

        for index in &result.changed_slots {
            let slot = state.inventory().slot(*index).clone();
            for subscriber in self.subscribers.values() {
                subscriber.inventory_slot_update(self.block, SlotId(*index as i16), slot.clone());
            }
        }
        for (bar, value) in &result.changed_bars {
            for subscriber in self.subscribers.values() {
                subscriber.inventory_progress_update(self.block, *bar, *value);
            }
        }

        Some(result)
    }

    /// Update a sign's text; rejects oversized lines.
    pub fn set_sign_text(&mut self, lines: [String; 4]) -> bool {
        let TileState::Sign { lines: stored } = &mut self.state else {
            return false;
        };
        if lines.iter().any(|line| line.chars().count() > 15) {
            debug!("rejecting oversized sign text at {:?}", self.block);
            return false;
        }
        *stored = lines;
        true
    }

    /// Persist to an on-disk compound (`id`, position, variant payload).
    pub fn marshal_nbt(&self) -> Compound {
        let mut tag = Compound::new();
        tag.set("x", Tag::Int(self.block.x));
        tag.set("y", Tag::Int(self.block.y as i32));
        tag.set("z", Tag::Int(self.block.z));

        match &self.state {
            TileState::Chest { inv } => {
                tag.set("id", Tag::String("Chest".into()));
                tag.set("Items", Tag::List(inv.marshal_nbt(0)));
            }
            TileState::Workbench { inv } => {
                tag.set("id", Tag::String("Workbench".into()));
                tag.set("Items", Tag::List(inv.marshal_nbt(0)));
            }
            TileState::Furnace { state } => {
                tag.set("id", Tag::String("Furnace".into()));
                tag.set("Items", Tag::List(state.inventory().marshal_nbt(0)));
            }
            TileState::Sign { lines } => {
                tag.set("id", Tag::String("Sign".into()));
                for (i, line) in lines.iter().enumerate() {
                    tag.set(&format!("Text{}", i + 1), Tag::String(line.clone()));
                }
            }
        }
        tag
    }

    /// Restore from an on-disk compound; unknown ids yield `None`.
    pub fn unmarshal_nbt(tag: &Compound) -> Option<TileEntity> {
        let block = BlockXyz {
            x: tag.get_int("x")?,
            y: tag.get_int("y")? as i8,
            z: tag.get_int("z")?,
        };

        let state = match tag.get_string("id")? {
            "Chest" => TileState::Chest {
                inv: Self::inventory_from_items(tag, CHEST_SLOTS),
            },
            "Workbench" => TileState::Workbench {
                inv: Self::inventory_from_items(tag, WORKBENCH_SLOTS),
            },
            "Furnace" => {
                let mut state = FurnaceState::new();
                let loaded = Self::inventory_from_items(tag, 3);
                for index in 0..3 {
                    state.inventory_mut().set_slot(index, loaded.slot(index).clone());
                }
                TileState::Furnace { state }
            }
            "Sign" => {
                let mut lines: [String; 4] = Default::default();
                for (i, line) in lines.iter_mut().enumerate() {
                    if let Some(text) = tag.get_string(&format!("Text{}", i + 1)) {
                        *line = text.to_string();
                    }
                }
                TileState::Sign { lines }
            }
            other => {
                debug!("ignoring unknown tile entity id {other:?}");
                return None;
            }
        };

        Some(TileEntity::new(block, state))
    }

    fn inventory_from_items(tag: &Compound, size: usize) -> Inventory {
        let mut inv = Inventory::new(size);
        if let Some(Tag::List(items)) = tag.get("Items") {
            for item in items {
                let Tag::Compound(item) = item else { continue };
                let Some(index) = item.get_byte("Slot") else { continue };
                if (0..size as i8).contains(&index) {
                    inv.set_slot(index as usize, Slot::unmarshal_nbt(item));
                }
            }
        }
        inv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::AspectKind;
    use shardcraft_core::{ItemCount, ItemData, ItemTypeId, TxId};

    fn slot(ty: i16, n: i8) -> Slot {
        Slot::new(ItemTypeId(ty), ItemCount(n), ItemData(0))
    }

    fn rules() -> GameRules {
        GameRules::default_rules()
    }

    fn click_on(slot_id: i16, cursor: Slot) -> Click {
        Click {
            slot_id: SlotId(slot_id),
            cursor,
            right_click: false,
            shift_click: false,
            tx_id: TxId(7),
            expected_slot: Slot::empty(),
        }
    }

    #[test]
    fn aspect_state_mapping() {
        assert!(matches!(
            TileState::for_aspect(AspectKind::Chest),
            Some(TileState::Chest { .. })
        ));
        assert!(matches!(
            TileState::for_aspect(AspectKind::Furnace),
            Some(TileState::Furnace { .. })
        ));
        assert!(TileState::for_aspect(AspectKind::Standard).is_none());
        assert!(TileState::for_aspect(AspectKind::Void).is_none());
    }

    #[test]
    fn chest_click_mutates_inventory() {
        let rules = rules();
        let mut chest = TileEntity::new(
            BlockXyz::new(1, 64, 1),
            TileState::for_aspect(AspectKind::Chest).unwrap(),
        );

        let outcome = chest.apply_click(&click_on(5, slot(1, 10)), &rules);
        assert_eq!(outcome.state, TxState::Accepted);
        assert!(outcome.cursor.is_empty());
        assert_eq!(chest.slot_snapshot(5), slot(1, 10));
    }

    #[test]
    fn workbench_grid_produces_output() {
        let rules = rules();
        let mut bench = TileEntity::new(
            BlockXyz::new(0, 64, 0),
            TileState::for_aspect(AspectKind::Workbench).unwrap(),
        );

        // Drop a log into grid slot 1; output should become planks.
        let outcome = bench.apply_click(&click_on(1, slot(17, 1)), &rules);
        assert!(outcome.changed.contains(&WORKBENCH_OUTPUT));
        assert_eq!(bench.slot_snapshot(WORKBENCH_OUTPUT).item_type, ItemTypeId(5));

        // Taking the output consumes the grid.
        let outcome = bench.apply_click(&click_on(0, Slot::empty()), &rules);
        assert_eq!(outcome.state, TxState::Accepted);
        assert_eq!(outcome.cursor.item_type, ItemTypeId(5));
        assert_eq!(outcome.cursor.count, ItemCount(4));
        assert!(bench.slot_snapshot(1).is_empty());
        assert!(bench.slot_snapshot(WORKBENCH_OUTPUT).is_empty());
    }

    #[test]
    fn craft_output_click_with_mismatched_cursor_rejected() {
        let rules = rules();
        let mut bench = TileEntity::new(
            BlockXyz::new(0, 64, 0),
            TileState::for_aspect(AspectKind::Workbench).unwrap(),
        );
        bench.apply_click(&click_on(1, slot(17, 1)), &rules);

        let outcome = bench.apply_click(&click_on(0, slot(1, 1)), &rules);
        assert_eq!(outcome.state, TxState::Rejected);
        // Grid unchanged.
        assert_eq!(bench.slot_snapshot(1), slot(17, 1));
    }

    #[test]
    fn destroyed_returns_contents() {
        let rules = rules();
        let mut chest = TileEntity::new(
            BlockXyz::new(1, 64, 1),
            TileState::for_aspect(AspectKind::Chest).unwrap(),
        );
        chest.apply_click(&click_on(0, slot(1, 10)), &rules);
        chest.apply_click(&click_on(9, slot(4, 3)), &rules);

        let contents = chest.destroyed();
        assert_eq!(contents.len(), 2);
        assert!(contents.contains(&slot(1, 10)));
        assert!(contents.contains(&slot(4, 3)));
    }

    #[test]
    fn sign_text_length_limit() {
        let mut sign = TileEntity::new(
            BlockXyz::new(0, 64, 0),
            TileState::for_aspect(AspectKind::Sign).unwrap(),
        );
        assert!(sign.set_sign_text([
            "hello".into(),
            String::new(),
            String::new(),
            String::new()
        ]));
        assert!(!sign.set_sign_text([
            "a line that is far too long".into(),
            String::new(),
            String::new(),
            String::new()
        ]));
    }

    #[test]
    fn nbt_round_trip() {
        let rules = rules();
        let mut chest = TileEntity::new(
            BlockXyz::new(5, 70, -3),
            TileState::for_aspect(AspectKind::Chest).unwrap(),
        );
        chest.apply_click(&click_on(11, slot(4, 7)), &rules);

        let tag = chest.marshal_nbt();
        let restored = TileEntity::unmarshal_nbt(&tag).unwrap();
        assert_eq!(restored.block, BlockXyz::new(5, 70, -3));
        assert_eq!(restored.slot_snapshot(11), slot(4, 7));
    }

    #[test]
    fn unknown_tile_id_ignored() {
        let mut tag = Compound::new();
        tag.set("x", Tag::Int(0));
        tag.set("y", Tag::Int(64));
        tag.set("z", Tag::Int(0));
        tag.set("id", Tag::String("RecordPlayer".into()));
        assert!(TileEntity::unmarshal_nbt(&tag).is_none());
    }
}
