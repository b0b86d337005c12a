//! The capability a chunk holds for talking back to a player session.
//!
//! Chunks never own players. Each subscriber is represented by a handle
//! that forwards to queues owned by the player session; when the session
//! has terminated, the handle's methods silently drop their payload, so a
//! departing player never wedges a shard.

use crate::slot::Slot;
use shardcraft_core::{
    AbsXyz, BlockXyz, ChunkXz, EntityId, InvTypeId, PrgBarId, PrgBarValue, SlotId, TxId,
};
use std::sync::Arc;

/// Forwarding capability to one player session. Every method is
/// fire-and-forget and safe to call from a shard task.
pub trait PlayerClient: Send + Sync {
    /// The player's entity id.
    fn entity_id(&self) -> EntityId;

    /// The player's name, for presence records.
    fn name(&self) -> &str;

    /// Queue raw packet bytes for transmission to the client.
    fn transmit(&self, data: Vec<u8>);

    /// A chunk the player was waiting on finished its initial send.
    fn notify_chunk_load(&self);

    /// An item entity overlaps the player; the player may respond with a
    /// take-item request to the chunk.
    fn offer_item(&self, from_chunk: ChunkXz, entity_id: EntityId, item: Slot);

    /// Hand an item stack to the player; whatever does not fit comes back
    /// to the world as a drop.
    fn give_item(&self, at: AbsXyz, item: Slot);

    /// The chunk determined the held item should be placed at `target`;
    /// the player confirms it still holds `was_held` and issues the
    /// place-item request.
    fn place_held_item(&self, target: BlockXyz, was_held: Slot);

    /// A tile-entity window opened for this player.
    fn inventory_subscribed(&self, block: BlockXyz, inv_type: InvTypeId, slots: Vec<Slot>);

    /// A slot in a subscribed tile-entity window changed.
    fn inventory_slot_update(&self, block: BlockXyz, slot_id: SlotId, slot: Slot);

    /// A progress bar in a subscribed tile-entity window changed.
    fn inventory_progress_update(&self, block: BlockXyz, bar: PrgBarId, value: PrgBarValue);

    /// The cursor contents changed as the outcome of a remote click.
    fn inventory_cursor_update(&self, block: BlockXyz, cursor: Slot);

    /// The outcome of a deferred remote window click.
    fn inventory_tx_state(&self, block: BlockXyz, tx_id: TxId, accepted: bool);

    /// The tile entity went away (block destroyed); close the window.
    fn inventory_unsubscribed(&self, block: BlockXyz);
}

/// Shared handle to a player session.
pub type PlayerHandle = Arc<dyn PlayerClient>;
