//! The outermost actor: the player registry and the world clock.
//!
//! One task selects over its work queue, the tick timer and the player
//! connect/disconnect channels. World time advances per tick and a
//! time-update multicast goes out once a second.

use shardcraft_core::{EntityId, Ticks, DAY_TICKS_PER_TICK, TICKS_PER_SECOND};
use shardcraft_proto::{serialize_packets, Packet};
use shardcraft_world::PlayerHandle;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

enum GameRequest {
    Broadcast(Vec<u8>),
    PlayerCount(oneshot::Sender<usize>),
}

/// A newly logged-in player to register.
pub struct PlayerRegistration {
    pub entity_id: EntityId,
    pub name: String,
    pub client: PlayerHandle,
}

/// Cloneable handle to the game actor.
#[derive(Clone)]
pub struct GameHandle {
    tx: mpsc::Sender<GameRequest>,
    connect_tx: mpsc::Sender<PlayerRegistration>,
    disconnect_tx: mpsc::Sender<EntityId>,
}

impl GameHandle {
    /// Serialize and multicast a packet to every connected player.
    pub async fn broadcast_packet(&self, packet: Packet) {
        match serialize_packets(&[packet]) {
            Ok(data) => {
                let _ = self.tx.send(GameRequest::Broadcast(data)).await;
            }
            Err(err) => error!("broadcast serialization failed: {err}"),
        }
    }

    /// Broadcast a chat message to every player.
    pub async fn broadcast_message(&self, message: String) {
        self.broadcast_packet(Packet::ChatMessage { message }).await;
    }

    /// Current player count.
    pub async fn player_count(&self) -> usize {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(GameRequest::PlayerCount(reply_tx))
            .await
            .is_err()
        {
            return 0;
        }
        reply_rx.await.unwrap_or(0)
    }

    /// Blocking flavour of [`Self::player_count`] for the handshake
    /// thread.
    pub fn player_count_blocking(&self) -> usize {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .blocking_send(GameRequest::PlayerCount(reply_tx))
            .is_err()
        {
            return 0;
        }
        reply_rx.blocking_recv().unwrap_or(0)
    }

    /// Register a player after a successful login.
    pub fn register_blocking(&self, registration: PlayerRegistration) -> bool {
        self.connect_tx.blocking_send(registration).is_ok()
    }

    /// Report a player gone; the game unregisters it.
    pub async fn disconnect(&self, entity_id: EntityId) {
        let _ = self.disconnect_tx.send(entity_id).await;
    }
}

/// The game actor state.
pub struct Game {
    players: HashMap<EntityId, PlayerRegistration>,
    names: HashMap<String, EntityId>,
    time: Ticks,
}

impl Game {
    /// Spawn the game task. Returns its handle and a stop sender.
    pub fn spawn(initial_time: Ticks) -> (GameHandle, watch::Sender<bool>) {
        let (tx, rx) = mpsc::channel(256);
        let (connect_tx, connect_rx) = mpsc::channel(16);
        let (disconnect_tx, disconnect_rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);

        let game = Game {
            players: HashMap::new(),
            names: HashMap::new(),
            time: initial_time,
        };
        tokio::spawn(game.run(rx, connect_rx, disconnect_rx, stop_rx));

        (
            GameHandle {
                tx,
                connect_tx,
                disconnect_tx,
            },
            stop_tx,
        )
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<GameRequest>,
        mut connect_rx: mpsc::Receiver<PlayerRegistration>,
        mut disconnect_rx: mpsc::Receiver<EntityId>,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(1000 / TICKS_PER_SECOND as u64));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    Some(GameRequest::Broadcast(data)) => self.multicast(&data, None),
                    Some(GameRequest::PlayerCount(reply)) => {
                        let _ = reply.send(self.players.len());
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    ticks += 1;
                    self.time += DAY_TICKS_PER_TICK;
                    if ticks % TICKS_PER_SECOND as u64 == 0 {
                        self.send_time_update();
                    }
                },
                Some(registration) = connect_rx.recv() => self.on_connect(registration),
                Some(entity_id) = disconnect_rx.recv() => self.on_disconnect(entity_id),
                _ = stop_rx.changed() => break,
            }
        }

        info!("game loop stopped at time {}", self.time);
    }

    fn on_connect(&mut self, registration: PlayerRegistration) {
        info!(
            "player {} ({}) joined",
            registration.name, registration.entity_id
        );
        self.names
            .insert(registration.name.clone(), registration.entity_id);
        self.players.insert(registration.entity_id, registration);
    }

    fn on_disconnect(&mut self, entity_id: EntityId) {
        match self.players.remove(&entity_id) {
            Some(registration) => {
                self.names.remove(&registration.name);
                info!("player {} ({entity_id}) left", registration.name);
            }
            None => warn!("disconnect for unknown player {entity_id}"),
        }
    }

    fn send_time_update(&self) {
        match serialize_packets(&[Packet::TimeUpdate { time: self.time }]) {
            Ok(data) => self.multicast(&data, None),
            Err(err) => error!("time update serialization failed: {err}"),
        }
    }

    fn multicast(&self, data: &[u8], except: Option<EntityId>) {
        for (entity_id, registration) in &self.players {
            if Some(*entity_id) != except {
                registration.client.transmit(data.to_vec());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardcraft_core::{
        AbsXyz, BlockXyz, ChunkXz, InvTypeId, PrgBarId, PrgBarValue, SlotId, TxId,
    };
    use shardcraft_world::{PlayerClient, Slot};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeClient {
        entity_id: EntityId,
        received: Mutex<Vec<Vec<u8>>>,
    }

    impl PlayerClient for FakeClient {
        fn entity_id(&self) -> EntityId {
            self.entity_id
        }
        fn name(&self) -> &str {
            "fake"
        }
        fn transmit(&self, data: Vec<u8>) {
            self.received.lock().unwrap().push(data);
        }
        fn notify_chunk_load(&self) {}
        fn offer_item(&self, _: ChunkXz, _: EntityId, _: Slot) {}
        fn give_item(&self, _: AbsXyz, _: Slot) {}
        fn place_held_item(&self, _: BlockXyz, _: Slot) {}
        fn inventory_subscribed(&self, _: BlockXyz, _: InvTypeId, _: Vec<Slot>) {}
        fn inventory_slot_update(&self, _: BlockXyz, _: SlotId, _: Slot) {}
        fn inventory_progress_update(&self, _: BlockXyz, _: PrgBarId, _: PrgBarValue) {}
        fn inventory_cursor_update(&self, _: BlockXyz, _: Slot) {}
        fn inventory_tx_state(&self, _: BlockXyz, _: TxId, _: bool) {}
        fn inventory_unsubscribed(&self, _: BlockXyz) {}
    }

    #[tokio::test]
    async fn register_count_broadcast_unregister() {
        let (game, _stop) = Game::spawn(0);
        assert_eq!(game.player_count().await, 0);

        let client = Arc::new(FakeClient {
            entity_id: EntityId(7),
            ..Default::default()
        });
        let registration = PlayerRegistration {
            entity_id: EntityId(7),
            name: "alice".into(),
            client: client.clone(),
        };
        // register_blocking needs a non-runtime thread.
        let game2 = game.clone();
        tokio::task::spawn_blocking(move || {
            assert!(game2.register_blocking(registration));
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(game.player_count().await, 1);

        game.broadcast_message("hello".into()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(client.received.lock().unwrap().len(), 1);

        game.disconnect(EntityId(7)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(game.player_count().await, 0);
    }
}
