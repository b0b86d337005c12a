//! World persistence: level metadata, chunk storage and player blobs.
//!
//! Disk formats are gzip-compressed NBT. Chunks live one file per column
//! under `region/`; player state under `players/<name>.dat`; level
//! metadata in `level.dat`. The chunk store runs behind a bounded request
//! channel so disk I/O never happens on a shard task directly. A missing
//! chunk is not an error: the store chains a deterministic flat-terrain
//! generator behind the directory store, and a missing player file simply
//! means a first login.

use crate::block::ids;
use anyhow::{Context, Result};
use rand::Rng;
use shardcraft_core::{BlockXyz, ChunkXz, Ticks, CHUNK_SIZE_H, CHUNK_SIZE_Y, CHUNK_VOLUME};
use shardcraft_nbt::{Compound, Tag};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Raw per-chunk state as stored on disk or produced by generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSnapshot {
    pub loc: ChunkXz,
    pub blocks: Vec<u8>,
    pub block_data: Vec<u8>,
    pub block_light: Vec<u8>,
    pub sky_light: Vec<u8>,
    pub height_map: Vec<u8>,
    pub entities: Vec<Compound>,
    pub tile_entities: Vec<Compound>,
}

/// Read/write access to per-chunk state by chunk coordinate.
pub trait ChunkStore: Send {
    /// Read a chunk; `Ok(None)` means the chunk does not exist.
    fn read(&mut self, loc: ChunkXz) -> Result<Option<ChunkSnapshot>>;
    /// Write a chunk back.
    fn write(&mut self, snap: &ChunkSnapshot) -> Result<()>;
}

/// One gzip NBT file per chunk under `<world>/region/`.
pub struct DirectoryChunkStore {
    dir: PathBuf,
}

impl DirectoryChunkStore {
    /// Open (creating the directory if needed).
    pub fn new(world_dir: &Path) -> Result<DirectoryChunkStore> {
        let dir = world_dir.join("region");
        fs::create_dir_all(&dir).context("failed to create region directory")?;
        Ok(DirectoryChunkStore { dir })
    }

    fn chunk_path(&self, loc: ChunkXz) -> PathBuf {
        self.dir.join(format!("c.{}.{}.dat", loc.x, loc.z))
    }
}

impl ChunkStore for DirectoryChunkStore {
    fn read(&mut self, loc: ChunkXz) -> Result<Option<ChunkSnapshot>> {
        let path = self.chunk_path(loc);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to open {}", path.display()))
            }
        };

        let root = shardcraft_nbt::read_gzip(file)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let level = root
            .get_compound("Level")
            .context("chunk file has no Level compound")?;

        let list_of = |name: &str| -> Vec<Compound> {
            match level.get(name) {
                Some(Tag::List(items)) => items
                    .iter()
                    .filter_map(|tag| match tag {
                        Tag::Compound(compound) => Some(compound.clone()),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            }
        };

        Ok(Some(ChunkSnapshot {
            loc,
            blocks: level.get_byte_array("Blocks").unwrap_or_default().to_vec(),
            block_data: level.get_byte_array("Data").unwrap_or_default().to_vec(),
            block_light: level
                .get_byte_array("BlockLight")
                .unwrap_or_default()
                .to_vec(),
            sky_light: level.get_byte_array("SkyLight").unwrap_or_default().to_vec(),
            height_map: level.get_byte_array("HeightMap").unwrap_or_default().to_vec(),
            entities: list_of("Entities"),
            tile_entities: list_of("TileEntities"),
        }))
    }

    fn write(&mut self, snap: &ChunkSnapshot) -> Result<()> {
        let mut level = Compound::new();
        level.set("xPos", Tag::Int(snap.loc.x));
        level.set("zPos", Tag::Int(snap.loc.z));
        level.set("Blocks", Tag::ByteArray(snap.blocks.clone()));
        level.set("Data", Tag::ByteArray(snap.block_data.clone()));
        level.set("BlockLight", Tag::ByteArray(snap.block_light.clone()));
        level.set("SkyLight", Tag::ByteArray(snap.sky_light.clone()));
        level.set("HeightMap", Tag::ByteArray(snap.height_map.clone()));
        level.set(
            "Entities",
            Tag::List(snap.entities.iter().cloned().map(Tag::Compound).collect()),
        );
        level.set(
            "TileEntities",
            Tag::List(
                snap.tile_entities
                    .iter()
                    .cloned()
                    .map(Tag::Compound)
                    .collect(),
            ),
        );

        let mut root = Compound::new();
        root.set("Level", Tag::Compound(level));

        let path = self.chunk_path(snap.loc);
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        shardcraft_nbt::write_gzip(file, &root)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Deterministic flat terrain for chunks with no stored data: bedrock,
/// stone, dirt, then a grass surface at y = 63.
pub struct FlatTerrainGenerator;

/// Surface height produced by the flat generator.
pub const GENERATED_SURFACE_Y: i32 = 63;

impl FlatTerrainGenerator {
    /// Generate one column.
    pub fn generate(loc: ChunkXz) -> ChunkSnapshot {
        let h = CHUNK_SIZE_H as usize;
        let y_max = CHUNK_SIZE_Y as usize;
        let nibbles = CHUNK_VOLUME / 2;

        let mut blocks = vec![0u8; CHUNK_VOLUME];
        let mut sky_light = vec![0u8; nibbles];
        let surface = GENERATED_SURFACE_Y as usize;

        for x in 0..h {
            for z in 0..h {
                let column = (x * h + z) * y_max;
                blocks[column] = ids::BEDROCK.0;
                for y in 1..surface - 4 {
                    blocks[column + y] = ids::STONE.0;
                }
                for y in surface - 4..surface {
                    blocks[column + y] = ids::DIRT.0;
                }
                blocks[column + surface] = ids::GRASS.0;

                // Full sky light above the surface.
                for y in surface + 1..y_max {
                    let index = column + y;
                    let byte = &mut sky_light[index / 2];
                    if index % 2 == 0 {
                        *byte |= 0x0f;
                    } else {
                        *byte |= 0xf0;
                    }
                }
            }
        }

        ChunkSnapshot {
            loc,
            blocks,
            block_data: vec![0u8; nibbles],
            block_light: vec![0u8; nibbles],
            sky_light,
            height_map: vec![(GENERATED_SURFACE_Y + 1) as u8; h * h],
            entities: Vec::new(),
            tile_entities: Vec::new(),
        }
    }
}

/// Directory store chained with the generator: reads fall back to fresh
/// terrain, writes always hit the directory store.
pub struct ChainedChunkStore {
    persistent: DirectoryChunkStore,
}

impl ChainedChunkStore {
    /// Open over a world directory.
    pub fn new(world_dir: &Path) -> Result<ChainedChunkStore> {
        Ok(ChainedChunkStore {
            persistent: DirectoryChunkStore::new(world_dir)?,
        })
    }
}

impl ChunkStore for ChainedChunkStore {
    fn read(&mut self, loc: ChunkXz) -> Result<Option<ChunkSnapshot>> {
        match self.persistent.read(loc) {
            Ok(Some(snap)) => Ok(Some(snap)),
            Ok(None) => Ok(Some(FlatTerrainGenerator::generate(loc))),
            Err(err) => {
                // A corrupt chunk file is reported as absent; subscriptions
                // fail silently and queries assume solid.
                warn!("chunk {loc} read failed: {err:#}");
                Ok(None)
            }
        }
    }

    fn write(&mut self, snap: &ChunkSnapshot) -> Result<()> {
        self.persistent.write(snap)
    }
}

enum StoreRequest {
    Read {
        loc: ChunkXz,
        reply: oneshot::Sender<Option<ChunkSnapshot>>,
    },
    Write {
        snap: Box<ChunkSnapshot>,
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the chunk-store service task.
#[derive(Clone)]
pub struct ChunkStoreHandle {
    tx: mpsc::Sender<StoreRequest>,
}

impl ChunkStoreHandle {
    /// Spawn the service task over a concrete store.
    pub fn spawn(mut store: Box<dyn ChunkStore>) -> ChunkStoreHandle {
        let (tx, mut rx) = mpsc::channel::<StoreRequest>(64);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                match request {
                    StoreRequest::Read { loc, reply } => {
                        let result = match store.read(loc) {
                            Ok(snap) => snap,
                            Err(err) => {
                                warn!("chunk {loc} read failed: {err:#}");
                                None
                            }
                        };
                        let _ = reply.send(result);
                    }
                    StoreRequest::Write { snap, reply } => {
                        if let Err(err) = store.write(&snap) {
                            warn!("chunk {} write failed: {err:#}", snap.loc);
                        }
                        let _ = reply.send(());
                    }
                }
            }
        });
        ChunkStoreHandle { tx }
    }

    /// Read a chunk; `None` when absent or on any store failure.
    pub async fn read(&self, loc: ChunkXz) -> Option<ChunkSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(StoreRequest::Read {
                loc,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return None;
        }
        reply_rx.await.unwrap_or(None)
    }

    /// Write a chunk and wait for the store to finish.
    pub async fn write(&self, snap: ChunkSnapshot) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(StoreRequest::Write {
                snap: Box::new(snap),
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return;
        }
        let _ = reply_rx.await;
    }
}

/// Level metadata loaded from `level.dat`.
#[derive(Debug, Clone)]
pub struct LevelInfo {
    pub spawn: BlockXyz,
    pub time: Ticks,
    pub seed: i64,
}

/// Load level metadata; fails when the file exists but cannot be parsed.
pub fn load_level(world_dir: &Path) -> Result<LevelInfo> {
    let path = world_dir.join("level.dat");
    let file =
        File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
    let root = shardcraft_nbt::read_gzip(file)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let spawn = (|| {
        Some(BlockXyz {
            x: match root.lookup("Data/SpawnX")? {
                Tag::Int(v) => *v,
                _ => return None,
            },
            y: match root.lookup("Data/SpawnY")? {
                Tag::Int(v) => *v as i8,
                _ => return None,
            },
            z: match root.lookup("Data/SpawnZ")? {
                Tag::Int(v) => *v,
                _ => return None,
            },
        })
    })()
    .context("level data does not contain Spawn{X,Y,Z}")?;

    let time = match root.lookup("Data/Time") {
        Some(Tag::Long(v)) => *v,
        _ => 0,
    };
    let seed = match root.lookup("Data/RandomSeed") {
        Some(Tag::Long(v)) => *v,
        _ => 0,
    };

    Ok(LevelInfo { spawn, time, seed })
}

/// Write a fresh `level.dat` for a new world.
pub fn create_level(world_dir: &Path, spawn: BlockXyz, seed: i64) -> Result<LevelInfo> {
    fs::create_dir_all(world_dir).context("failed to create world directory")?;

    let mut data = Compound::new();
    data.set("Time", Tag::Long(0));
    data.set("SpawnX", Tag::Int(spawn.x));
    data.set("SpawnY", Tag::Int(spawn.y as i32));
    data.set("SpawnZ", Tag::Int(spawn.z));
    data.set("RandomSeed", Tag::Long(seed));
    data.set("LevelName", Tag::String("world".into()));
    data.set("version", Tag::Int(19132));
    data.set("LastPlayed", Tag::Long(0));

    let mut root = Compound::new();
    root.set("Data", Tag::Compound(data));

    let path = world_dir.join("level.dat");
    let file = File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    shardcraft_nbt::write_gzip(file, &root)
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(LevelInfo {
        spawn,
        time: 0,
        seed,
    })
}

/// Per-player persisted NBT blobs.
pub struct PlayerStore {
    dir: PathBuf,
}

impl PlayerStore {
    /// Open over a world directory.
    pub fn new(world_dir: &Path) -> PlayerStore {
        PlayerStore {
            dir: world_dir.join("players"),
        }
    }

    /// Read a player's blob; `Ok(None)` on first login.
    pub fn read(&self, name: &str) -> Result<Option<Compound>> {
        let path = self.dir.join(format!("{name}.dat"));
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to open {}", path.display()))
            }
        };
        let compound = shardcraft_nbt::read_gzip(file)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(compound))
    }

    /// Write a player's blob.
    pub fn write(&self, name: &str, data: &Compound) -> Result<()> {
        fs::create_dir_all(&self.dir).context("failed to create players directory")?;
        let path = self.dir.join(format!("{name}.dat"));
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        shardcraft_nbt::write_gzip(file, data)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

/// The world store facade: level metadata, chunk store handle and player
/// store for one world directory.
pub struct WorldStore {
    pub level: LevelInfo,
    pub chunks: ChunkStoreHandle,
    pub players: PlayerStore,
}

impl WorldStore {
    /// Open a world, creating a fresh one when no level data exists yet.
    /// A present but unreadable `level.dat` is a startup failure.
    pub fn open(world_dir: &Path) -> Result<WorldStore> {
        let level = if world_dir.join("level.dat").exists() {
            load_level(world_dir)?
        } else {
            info!("No level.dat at {}; creating a new world", world_dir.display());
            let seed = rand::thread_rng().gen::<i64>();
            create_level(world_dir, BlockXyz::new(0, 75, 0), seed)?
        };

        let store = ChainedChunkStore::new(world_dir)?;
        Ok(WorldStore {
            level,
            chunks: ChunkStoreHandle::spawn(Box::new(store)),
            players: PlayerStore::new(world_dir),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_terrain_shape() {
        let snap = FlatTerrainGenerator::generate(ChunkXz::new(3, -2));
        assert_eq!(snap.blocks.len(), CHUNK_VOLUME);
        assert_eq!(snap.block_data.len(), CHUNK_VOLUME / 2);

        // Column (0,0): bedrock at the bottom, grass at the surface.
        assert_eq!(snap.blocks[0], ids::BEDROCK.0);
        assert_eq!(snap.blocks[GENERATED_SURFACE_Y as usize], ids::GRASS.0);
        assert_eq!(snap.blocks[GENERATED_SURFACE_Y as usize + 1], 0);
        assert_eq!(snap.height_map[0], (GENERATED_SURFACE_Y + 1) as u8);
    }

    #[test]
    fn directory_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirectoryChunkStore::new(dir.path()).unwrap();

        assert!(store.read(ChunkXz::new(0, 0)).unwrap().is_none());

        let mut snap = FlatTerrainGenerator::generate(ChunkXz::new(0, 0));
        let mut entity = Compound::new();
        entity.set("id", Tag::String("Item".into()));
        entity.set(
            "Pos",
            Tag::List(vec![Tag::Double(1.0), Tag::Double(70.0), Tag::Double(1.0)]),
        );
        snap.entities.push(entity);

        store.write(&snap).unwrap();
        let restored = store.read(ChunkXz::new(0, 0)).unwrap().unwrap();
        assert_eq!(restored.blocks, snap.blocks);
        assert_eq!(restored.entities.len(), 1);
    }

    #[test]
    fn chained_store_generates_missing_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ChainedChunkStore::new(dir.path()).unwrap();
        let snap = store.read(ChunkXz::new(9, 9)).unwrap().unwrap();
        assert_eq!(snap.blocks[GENERATED_SURFACE_Y as usize], ids::GRASS.0);
    }

    #[test]
    fn level_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let created = create_level(dir.path(), BlockXyz::new(0, 75, 0), 42).unwrap();
        let loaded = load_level(dir.path()).unwrap();
        assert_eq!(loaded.spawn, created.spawn);
        assert_eq!(loaded.seed, 42);
        assert_eq!(loaded.time, 0);
    }

    #[test]
    fn missing_level_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_level(dir.path()).is_err());
    }

    #[test]
    fn player_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlayerStore::new(dir.path());

        assert!(store.read("alice").unwrap().is_none());

        let mut data = Compound::new();
        data.set("Health", Tag::Short(20));
        store.write("alice", &data).unwrap();

        let restored = store.read("alice").unwrap().unwrap();
        assert_eq!(restored.get_short("Health"), Some(20));
    }

    #[tokio::test]
    async fn store_service_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let handle =
            ChunkStoreHandle::spawn(Box::new(ChainedChunkStore::new(dir.path()).unwrap()));

        let mut snap = handle.read(ChunkXz::new(1, 1)).await.unwrap();
        snap.blocks[70] = ids::GLASS.0;
        handle.write(snap.clone()).await;

        let restored = handle.read(ChunkXz::new(1, 1)).await.unwrap();
        assert_eq!(restored.blocks[70], ids::GLASS.0);
    }
}
