//! In-memory model of the visible game world
//!
//! Entities are keyed by serial number. The world is a plain data structure;
//! all mutation happens on the session thread via [`crate::GameSession`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// A world-object identifier
///
/// `Serial::ZERO` is the documented "not found" value returned by queries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Serial(pub u32);

impl Serial {
    pub const ZERO: Serial = Serial(0);

    /// Whether this serial refers to an actual object
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for Serial {
    fn from(raw: u32) -> Self {
        Serial(raw)
    }
}

/// A position in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chebyshev distance, which is what the game uses for tile ranges
    pub fn distance(self, other: Position) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

bitflags! {
    /// Per-entity status flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntityFlags: u16 {
        const HIDDEN    = 1 << 0;
        const POISONED  = 1 << 1;
        const WAR_MODE  = 1 << 2;
        const MOVABLE   = 1 << 3;
        const CONTAINER = 1 << 4;
    }
}

/// An item in the world or inside a container
#[derive(Debug, Clone)]
pub struct Item {
    pub serial: Serial,
    /// Art/type identifier
    pub graphic: u16,
    pub amount: u16,
    /// Containing object, `None` when on the ground or equipped
    pub container: Option<Serial>,
    pub position: Position,
    pub name: String,
    pub flags: EntityFlags,
}

/// A mobile (player, NPC or creature)
#[derive(Debug, Clone)]
pub struct Mobile {
    pub serial: Serial,
    pub body: u16,
    pub name: String,
    pub position: Position,
    pub hits: u16,
    pub max_hits: u16,
    pub flags: EntityFlags,
}

/// An open server-side dialog
#[derive(Debug, Clone)]
pub struct Gump {
    pub gump_id: u32,
    pub type_id: u32,
    pub lines: Vec<String>,
}

/// Lock state of a skill or stat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockState {
    Up,
    Down,
    Locked,
}

/// Which stat a lock applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stat {
    Strength,
    Dexterity,
    Intelligence,
}

/// The visible world: all entities the client currently knows about
#[derive(Debug, Default)]
pub struct World {
    pub player: Serial,
    pub backpack: Serial,
    items: HashMap<Serial, Item>,
    mobiles: HashMap<Serial, Mobile>,
    gumps: Vec<Gump>,
    skill_locks: HashMap<String, LockState>,
    stat_locks: HashMap<Stat, LockState>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item(&self, serial: Serial) -> Option<&Item> {
        self.items.get(&serial)
    }

    pub fn mobile(&self, serial: Serial) -> Option<&Mobile> {
        self.mobiles.get(&serial)
    }

    /// Whether any entity with this serial exists
    pub fn contains(&self, serial: Serial) -> bool {
        self.items.contains_key(&serial) || self.mobiles.contains_key(&serial)
    }

    pub fn insert_item(&mut self, item: Item) {
        self.items.insert(item.serial, item);
    }

    pub fn insert_mobile(&mut self, mobile: Mobile) {
        self.mobiles.insert(mobile.serial, mobile);
    }

    pub fn remove_entity(&mut self, serial: Serial) {
        self.items.remove(&serial);
        self.mobiles.remove(&serial);
    }

    /// Position of any entity, following container chains for items
    pub fn entity_position(&self, serial: Serial) -> Option<Position> {
        if let Some(mobile) = self.mobiles.get(&serial) {
            return Some(mobile.position);
        }
        let mut current = self.items.get(&serial)?;
        let mut hops = 0;
        while let Some(parent) = current.container {
            if let Some(mobile) = self.mobiles.get(&parent) {
                return Some(mobile.position);
            }
            match self.items.get(&parent) {
                Some(item) => current = item,
                None => break,
            }
            hops += 1;
            if hops > 16 {
                break; // malformed container chain
            }
        }
        Some(current.position)
    }

    /// Distance from the player to an entity, `None` if either is unknown
    pub fn distance_to(&self, serial: Serial) -> Option<i32> {
        let player = self.entity_position(self.player)?;
        let target = self.entity_position(serial)?;
        Some(player.distance(target))
    }

    /// Find an item by graphic, optionally restricted to one container.
    /// Serials in `ignore` are skipped. Lowest serial wins so results are
    /// stable across calls.
    pub fn find_type(
        &self,
        graphic: u16,
        container: Option<Serial>,
        ignore: &HashSet<Serial>,
    ) -> Option<Serial> {
        self.items
            .values()
            .filter(|item| item.graphic == graphic)
            .filter(|item| container.is_none() || item.container == container)
            .filter(|item| !ignore.contains(&item.serial))
            .map(|item| item.serial)
            .min()
    }

    /// Find the mobile closest to the player, skipping the player itself
    /// and everything in `ignore`
    pub fn find_nearest_mobile(&self, ignore: &HashSet<Serial>) -> Option<Serial> {
        let player_pos = self.entity_position(self.player)?;
        self.mobiles
            .values()
            .filter(|m| m.serial != self.player)
            .filter(|m| !ignore.contains(&m.serial))
            .min_by_key(|m| (player_pos.distance(m.position), m.serial))
            .map(|m| m.serial)
    }

    pub fn gumps(&self) -> &[Gump] {
        &self.gumps
    }

    pub fn push_gump(&mut self, gump: Gump) {
        self.gumps.push(gump);
    }

    /// Remove an open gump by id, returning whether one was removed
    pub fn close_gump(&mut self, gump_id: u32) -> bool {
        let before = self.gumps.len();
        self.gumps.retain(|g| g.gump_id != gump_id);
        self.gumps.len() != before
    }

    pub fn set_skill_lock(&mut self, skill: &str, lock: LockState) {
        self.skill_locks.insert(skill.to_ascii_lowercase(), lock);
    }

    pub fn skill_lock(&self, skill: &str) -> Option<LockState> {
        self.skill_locks.get(&skill.to_ascii_lowercase()).copied()
    }

    pub fn set_stat_lock(&mut self, stat: Stat, lock: LockState) {
        self.stat_locks.insert(stat, lock);
    }

    pub fn stat_lock(&self, stat: Stat) -> Option<LockState> {
        self.stat_locks.get(&stat).copied()
    }
}
