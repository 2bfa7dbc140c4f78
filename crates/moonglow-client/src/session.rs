//! The game session: single owner of all mutable client state
//!
//! `GameSession` holds the world, the outbound network sink and the journal.
//! It lives on the session thread for its whole life; the scripting runtime
//! reaches it only through queued closures.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use moonglow_events::{JournalEntry, JournalKind};

use crate::world::{Gump, LockState, Position, Serial, Stat, World};

/// Cap on the session's own rolling journal history
const SESSION_JOURNAL_CAP: usize = 500;

/// Outbound wire messages
///
/// The real protocol encoding is an external concern; the session only needs
/// a sink that accepts these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Speech { text: String, emote: bool },
    DoubleClick(Serial),
    PickUp { serial: Serial, amount: u16 },
    Drop { serial: Serial, container: Serial },
    Target(Serial),
    CancelTarget,
    GumpReply { gump_id: u32, button: u32 },
    PathRequest { x: i32, y: i32, z: i32 },
    SkillLock { skill: String, lock: LockState },
    StatLock { stat: Stat, lock: LockState },
}

/// Sink for outbound messages, implemented by the network layer
pub trait NetSink: Send {
    fn send(&mut self, message: OutboundMessage);
}

/// A sink that records everything, for tests and offline runs
#[derive(Default, Clone)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the recorded messages
    pub fn handle(&self) -> Arc<Mutex<Vec<OutboundMessage>>> {
        self.messages.clone()
    }
}

impl NetSink for RecordingSink {
    fn send(&mut self, message: OutboundMessage) {
        debug!(target: "session", "outbound: {:?}", message);
        self.messages.lock().unwrap().push(message);
    }
}

/// Receives every journal line as it is added, on the session thread
pub trait JournalSink: Send + Sync {
    fn on_journal(&self, entry: &JournalEntry);
}

/// The live game session
pub struct GameSession {
    pub world: World,
    character_name: String,
    net: Box<dyn NetSink>,
    journal_sink: Option<Arc<dyn JournalSink>>,
    journal: VecDeque<JournalEntry>,
    /// Whether a server target cursor is currently up
    target_cursor: bool,
    last_target: Serial,
}

impl GameSession {
    pub fn new(character_name: impl Into<String>, net: Box<dyn NetSink>) -> Self {
        Self {
            world: World::new(),
            character_name: character_name.into(),
            net,
            journal_sink: None,
            journal: VecDeque::new(),
            target_cursor: false,
            last_target: Serial::ZERO,
        }
    }

    /// An offline session backed by a recording sink, with a player and
    /// backpack already present. Used by tests and the headless CLI.
    pub fn offline(character_name: impl Into<String>) -> (Self, RecordingSink) {
        use crate::world::{EntityFlags, Item, Mobile};

        let sink = RecordingSink::new();
        let mut session = Self::new(character_name, Box::new(sink.clone()));

        let player = Serial(0x0000_0001);
        let backpack = Serial(0x4000_0001);
        session.world.player = player;
        session.world.backpack = backpack;
        session.world.insert_mobile(Mobile {
            serial: player,
            body: 400,
            name: session.character_name.clone(),
            position: Position::new(1000, 1000, 0),
            hits: 100,
            max_hits: 100,
            flags: EntityFlags::empty(),
        });
        session.world.insert_item(Item {
            serial: backpack,
            graphic: 0x0E75,
            amount: 1,
            container: Some(player),
            position: Position::default(),
            name: "backpack".into(),
            flags: EntityFlags::CONTAINER,
        });
        (session, sink)
    }

    pub fn character_name(&self) -> &str {
        &self.character_name
    }

    /// Install the single journal subscriber
    pub fn set_journal_sink(&mut self, sink: Arc<dyn JournalSink>) {
        self.journal_sink = Some(sink);
    }

    // ===== Journal =====

    /// Append a journal line and notify the subscriber
    pub fn add_journal(&mut self, entry: JournalEntry) {
        if let Some(sink) = &self.journal_sink {
            sink.on_journal(&entry);
        }
        self.journal.push_back(entry);
        while self.journal.len() > SESSION_JOURNAL_CAP {
            self.journal.pop_front();
        }
    }

    /// Most recent journal lines, oldest first
    pub fn journal_texts(&self) -> Vec<String> {
        self.journal.iter().map(|e| e.text.clone()).collect()
    }

    /// A user-visible system message
    pub fn sys_message(&mut self, text: impl Into<String>) {
        let text = text.into();
        info!(target: "session", "{}", text);
        self.add_journal(JournalEntry::system(text));
    }

    // ===== Speech =====

    pub fn say(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.net.send(OutboundMessage::Speech {
            text: text.clone(),
            emote: false,
        });
        let author = self.character_name.clone();
        self.add_journal(JournalEntry::new(text, author, JournalKind::Say));
    }

    pub fn emote(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.net.send(OutboundMessage::Speech {
            text: text.clone(),
            emote: true,
        });
        let author = self.character_name.clone();
        self.add_journal(JournalEntry::new(text, author, JournalKind::Emote));
    }

    /// Overhead message on an entity; local-only, lands in the journal
    pub fn head_message(&mut self, serial: Serial, text: impl Into<String>) {
        let author = self
            .world
            .mobile(serial)
            .map(|m| m.name.clone())
            .or_else(|| self.world.item(serial).map(|i| i.name.clone()))
            .unwrap_or_default();
        self.add_journal(JournalEntry::new(text, author, JournalKind::Label));
    }

    // ===== Object interaction =====

    /// Double-click an object. Returns false when the serial is unknown.
    pub fn use_item(&mut self, serial: Serial) -> bool {
        if !self.world.contains(serial) {
            return false;
        }
        self.net.send(OutboundMessage::DoubleClick(serial));
        true
    }

    /// Move an item into a container. `Serial::ZERO` container means the
    /// ground at the item's position.
    pub fn move_item(&mut self, serial: Serial, container: Serial, amount: u16) -> bool {
        let Some(item) = self.world.item(serial) else {
            return false;
        };
        if container.is_valid() && !self.world.contains(container) {
            return false;
        }
        let amount = amount.min(item.amount).max(1);
        self.net.send(OutboundMessage::PickUp { serial, amount });
        self.net.send(OutboundMessage::Drop { serial, container });
        if let Some(item) = self.world.item(serial).cloned() {
            let mut moved = item;
            moved.container = container.is_valid().then_some(container);
            self.world.insert_item(moved);
        }
        true
    }

    // ===== Targeting =====

    /// Server put a target cursor up (called by the protocol layer)
    pub fn offer_target_cursor(&mut self) {
        self.target_cursor = true;
    }

    pub fn has_target_cursor(&self) -> bool {
        self.target_cursor
    }

    /// Answer the current target cursor. False when no cursor is up or the
    /// serial is unknown.
    pub fn target(&mut self, serial: Serial) -> bool {
        if !self.target_cursor || !self.world.contains(serial) {
            return false;
        }
        self.target_cursor = false;
        self.last_target = serial;
        self.net.send(OutboundMessage::Target(serial));
        true
    }

    pub fn cancel_target(&mut self) {
        if self.target_cursor {
            self.target_cursor = false;
            self.net.send(OutboundMessage::CancelTarget);
        }
    }

    pub fn last_target(&self) -> Serial {
        self.last_target
    }

    // ===== Gumps =====

    pub fn open_gump(&mut self, gump: Gump) {
        self.world.push_gump(gump);
    }

    pub fn has_gump(&self) -> bool {
        !self.world.gumps().is_empty()
    }

    /// Reply to an open gump. False when no gump with that id is open.
    pub fn reply_gump(&mut self, gump_id: u32, button: u32) -> bool {
        if !self.world.close_gump(gump_id) {
            return false;
        }
        self.net.send(OutboundMessage::GumpReply { gump_id, button });
        true
    }

    // ===== Queries =====

    pub fn find_type(
        &self,
        graphic: u16,
        container: Option<Serial>,
        ignore: &HashSet<Serial>,
    ) -> Serial {
        self.world
            .find_type(graphic, container, ignore)
            .unwrap_or(Serial::ZERO)
    }

    pub fn find_nearest(&self, ignore: &HashSet<Serial>) -> Serial {
        self.world
            .find_nearest_mobile(ignore)
            .unwrap_or(Serial::ZERO)
    }

    // ===== Movement and locks =====

    /// Request a path to a destination. The actual pathfinding is engine
    /// logic; the session only issues the request.
    pub fn pathfind_to(&mut self, x: i32, y: i32, z: i32) -> bool {
        if self.world.mobile(self.world.player).is_none() {
            return false;
        }
        self.net.send(OutboundMessage::PathRequest { x, y, z });
        true
    }

    pub fn set_skill_lock(&mut self, skill: &str, lock: LockState) {
        self.world.set_skill_lock(skill, lock);
        self.net.send(OutboundMessage::SkillLock {
            skill: skill.to_string(),
            lock,
        });
    }

    pub fn set_stat_lock(&mut self, stat: Stat, lock: LockState) {
        self.world.set_stat_lock(stat, lock);
        self.net.send(OutboundMessage::StatLock { stat, lock });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn say_sends_speech_and_journals() {
        let (mut session, sink) = GameSession::offline("Tester");
        session.say("hello");

        let messages = sink.handle();
        let messages = messages.lock().unwrap();
        assert_eq!(
            messages[0],
            OutboundMessage::Speech {
                text: "hello".into(),
                emote: false
            }
        );
        assert_eq!(session.journal.back().unwrap().author, "Tester");
    }

    #[test]
    fn use_item_unknown_serial_is_false() {
        let (mut session, sink) = GameSession::offline("Tester");
        assert!(!session.use_item(Serial(0xDEAD_BEEF)));
        assert!(sink.handle().lock().unwrap().is_empty());
    }

    #[test]
    fn target_requires_cursor() {
        let (mut session, _sink) = GameSession::offline("Tester");
        let player = session.world.player;
        assert!(!session.target(player));

        session.offer_target_cursor();
        assert!(session.target(player));
        assert!(!session.has_target_cursor());
        assert_eq!(session.last_target(), player);
    }

    #[test]
    fn reply_gump_closes_it() {
        let (mut session, _sink) = GameSession::offline("Tester");
        session.open_gump(Gump {
            gump_id: 7,
            type_id: 0x1234,
            lines: vec!["Quest?".into()],
        });
        assert!(session.has_gump());
        assert!(session.reply_gump(7, 1));
        assert!(!session.has_gump());
        assert!(!session.reply_gump(7, 1));
    }

    #[test]
    fn move_item_updates_container() {
        let (mut session, _sink) = GameSession::offline("Tester");
        let backpack = session.world.backpack;
        let loose = Serial(0x4000_0099);
        session.world.insert_item(crate::world::Item {
            serial: loose,
            graphic: 0x0F52,
            amount: 5,
            container: None,
            position: Position::new(1001, 1000, 0),
            name: "dagger".into(),
            flags: crate::world::EntityFlags::MOVABLE,
        });

        assert!(session.move_item(loose, backpack, 5));
        assert_eq!(session.world.item(loose).unwrap().container, Some(backpack));
    }
}
