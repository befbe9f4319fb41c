//! Matchmaking Queue
//!
//! Holds every pending and active game, indexed by room id. Single owner:
//! the gateway. Nothing here is persisted; a process restart drops all
//! in-flight games by design.
//!
//! All rejections are advisory error values for the gateway to translate
//! into client notices; none of them disturb queue state.

use std::collections::BTreeMap;

use rand::Rng;
use thiserror::Error;

use crate::game::state::{ConnectionId, Game, GameDto, RoomId};

/// Upper bound of the random room-id seed; probing walks upward from there.
const ROOM_SEED_RANGE: u32 = 100;

/// Queue operation errors. Advisory only.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The nickname already occupies a slot in an unfinished game.
    #[error("player is already in a game or on queue")]
    AlreadyQueued,
    /// No game with the given room id.
    #[error("game not found")]
    NotFound,
}

/// Storage and pairing interface of the matchmaking queue.
///
/// A trait seam so the gateway can be driven against a mock or a future
/// concurrent-safe structure in tests.
pub trait QueueRepository {
    /// First-fit pairing: an open, same-mode, non-challenge, unfinished game,
    /// or a fresh waiting one. Errors if the nickname is queued anywhere.
    fn find_or_create_slot(&mut self, name: &str, with_power_ups: bool)
        -> Result<RoomId, QueueError>;

    /// Create a pending challenge game: source on the first slot, target's
    /// name reserved on the second. Errors if either nickname is queued.
    fn create_challenge(
        &mut self,
        source: &str,
        target: &str,
        with_power_ups: bool,
    ) -> Result<RoomId, QueueError>;

    /// Whether a nickname occupies a slot of any unfinished game.
    fn is_player_queued(&self, login: &str) -> bool;

    /// Game by room id.
    fn game(&self, room: RoomId) -> Option<&Game>;

    /// Mutable game by room id.
    fn game_mut(&mut self, room: RoomId) -> Option<&mut Game>;

    /// Room of the game a connection is bound to, if any.
    fn find_by_connection(&self, connection: ConnectionId) -> Option<RoomId>;

    /// Remove a game by room id. Safe for games that never started.
    fn remove(&mut self, room: RoomId) -> Option<Game>;

    /// Projections of every started, unfinished game (for game lists).
    fn live_games(&self) -> Vec<GameDto>;

    /// Number of queued games.
    fn len(&self) -> usize;

    /// Whether the queue is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory queue keyed by room id.
#[derive(Debug, Default)]
pub struct GameQueue {
    games: BTreeMap<RoomId, Game>,
}

impl GameQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Linear-probe upward from `candidate` to the first unused room id.
    /// O(n) worst case, fine at the handful of simultaneous matches served.
    pub fn allocate_room_id(&self, candidate: RoomId) -> RoomId {
        let mut room = candidate;
        while self.games.contains_key(&room) {
            room += 1;
        }
        room
    }

    fn new_room_id(&self) -> RoomId {
        self.allocate_room_id(rand::thread_rng().gen_range(0..ROOM_SEED_RANGE))
    }
}

impl QueueRepository for GameQueue {
    fn find_or_create_slot(
        &mut self,
        name: &str,
        with_power_ups: bool,
    ) -> Result<RoomId, QueueError> {
        if self.is_player_queued(name) {
            return Err(QueueError::AlreadyQueued);
        }
        let open = self
            .games
            .values()
            .find(|g| {
                g.has_open_slot()
                    && !g.has_ended
                    && !g.is_challenge
                    && g.with_power_ups == with_power_ups
            })
            .map(|g| g.room);
        if let Some(room) = open {
            return Ok(room);
        }
        let room = self.new_room_id();
        self.games.insert(room, Game::new(room, with_power_ups, false));
        Ok(room)
    }

    fn create_challenge(
        &mut self,
        source: &str,
        target: &str,
        with_power_ups: bool,
    ) -> Result<RoomId, QueueError> {
        if self.is_player_queued(source) || self.is_player_queued(target) {
            return Err(QueueError::AlreadyQueued);
        }
        let room = self.new_room_id();
        let mut game = Game::new(room, with_power_ups, true);
        game.player1.name = Some(source.to_string());
        game.player2.name = Some(target.to_string());
        self.games.insert(room, game);
        Ok(room)
    }

    fn is_player_queued(&self, login: &str) -> bool {
        // Checks both slots; the system this replaces only ever compared
        // the first one (twice), letting one nickname wait in two games.
        self.games
            .values()
            .any(|g| !g.has_ended && g.involves_name(login))
    }

    fn game(&self, room: RoomId) -> Option<&Game> {
        self.games.get(&room)
    }

    fn game_mut(&mut self, room: RoomId) -> Option<&mut Game> {
        self.games.get_mut(&room)
    }

    fn find_by_connection(&self, connection: ConnectionId) -> Option<RoomId> {
        self.games
            .values()
            .find(|g| g.side_of(connection).is_some())
            .map(|g| g.room)
    }

    fn remove(&mut self, room: RoomId) -> Option<Game> {
        self.games.remove(&room)
    }

    fn live_games(&self) -> Vec<GameDto> {
        self.games
            .values()
            .filter(|g| g.has_started && !g.has_ended)
            .map(Game::game_dto)
            .collect()
    }

    fn len(&self) -> usize {
        self.games.len()
    }
}
