//! The arena: registry of all live games.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use metrics::counter;
use rand::Rng;
use tracing::{debug, info};

use keysprint_core::errors::GameError;
use keysprint_core::ids::GameId;

use crate::game::Game;

/// Target texts handed to new games. The create request carries no body, so
/// the server owns text selection.
const PHRASES: &[&str] = &[
    "the quick brown fox jumps over the lazy dog",
    "pack my box with five dozen liquor jugs",
    "sphinx of black quartz judge my vow",
    "how vexingly quick daft zebras jump",
    "the five boxing wizards jump quickly",
    "jackdaws love my big sphinx of quartz",
    "crazy frederick bought many very exquisite opal jewels",
    "we promptly judged antique ivory buckles for the next prize",
];

pub(crate) fn random_phrase() -> &'static str {
    PHRASES[rand::rng().random_range(0..PHRASES.len())]
}

/// Concurrency-safe map from [`GameId`] to its exclusively-owned [`Game`].
///
/// The arena is the single owner of every live game; games are removed once
/// they end (driven by the connection handler observing a finish) or by the
/// abandoned-game sweep. Map operations are sharded internally and never
/// interleave with any individual game's lock.
pub struct Arena {
    games: DashMap<GameId, Arc<Game>>,
}

impl Arena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self {
            games: DashMap::new(),
        }
    }

    /// Allocate a fresh `Created` game with a random target text, insert it,
    /// and return it. Always succeeds.
    pub fn create_game(&self) -> Arc<Game> {
        self.create_game_with_text(random_phrase())
    }

    /// Allocate a fresh game with a caller-chosen target text.
    pub fn create_game_with_text(&self, text: impl Into<String>) -> Arc<Game> {
        let game = Arc::new(Game::new(text));
        let _ = self.games.insert(game.id(), Arc::clone(&game));
        counter!("games_created_total").increment(1);
        debug!(game_id = %game.id(), "game created");
        game
    }

    /// Look up a live game.
    pub fn get(&self, id: GameId) -> Result<Arc<Game>, GameError> {
        self.games
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(GameError::NotFound { game_id: id })
    }

    /// Remove a game. Safe to call for ids that are already gone.
    pub fn remove(&self, id: GameId) {
        if self.games.remove(&id).is_some() {
            debug!(game_id = %id, "game evicted");
        }
    }

    /// Number of live games.
    pub fn len(&self) -> usize {
        self.games.len()
    }

    /// Whether no games are live.
    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Evict games nobody can finish: every joined participant's outbox is
    /// closed, or nobody ever attached and the game outlived `ttl`.
    ///
    /// Candidates are collected before any game lock is taken, so a game's
    /// lock is never acquired while holding the arena's shard locks.
    pub fn evict_abandoned(&self, ttl: Duration) -> usize {
        let candidates: Vec<(GameId, Arc<Game>)> = self
            .games
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut evicted = 0;
        for (id, game) in candidates {
            if game.is_abandoned(ttl) {
                let _ = self.games.remove(&id);
                evicted += 1;
                info!(game_id = %id, "evicted abandoned game");
            }
        }
        evicted
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}
