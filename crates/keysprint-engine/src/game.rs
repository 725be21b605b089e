//! One game's authoritative state machine.
//!
//! All mutation goes through a single per-game mutex, so transitions on one
//! game are strictly serialized: whichever update acquires the lock first
//! and reaches the terminal position wins, and everything after the
//! `Ended` transition is rejected. The lock is only ever held across
//! synchronous work — never across an await point.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, warn};

use keysprint_core::errors::GameError;
use keysprint_core::ids::{GameId, PlayerId};
use keysprint_core::protocol::{
    ClientMessage, GameSnapshot, GameStatus, PlayerSnapshot, ServerMessage, StatusPayload,
};

use crate::outbox::Outbox;

/// Outcome of applying one message, for the connection handler to act on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// State may have changed but the lifecycle did not.
    None,
    /// The game went `Created → Active`.
    Started,
    /// The game went `Active → Ended`; the caller should evict it from the
    /// arena.
    Finished {
        /// First player to reach the terminal position.
        winner: PlayerId,
    },
}

#[derive(Debug)]
struct Player {
    id: PlayerId,
    position: usize,
    outbox: Outbox,
}

#[derive(Debug)]
struct GameState {
    text: String,
    status: GameStatus,
    players: Vec<Player>,
    winner: Option<PlayerId>,
}

/// One race: roster, target text, lifecycle, and broadcast fan-out.
#[derive(Debug)]
pub struct Game {
    id: GameId,
    created_at: Instant,
    state: Mutex<GameState>,
}

impl Game {
    /// Create a game in `Created` state with the given target text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: GameId::new(),
            created_at: Instant::now(),
            state: Mutex::new(GameState {
                text: text.into(),
                status: GameStatus::Created,
                players: Vec::new(),
                winner: None,
            }),
        }
    }

    /// This game's id.
    pub fn id(&self) -> GameId {
        self.id
    }

    /// Current lifecycle state.
    pub fn status(&self) -> GameStatus {
        self.state.lock().status
    }

    /// Point-in-time view of the game.
    pub fn snapshot(&self) -> GameSnapshot {
        let state = self.state.lock();
        Self::snapshot_locked(self.id, &state)
    }

    /// Attach a new participant and announce it to the whole roster
    /// (including the joiner, which is how a client learns its own id).
    ///
    /// Late joins while `Active` are allowed; joining an `Ended` game is
    /// rejected.
    pub fn join(&self, outbox: Outbox) -> Result<PlayerSnapshot, GameError> {
        let mut state = self.state.lock();
        if state.status == GameStatus::Ended {
            return Err(GameError::Closed { game_id: self.id });
        }
        let player = Player {
            id: PlayerId::new(),
            position: 0,
            outbox,
        };
        let joined = PlayerSnapshot {
            player_id: player.id,
            position: 0,
        };
        state.players.push(player);
        debug!(game_id = %self.id, player_id = %joined.player_id, "player joined");
        Self::broadcast(&mut state, &ServerMessage::JoinNotify(joined));
        Ok(joined)
    }

    /// Apply one decoded message to the state machine.
    ///
    /// Serialized per game by the internal lock; see the module docs for the
    /// winner-race guarantee this provides.
    pub fn apply(&self, message: &ClientMessage) -> Result<Transition, GameError> {
        let mut state = self.state.lock();
        if state.status == GameStatus::Ended {
            return Err(GameError::Closed { game_id: self.id });
        }

        match *message {
            ClientMessage::StartGame => {
                if state.status != GameStatus::Created {
                    // A second start request from the other client must not
                    // corrupt state; it is idempotent, not an error.
                    return Ok(Transition::None);
                }
                if state.text.is_empty() {
                    state.text = crate::arena::random_phrase().to_owned();
                }
                state.status = GameStatus::Active;
                let snapshot = Self::snapshot_locked(self.id, &state);
                Self::broadcast(
                    &mut state,
                    &ServerMessage::StatusUpdate(StatusPayload {
                        status: GameStatus::Active,
                        game: Some(snapshot),
                        winner_id: None,
                    }),
                );
                debug!(game_id = %self.id, "race started");
                Ok(Transition::Started)
            }

            ClientMessage::PositionUpdate {
                player_id,
                position,
            } => {
                if state.status != GameStatus::Active {
                    return Err(GameError::Validation {
                        message: format!("game {} is not active", self.id),
                    });
                }

                let finish_line = state.text.chars().count();
                let position = usize::try_from(position)
                    .ok()
                    .filter(|p| *p <= finish_line)
                    .ok_or_else(|| GameError::Validation {
                        message: format!("position {position} outside 0..={finish_line}"),
                    })?;

                let Some(player) = state.players.iter_mut().find(|p| p.id == player_id) else {
                    return Err(GameError::Validation {
                        message: format!("player {player_id} is not in game {}", self.id),
                    });
                };
                player.position = position;

                if position == finish_line {
                    state.status = GameStatus::Ended;
                    state.winner = Some(player_id);
                    Self::broadcast(
                        &mut state,
                        &ServerMessage::StatusUpdate(StatusPayload {
                            status: GameStatus::Ended,
                            game: None,
                            winner_id: Some(player_id),
                        }),
                    );
                    counter!("games_finished_total").increment(1);
                    debug!(game_id = %self.id, winner = %player_id, "race finished");
                    Ok(Transition::Finished { winner: player_id })
                } else {
                    Self::broadcast(
                        &mut state,
                        &ServerMessage::PositionUpdate {
                            player_id,
                            position,
                        },
                    );
                    Ok(Transition::None)
                }
            }
        }
    }

    /// Whether the sweeper may reap this game: every joined participant's
    /// outbox is closed, or nobody ever joined and the game outlived `ttl`.
    pub fn is_abandoned(&self, ttl: Duration) -> bool {
        let state = self.state.lock();
        if state.players.is_empty() {
            return self.created_at.elapsed() >= ttl;
        }
        state.players.iter().all(|p| p.outbox.is_closed())
    }

    /// Serialize once, fan out to every participant, prune the unreachable.
    ///
    /// Delivery failures are logged and drop the participant from future
    /// fan-out; they never fail the transition that triggered the broadcast.
    fn broadcast(state: &mut GameState, message: &ServerMessage) {
        let frame = match message.encode() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(error = %e, "failed to serialize broadcast frame");
                return;
            }
        };
        state.players.retain(|player| {
            if player.outbox.send(Arc::clone(&frame)) {
                true
            } else {
                let err = GameError::Connection {
                    player_id: player.id,
                };
                counter!("ws_broadcast_drops_total").increment(1);
                warn!(code = err.code(), error = %err, "dropping unreachable participant");
                false
            }
        });
    }

    fn snapshot_locked(id: GameId, state: &GameState) -> GameSnapshot {
        GameSnapshot {
            game_id: id,
            status: state.status,
            text: state.text.clone(),
            players: state
                .players
                .iter()
                .map(|p| PlayerSnapshot {
                    player_id: p.id,
                    position: p.position,
                })
                .collect(),
            winner_id: state.winner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_outbox(capacity: usize) -> (Outbox, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Outbox::new(tx), rx)
    }

    fn join(game: &Game) -> (PlayerId, mpsc::Receiver<Arc<String>>) {
        let (outbox, rx) = make_outbox(32);
        let snap = game.join(outbox).unwrap();
        (snap.player_id, rx)
    }

    fn next_frame(rx: &mut mpsc::Receiver<Arc<String>>) -> serde_json::Value {
        let frame = rx.try_recv().expect("expected a frame");
        serde_json::from_str(&frame).unwrap()
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<String>>) {
        while rx.try_recv().is_ok() {}
    }

    fn position_update(player_id: PlayerId, position: i64) -> ClientMessage {
        ClientMessage::PositionUpdate {
            player_id,
            position,
        }
    }

    #[test]
    fn new_game_starts_created_and_empty() {
        let game = Game::new("race");
        let snap = game.snapshot();
        assert_eq!(snap.status, GameStatus::Created);
        assert_eq!(snap.text, "race");
        assert!(snap.players.is_empty());
        assert!(snap.winner_id.is_none());
    }

    #[test]
    fn join_broadcasts_to_everyone_including_joiner() {
        let game = Game::new("race");
        let (p1, mut rx1) = join(&game);

        let frame = next_frame(&mut rx1);
        assert_eq!(frame["type"], "join_notify");
        assert_eq!(frame["payload"]["player_id"], p1.to_string());
        assert_eq!(frame["payload"]["position"], 0);

        let (p2, mut rx2) = join(&game);
        // Existing participant hears about the newcomer...
        let frame = next_frame(&mut rx1);
        assert_eq!(frame["payload"]["player_id"], p2.to_string());
        // ...and the newcomer hears about itself.
        let frame = next_frame(&mut rx2);
        assert_eq!(frame["payload"]["player_id"], p2.to_string());
    }

    #[test]
    fn roster_preserves_join_order() {
        let game = Game::new("race");
        let (p1, _rx1) = join(&game);
        let (p2, _rx2) = join(&game);
        let snap = game.snapshot();
        assert_eq!(
            snap.players.iter().map(|p| p.player_id).collect::<Vec<_>>(),
            vec![p1, p2]
        );
    }

    #[test]
    fn start_game_broadcasts_snapshot() {
        let game = Game::new("race");
        let (_p1, mut rx1) = join(&game);
        drain(&mut rx1);

        let transition = game.apply(&ClientMessage::StartGame).unwrap();
        assert_eq!(transition, Transition::Started);
        assert_eq!(game.status(), GameStatus::Active);

        let frame = next_frame(&mut rx1);
        assert_eq!(frame["type"], "status_update");
        assert_eq!(frame["payload"]["status"], "active");
        assert_eq!(frame["payload"]["game"]["text"], "race");
    }

    #[test]
    fn duplicate_start_is_noop_with_single_broadcast() {
        let game = Game::new("race");
        let (_p1, mut rx1) = join(&game);
        drain(&mut rx1);

        assert_eq!(game.apply(&ClientMessage::StartGame).unwrap(), Transition::Started);
        assert_eq!(game.apply(&ClientMessage::StartGame).unwrap(), Transition::None);

        let frame = next_frame(&mut rx1);
        assert_eq!(frame["payload"]["status"], "active");
        // Exactly one status broadcast for the two start requests.
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn start_assigns_text_when_missing() {
        let game = Game::new("");
        let _ = game.apply(&ClientMessage::StartGame).unwrap();
        assert!(!game.snapshot().text.is_empty());
    }

    #[test]
    fn position_update_echoes_to_all_participants() {
        let game = Game::new("keyboard");
        let (p1, mut rx1) = join(&game);
        let (_p2, mut rx2) = join(&game);
        let _ = game.apply(&ClientMessage::StartGame).unwrap();
        drain(&mut rx1);
        drain(&mut rx2);

        let transition = game.apply(&position_update(p1, 3)).unwrap();
        assert_eq!(transition, Transition::None);

        for rx in [&mut rx1, &mut rx2] {
            let frame = next_frame(rx);
            assert_eq!(frame["type"], "position_update");
            assert_eq!(frame["payload"]["player_id"], p1.to_string());
            assert_eq!(frame["payload"]["position"], 3);
        }
    }

    #[test]
    fn terminal_position_ends_game_with_winner() {
        let game = Game::new("race");
        let (p1, mut rx1) = join(&game);
        let (p2, mut rx2) = join(&game);
        let _ = game.apply(&ClientMessage::StartGame).unwrap();
        drain(&mut rx1);
        drain(&mut rx2);

        let transition = game.apply(&position_update(p1, 4)).unwrap();
        assert_eq!(transition, Transition::Finished { winner: p1 });
        assert_eq!(game.status(), GameStatus::Ended);
        assert_eq!(game.snapshot().winner_id, Some(p1));

        let frame = next_frame(&mut rx2);
        assert_eq!(frame["type"], "status_update");
        assert_eq!(frame["payload"]["status"], "ended");
        assert_eq!(frame["payload"]["winner_id"], p1.to_string());

        // The runner-up's terminal update is rejected; the winner stands.
        let err = game.apply(&position_update(p2, 4)).unwrap_err();
        assert!(matches!(err, GameError::Closed { .. }));
        assert_eq!(game.snapshot().winner_id, Some(p1));
    }

    #[test]
    fn every_message_after_end_is_closed_without_broadcast() {
        let game = Game::new("race");
        let (p1, mut rx1) = join(&game);
        let _ = game.apply(&ClientMessage::StartGame).unwrap();
        let _ = game.apply(&position_update(p1, 4)).unwrap();
        drain(&mut rx1);

        assert!(matches!(
            game.apply(&ClientMessage::StartGame).unwrap_err(),
            GameError::Closed { .. }
        ));
        assert!(matches!(
            game.apply(&position_update(p1, 2)).unwrap_err(),
            GameError::Closed { .. }
        ));
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn join_after_end_is_rejected() {
        let game = Game::new("race");
        let (p1, _rx1) = join(&game);
        let _ = game.apply(&ClientMessage::StartGame).unwrap();
        let _ = game.apply(&position_update(p1, 4)).unwrap();

        let (outbox, _rx) = make_outbox(8);
        assert!(matches!(
            game.join(outbox).unwrap_err(),
            GameError::Closed { .. }
        ));
    }

    #[test]
    fn out_of_range_positions_are_rejected_without_mutation() {
        let game = Game::new("race");
        let (p1, mut rx1) = join(&game);
        let _ = game.apply(&ClientMessage::StartGame).unwrap();
        drain(&mut rx1);

        for bad in [-1, 5, i64::MAX] {
            let err = game.apply(&position_update(p1, bad)).unwrap_err();
            assert!(matches!(err, GameError::Validation { .. }), "position {bad}");
        }
        assert_eq!(game.snapshot().players[0].position, 0);
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn unknown_player_is_rejected() {
        let game = Game::new("race");
        let (_p1, _rx1) = join(&game);
        let _ = game.apply(&ClientMessage::StartGame).unwrap();

        let err = game.apply(&position_update(PlayerId::new(), 2)).unwrap_err();
        assert!(matches!(err, GameError::Validation { .. }));
    }

    #[test]
    fn position_update_before_start_is_rejected() {
        let game = Game::new("race");
        let (p1, _rx1) = join(&game);
        let err = game.apply(&position_update(p1, 2)).unwrap_err();
        assert!(matches!(err, GameError::Validation { .. }));
        assert_eq!(game.status(), GameStatus::Created);
    }

    #[test]
    fn finish_line_counts_chars_not_bytes() {
        let game = Game::new("héllo");
        let (p1, _rx1) = join(&game);
        let _ = game.apply(&ClientMessage::StartGame).unwrap();

        // 5 chars, 6 bytes: byte length must be out of range, char length wins.
        assert!(matches!(
            game.apply(&position_update(p1, 6)).unwrap_err(),
            GameError::Validation { .. }
        ));
        assert_eq!(
            game.apply(&position_update(p1, 5)).unwrap(),
            Transition::Finished { winner: p1 }
        );
    }

    #[test]
    fn unreachable_participant_is_pruned_from_roster() {
        let game = Game::new("race");
        let (p1, rx1) = join(&game);
        let (_p2, mut rx2) = join(&game);
        drop(rx1); // p1's connection task is gone
        drain(&mut rx2);

        let _ = game.apply(&ClientMessage::StartGame).unwrap();

        let snap = game.snapshot();
        assert_eq!(snap.players.len(), 1);
        assert!(snap.players.iter().all(|p| p.player_id != p1));
        // The survivor still got the broadcast.
        let frame = next_frame(&mut rx2);
        assert_eq!(frame["type"], "status_update");
    }

    #[test]
    fn slow_consumer_is_pruned_without_failing_the_broadcast() {
        let game = Game::new("keyboard");
        let (slow_outbox, _slow_rx) = make_outbox(1);
        let slow = game.join(slow_outbox).unwrap();
        let (fast, mut fast_rx) = join(&game);
        let _ = game.apply(&ClientMessage::StartGame).unwrap();
        drain(&mut fast_rx);

        // The slow player's queue (capacity 1) filled on its own join
        // broadcast; every later fan-out fails for it until it is pruned.
        let _ = game.apply(&position_update(fast, 1)).unwrap();
        let snap = game.snapshot();
        assert!(snap.players.iter().all(|p| p.player_id != slow.player_id));
        assert_eq!(next_frame(&mut fast_rx)["payload"]["position"], 1);
    }

    #[test]
    fn abandoned_when_every_outbox_is_closed() {
        let game = Game::new("race");
        let (_p1, rx1) = join(&game);
        let (_p2, rx2) = join(&game);
        assert!(!game.is_abandoned(Duration::ZERO));
        drop(rx1);
        assert!(!game.is_abandoned(Duration::ZERO));
        drop(rx2);
        assert!(game.is_abandoned(Duration::ZERO));
    }

    #[test]
    fn empty_game_abandoned_only_after_ttl() {
        let game = Game::new("race");
        assert!(!game.is_abandoned(Duration::from_secs(3600)));
        assert!(game.is_abandoned(Duration::ZERO));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_terminal_updates_produce_exactly_one_winner() {
        let game = Arc::new(Game::new("race"));
        let (p1, _rx1) = join(&game);
        let (p2, _rx2) = join(&game);
        let _ = game.apply(&ClientMessage::StartGame).unwrap();

        let g1 = Arc::clone(&game);
        let g2 = Arc::clone(&game);
        let t1 = tokio::spawn(async move { g1.apply(&position_update(p1, 4)) });
        let t2 = tokio::spawn(async move { g2.apply(&position_update(p2, 4)) });
        let results = [t1.await.unwrap(), t2.await.unwrap()];

        let finishes: Vec<_> = results
            .iter()
            .filter_map(|r| match r {
                Ok(Transition::Finished { winner }) => Some(*winner),
                _ => None,
            })
            .collect();
        let rejections = results
            .iter()
            .filter(|r| matches!(r, Err(GameError::Closed { .. })))
            .count();

        assert_eq!(finishes.len(), 1, "exactly one winning transition");
        assert_eq!(rejections, 1, "the loser observes the terminal state");
        assert_eq!(game.snapshot().winner_id, Some(finishes[0]));
    }
}
