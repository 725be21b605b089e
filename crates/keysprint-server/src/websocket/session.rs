//! One participant's connection lifecycle, from upgrade through disconnect.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use keysprint_core::GameError;
use keysprint_core::protocol::ClientMessage;
use keysprint_engine::{Game, Outbox, Transition};

use crate::server::AppState;

/// Run one participant's session on an upgraded socket.
///
/// 1. Joins the game (the `join_notify` broadcast tells the client its id)
/// 2. Spawns the outbound forwarder: drains the bounded frame queue into the
///    socket and sends periodic Ping frames
/// 3. Dispatches each inbound text frame to the game; malformed frames and
///    rejected updates are logged and skipped, a finished or closed game
///    ends the loop
/// 4. Flushes pending frames, closes the socket, and cleans up
///
/// No lock is held across any socket await; the per-game lock lives entirely
/// inside `join`/`apply`.
#[instrument(skip_all, fields(game_id = %game.id()))]
pub async fn run_player_session(socket: WebSocket, game: Arc<Game>, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(state.config.send_queue_size);
    let joined = match game.join(Outbox::new(send_tx)) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            // The game ended between the arena lookup and the upgrade.
            warn!(error = %err, "attach rejected");
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };
    let player_id = joined.player_id;

    info!(player_id = %player_id, "player connected");
    counter!("ws_connections_total").increment(1);
    gauge!("ws_connections_active").increment(1.0);
    let _ = state.connections.fetch_add(1, Ordering::Relaxed);

    // Outbound forwarder. On cancellation it flushes whatever the final
    // transition queued before closing, so a winner announcement is not lost
    // to the race between the broadcast and this handler exiting.
    let cancel = CancellationToken::new();
    let forwarder_cancel = cancel.clone();
    let ping_interval = Duration::from_secs(state.config.ping_interval_secs);
    let forwarder = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        // Skip the immediate first tick
        let _ = ping.tick().await;
        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    match frame {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        return;
                    }
                }
                () = forwarder_cancel.cancelled() => {
                    while let Ok(text) = send_rx.try_recv() {
                        if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                            return;
                        }
                    }
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return;
                }
            }
        }
    });

    while let Some(Ok(frame)) = ws_rx.next().await {
        let text = match frame {
            Message::Text(ref t) => t.to_string(),
            Message::Close(_) => {
                debug!(player_id = %player_id, "client sent close frame");
                break;
            }
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => continue,
        };

        let message = match ClientMessage::decode(&text) {
            Ok(message) => message,
            Err(err) => {
                warn!(player_id = %player_id, error = %err, "dropping undecodable frame");
                continue;
            }
        };

        match game.apply(&message) {
            Ok(Transition::Finished { winner }) => {
                state.arena.remove(game.id());
                debug!(winner = %winner, "race finished, evicting game");
                break;
            }
            Ok(_) => {}
            Err(GameError::Closed { .. }) => {
                debug!(player_id = %player_id, "game already over");
                break;
            }
            Err(err) => {
                warn!(player_id = %player_id, code = err.code(), error = %err, "message rejected");
            }
        }
    }

    info!(player_id = %player_id, "player disconnected");
    gauge!("ws_connections_active").decrement(1.0);
    let _ = state.connections.fetch_sub(1, Ordering::Relaxed);

    cancel.cancel();
    if tokio::time::timeout(Duration::from_secs(5), forwarder)
        .await
        .is_err()
    {
        warn!(player_id = %player_id, "outbound forwarder did not drain in time");
    }
}
