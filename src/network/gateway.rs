//! Session Gateway
//!
//! Bridges inbound client events to queue and game operations. The gateway
//! is a pure dispatcher: every handler returns a list of [`Effect`]s for
//! the transport layer to execute, and performs no socket I/O itself. That
//! keeps every matchmaking and match rule testable without a WebSocket.
//!
//! Handlers are tolerant by design: a stale room, a caller that is not a
//! player, or an out-of-order tick is ignored or answered with
//! `game_not_found`, never treated as fatal. Simulation time advances only
//! on ticks from the connection bound to player1; player2's `update_ball`
//! events are dropped silently so the physics can never double-step.

use tracing::{debug, error, info};

use crate::game::queue::{QueueError, QueueRepository};
use crate::game::state::{ConnectionId, MatchResultDto, MoveDirection, RoomId, Side};
use crate::network::external::GameDirectory;
use crate::network::protocol::{
    AcceptChallengePayload, ChallengePayload, ClientEvent, JoinGamePayload, PowerUpDto,
    ServerEvent,
};

/// One outbound action for the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send to the calling connection only.
    Send(ServerEvent),
    /// Fan out to every socket joined to the room (players + spectators).
    Broadcast {
        /// Target room.
        room: RoomId,
        /// Event to fan out.
        event: ServerEvent,
    },
    /// Fan out to every connected socket.
    BroadcastAll(ServerEvent),
    /// Join the calling connection to a room channel.
    JoinRoom(RoomId),
    /// Remove the calling connection from a room channel.
    LeaveRoom(RoomId),
    /// Dissolve a room channel entirely once its match is retired, so a
    /// reused room id never reaches stale members.
    CloseRoom(RoomId),
}

fn not_found(message: Option<&str>) -> Effect {
    Effect::Send(ServerEvent::GameNotFound {
        message: message.map(str::to_string),
    })
}

/// The event dispatcher. Owns the queue; collaborator checks go through the
/// injected [`GameDirectory`].
pub struct Gateway<Q, D> {
    queue: Q,
    directory: D,
}

impl<Q: QueueRepository, D: GameDirectory> Gateway<Q, D> {
    /// Create a gateway over a queue and a collaborator directory.
    pub fn new(queue: Q, directory: D) -> Self {
        Self { queue, directory }
    }

    /// Read access to the queue (state inspection, tests).
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Handle one inbound event to completion.
    pub async fn dispatch(&mut self, conn: ConnectionId, event: ClientEvent) -> Vec<Effect> {
        match event {
            ClientEvent::Challenge(payload) => self.on_challenge(conn, payload).await,
            ClientEvent::AcceptChallenge(payload) => self.on_accept_challenge(conn, payload).await,
            ClientEvent::RejectChallenge { room } => {
                vec![Effect::Broadcast {
                    room,
                    event: ServerEvent::RejectChallenge,
                }]
            }
            ClientEvent::JoinGame(payload) => self.on_join_game(conn, payload),
            ClientEvent::Move { direction, room } => self.on_move(conn, room, direction),
            ClientEvent::UpdateBall { room } => self.on_update_ball(conn, room).await,
            ClientEvent::GetGameList => {
                vec![Effect::BroadcastAll(ServerEvent::GameList {
                    games: self.queue.live_games(),
                })]
            }
            ClientEvent::WatchGame { room } => self.on_watch_game(room),
            ClientEvent::LeftGame => self.on_leave(conn).await,
        }
    }

    /// Treat a dropped socket like a voluntary leave.
    pub async fn handle_disconnect(&mut self, conn: ConnectionId) -> Vec<Effect> {
        self.on_leave(conn).await
    }

    async fn on_challenge(&mut self, conn: ConnectionId, payload: ChallengePayload) -> Vec<Effect> {
        let ChallengePayload {
            user_source,
            user_target,
            with_power_ups,
        } = payload;

        if self.queue.is_player_queued(&user_source) {
            return vec![not_found(Some("You are already in a game!"))];
        }
        if self.queue.is_player_queued(&user_target) {
            return vec![not_found(Some("User are already in a game or on queue!"))];
        }
        if user_source == user_target {
            return vec![not_found(None)];
        }
        if self.directory.is_blocked(&user_source, &user_target).await {
            return vec![not_found(Some("This user is blocked!"))];
        }
        if !self.directory.is_user_online(&user_target).await {
            return vec![not_found(Some("This user is not available!"))];
        }

        let room = match self
            .queue
            .create_challenge(&user_source, &user_target, with_power_ups)
        {
            Ok(room) => room,
            Err(QueueError::AlreadyQueued) | Err(QueueError::NotFound) => {
                return vec![not_found(None)];
            }
        };
        let Some(game) = self.queue.game_mut(room) else {
            return vec![not_found(None)];
        };
        game.bind(Side::Player1, conn, &user_source);
        let dto = game.game_dto();
        debug!(%conn, room, source = %user_source, target = %user_target, with_power_ups, "challenge created");
        vec![
            Effect::JoinRoom(room),
            Effect::Broadcast {
                room,
                event: ServerEvent::UpdateGame(dto),
            },
            Effect::Send(ServerEvent::GameRoom { room }),
        ]
    }

    async fn on_accept_challenge(
        &mut self,
        conn: ConnectionId,
        payload: AcceptChallengePayload,
    ) -> Vec<Effect> {
        let room = payload.room;
        // Names read before the block check so no game borrow is held
        // across the await. A started game is no longer acceptable: the
        // names are public via the game list, and a second accept would
        // re-bind the running slot.
        let (challenger, challenged) = match self.queue.game(room) {
            Some(game) if !game.has_started => {
                (game.player1.name.clone(), game.player2.name.clone())
            }
            _ => return vec![not_found(None)],
        };
        let (Some(challenger), Some(challenged)) = (challenger, challenged) else {
            return vec![not_found(None)];
        };

        // Block status may have changed since the challenge was issued
        if self.directory.is_blocked(&challenger, &challenged).await {
            return vec![
                not_found(None),
                Effect::Broadcast {
                    room,
                    event: ServerEvent::GameNotFound {
                        message: Some("Some error occurred with the challenge".to_string()),
                    },
                },
            ];
        }

        if challenged != payload.user_source || challenger != payload.user_target {
            return vec![not_found(None)];
        }
        let Some(game) = self.queue.game_mut(room) else {
            return vec![not_found(None)];
        };
        game.bind(Side::Player2, conn, &payload.user_source);
        game.start();
        let dto = game.game_dto();
        info!(%conn, room, accepter = %payload.user_source, "challenge accepted, game started");

        let mut effects = vec![
            Effect::JoinRoom(room),
            Effect::Send(ServerEvent::UpdateGame(dto.clone())),
        ];
        effects.extend(self.refresh_emits(room));
        effects.push(Effect::Broadcast {
            room,
            event: ServerEvent::StartGame(dto),
        });
        effects.push(Effect::BroadcastAll(ServerEvent::GameList {
            games: self.queue.live_games(),
        }));
        effects
    }

    fn on_join_game(&mut self, conn: ConnectionId, payload: JoinGamePayload) -> Vec<Effect> {
        let room = match self
            .queue
            .find_or_create_slot(&payload.name, payload.with_power_ups)
        {
            Ok(room) => room,
            Err(QueueError::AlreadyQueued) => {
                return vec![not_found(Some("You are already in a game!"))];
            }
            Err(QueueError::NotFound) => return vec![not_found(None)],
        };
        let Some(game) = self.queue.game_mut(room) else {
            return vec![not_found(None)];
        };

        if !game.player1.is_bound() {
            game.bind(Side::Player1, conn, &payload.name);
            let dto = game.game_dto();
            debug!(%conn, room, name = %payload.name, "player one waiting");
            return vec![
                Effect::JoinRoom(room),
                Effect::Broadcast {
                    room,
                    event: ServerEvent::UpdateGame(dto),
                },
            ];
        }

        game.bind(Side::Player2, conn, &payload.name);
        game.start();
        let dto = game.game_dto();
        info!(%conn, room, name = %payload.name, "player two joined, game started");

        let mut effects = vec![Effect::JoinRoom(room)];
        effects.extend(self.refresh_emits(room));
        effects.push(Effect::Broadcast {
            room,
            event: ServerEvent::StartGame(dto),
        });
        effects.push(Effect::BroadcastAll(ServerEvent::GameList {
            games: self.queue.live_games(),
        }));
        effects
    }

    fn on_move(&mut self, conn: ConnectionId, room: RoomId, direction: MoveDirection) -> Vec<Effect> {
        let Some(game) = self.queue.game_mut(room) else {
            return Vec::new();
        };
        // Spectators and strangers get no feedback
        let Some(side) = game.side_of(conn) else {
            return Vec::new();
        };
        if game.is_paddle_collision(side, direction) {
            return Vec::new();
        }
        game.apply_move(side, direction);
        vec![Effect::Broadcast {
            room,
            event: ServerEvent::UpdatePlayer {
                player1: game.player_dto(Side::Player1),
                player2: game.player_dto(Side::Player2),
            },
        }]
    }

    async fn on_update_ball(&mut self, conn: ConnectionId, room: RoomId) -> Vec<Effect> {
        let mut effects = Vec::new();
        let mut finished: Option<MatchResultDto> = None;
        {
            let Some(game) = self.queue.game_mut(room) else {
                return effects;
            };
            // Only player1's connection drives simulation time
            if game.player1.connection != Some(conn) {
                return effects;
            }

            let scored = game.update();
            if scored {
                effects.push(Effect::Broadcast {
                    room,
                    event: ServerEvent::UpdateScore {
                        player1: game.player1.score,
                        player2: game.player2.score,
                    },
                });
                effects.push(Effect::Broadcast {
                    room,
                    event: ServerEvent::UpdatePlayer {
                        player1: game.player_dto(Side::Player1),
                        player2: game.player_dto(Side::Player2),
                    },
                });
                if let Some(power_up) = game.power_up.as_ref() {
                    effects.push(Effect::Broadcast {
                        room,
                        event: ServerEvent::UpdatePowerUp(PowerUpDto::from_box(power_up)),
                    });
                }
            }

            if game.check_winner() {
                effects.push(Effect::Broadcast {
                    room,
                    event: ServerEvent::EndGame(game.game_dto()),
                });
                finished = Some(game.result_dto());
            } else {
                effects.push(Effect::Broadcast {
                    room,
                    event: ServerEvent::UpdateBall {
                        ball: game.ball,
                        scored,
                    },
                });
                if let Some(power_up) = game.power_up.as_mut() {
                    if power_up.update_send {
                        power_up.update_send = false;
                        let dto = PowerUpDto::from_box(power_up);
                        let active = power_up.is_active();
                        effects.push(Effect::Broadcast {
                            room,
                            event: ServerEvent::UpdatePowerUp(dto),
                        });
                        if active {
                            effects.push(Effect::Broadcast {
                                room,
                                event: ServerEvent::UpdatePlayer {
                                    player1: game.player_dto(Side::Player1),
                                    player2: game.player_dto(Side::Player2),
                                },
                            });
                        }
                    }
                }
            }
        }

        if let Some(result) = finished {
            info!(room, winner = result.winner.as_deref().unwrap_or("-"), "game over");
            self.queue.remove(room);
            // Membership must not outlive the match: the id is free for
            // reuse the moment the game leaves the queue
            effects.push(Effect::CloseRoom(room));
            effects.push(Effect::BroadcastAll(ServerEvent::GameList {
                games: self.queue.live_games(),
            }));
            self.persist(result).await;
        }
        effects
    }

    fn on_watch_game(&mut self, room: RoomId) -> Vec<Effect> {
        let Some(game) = self.queue.game(room) else {
            return vec![not_found(None)];
        };
        if !game.has_started || game.has_ended {
            return vec![not_found(Some("Game not available!"))];
        }
        let dto = game.game_dto();
        debug!(room, "spectator joined");

        let mut effects = vec![Effect::JoinRoom(room)];
        effects.extend(self.refresh_emits(room));
        effects.push(Effect::Broadcast {
            room,
            event: ServerEvent::UpdateGame(dto),
        });
        effects
    }

    /// Retire whatever game the connection is bound to. The remaining player
    /// wins; a game nobody started is discarded without a result.
    async fn on_leave(&mut self, conn: ConnectionId) -> Vec<Effect> {
        let Some(room) = self.queue.find_by_connection(conn) else {
            return Vec::new();
        };
        let mut effects = Vec::new();
        let mut result = None;
        if let Some(game) = self.queue.game_mut(room) {
            if game.winner.is_none() {
                if let Some(side) = game.side_of(conn) {
                    game.slot_mut(side).quit = true;
                }
                game.check_winner();
            }
            if game.has_started {
                result = Some(game.result_dto());
            }
            effects.push(Effect::LeaveRoom(room));
            effects.push(Effect::Broadcast {
                room,
                event: ServerEvent::EndGame(game.game_dto()),
            });
        }
        self.queue.remove(room);
        info!(%conn, room, "game retired after leave");
        effects.push(Effect::CloseRoom(room));
        effects.push(Effect::BroadcastAll(ServerEvent::GameList {
            games: self.queue.live_games(),
        }));
        if let Some(result) = result {
            self.persist(result).await;
        }
        effects
    }

    /// The refresh a room needs after a lifecycle change: both players, the
    /// ball, and the score.
    fn refresh_emits(&self, room: RoomId) -> Vec<Effect> {
        let Some(game) = self.queue.game(room) else {
            return Vec::new();
        };
        vec![
            Effect::Broadcast {
                room,
                event: ServerEvent::UpdatePlayer {
                    player1: game.player_dto(Side::Player1),
                    player2: game.player_dto(Side::Player2),
                },
            },
            Effect::Broadcast {
                room,
                event: ServerEvent::UpdateBall {
                    ball: game.ball,
                    scored: false,
                },
            },
            Effect::Broadcast {
                room,
                event: ServerEvent::UpdateScore {
                    player1: game.player1.score,
                    player2: game.player2.score,
                },
            },
        ]
    }

    /// Fire-and-forget result persistence; failures never block teardown.
    async fn persist(&self, result: MatchResultDto) {
        if let Err(err) = self.directory.record_result(result).await {
            error!("failed to persist match result: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    use crate::game::queue::GameQueue;
    use crate::network::protocol::JoinGamePayload;
    use crate::{Vec2, BALL_RADIUS, FIELD_HEIGHT};

    /// Configurable collaborator double.
    #[derive(Default, Clone)]
    struct StubDirectory {
        offline: HashSet<String>,
        blocked: HashSet<(String, String)>,
        recorded: Arc<Mutex<Vec<MatchResultDto>>>,
    }

    impl StubDirectory {
        fn block(mut self, a: &str, b: &str) -> Self {
            self.blocked.insert((a.to_string(), b.to_string()));
            self
        }

        fn offline(mut self, login: &str) -> Self {
            self.offline.insert(login.to_string());
            self
        }

        fn results(&self) -> Vec<MatchResultDto> {
            self.recorded.lock().unwrap().clone()
        }
    }

    impl GameDirectory for StubDirectory {
        async fn is_user_online(&self, login: &str) -> bool {
            !self.offline.contains(login)
        }

        async fn is_blocked(&self, a: &str, b: &str) -> bool {
            self.blocked.contains(&(a.to_string(), b.to_string()))
                || self.blocked.contains(&(b.to_string(), a.to_string()))
        }

        async fn record_result(&self, result: MatchResultDto) -> anyhow::Result<()> {
            self.recorded.lock().unwrap().push(result);
            Ok(())
        }
    }

    fn gateway(directory: StubDirectory) -> Gateway<GameQueue, StubDirectory> {
        Gateway::new(GameQueue::new(), directory)
    }

    fn join(name: &str, with_power_ups: bool) -> ClientEvent {
        ClientEvent::JoinGame(JoinGamePayload {
            name: name.to_string(),
            with_power_ups,
        })
    }

    fn challenge(source: &str, target: &str) -> ClientEvent {
        ClientEvent::Challenge(ChallengePayload {
            user_source: source.to_string(),
            user_target: target.to_string(),
            with_power_ups: false,
        })
    }

    fn sent_not_found(effects: &[Effect]) -> Option<Option<String>> {
        effects.iter().find_map(|e| match e {
            Effect::Send(ServerEvent::GameNotFound { message }) => Some(message.clone()),
            _ => None,
        })
    }

    fn contains_start_game(effects: &[Effect]) -> bool {
        effects.iter().any(|e| {
            matches!(
                e,
                Effect::Broadcast {
                    event: ServerEvent::StartGame(_),
                    ..
                }
            )
        })
    }

    /// Pair two players through open matchmaking and return their
    /// connections and room.
    async fn start_match(
        gw: &mut Gateway<GameQueue, StubDirectory>,
    ) -> (ConnectionId, ConnectionId, RoomId) {
        let (ada, grace) = (Uuid::new_v4(), Uuid::new_v4());
        gw.dispatch(ada, join("ada", false)).await;
        let effects = gw.dispatch(grace, join("grace", false)).await;
        assert!(contains_start_game(&effects));
        let room = gw.queue().find_by_connection(ada).unwrap();
        (ada, grace, room)
    }

    #[tokio::test]
    async fn test_two_joins_share_one_started_game() {
        let mut gw = gateway(StubDirectory::default());
        let (ada, grace, room) = start_match(&mut gw).await;

        assert_eq!(gw.queue().len(), 1);
        assert_eq!(gw.queue().find_by_connection(grace), Some(room));
        let game = gw.queue().game(room).unwrap();
        assert!(game.has_started && !game.waiting);
        assert_eq!(game.side_of(ada), Some(Side::Player1));
        assert_eq!(game.side_of(grace), Some(Side::Player2));
    }

    #[tokio::test]
    async fn test_duplicate_nickname_cannot_wait_twice() {
        let mut gw = gateway(StubDirectory::default());
        gw.dispatch(Uuid::new_v4(), join("ada", false)).await;
        let effects = gw.dispatch(Uuid::new_v4(), join("ada", false)).await;

        assert_eq!(
            sent_not_found(&effects),
            Some(Some("You are already in a game!".to_string()))
        );
        assert_eq!(gw.queue().len(), 1);
    }

    #[tokio::test]
    async fn test_challenge_between_blocked_users_creates_nothing() {
        let mut gw = gateway(StubDirectory::default().block("ada", "grace"));
        let effects = gw.dispatch(Uuid::new_v4(), challenge("ada", "grace")).await;

        assert_eq!(
            sent_not_found(&effects),
            Some(Some("This user is blocked!".to_string()))
        );
        assert!(gw.queue().is_empty());
    }

    #[tokio::test]
    async fn test_challenge_offline_target_rejected() {
        let mut gw = gateway(StubDirectory::default().offline("grace"));
        let effects = gw.dispatch(Uuid::new_v4(), challenge("ada", "grace")).await;

        assert_eq!(
            sent_not_found(&effects),
            Some(Some("This user is not available!".to_string()))
        );
        assert!(gw.queue().is_empty());
    }

    #[tokio::test]
    async fn test_self_challenge_rejected() {
        let mut gw = gateway(StubDirectory::default());
        let effects = gw.dispatch(Uuid::new_v4(), challenge("ada", "ada")).await;

        assert_eq!(sent_not_found(&effects), Some(None));
        assert!(gw.queue().is_empty());
    }

    #[tokio::test]
    async fn test_challenge_accept_starts_game() {
        let mut gw = gateway(StubDirectory::default());
        let (ada, grace) = (Uuid::new_v4(), Uuid::new_v4());

        let effects = gw.dispatch(ada, challenge("ada", "grace")).await;
        let room = effects
            .iter()
            .find_map(|e| match e {
                Effect::Send(ServerEvent::GameRoom { room }) => Some(*room),
                _ => None,
            })
            .expect("challenger should get a room");

        let effects = gw
            .dispatch(
                grace,
                ClientEvent::AcceptChallenge(AcceptChallengePayload {
                    room,
                    user_source: "grace".to_string(),
                    user_target: "ada".to_string(),
                }),
            )
            .await;
        assert!(contains_start_game(&effects));
        assert!(gw.queue().game(room).unwrap().has_started);
    }

    #[tokio::test]
    async fn test_accept_by_wrong_player_rejected() {
        let mut gw = gateway(StubDirectory::default());
        let ada = Uuid::new_v4();
        gw.dispatch(ada, challenge("ada", "grace")).await;
        let room = gw.queue().find_by_connection(ada).unwrap();

        let effects = gw
            .dispatch(
                Uuid::new_v4(),
                ClientEvent::AcceptChallenge(AcceptChallengePayload {
                    room,
                    user_source: "eve".to_string(),
                    user_target: "ada".to_string(),
                }),
            )
            .await;
        assert_eq!(sent_not_found(&effects), Some(None));
        assert!(!gw.queue().game(room).unwrap().has_started);
    }

    #[tokio::test]
    async fn test_accept_on_started_game_cannot_rebind_slot() {
        let mut gw = gateway(StubDirectory::default());
        let (ada, grace) = (Uuid::new_v4(), Uuid::new_v4());
        gw.dispatch(ada, challenge("ada", "grace")).await;
        let room = gw.queue().find_by_connection(ada).unwrap();

        let accept = AcceptChallengePayload {
            room,
            user_source: "grace".to_string(),
            user_target: "ada".to_string(),
        };
        gw.dispatch(grace, ClientEvent::AcceptChallenge(accept.clone()))
            .await;
        assert!(gw.queue().game(room).unwrap().has_started);

        // Names are public via the game list; a copycat accept mid-match
        // must not steal the bound connection
        let effects = gw
            .dispatch(Uuid::new_v4(), ClientEvent::AcceptChallenge(accept))
            .await;
        assert_eq!(sent_not_found(&effects), Some(None));
        assert_eq!(
            gw.queue().game(room).unwrap().player2.connection,
            Some(grace)
        );
    }

    #[tokio::test]
    async fn test_move_from_spectator_ignored() {
        let mut gw = gateway(StubDirectory::default());
        let (_, _, room) = start_match(&mut gw).await;

        let effects = gw
            .dispatch(
                Uuid::new_v4(),
                ClientEvent::Move {
                    direction: MoveDirection::Up,
                    room,
                },
            )
            .await;
        assert!(effects.is_empty());
    }

    #[tokio::test]
    async fn test_move_against_wall_ignored() {
        let mut gw = gateway(StubDirectory::default());
        let (ada, _, room) = start_match(&mut gw).await;

        // Walk the paddle to the top, then one step further
        loop {
            let effects = gw
                .dispatch(
                    ada,
                    ClientEvent::Move {
                        direction: MoveDirection::Up,
                        room,
                    },
                )
                .await;
            if effects.is_empty() {
                break;
            }
        }
        let game = gw.queue().game(room).unwrap();
        let y = game.player1.paddle.y;
        assert!(y >= 0.0 && y < crate::PADDLE_STEP);
    }

    #[tokio::test]
    async fn test_update_ball_authority_is_player1() {
        let mut gw = gateway(StubDirectory::default());
        let (ada, grace, room) = start_match(&mut gw).await;

        let before = gw.queue().game(room).unwrap().ball.pos;
        let effects = gw.dispatch(grace, ClientEvent::UpdateBall { room }).await;
        assert!(effects.is_empty());
        assert_eq!(gw.queue().game(room).unwrap().ball.pos, before);

        let effects = gw.dispatch(ada, ClientEvent::UpdateBall { room }).await;
        assert!(!effects.is_empty());
        assert_ne!(gw.queue().game(room).unwrap().ball.pos, before);
    }

    #[tokio::test]
    async fn test_update_ball_for_unknown_room_ignored() {
        let mut gw = gateway(StubDirectory::default());
        let effects = gw
            .dispatch(Uuid::new_v4(), ClientEvent::UpdateBall { room: 999 })
            .await;
        assert!(effects.is_empty());
    }

    #[tokio::test]
    async fn test_winning_tick_retires_game_and_persists() {
        let directory = StubDirectory::default();
        let mut gw = gateway(directory.clone());
        let (ada, _, room) = start_match(&mut gw).await;

        {
            let game = gw.queue.game_mut(room).unwrap();
            game.player1.score = crate::WINNING_SCORE - 1;
            // Park the ball so the next tick scores for player1
            game.player2.paddle.y = 0.0;
            game.ball.pos = Vec2::new(crate::FIELD_WIDTH - BALL_RADIUS + 1.0, FIELD_HEIGHT - 50.0);
            game.ball.vel = Vec2::new(2.0 * BALL_RADIUS, 0.0);
        }

        let effects = gw.dispatch(ada, ClientEvent::UpdateBall { room }).await;
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Broadcast {
                event: ServerEvent::EndGame(_),
                ..
            }
        )));
        assert!(gw.queue().game(room).is_none());

        let results = directory.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].winner.as_deref(), Some("ada"));
        assert_eq!(results[0].winner_score, crate::WINNING_SCORE);
    }

    #[tokio::test]
    async fn test_natural_end_closes_room_before_id_reuse() {
        let mut gw = gateway(StubDirectory::default());
        let (ada, _, room) = start_match(&mut gw).await;

        {
            let game = gw.queue.game_mut(room).unwrap();
            game.player1.score = crate::WINNING_SCORE - 1;
            game.player2.paddle.y = 0.0;
            game.ball.pos = Vec2::new(crate::FIELD_WIDTH - BALL_RADIUS + 1.0, FIELD_HEIGHT - 50.0);
            game.ball.vel = Vec2::new(2.0 * BALL_RADIUS, 0.0);
        }

        let effects = gw.dispatch(ada, ClientEvent::UpdateBall { room }).await;
        // The freed id is immediately reusable, so the room channel must be
        // dissolved in the same effect list that announced the end
        assert_eq!(gw.queue().allocate_room_id(room), room);
        let end = effects.iter().position(|e| {
            matches!(
                e,
                Effect::Broadcast {
                    event: ServerEvent::EndGame(_),
                    ..
                }
            )
        });
        let close = effects.iter().position(|e| *e == Effect::CloseRoom(room));
        assert!(end.is_some());
        assert!(close.unwrap() > end.unwrap());
    }

    #[tokio::test]
    async fn test_disconnect_mid_match_declares_remaining_winner() {
        let directory = StubDirectory::default();
        let mut gw = gateway(directory.clone());
        let (ada, _, room) = start_match(&mut gw).await;

        {
            let game = gw.queue.game_mut(room).unwrap();
            game.player1.score = 3;
            game.player2.score = 1;
        }

        let effects = gw.handle_disconnect(ada).await;
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Broadcast {
                event: ServerEvent::EndGame(_),
                ..
            }
        )));
        assert!(effects.contains(&Effect::CloseRoom(room)));
        assert!(gw.queue().is_empty());

        let results = directory.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].winner.as_deref(), Some("grace"));
        assert_eq!(results[0].winner_score, 1);
        assert_eq!(results[0].loser_score, 3);
    }

    #[tokio::test]
    async fn test_waiting_game_discarded_without_result() {
        let directory = StubDirectory::default();
        let mut gw = gateway(directory.clone());
        let ada = Uuid::new_v4();
        gw.dispatch(ada, join("ada", false)).await;

        gw.handle_disconnect(ada).await;
        assert!(gw.queue().is_empty());
        assert!(directory.results().is_empty());
    }

    #[tokio::test]
    async fn test_watch_game_rules() {
        let mut gw = gateway(StubDirectory::default());
        let spectator = Uuid::new_v4();

        // Unknown room
        let effects = gw
            .dispatch(spectator, ClientEvent::WatchGame { room: 123 })
            .await;
        assert_eq!(sent_not_found(&effects), Some(None));

        // Waiting game is not watchable
        let ada = Uuid::new_v4();
        gw.dispatch(ada, join("ada", false)).await;
        let room = gw.queue().find_by_connection(ada).unwrap();
        let effects = gw.dispatch(spectator, ClientEvent::WatchGame { room }).await;
        assert_eq!(
            sent_not_found(&effects),
            Some(Some("Game not available!".to_string()))
        );

        // Started game is
        gw.dispatch(Uuid::new_v4(), join("grace", false)).await;
        let effects = gw.dispatch(spectator, ClientEvent::WatchGame { room }).await;
        assert!(effects.contains(&Effect::JoinRoom(room)));
    }

    #[tokio::test]
    async fn test_game_list_reports_live_games_only() {
        let mut gw = gateway(StubDirectory::default());
        gw.dispatch(Uuid::new_v4(), join("ada", false)).await;

        let effects = gw.dispatch(Uuid::new_v4(), ClientEvent::GetGameList).await;
        match &effects[0] {
            Effect::BroadcastAll(ServerEvent::GameList { games }) => assert!(games.is_empty()),
            other => panic!("expected game list, got {other:?}"),
        }

        gw.dispatch(Uuid::new_v4(), join("grace", false)).await;
        let effects = gw.dispatch(Uuid::new_v4(), ClientEvent::GetGameList).await;
        match &effects[0] {
            Effect::BroadcastAll(ServerEvent::GameList { games }) => assert_eq!(games.len(), 1),
            other => panic!("expected game list, got {other:?}"),
        }
    }
}
