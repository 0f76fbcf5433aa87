//! Room actor: an isolated Tokio task that owns one game.
//!
//! Each room runs in its own task and is only reachable through its command
//! channel, so every operation on a room is applied one at a time, in the
//! order it was received. No lock guards a room's state.
//!
//! Outbound events are queued while a command is handled and delivered
//! afterwards, in queue order, over unbounded channels. Delivery never
//! waits on a client's network connection.

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::time::{SystemTime, UNIX_EPOCH};

use digitduel_protocol::{
    EndReason, Feedback, GameMode, GuessRecord, Identity, MAX_PLAYERS, Phase, PlayerView,
    RoomId, RoomListEntry, RoomSnapshot, ServerEvent, UserId,
};
use digitduel_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

use crate::feedback::{self, Code};
use crate::presence;
use crate::registry::RegistryLink;
use crate::supervisor::{self, ConnectionSupervisor};
use crate::{RoomConfig, RoomError};

/// Channel sender for delivering events to one client connection.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Where a room sends events for one occupant: the connection's id plus its
/// outbound channel.
///
/// The id lets the room ignore a close reported by a connection that has
/// already been replaced.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: EventSender,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, sender: EventSender) -> Self {
        Self { id, sender }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues `event` for the connection. Returns `false` if it is gone.
    pub(crate) fn push(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Room metadata as the directory sees it. Never carries secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub mode: GameMode,
    pub phase: Phase,
    /// Seat 0.
    pub host: Option<Identity>,
    /// Seat 1.
    pub guest: Option<Identity>,
}

impl RoomSummary {
    pub fn occupants(&self) -> usize {
        usize::from(self.host.is_some()) + usize::from(self.guest.is_some())
    }

    /// Both seats are filled and the game is past the lobby.
    pub fn is_ready(&self) -> bool {
        self.occupants() == MAX_PLAYERS && self.phase != Phase::Waiting
    }

    /// Shown in other users' "available" listing.
    pub fn is_open(&self) -> bool {
        self.phase.is_joinable() && self.occupants() < MAX_PLAYERS
    }

    pub fn is_host(&self, user_id: &UserId) -> bool {
        self.host.as_ref().is_some_and(|host| &host.user_id == user_id)
    }

    pub fn is_guest(&self, user_id: &UserId) -> bool {
        self.guest.as_ref().is_some_and(|guest| &guest.user_id == user_id)
    }

    pub fn has_occupant(&self, user_id: &UserId) -> bool {
        self.is_host(user_id) || self.is_guest(user_id)
    }

    pub fn entry(&self) -> RoomListEntry {
        RoomListEntry {
            room_id: self.room_id.clone(),
            host_name: self
                .host
                .as_ref()
                .map(|host| host.display_name.clone())
                .unwrap_or_default(),
            mode: self.mode,
            players: self.occupants(),
            max_players: MAX_PLAYERS,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        identity: Identity,
        link: ConnectionHandle,
        reply: Reply<RoomSnapshot>,
    },
    Leave {
        user_id: UserId,
        reply: Reply<()>,
    },
    SubmitSecret {
        user_id: UserId,
        value: String,
        reply: Reply<()>,
    },
    SubmitGuess {
        user_id: UserId,
        value: String,
        reply: Reply<Feedback>,
    },
    Snapshot {
        user_id: UserId,
        reply: Reply<RoomSnapshot>,
    },
    Summary {
        reply: Reply<RoomSummary>,
    },
    /// The connection behind `connection` closed. Fire-and-forget.
    Disconnect {
        user_id: UserId,
        connection: ConnectionId,
    },
    Reconnect {
        user_id: UserId,
        link: ConnectionHandle,
        reply: Reply<RoomSnapshot>,
    },
    /// Fire-and-forget.
    Typing {
        user_id: UserId,
        is_typing: bool,
        current_input: String,
    },
    Shutdown,
    /// Runs a handler that queues an event and then panics.
    #[cfg(test)]
    Fault {
        reply: Reply<()>,
    },
}

/// Handle to a running room actor.
///
/// Cheap to clone: it wraps an `mpsc::Sender`. The registry holds one per
/// room and hands out clones, so no registry lock is held while a
/// room works.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// The actor has stopped and will accept no more commands.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub async fn join(
        &self,
        identity: Identity,
        link: ConnectionHandle,
    ) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Join {
            identity,
            link,
            reply,
        })
        .await
    }

    pub async fn leave(&self, user_id: UserId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Leave { user_id, reply })
            .await
    }

    pub async fn submit_secret(
        &self,
        user_id: UserId,
        value: String,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::SubmitSecret {
            user_id,
            value,
            reply,
        })
        .await
    }

    pub async fn submit_guess(
        &self,
        user_id: UserId,
        value: String,
    ) -> Result<Feedback, RoomError> {
        self.request(|reply| RoomCommand::SubmitGuess {
            user_id,
            value,
            reply,
        })
        .await
    }

    /// Full state for an occupant.
    pub async fn snapshot(&self, user_id: UserId) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Snapshot { user_id, reply })
            .await
    }

    pub async fn summary(&self) -> Result<RoomSummary, RoomError> {
        self.request(|reply| RoomCommand::Summary { reply }).await
    }

    /// Reports that `connection` closed. Fire-and-forget.
    pub async fn disconnect(
        &self,
        user_id: UserId,
        connection: ConnectionId,
    ) -> Result<(), RoomError> {
        self.notify(RoomCommand::Disconnect {
            user_id,
            connection,
        })
        .await
    }

    /// Rebinds the occupant's seat to `link` and pushes a snapshot to it.
    pub async fn reconnect(
        &self,
        user_id: UserId,
        link: ConnectionHandle,
    ) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Reconnect {
            user_id,
            link,
            reply,
        })
        .await
    }

    /// Relays a typing indicator to the other occupant. Fire-and-forget.
    pub async fn typing(
        &self,
        user_id: UserId,
        is_typing: bool,
        current_input: String,
    ) -> Result<(), RoomError> {
        self.notify(RoomCommand::Typing {
            user_id,
            is_typing,
            current_input,
        })
        .await
    }

    /// Tells the room to shut down.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.notify(RoomCommand::Shutdown).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.notify(build(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))?
    }

    #[cfg(test)]
    async fn fault(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Fault { reply }).await
    }

    async fn notify(&self, command: RoomCommand) -> Result<(), RoomError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }
}

/// Who receives a queued event. Resolved to connections at delivery time.
#[derive(Debug, Clone, Copy)]
enum Recipient {
    Both,
    Seat(usize),
    OpponentOf(usize),
}

fn opponent(seat: usize) -> usize {
    1 - seat
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Debug)]
struct Guess {
    /// Room-wide acceptance order.
    seq: u64,
    record: GuessRecord,
}

/// One occupied seat.
#[derive(Debug)]
struct Seat {
    identity: Identity,
    /// `None` while the occupant is disconnected.
    link: Option<ConnectionHandle>,
    secret: Option<Code>,
    guesses: Vec<Guess>,
}

impl Seat {
    fn new(identity: Identity, link: ConnectionHandle) -> Self {
        Self {
            identity,
            link: Some(link),
            secret: None,
            guesses: Vec::new(),
        }
    }

    fn user_id(&self) -> &UserId {
        &self.identity.user_id
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }
}

/// The internal room state. Runs inside a Tokio task.
struct RoomActor {
    room_id: RoomId,
    mode: GameMode,
    phase: Phase,
    /// Seat 0 is the host.
    seats: [Option<Seat>; MAX_PLAYERS],
    /// Seat whose guess is expected. Only set while playing.
    current_turn: Option<usize>,
    winner: Option<UserId>,
    next_guess_seq: u64,
    supervisor: ConnectionSupervisor,
    config: RoomConfig,
    last_activity: Instant,
    finished_at: Option<Instant>,
    outbox: Vec<(Recipient, ServerEvent)>,
    /// Last summary handed to the directory.
    published: RoomSummary,
    closing: bool,
    retired: bool,
    receiver: mpsc::Receiver<RoomCommand>,
    registry: RegistryLink,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::info!(room_id = %self.room_id, mode = ?self.mode, "room actor started");

        while !self.closing {
            let grace = self.supervisor.next_deadline();
            let expiry = self.expiry_deadline();

            // Deadlines first: a busy command queue must not hold off a forfeit.
            tokio::select! {
                biased;

                seat = supervisor::wait_for(grace) => {
                    let _ = self.guarded("grace expiry", |room| {
                        room.handle_grace_expired(seat);
                        Ok(())
                    });
                    self.settle().await;
                }
                () = time::sleep_until(expiry) => {
                    let _ = self.guarded("expiry", |room| {
                        room.handle_expired();
                        Ok(())
                    });
                    self.flush();
                    self.closing = true;
                }
                command = self.receiver.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
            }
        }

        self.retire().await;
        tracing::info!(room_id = %self.room_id, "room actor stopped");
    }

    async fn handle_command(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join {
                identity,
                link,
                reply,
            } => {
                let result = self.guarded("join", |room| room.handle_join(identity, link));
                self.respond(reply, result).await;
            }
            RoomCommand::Leave { user_id, reply } => {
                let result = self.guarded("leave", |room| room.handle_leave(&user_id));
                self.respond(reply, result).await;
            }
            RoomCommand::SubmitSecret {
                user_id,
                value,
                reply,
            } => {
                let result = self.guarded("submit secret", |room| {
                    room.handle_submit_secret(&user_id, &value)
                });
                self.respond(reply, result).await;
            }
            RoomCommand::SubmitGuess {
                user_id,
                value,
                reply,
            } => {
                let result = self.guarded("submit guess", |room| {
                    room.handle_submit_guess(&user_id, &value)
                });
                self.respond(reply, result).await;
            }
            RoomCommand::Snapshot { user_id, reply } => {
                let result = self
                    .require_seat(&user_id)
                    .map(|_| self.snapshot());
                let _ = reply.send(result);
            }
            RoomCommand::Summary { reply } => {
                let _ = reply.send(Ok(self.summary()));
            }
            RoomCommand::Disconnect {
                user_id,
                connection,
            } => {
                let _ = self.guarded("disconnect", |room| {
                    room.handle_disconnect(&user_id, connection);
                    Ok(())
                });
                self.settle().await;
            }
            RoomCommand::Reconnect {
                user_id,
                link,
                reply,
            } => {
                let result =
                    self.guarded("reconnect", |room| room.handle_reconnect(&user_id, link));
                self.respond(reply, result).await;
            }
            RoomCommand::Typing {
                user_id,
                is_typing,
                current_input,
            } => {
                self.handle_typing(&user_id, is_typing, &current_input);
                self.flush();
            }
            RoomCommand::Shutdown => {
                tracing::info!(room_id = %self.room_id, "room shutting down");
                self.closing = true;
            }
            #[cfg(test)]
            RoomCommand::Fault { reply } => {
                let result: Result<(), RoomError> = self.guarded("fault", |room| {
                    room.emit(
                        Recipient::Both,
                        presence::typing_update(&room.room_id, true, "1"),
                    );
                    panic!("handler fault");
                });
                self.respond(reply, result).await;
            }
        }
    }

    /// Runs a handler, turning a panic into [`RoomError::Internal`].
    ///
    /// Events queued by a handler that panicked are discarded. The room
    /// keeps serving afterwards.
    fn guarded<T>(
        &mut self,
        op: &'static str,
        handler: impl FnOnce(&mut Self) -> Result<T, RoomError>,
    ) -> Result<T, RoomError> {
        match panic::catch_unwind(AssertUnwindSafe(|| handler(&mut *self))) {
            Ok(result) => result,
            Err(_) => {
                self.outbox.clear();
                tracing::error!(room_id = %self.room_id, op, "room handler panicked");
                Err(RoomError::Internal(self.room_id.clone()))
            }
        }
    }

    /// Settles the room, then answers the caller. A caller that sees the
    /// reply also sees the directory in its updated state.
    async fn respond<T>(&mut self, reply: Reply<T>, result: Result<T, RoomError>) {
        self.settle().await;
        let _ = reply.send(result);
    }

    /// Delivers queued events, then syncs the directory or retires the room.
    async fn settle(&mut self) {
        self.flush();
        if self.closing {
            self.retire().await;
        } else {
            self.sync_directory().await;
        }
    }

    // ---------------------------------------------------------------------
    // Handlers
    // ---------------------------------------------------------------------

    fn handle_join(
        &mut self,
        identity: Identity,
        link: ConnectionHandle,
    ) -> Result<RoomSnapshot, RoomError> {
        if self.seat_of(&identity.user_id).is_some() {
            return Err(RoomError::AlreadyInRoom(
                identity.user_id,
                self.room_id.clone(),
            ));
        }
        let Some(seat) = self.seats.iter().position(Option::is_none) else {
            return Err(RoomError::Capacity(self.room_id.clone()));
        };
        if !self.phase.is_joinable() {
            return Err(self.state_error("join"));
        }

        let user_id = identity.user_id.clone();
        self.seats[seat] = Some(Seat::new(identity, link));
        self.touch();
        tracing::info!(
            room_id = %self.room_id,
            %user_id,
            seat,
            players = self.occupants(),
            "player joined"
        );

        self.emit(
            Recipient::OpponentOf(seat),
            ServerEvent::PlayerJoined {
                room_id: self.room_id.clone(),
                player_id: user_id,
            },
        );
        if self.occupants() == MAX_PLAYERS {
            self.phase = Phase::Setup;
            tracing::info!(room_id = %self.room_id, "room ready, waiting for secrets");
            self.emit(
                Recipient::Both,
                ServerEvent::RoomReady {
                    room_id: self.room_id.clone(),
                },
            );
        }

        Ok(self.snapshot())
    }

    fn handle_leave(&mut self, user_id: &UserId) -> Result<(), RoomError> {
        let seat = self.require_seat(user_id)?;
        self.seats[seat] = None;
        self.supervisor.connection_restored(seat);
        self.touch();

        let other = opponent(seat);
        let remaining = self.seats[other].is_some();
        tracing::info!(
            room_id = %self.room_id,
            %user_id,
            phase = %self.phase,
            remaining,
            "player left"
        );

        if !remaining {
            self.closing = true;
            return Ok(());
        }

        let left = ServerEvent::PlayerLeft {
            room_id: self.room_id.clone(),
            player_id: user_id.clone(),
        };
        match self.phase {
            Phase::Playing => {
                self.emit(Recipient::Seat(other), left);
                self.finish(other, EndReason::Forfeit);
            }
            Phase::Setup => {
                // Back to the lobby. The remaining occupant keeps any secret
                // and becomes host if they were the guest.
                self.phase = Phase::Waiting;
                self.current_turn = None;
                if other == 1 {
                    self.seats.swap(0, 1);
                    self.supervisor.promote_guest();
                }
                self.emit(Recipient::Seat(0), left);
            }
            Phase::Waiting | Phase::Finished => {
                self.emit(Recipient::Seat(other), left);
            }
        }
        Ok(())
    }

    fn handle_submit_secret(&mut self, user_id: &UserId, value: &str) -> Result<(), RoomError> {
        let seat = self.require_seat(user_id)?;
        let code = Code::parse(value)?;
        if self.phase != Phase::Setup {
            return Err(self.state_error("submit a secret"));
        }

        let room_id = self.room_id.clone();
        let occupant = self.occupant_mut(seat)?;
        if occupant.secret.is_some() {
            return Err(RoomError::SecretAlreadySet(user_id.clone(), room_id));
        }
        occupant.secret = Some(code);
        self.touch();
        tracing::info!(room_id = %self.room_id, %user_id, "secret submitted");

        let both_set = self
            .seats
            .iter()
            .all(|seat| seat.as_ref().is_some_and(|s| s.secret.is_some()));
        if both_set {
            self.start_game();
        }
        Ok(())
    }

    fn handle_submit_guess(
        &mut self,
        user_id: &UserId,
        value: &str,
    ) -> Result<Feedback, RoomError> {
        let seat = self.require_seat(user_id)?;
        if self.phase != Phase::Playing {
            return Err(self.state_error("submit a guess"));
        }
        let guess = Code::parse(value)?;
        if self.current_turn != Some(seat) {
            return Err(RoomError::Turn(self.room_id.clone()));
        }

        let secret = self.seats[opponent(seat)]
            .as_ref()
            .and_then(|s| s.secret)
            .ok_or_else(|| RoomError::Internal(self.room_id.clone()))?;
        let verdict = feedback::evaluate(&guess, &secret, self.mode);

        let record = GuessRecord {
            guess: guess.to_string(),
            feedback: verdict.feedback,
            timestamp: unix_millis(),
            player_id: user_id.clone(),
        };
        let seq = self.next_guess_seq;
        self.next_guess_seq += 1;
        self.occupant_mut(seat)?.guesses.push(Guess {
            seq,
            record: record.clone(),
        });
        self.touch();
        tracing::debug!(
            room_id = %self.room_id,
            %user_id,
            feedback = ?verdict.feedback,
            "guess accepted"
        );

        if verdict.solved {
            self.finish(seat, EndReason::Solved);
        } else {
            self.current_turn = Some(opponent(seat));
            self.emit(
                Recipient::Both,
                ServerEvent::GuessSubmitted {
                    room_id: self.room_id.clone(),
                    guess: record,
                },
            );
        }
        Ok(verdict.feedback)
    }

    fn handle_disconnect(&mut self, user_id: &UserId, connection: ConnectionId) {
        let Some(seat) = self.seat_of(user_id) else {
            tracing::debug!(room_id = %self.room_id, %user_id, "disconnect from non-occupant, ignoring");
            return;
        };
        let Some(occupant) = self.seats[seat].as_mut() else {
            return;
        };
        if occupant.link.as_ref().map(ConnectionHandle::id) != Some(connection) {
            tracing::debug!(
                room_id = %self.room_id,
                %user_id,
                %connection,
                "stale disconnect ignored"
            );
            return;
        }
        occupant.link = None;

        if self.phase != Phase::Finished {
            self.supervisor.connection_lost(seat);
        }
        tracing::info!(
            room_id = %self.room_id,
            %user_id,
            phase = %self.phase,
            "occupant disconnected, grace window started"
        );
        self.emit(
            Recipient::OpponentOf(seat),
            ServerEvent::PlayerDisconnected {
                room_id: self.room_id.clone(),
                player_id: user_id.clone(),
            },
        );
    }

    fn handle_reconnect(
        &mut self,
        user_id: &UserId,
        link: ConnectionHandle,
    ) -> Result<RoomSnapshot, RoomError> {
        let seat = self.require_seat(user_id)?;
        let occupant = self.occupant_mut(seat)?;
        let was_offline = !occupant.is_connected();
        occupant.link = Some(link);
        let resumed = self.supervisor.connection_restored(seat);
        tracing::info!(room_id = %self.room_id, %user_id, resumed, "occupant reconnected");

        if was_offline {
            self.emit(
                Recipient::OpponentOf(seat),
                ServerEvent::PlayerReconnected {
                    room_id: self.room_id.clone(),
                    player_id: user_id.clone(),
                },
            );
        }
        let snapshot = self.snapshot();
        self.emit(
            Recipient::Seat(seat),
            ServerEvent::RoomSnapshot {
                snapshot: snapshot.clone(),
            },
        );
        Ok(snapshot)
    }

    fn handle_typing(&mut self, user_id: &UserId, is_typing: bool, current_input: &str) {
        let Some(seat) = self.seat_of(user_id) else {
            tracing::debug!(room_id = %self.room_id, %user_id, "typing from non-occupant, dropped");
            return;
        };
        let event = presence::typing_update(&self.room_id, is_typing, current_input);
        self.emit(Recipient::OpponentOf(seat), event);
    }

    fn handle_grace_expired(&mut self, seat: usize) {
        self.supervisor.connection_restored(seat);
        let Some(occupant) = self.seats[seat].as_ref() else {
            return;
        };
        if occupant.is_connected() {
            return;
        }

        let other = opponent(seat);
        let other_connected = self.seats[other]
            .as_ref()
            .is_some_and(Seat::is_connected);
        tracing::info!(
            room_id = %self.room_id,
            user_id = %occupant.user_id(),
            phase = %self.phase,
            other_connected,
            "grace window expired"
        );

        if !other_connected {
            self.closing = true;
        } else if self.phase.is_contested() {
            self.finish(other, EndReason::Forfeit);
        }
    }

    /// Idle timeout or finished retention ran out. Occupants of an
    /// unfinished game are told every seat is gone.
    fn handle_expired(&mut self) {
        tracing::info!(room_id = %self.room_id, phase = %self.phase, "room expired");
        if self.phase == Phase::Finished {
            return;
        }
        let vacated: Vec<UserId> = self
            .seats
            .iter()
            .flatten()
            .map(|seat| seat.user_id().clone())
            .collect();
        for player_id in vacated {
            self.emit(
                Recipient::Both,
                ServerEvent::PlayerLeft {
                    room_id: self.room_id.clone(),
                    player_id,
                },
            );
        }
    }

    // ---------------------------------------------------------------------
    // Transitions
    // ---------------------------------------------------------------------

    fn start_game(&mut self) {
        self.phase = Phase::Playing;
        self.current_turn = Some(0);
        let Some(host) = self.seats[0].as_ref() else {
            return;
        };
        let current_turn = host.user_id().clone();
        tracing::info!(room_id = %self.room_id, first = %current_turn, "game started");
        self.emit(
            Recipient::Both,
            ServerEvent::GameStarted {
                room_id: self.room_id.clone(),
                current_turn,
            },
        );
    }

    fn finish(&mut self, winner: usize, reason: EndReason) {
        let Some(winner) = self.seats[winner].as_ref().map(|s| s.user_id().clone()) else {
            return;
        };
        self.phase = Phase::Finished;
        self.current_turn = None;
        self.winner = Some(winner.clone());
        self.finished_at = Some(Instant::now());
        self.supervisor.clear();
        tracing::info!(room_id = %self.room_id, %winner, ?reason, "game finished");

        self.emit(
            Recipient::Both,
            ServerEvent::GameEnded {
                room_id: self.room_id.clone(),
                winner,
                reason,
            },
        );
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn seat_of(&self, user_id: &UserId) -> Option<usize> {
        self.seats
            .iter()
            .position(|seat| seat.as_ref().is_some_and(|s| s.user_id() == user_id))
    }

    fn require_seat(&self, user_id: &UserId) -> Result<usize, RoomError> {
        self.seat_of(user_id)
            .ok_or_else(|| RoomError::NotInRoom(user_id.clone(), self.room_id.clone()))
    }

    fn occupant_mut(&mut self, seat: usize) -> Result<&mut Seat, RoomError> {
        let room_id = &self.room_id;
        self.seats[seat]
            .as_mut()
            .ok_or_else(|| RoomError::Internal(room_id.clone()))
    }

    fn occupants(&self) -> usize {
        self.seats.iter().flatten().count()
    }

    fn state_error(&self, action: &'static str) -> RoomError {
        RoomError::State {
            room_id: self.room_id.clone(),
            phase: self.phase,
            action,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn expiry_deadline(&self) -> Instant {
        match self.finished_at {
            Some(at) => at + self.config.finished_retention,
            None => self.last_activity + self.config.idle_timeout,
        }
    }

    fn emit(&mut self, to: Recipient, event: ServerEvent) {
        self.outbox.push((to, event));
    }

    fn flush(&mut self) {
        for (to, event) in mem::take(&mut self.outbox) {
            match to {
                Recipient::Both => {
                    for seat in 0..MAX_PLAYERS {
                        self.deliver(seat, event.clone());
                    }
                }
                Recipient::Seat(seat) => self.deliver(seat, event),
                Recipient::OpponentOf(seat) => self.deliver(opponent(seat), event),
            }
        }
    }

    /// Sends to a seat's live connection. Silently drops if there is none.
    fn deliver(&self, seat: usize, event: ServerEvent) {
        let Some(occupant) = self.seats[seat].as_ref() else {
            return;
        };
        if let Some(link) = &occupant.link {
            if !link.push(event) {
                tracing::debug!(
                    room_id = %self.room_id,
                    user_id = %occupant.user_id(),
                    "event dropped, connection gone"
                );
            }
        }
    }

    fn snapshot(&self) -> RoomSnapshot {
        let host = self.seats[0].as_ref();
        let mut guesses: Vec<&Guess> = self
            .seats
            .iter()
            .flatten()
            .flat_map(|seat| &seat.guesses)
            .collect();
        guesses.sort_by_key(|guess| guess.seq);

        RoomSnapshot {
            room_id: self.room_id.clone(),
            mode: self.mode,
            phase: self.phase,
            host_id: host.map(|s| s.user_id().clone()),
            host_name: host.map(|s| s.identity.display_name.clone()),
            players: self
                .seats
                .iter()
                .enumerate()
                .filter_map(|(index, seat)| {
                    seat.as_ref().map(|s| PlayerView {
                        user_id: s.user_id().clone(),
                        display_name: s.identity.display_name.clone(),
                        connected: s.is_connected(),
                        has_secret: s.secret.is_some(),
                        is_host: index == 0,
                    })
                })
                .collect(),
            max_players: MAX_PLAYERS,
            current_turn: self
                .current_turn
                .and_then(|seat| self.seats[seat].as_ref())
                .map(|s| s.user_id().clone()),
            winner: self.winner.clone(),
            guesses: guesses.into_iter().map(|g| g.record.clone()).collect(),
        }
    }

    fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.room_id.clone(),
            mode: self.mode,
            phase: self.phase,
            host: self.seats[0].as_ref().map(|s| s.identity.clone()),
            guest: self.seats[1].as_ref().map(|s| s.identity.clone()),
        }
    }

    async fn sync_directory(&mut self) {
        let summary = self.summary();
        if summary != self.published {
            self.registry.publish(summary.clone()).await;
            self.published = summary;
        }
    }

    /// Removes the room from the registry. Runs at most once.
    async fn retire(&mut self) {
        if self.retired {
            return;
        }
        self.retired = true;
        self.closing = true;
        self.receiver.close();
        self.supervisor.clear();
        self.registry.retire(&self.room_id).await;
        tracing::info!(room_id = %self.room_id, "room retired");
    }
}

/// Spawns a room actor with `host` in seat 0.
///
/// Returns the handle plus the room's initial summary, which the caller
/// publishes to the directory.
pub(crate) fn spawn_room(
    room_id: RoomId,
    mode: GameMode,
    host: Identity,
    link: ConnectionHandle,
    config: RoomConfig,
    registry: RegistryLink,
) -> (RoomHandle, RoomSummary) {
    let (tx, rx) = mpsc::channel(config.command_buffer);
    let now = Instant::now();

    let summary = RoomSummary {
        room_id: room_id.clone(),
        mode,
        phase: Phase::Waiting,
        host: Some(host.clone()),
        guest: None,
    };

    let actor = RoomActor {
        room_id: room_id.clone(),
        mode,
        phase: Phase::Waiting,
        seats: [Some(Seat::new(host, link)), None],
        current_turn: None,
        winner: None,
        next_guess_seq: 0,
        supervisor: ConnectionSupervisor::new(config.reconnect_grace),
        config,
        last_activity: now,
        finished_at: None,
        outbox: Vec::new(),
        published: summary.clone(),
        closing: false,
        retired: false,
        receiver: rx,
        registry,
    };

    tokio::spawn(actor.run());

    (
        RoomHandle {
            room_id,
            sender: tx,
        },
        summary,
    )
}
