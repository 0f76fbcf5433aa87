//! The session registry: creates rooms, finds them by id, and routes
//! operations to them.
//!
//! The room-id index is the only structure shared between rooms. It is
//! locked just long enough to insert, remove, or clone out a
//! [`RoomHandle`]; every room operation then runs on the room's own actor
//! with no registry lock held.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use digitduel_protocol::{
    Feedback, GameMode, Identity, RoomId, RoomListEntry, RoomListing, RoomSnapshot, UserId,
};
use digitduel_transport::ConnectionId;
use rand::Rng;
use tokio::sync::Mutex;

use crate::room::spawn_room;
use crate::{ConnectionHandle, RoomConfig, RoomDirectory, RoomError, RoomHandle, RoomSummary};

/// Characters used in room codes: uppercase letters and digits without the
/// easily confused `0`, `1`, `I`, `L`, `O`.
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Collisions are retried this many times before `create` gives up.
const ROOM_CODE_ATTEMPTS: usize = 32;

fn generate_room_code(length: usize) -> RoomId {
    let mut rng = rand::rng();
    let code = (0..length)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect::<String>();
    RoomId::new(code)
}

struct Shared {
    rooms: Mutex<HashMap<RoomId, RoomHandle>>,
    directory: RoomDirectory,
    config: RoomConfig,
}

/// A room actor's way back to the registry that spawned it.
///
/// Weak so a dropped registry does not stay alive through its rooms.
#[derive(Clone)]
pub(crate) struct RegistryLink(Weak<Shared>);

impl RegistryLink {
    /// A link to no registry, for driving a room actor on its own.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self(Weak::new())
    }

    pub(crate) async fn publish(&self, summary: RoomSummary) {
        if let Some(shared) = self.0.upgrade() {
            shared.directory.upsert(summary).await;
        }
    }

    pub(crate) async fn retire(&self, room_id: &RoomId) {
        if let Some(shared) = self.0.upgrade() {
            // Directory removal happens under the index lock so a new room
            // reusing this id cannot be removed by mistake.
            let mut rooms = shared.rooms.lock().await;
            rooms.remove(room_id);
            shared.directory.remove(room_id).await;
        }
    }
}

/// Entry point for room operations from the connection layer.
///
/// Cheap to clone; all clones share the same index and directory.
#[derive(Clone)]
pub struct SessionRegistry {
    shared: Arc<Shared>,
}

impl SessionRegistry {
    pub fn new(config: RoomConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                rooms: Mutex::new(HashMap::new()),
                directory: RoomDirectory::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.shared.config
    }

    pub fn directory(&self) -> &RoomDirectory {
        &self.shared.directory
    }

    /// Creates a room with `host` in seat 0 and returns its id.
    ///
    /// # Errors
    /// [`RoomError::ServerFull`] when the room limit is reached or no free
    /// room code could be found.
    pub async fn create(
        &self,
        host: Identity,
        mode: GameMode,
        link: ConnectionHandle,
    ) -> Result<RoomId, RoomError> {
        let config = &self.shared.config;
        let mut rooms = self.shared.rooms.lock().await;
        if rooms.len() >= config.max_rooms {
            tracing::warn!(rooms = rooms.len(), "room limit reached");
            return Err(RoomError::ServerFull);
        }

        let room_id = (0..ROOM_CODE_ATTEMPTS)
            .map(|_| generate_room_code(config.room_code_length))
            .find(|candidate| !rooms.contains_key(candidate))
            .ok_or(RoomError::ServerFull)?;

        let host_id = host.user_id.clone();
        let (handle, summary) = spawn_room(
            room_id.clone(),
            mode,
            host,
            link,
            config.clone(),
            RegistryLink(Arc::downgrade(&self.shared)),
        );
        rooms.insert(room_id.clone(), handle);
        // Published under the index lock so no later update from the room
        // can be overwritten by this first one.
        self.shared.directory.upsert(summary).await;
        tracing::info!(%room_id, host = %host_id, ?mode, "room created");
        Ok(room_id)
    }

    /// Clones out the handle for `room_id`.
    pub async fn get(&self, room_id: &RoomId) -> Result<RoomHandle, RoomError> {
        self.shared
            .rooms
            .lock()
            .await
            .get(room_id)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))
    }

    pub async fn join(
        &self,
        room_id: &RoomId,
        identity: Identity,
        link: ConnectionHandle,
    ) -> Result<RoomSnapshot, RoomError> {
        let handle = self.get(room_id).await?;
        let result = handle.join(identity, link).await;
        self.checked(&handle, result).await
    }

    pub async fn leave(&self, room_id: &RoomId, user_id: &UserId) -> Result<(), RoomError> {
        let handle = self.get(room_id).await?;
        let result = handle.leave(user_id.clone()).await;
        self.checked(&handle, result).await
    }

    pub async fn submit_secret(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        value: &str,
    ) -> Result<(), RoomError> {
        let handle = self.get(room_id).await?;
        let result = handle.submit_secret(user_id.clone(), value.to_owned()).await;
        self.checked(&handle, result).await
    }

    pub async fn submit_guess(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        value: &str,
    ) -> Result<Feedback, RoomError> {
        let handle = self.get(room_id).await?;
        let result = handle.submit_guess(user_id.clone(), value.to_owned()).await;
        self.checked(&handle, result).await
    }

    /// Whether both seats are filled and the game is past the lobby.
    pub async fn check_status(&self, room_id: &RoomId) -> Result<bool, RoomError> {
        let handle = self.get(room_id).await?;
        let result = handle.summary().await;
        self.checked(&handle, result).await.map(|summary| summary.is_ready())
    }

    pub async fn snapshot(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<RoomSnapshot, RoomError> {
        let handle = self.get(room_id).await?;
        let result = handle.snapshot(user_id.clone()).await;
        self.checked(&handle, result).await
    }

    /// Relays a typing indicator. Never acknowledged to the sender.
    pub async fn typing(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        is_typing: bool,
        current_input: &str,
    ) -> Result<(), RoomError> {
        let handle = self.get(room_id).await?;
        handle
            .typing(user_id.clone(), is_typing, current_input.to_owned())
            .await
    }

    /// The caller's hosted, joined, and available rooms.
    pub async fn list(&self, user_id: &UserId) -> RoomListing {
        self.shared.directory.listing(user_id).await
    }

    pub async fn list_available(&self, user_id: &UserId) -> Vec<RoomListEntry> {
        self.shared.directory.available(user_id).await
    }

    /// Tells every room `user_id` sits in that `connection` closed.
    pub async fn disconnect(&self, user_id: &UserId, connection: ConnectionId) {
        for room_id in self.shared.directory.rooms_of(user_id).await {
            let Ok(handle) = self.get(&room_id).await else {
                continue;
            };
            if let Err(err) = handle.disconnect(user_id.clone(), connection).await {
                tracing::debug!(%room_id, %user_id, %err, "disconnect not delivered");
            }
        }
    }

    /// Rebinds every seat `user_id` holds to `link`. Each room pushes a
    /// snapshot over the new connection; the snapshots are also returned.
    pub async fn reconnect(&self, user_id: &UserId, link: ConnectionHandle) -> Vec<RoomSnapshot> {
        let mut snapshots = Vec::new();
        for room_id in self.shared.directory.rooms_of(user_id).await {
            let Ok(handle) = self.get(&room_id).await else {
                continue;
            };
            match handle.reconnect(user_id.clone(), link.clone()).await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => tracing::debug!(%room_id, %user_id, %err, "reconnect skipped room"),
            }
        }
        snapshots
    }

    /// Subscribes to directory pushes.
    pub async fn watch(&self, user_id: UserId, link: ConnectionHandle) {
        self.shared.directory.watch(user_id, link).await;
    }

    pub async fn unwatch(&self, user_id: &UserId, connection: Option<ConnectionId>) {
        self.shared.directory.unwatch(user_id, connection).await;
    }

    pub async fn room_count(&self) -> usize {
        self.shared.rooms.lock().await.len()
    }

    /// Shuts down every room.
    pub async fn shutdown(&self) {
        let handles: Vec<RoomHandle> = self.shared.rooms.lock().await.values().cloned().collect();
        for handle in handles {
            let _ = handle.shutdown().await;
        }
    }

    /// Drops a room whose actor is gone without retiring itself, so one
    /// dead room never lingers in listings.
    async fn checked<T>(
        &self,
        handle: &RoomHandle,
        result: Result<T, RoomError>,
    ) -> Result<T, RoomError> {
        if matches!(result, Err(RoomError::Unavailable(_))) && handle.is_closed() {
            let room_id = handle.room_id();
            let mut rooms = self.shared.rooms.lock().await;
            if rooms.get(room_id).is_some_and(RoomHandle::is_closed) {
                rooms.remove(room_id);
                self.shared.directory.remove(room_id).await;
                tracing::warn!(%room_id, "purged unavailable room");
            }
        }
        result
    }
}
