//! The room directory: the lobby view of every live room.
//!
//! Rooms publish a [`RoomSummary`] whenever their metadata changes. The
//! directory answers per-user listings from those summaries and pushes a
//! fresh [`RoomListing`] to every watcher on each change, so lobby clients
//! never poll.

use std::collections::HashMap;

use digitduel_protocol::{RoomId, RoomListEntry, RoomListing, ServerEvent, UserId};
use digitduel_transport::ConnectionId;
use tokio::sync::Mutex;

use crate::{ConnectionHandle, RoomSummary};

struct Listed {
    /// Creation order, used to keep listings stable.
    order: u64,
    summary: RoomSummary,
}

#[derive(Default)]
struct DirectoryState {
    rooms: HashMap<RoomId, Listed>,
    watchers: HashMap<UserId, ConnectionHandle>,
    next_order: u64,
}

fn in_creation_order(rooms: &HashMap<RoomId, Listed>) -> Vec<&RoomSummary> {
    let mut listed: Vec<&Listed> = rooms.values().collect();
    listed.sort_by_key(|listed| listed.order);
    listed.into_iter().map(|listed| &listed.summary).collect()
}

impl DirectoryState {
    fn sorted(&self) -> Vec<&RoomSummary> {
        in_creation_order(&self.rooms)
    }

    fn publish(&mut self) {
        let DirectoryState { rooms, watchers, .. } = self;
        if watchers.is_empty() {
            return;
        }
        let summaries = in_creation_order(rooms);

        watchers.retain(|user_id, link| {
            let delivered = link.push(ServerEvent::RoomListing {
                listing: listing_for(&summaries, user_id),
            });
            if !delivered {
                tracing::debug!(%user_id, "watcher gone, unsubscribed");
            }
            delivered
        });
    }
}

/// Splits `rooms` into the three lobby sections for `user_id`.
fn listing_for(rooms: &[&RoomSummary], user_id: &UserId) -> RoomListing {
    let mut listing = RoomListing::default();
    for summary in rooms {
        if summary.is_host(user_id) {
            listing.hosted.push(summary.entry());
        } else if summary.is_guest(user_id) {
            listing.joined.push(summary.entry());
        } else if summary.is_open() {
            listing.available.push(summary.entry());
        }
    }
    listing
}

/// Lobby state shared by all rooms.
#[derive(Default)]
pub struct RoomDirectory {
    state: Mutex<DirectoryState>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a room's summary and notifies watchers.
    pub async fn upsert(&self, summary: RoomSummary) {
        let mut state = self.state.lock().await;
        match state.rooms.get_mut(&summary.room_id) {
            Some(listed) => listed.summary = summary,
            None => {
                let order = state.next_order;
                state.next_order += 1;
                state
                    .rooms
                    .insert(summary.room_id.clone(), Listed { order, summary });
            }
        }
        state.publish();
    }

    /// Drops a room and notifies watchers. Unknown ids are ignored.
    pub async fn remove(&self, room_id: &RoomId) {
        let mut state = self.state.lock().await;
        if state.rooms.remove(room_id).is_some() {
            state.publish();
        }
    }

    /// The caller's hosted, joined, and available rooms.
    pub async fn listing(&self, user_id: &UserId) -> RoomListing {
        let state = self.state.lock().await;
        listing_for(&state.sorted(), user_id)
    }

    /// Waiting rooms with a free seat that `user_id` does not occupy.
    pub async fn available(&self, user_id: &UserId) -> Vec<RoomListEntry> {
        self.listing(user_id).await.available
    }

    /// Every room where `user_id` holds a seat, in any phase.
    pub async fn rooms_of(&self, user_id: &UserId) -> Vec<RoomId> {
        let state = self.state.lock().await;
        state
            .sorted()
            .into_iter()
            .filter(|summary| summary.has_occupant(user_id))
            .map(|summary| summary.room_id.clone())
            .collect()
    }

    /// Subscribes `user_id` to listing pushes on `link` and sends the
    /// current listing right away. Replaces an earlier subscription.
    pub async fn watch(&self, user_id: UserId, link: ConnectionHandle) {
        let mut state = self.state.lock().await;
        let listing = listing_for(&state.sorted(), &user_id);
        if link.push(ServerEvent::RoomListing { listing }) {
            tracing::debug!(%user_id, connection = %link.id(), "watching room directory");
            state.watchers.insert(user_id, link);
        }
    }

    /// Ends the subscription. With `connection` set, only a subscription
    /// made from that connection is removed.
    pub async fn unwatch(&self, user_id: &UserId, connection: Option<ConnectionId>) {
        let mut state = self.state.lock().await;
        let matches = state
            .watchers
            .get(user_id)
            .is_some_and(|link| connection.is_none_or(|id| link.id() == id));
        if matches {
            state.watchers.remove(user_id);
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.rooms.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    #[cfg(test)]
    pub async fn watcher_count(&self) -> usize {
        self.state.lock().await.watchers.len()
    }
}
