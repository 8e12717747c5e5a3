//! Scripted remote used to control reply content and timing.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use taskboard_core::{
    field_map, Entity, EntityId, RemoteErrorKind, RemoteFailure, RemoteOutcome, RemoteRequest,
    RemoteSyncClient,
};
use tokio::sync::oneshot;

enum Reply {
    Ready(RemoteOutcome),
    Gated(oneshot::Receiver<RemoteOutcome>),
}

/// Answers remote calls from a queue, in call order.
#[derive(Default)]
pub struct ScriptedRemote {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<RemoteRequest>>,
    collection: Mutex<Vec<Entity>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an immediate reply.
    pub fn reply(&self, outcome: RemoteOutcome) {
        self.replies.lock().push_back(Reply::Ready(outcome));
    }

    /// Queues a reply that is held until the returned sender fires.
    pub fn gate(&self) -> oneshot::Sender<RemoteOutcome> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().push_back(Reply::Gated(rx));
        tx
    }

    /// Sets what `fetch_all` returns.
    pub fn set_collection(&self, entities: Vec<Entity>) {
        *self.collection.lock() = entities;
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl RemoteSyncClient for ScriptedRemote {
    async fn send(&self, request: RemoteRequest) -> RemoteOutcome {
        self.requests.lock().push(request);
        let reply = self.replies.lock().pop_front();
        match reply {
            Some(Reply::Ready(outcome)) => outcome,
            Some(Reply::Gated(rx)) => rx.await.unwrap_or_else(|_| {
                RemoteOutcome::failed(RemoteErrorKind::Transport, "gate dropped")
            }),
            None => RemoteOutcome::failed(RemoteErrorKind::Transport, "no scripted reply"),
        }
    }

    async fn fetch_all(&self, _collection: &str) -> Result<Vec<Entity>, RemoteFailure> {
        Ok(self.collection.lock().clone())
    }
}

/// Canonical task entity as the server would return it.
pub fn task(id: EntityId, title: &str, status: &str, updated_at: i64) -> Entity {
    Entity::new(
        id,
        field_map([
            ("title", title),
            ("status", status),
            ("priority", "medium"),
        ]),
        1,
        updated_at,
    )
}

/// Yields until the remote has seen `count` requests.
pub async fn wait_for_requests(remote: &ScriptedRemote, count: usize) {
    while remote.requests().len() < count {
        tokio::task::yield_now().await;
    }
}
