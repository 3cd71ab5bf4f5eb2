//! Per-user search state: which search is current, and which markers the
//! last completed search put on that user's map.

use std::{
    collections::HashMap,
    future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, PoisonError,
    },
};

use log::*;
use serde::Serialize;
use tokio::sync::watch;

use crate::{
    ranking::{features::distance_label, RankedResult, TravelTime},
    services::Coordinate,
};

pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the handle cancels. Never resolves if the handle is
    /// dropped without cancelling.
    pub async fn cancelled(&mut self) {
        let sender_gone = self.rx.wait_for(|cancelled| *cancelled).await.is_err();
        if sender_gone {
            future::pending::<()>().await;
        }
    }
}

/// Identifies one search. Holding a ticket does not keep the search current:
/// a newer search by the same user supersedes and cancels it.
#[derive(Debug, Clone)]
pub struct SearchTicket {
    pub user: String,
    pub id: u64,
    pub token: CancelToken,
}

/// At most one in-flight search per user.
#[derive(Debug, Default)]
pub struct SearchSessions {
    active: Mutex<HashMap<String, (u64, CancelHandle)>>,
    next_id: AtomicU64,
}

impl SearchSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a search for `user`, cancelling whatever that user had running.
    pub fn begin(&self, user: &str) -> SearchTicket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (handle, token) = cancellation();
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.to_string(), (id, handle));
        if let Some((previous_id, previous)) = previous {
            debug!("Search {previous_id} for {user} superseded by {id}");
            previous.cancel();
        }
        SearchTicket {
            user: user.to_string(),
            id,
            token,
        }
    }

    /// Retires the ticket. Returns false if it had already been superseded
    /// or cancelled, in which case its results must be discarded.
    pub fn finish(&self, ticket: &SearchTicket) -> bool {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let current = matches!(active.get(&ticket.user), Some((id, _)) if *id == ticket.id);
        if current {
            active.remove(&ticket.user);
        }
        current && !ticket.token.is_cancelled()
    }

    pub fn cancel(&self, user: &str) -> bool {
        let removed = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user);
        match removed {
            Some((_, handle)) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub owner_id: String,
    pub coordinate: Coordinate,
    pub label: String,
    pub search_id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub kept: Vec<String>,
}

/// Markers of one user's map, keyed by candidate owner. Replaced wholesale by
/// each completed search.
#[derive(Debug, Default)]
pub struct MarkerRegistry {
    markers: HashMap<String, Marker>,
}

impl MarkerRegistry {
    pub fn apply(&mut self, search_id: u64, result: &RankedResult) -> LayerDiff {
        let mut diff = LayerDiff::default();
        let mut next = HashMap::with_capacity(result.features.len());
        for feature in &result.features {
            let distance = distance_label(feature.distance_m);
            let label = match feature.travel_times.driving {
                TravelTime::Minutes(m) => format!("{distance}, {m:.0} min"),
                TravelTime::Unavailable => distance,
            };
            if self.markers.remove(&feature.owner_id).is_some() {
                diff.kept.push(feature.owner_id.clone());
            } else {
                diff.added.push(feature.owner_id.clone());
            }
            next.insert(
                feature.owner_id.clone(),
                Marker {
                    owner_id: feature.owner_id.clone(),
                    coordinate: feature.destination,
                    label,
                    search_id,
                },
            );
        }
        diff.removed = self.markers.drain().map(|(owner, _)| owner).collect();
        diff.removed.sort();
        self.markers = next;
        diff
    }

    pub fn clear(&mut self) -> Vec<Marker> {
        let mut removed: Vec<Marker> = self.markers.drain().map(|(_, m)| m).collect();
        removed.sort_by(|a, b| a.owner_id.cmp(&b.owner_id));
        removed
    }

    pub fn get(&self, owner_id: &str) -> Option<&Marker> {
        self.markers.get(owner_id)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

/// Marker registries for every user, one per user.
#[derive(Debug, Default)]
pub struct MapSessions {
    registries: tokio::sync::Mutex<HashMap<String, MarkerRegistry>>,
}

impl MapSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn apply(&self, user: &str, search_id: u64, result: &RankedResult) -> LayerDiff {
        self.registries
            .lock()
            .await
            .entry(user.to_string())
            .or_default()
            .apply(search_id, result)
    }

    pub async fn clear(&self, user: &str) -> Vec<Marker> {
        self.registries
            .lock()
            .await
            .remove(user)
            .map(|mut registry| registry.clear())
            .unwrap_or_default()
    }

    pub async fn marker_count(&self, user: &str) -> usize {
        self.registries
            .lock()
            .await
            .get(user)
            .map_or(0, MarkerRegistry::len)
    }
}
