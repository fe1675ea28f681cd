//! Catalog events and EventBus
//!
//! Every mutation made through [`crate::Catalog`] ends with one event.
//! Events are sent after the write and its counter/position maintenance
//! have both finished, so subscribers always see refreshed caches.

use crate::db::models::EntityRef;
use crate::maintenance::MaintenanceTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Catalog event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CatalogEvent {
    /// Media record created
    MediaCreated {
        media_id: i64,
        /// Counted entities the new media contributes to
        affected: Vec<EntityRef>,
        timestamp: DateTime<Utc>,
    },

    /// Media record deleted
    MediaDeleted {
        media_id: i64,
        /// Counted entities the media contributed to before deletion
        affected: Vec<EntityRef>,
        timestamp: DateTime<Utc>,
    },

    /// Media foreign-key metadata replaced
    MediaUpdated {
        media_id: i64,
        /// Old and new entities of every changed link
        affected: Vec<EntityRef>,
        timestamp: DateTime<Utc>,
    },

    /// Media linked to or unlinked from a many-to-many entity
    AssociationChanged {
        media_id: i64,
        entity: EntityRef,
        /// `true` for link, `false` for unlink
        linked: bool,
        timestamp: DateTime<Utc>,
    },

    /// Tour created or saved
    TourSaved {
        tour_id: i64,
        timestamp: DateTime<Utc>,
    },

    /// Taxon inserted, moved or deleted
    TaxonTreeChanged {
        taxon_id: i64,
        timestamp: DateTime<Utc>,
    },

    /// Counter or position refresh failed; the triggering write stands
    MaintenanceFailed {
        target: MaintenanceTarget,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl CatalogEvent {
    /// Event name for logs and serialized output
    pub fn event_type(&self) -> &str {
        match self {
            CatalogEvent::MediaCreated { .. } => "MediaCreated",
            CatalogEvent::MediaDeleted { .. } => "MediaDeleted",
            CatalogEvent::MediaUpdated { .. } => "MediaUpdated",
            CatalogEvent::AssociationChanged { .. } => "AssociationChanged",
            CatalogEvent::TourSaved { .. } => "TourSaved",
            CatalogEvent::TaxonTreeChanged { .. } => "TaxonTreeChanged",
            CatalogEvent::MaintenanceFailed { .. } => "MaintenanceFailed",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CatalogEvent::MediaCreated { timestamp, .. }
            | CatalogEvent::MediaDeleted { timestamp, .. }
            | CatalogEvent::MediaUpdated { timestamp, .. }
            | CatalogEvent::AssociationChanged { timestamp, .. }
            | CatalogEvent::TourSaved { timestamp, .. }
            | CatalogEvent::TaxonTreeChanged { timestamp, .. }
            | CatalogEvent::MaintenanceFailed { timestamp, .. } => *timestamp,
        }
    }
}

/// Broadcast channel for catalog events
///
/// Cloning shares the channel. Slow subscribers lag and lose the oldest
/// events once `capacity` is exceeded.
///
/// ```
/// use cifonauta_common::events::{CatalogEvent, EventBus};
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(CatalogEvent::TourSaved {
///     tour_id: 1,
///     timestamp: chrono::Utc::now(),
/// });
///
/// let event = rx.try_recv().unwrap();
/// assert_eq!(event.event_type(), "TourSaved");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CatalogEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CatalogEvent,
    ) -> Result<usize, broadcast::error::SendError<CatalogEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CatalogEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
