//! Denormalized counter and tour position maintenance
//!
//! [`Maintainer::handle`] maps a [`CatalogEvent`] to the recounts and
//! position reassignments it requires and runs them in order. Failures
//! are collected and logged, never propagated: the write that produced
//! the event is already committed and stays committed. A failed target
//! can be re-run later with [`Maintainer::retry`].

mod counters;
mod positions;

pub use counters::{count_media, recount, recount_all};
pub use positions::{reassign_all_tour_positions, reassign_tour_positions};

use crate::db::models::{CountedKind, EntityCounts, EntityRef};
use crate::db::retry_on_lock;
use crate::events::CatalogEvent;
use crate::Error;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;
use tracing::warn;

/// Time budget for a manual retry while the database stays locked
const RETRY_MAX_WAIT_MS: u64 = 5000;

/// One unit of maintenance work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum MaintenanceTarget {
    /// Recount an entity's photos and videos
    Counter { entity: EntityRef },
    /// Reassign a tour's positions
    TourPositions { tour_id: i64 },
}

impl fmt::Display for MaintenanceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaintenanceTarget::Counter { entity } => write!(f, "counter {}", entity),
            MaintenanceTarget::TourPositions { tour_id } => write!(f, "positions tour#{}", tour_id),
        }
    }
}

/// Outcome of handling one event
#[derive(Debug, Default)]
pub struct MaintenanceReport {
    /// Entities recounted, with the stored counts
    pub recounted: Vec<(EntityRef, EntityCounts)>,
    /// Tours repositioned, with the number of positions
    pub repositioned: Vec<(i64, usize)>,
    pub failures: Vec<(MaintenanceTarget, Error)>,
}

impl MaintenanceReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Stored counts for an entity, if it was recounted
    pub fn counts_for(&self, entity: EntityRef) -> Option<EntityCounts> {
        self.recounted
            .iter()
            .find(|(e, _)| *e == entity)
            .map(|(_, counts)| *counts)
    }
}

/// Runs maintenance against one database
#[derive(Clone)]
pub struct Maintainer {
    pool: SqlitePool,
}

impl Maintainer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Work required after an event, without duplicates, in run order
    pub fn targets_for(event: &CatalogEvent) -> Vec<MaintenanceTarget> {
        let mut targets = Vec::new();

        match event {
            CatalogEvent::MediaCreated { affected, .. }
            | CatalogEvent::MediaDeleted { affected, .. }
            | CatalogEvent::MediaUpdated { affected, .. } => {
                for entity in affected {
                    push_entity_targets(&mut targets, *entity);
                }
            }
            CatalogEvent::AssociationChanged { entity, .. } => {
                push_entity_targets(&mut targets, *entity);
            }
            CatalogEvent::TourSaved { tour_id, .. } => {
                push_entity_targets(&mut targets, EntityRef::new(CountedKind::Tour, *tour_id));
            }
            CatalogEvent::TaxonTreeChanged { .. } | CatalogEvent::MaintenanceFailed { .. } => {}
        }

        targets
    }

    /// Run one target again, backing off while the database is locked
    pub async fn retry(&self, target: MaintenanceTarget) -> crate::Result<()> {
        let operation = target.to_string();
        retry_on_lock(&operation, RETRY_MAX_WAIT_MS, || self.run(target)).await
    }

    async fn run(&self, target: MaintenanceTarget) -> crate::Result<()> {
        match target {
            MaintenanceTarget::Counter { entity } => recount(&self.pool, entity).await.map(|_| ()),
            MaintenanceTarget::TourPositions { tour_id } => {
                reassign_tour_positions(&self.pool, tour_id).await.map(|_| ())
            }
        }
    }

    /// Run all maintenance an event requires
    pub async fn handle(&self, event: &CatalogEvent) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        for target in Self::targets_for(event) {
            let outcome = match target {
                MaintenanceTarget::Counter { entity } => recount(&self.pool, entity)
                    .await
                    .map(|counts| report.recounted.push((entity, counts))),
                MaintenanceTarget::TourPositions { tour_id } => {
                    reassign_tour_positions(&self.pool, tour_id)
                        .await
                        .map(|n| report.repositioned.push((tour_id, n)))
                }
            };

            if let Err(e) = outcome {
                warn!(
                    event = event.event_type(),
                    target = %target,
                    error = %e,
                    "Maintenance failed; cached value left stale"
                );
                report.failures.push((target, e));
            }
        }

        report
    }
}

fn push_entity_targets(targets: &mut Vec<MaintenanceTarget>, entity: EntityRef) {
    let counter = MaintenanceTarget::Counter { entity };
    if !targets.contains(&counter) {
        targets.push(counter);
    }

    if entity.kind == CountedKind::Tour {
        let positions = MaintenanceTarget::TourPositions { tour_id: entity.id };
        if !targets.contains(&positions) {
            targets.push(positions);
        }
    }
}
