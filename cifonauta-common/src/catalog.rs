//! Catalog mutation API
//!
//! Every write that can change a cached counter or a tour's positions
//! goes through [`Catalog`]. Each method performs the write, runs the
//! required maintenance inline and then emits one [`CatalogEvent`]:
//!
//! ```text
//! write ──► Maintainer::handle(event) ──► EventBus::emit_lossy(event)
//! ```
//!
//! Maintenance failures do not undo the write. They are returned in the
//! [`MaintenanceReport`] and announced as `MaintenanceFailed` events.

use crate::db::models::{
    CountedEntity, CountedKind, EntityRef, MediaLinks, NewMedia, NewTaxon, NewTour, Taxon, Tour,
};
use crate::db::{entities, media, taxa, tours};
use crate::events::{CatalogEvent, EventBus};
use crate::maintenance::{MaintenanceReport, Maintainer};
use crate::{Error, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
    maintainer: Maintainer,
    events: EventBus,
}

impl Catalog {
    pub fn new(pool: SqlitePool, events: EventBus) -> Self {
        Self {
            maintainer: Maintainer::new(pool.clone()),
            pool,
            events,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn maintainer(&self) -> &Maintainer {
        &self.maintainer
    }

    /// Run maintenance for an event, then publish it
    async fn finish(&self, event: CatalogEvent) -> MaintenanceReport {
        let report = self.maintainer.handle(&event).await;

        for (target, error) in &report.failures {
            self.events.emit_lossy(CatalogEvent::MaintenanceFailed {
                target: *target,
                message: error.to_string(),
                timestamp: Utc::now(),
            });
        }
        self.events.emit_lossy(event);

        report
    }

    /// Create a named entity; new entities start with zero counts
    pub async fn create_entity(&self, kind: CountedKind, name: &str) -> Result<CountedEntity> {
        if kind == CountedKind::Tour {
            let (id, _) = self
                .create_tour(&NewTour {
                    name: name.to_string(),
                    ..Default::default()
                })
                .await?;
            return entities::load_entity(&self.pool, EntityRef::new(kind, id)).await;
        }
        entities::insert_entity(&self.pool, kind, name).await
    }

    /// Create a media record and refresh the entities its links point to
    pub async fn create_media(&self, new: &NewMedia) -> Result<(i64, MaintenanceReport)> {
        let media_id = media::insert_media(&self.pool, new).await?;
        info!(media_id, filepath = %new.filepath, "Created media");

        let report = self
            .finish(CatalogEvent::MediaCreated {
                media_id,
                affected: new.links.entity_refs(),
                timestamp: Utc::now(),
            })
            .await;
        Ok((media_id, report))
    }

    /// Delete a media record and refresh everything it was counted in
    pub async fn delete_media(&self, media_id: i64) -> Result<MaintenanceReport> {
        let affected = entities::entities_for_media(&self.pool, media_id).await?;
        media::delete_media(&self.pool, media_id).await?;
        info!(media_id, affected = affected.len(), "Deleted media");

        Ok(self
            .finish(CatalogEvent::MediaDeleted {
                media_id,
                affected,
                timestamp: Utc::now(),
            })
            .await)
    }

    /// Replace a media item's size and place links
    ///
    /// Only entities whose link actually changed are recounted.
    pub async fn update_media_links(
        &self,
        media_id: i64,
        links: &MediaLinks,
    ) -> Result<MaintenanceReport> {
        let old = media::load_media(&self.pool, media_id).await?.links;
        media::update_media_links(&self.pool, media_id, links).await?;

        let old_refs = old.entity_refs();
        let new_refs = links.entity_refs();
        let mut affected: Vec<EntityRef> = old_refs
            .iter()
            .filter(|e| !new_refs.contains(e))
            .copied()
            .collect();
        affected.extend(new_refs.iter().filter(|e| !old_refs.contains(e)).copied());

        Ok(self
            .finish(CatalogEvent::MediaUpdated {
                media_id,
                affected,
                timestamp: Utc::now(),
            })
            .await)
    }

    /// Link a media item to an author, source, tag, reference or tour
    ///
    /// Size and place kinds are set with [`Catalog::update_media_links`].
    /// Linking twice is a no-op with an empty report.
    pub async fn associate(&self, entity: EntityRef, media_id: i64) -> Result<MaintenanceReport> {
        self.change_association(entity, media_id, true).await
    }

    /// Remove a many-to-many link
    pub async fn dissociate(&self, entity: EntityRef, media_id: i64) -> Result<MaintenanceReport> {
        self.change_association(entity, media_id, false).await
    }

    async fn change_association(
        &self,
        entity: EntityRef,
        media_id: i64,
        linked: bool,
    ) -> Result<MaintenanceReport> {
        let changed = if linked {
            entities::link_media(&self.pool, entity, media_id).await?
        } else {
            entities::unlink_media(&self.pool, entity, media_id).await?
        };

        if !changed {
            return Ok(MaintenanceReport::default());
        }

        Ok(self
            .finish(CatalogEvent::AssociationChanged {
                media_id,
                entity,
                linked,
                timestamp: Utc::now(),
            })
            .await)
    }

    /// Create a tour with its initial members
    pub async fn create_tour(&self, tour: &NewTour) -> Result<(i64, MaintenanceReport)> {
        let tour_id = tours::insert_tour(&self.pool, tour).await?;
        info!(tour_id, name = %tour.name, members = tour.media_ids.len(), "Created tour");

        let report = self
            .finish(CatalogEvent::TourSaved {
                tour_id,
                timestamp: Utc::now(),
            })
            .await;
        Ok((tour_id, report))
    }

    /// Save a tour's editable fields; positions are reassigned
    pub async fn save_tour(&self, tour: &Tour) -> Result<MaintenanceReport> {
        tours::update_tour(&self.pool, tour).await?;

        Ok(self
            .finish(CatalogEvent::TourSaved {
                tour_id: tour.id,
                timestamp: Utc::now(),
            })
            .await)
    }

    pub async fn add_media_to_tour(&self, tour_id: i64, media_id: i64) -> Result<MaintenanceReport> {
        self.associate(EntityRef::new(CountedKind::Tour, tour_id), media_id)
            .await
    }

    pub async fn remove_media_from_tour(
        &self,
        tour_id: i64,
        media_id: i64,
    ) -> Result<MaintenanceReport> {
        self.dissociate(EntityRef::new(CountedKind::Tour, tour_id), media_id)
            .await
    }

    /// Cite a reference in a tour; returns `false` if already cited
    ///
    /// Citations are not media links, so no counter changes.
    pub async fn add_reference_to_tour(&self, tour_id: i64, reference_id: i64) -> Result<bool> {
        tours::load_tour(&self.pool, tour_id).await?;
        entities::load_entity(&self.pool, EntityRef::new(CountedKind::Reference, reference_id))
            .await?;
        tours::link_tour_reference(&self.pool, tour_id, reference_id).await
    }

    pub async fn remove_reference_from_tour(&self, tour_id: i64, reference_id: i64) -> Result<bool> {
        tours::unlink_tour_reference(&self.pool, tour_id, reference_id).await
    }

    pub async fn create_taxon(&self, taxon: &NewTaxon) -> Result<Taxon> {
        let created = taxa::insert_taxon(&self.pool, taxon).await?;
        self.finish(CatalogEvent::TaxonTreeChanged {
            taxon_id: created.id,
            timestamp: Utc::now(),
        })
        .await;
        Ok(created)
    }

    /// Reparent a taxon; `None` makes it a root
    pub async fn move_taxon(&self, taxon_id: i64, new_parent: Option<i64>) -> Result<Taxon> {
        let moved = taxa::move_taxon(&self.pool, taxon_id, new_parent).await?;
        self.finish(CatalogEvent::TaxonTreeChanged {
            taxon_id,
            timestamp: Utc::now(),
        })
        .await;
        Ok(moved)
    }

    pub async fn delete_taxon(&self, taxon_id: i64) -> Result<()> {
        taxa::delete_taxon(&self.pool, taxon_id).await?;
        self.finish(CatalogEvent::TaxonTreeChanged {
            taxon_id,
            timestamp: Utc::now(),
        })
        .await;
        Ok(())
    }

    /// Tag a media item with a taxon; returns `false` if already tagged
    pub async fn tag_media_with_taxon(&self, taxon_id: i64, media_id: i64) -> Result<bool> {
        // Surface missing rows as NotFound rather than a constraint error
        taxa::load_taxon(&self.pool, taxon_id).await?;
        media::load_media(&self.pool, media_id).await?;
        taxa::link_taxon_media(&self.pool, taxon_id, media_id).await
    }

    pub async fn untag_media_taxon(&self, taxon_id: i64, media_id: i64) -> Result<bool> {
        taxa::unlink_taxon_media(&self.pool, taxon_id, media_id).await
    }

    /// Find a taxon by name or create it under `parent_id`
    ///
    /// An existing taxon is returned untouched, wherever it sits.
    pub async fn get_or_create_taxon(&self, taxon: &NewTaxon) -> Result<Taxon> {
        match taxa::find_taxon_by_name(&self.pool, &taxon.name).await? {
            Some(existing) => Ok(existing),
            None => self.create_taxon(taxon).await,
        }
    }

    /// Run every failed target of a report again
    ///
    /// All targets are attempted; the last error is returned.
    pub async fn retry_maintenance(&self, report: &MaintenanceReport) -> Result<()> {
        let mut last_error: Option<Error> = None;
        for (target, _) in &report.failures {
            if let Err(e) = self.maintainer.retry(*target).await {
                last_error = Some(e);
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
