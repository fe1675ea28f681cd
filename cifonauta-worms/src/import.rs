//! Import WoRMS classifications into the catalog taxonomy
//!
//! A classification chain becomes a path of catalog taxa: each level is
//! matched by AphiaID, then by name, and created under the previous level
//! when missing. Existing parentless taxa found along the way are
//! attached, which is how orphans get fixed.

use crate::client::AphiaClient;
use crate::error::{Result, WormsError};
use cifonauta_common::db::models::{NewTaxon, Taxon};
use cifonauta_common::db::taxa::{find_taxon_by_aphia, find_taxon_by_name, load_taxon, update_taxon_details};
use cifonauta_common::taxonomy::ranks::portuguese_rank;
use cifonauta_common::Catalog;
use tracing::info;

/// Catalog rank name for a WoRMS rank
///
/// Unknown ranks are kept as given.
pub fn catalog_rank(worms_rank: &str) -> String {
    portuguese_rank(worms_rank).unwrap_or(worms_rank).to_string()
}

/// Ranks above kingdom are not part of the catalog tree
fn is_above_kingdom(worms_rank: &str) -> bool {
    matches!(worms_rank, "Superdomain" | "Domain")
}

impl AphiaClient {
    /// Make sure the whole classification of `aphia_id` exists in the
    /// catalog; returns the path from kingdom down to the taxon
    pub async fn import_classification(&self, catalog: &Catalog, aphia_id: i64) -> Result<Vec<Taxon>> {
        let classification = self
            .classification_by_id(aphia_id)
            .await?
            .ok_or_else(|| WormsError::NotFound(format!("classification of AphiaID {}", aphia_id)))?;

        let pool = catalog.pool();
        let mut path: Vec<Taxon> = Vec::new();

        for level in classification.lineage() {
            if is_above_kingdom(&level.rank) {
                continue;
            }
            let parent_id = path.last().map(|t| t.id);
            let rank = catalog_rank(&level.rank);

            let existing = match find_taxon_by_aphia(pool, level.aphia_id).await? {
                Some(taxon) => Some(taxon),
                None => find_taxon_by_name(pool, &level.scientific_name).await?,
            };

            let taxon = match existing {
                Some(mut taxon) => {
                    if taxon.aphia != Some(level.aphia_id) || taxon.rank.is_empty() {
                        let rank = if taxon.rank.is_empty() { &rank } else { &taxon.rank };
                        update_taxon_details(pool, taxon.id, rank, Some(level.aphia_id)).await?;
                        taxon = load_taxon(pool, taxon.id).await?;
                    }
                    if taxon.parent_id.is_none() && parent_id.is_some() {
                        info!(taxon = %taxon.name, "Attaching parentless taxon");
                        taxon = catalog.move_taxon(taxon.id, parent_id).await?;
                    }
                    taxon
                }
                None => {
                    let mut new = NewTaxon::new(level.scientific_name.clone(), rank)
                        .with_aphia(level.aphia_id);
                    new.parent_id = parent_id;
                    let created = catalog.create_taxon(&new).await?;
                    info!(taxon = %created.name, aphia = level.aphia_id, "Imported taxon");
                    created
                }
            };

            path.push(taxon);
        }

        Ok(path)
    }
}
