//! Maintenance commands
//!
//! Each command returns the lines to print so it can be exercised
//! against an in-memory catalog.

use anyhow::{bail, Context, Result};
use cifonauta_common::db::models::CountedKind;
use cifonauta_common::db::taxa::{find_taxon_by_name, list_orphans};
use cifonauta_common::maintenance::{reassign_all_tour_positions, reassign_tour_positions, recount_all};
use cifonauta_common::{resolve_ancestor_closure, Catalog};
use cifonauta_worms::AphiaClient;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Recount cached media counters of one kind, or of every kind
pub async fn recount(pool: &SqlitePool, kind: Option<CountedKind>) -> Result<Vec<String>> {
    let kinds = match kind {
        Some(kind) => vec![kind],
        None => CountedKind::ALL.to_vec(),
    };

    let mut lines = Vec::new();
    for kind in kinds {
        let counts = recount_all(pool, kind)
            .await
            .with_context(|| format!("Failed to recount {}", kind))?;
        info!(kind = %kind, entities = counts.len(), "Recounted");
        for (entity, counts) in counts {
            lines.push(format!(
                "{}: {} images, {} videos",
                entity, counts.image_count, counts.video_count
            ));
        }
    }
    Ok(lines)
}

/// Renumber tour positions for one tour, or for every tour
pub async fn positions(pool: &SqlitePool, tour_id: Option<i64>) -> Result<Vec<String>> {
    let results = match tour_id {
        Some(id) => {
            let count = reassign_tour_positions(pool, id)
                .await
                .with_context(|| format!("Failed to reassign positions of tour {}", id))?;
            vec![(id, count)]
        }
        None => reassign_all_tour_positions(pool)
            .await
            .context("Failed to reassign tour positions")?,
    };

    Ok(results
        .into_iter()
        .map(|(id, count)| format!("tour#{}: {} positions", id, count))
        .collect())
}

/// Names of the given taxa and all their ancestors, in tree order
pub async fn closure(pool: &SqlitePool, names: &[String]) -> Result<Vec<String>> {
    let mut taxa = Vec::with_capacity(names.len());
    for name in names {
        match find_taxon_by_name(pool, name).await? {
            Some(taxon) => taxa.push(taxon),
            None => bail!("Unknown taxon: {}", name),
        }
    }

    let mut closure = resolve_ancestor_closure(pool, &taxa).await?;
    closure.sort_by_key(|t| (t.tree_id, t.lft));
    Ok(closure
        .into_iter()
        .map(|t| {
            let rank = if t.rank.is_empty() { "?" } else { t.rank.as_str() };
            format!("{}{} ({})", "  ".repeat(t.level as usize), t.name, rank)
        })
        .collect())
}

/// Taxa without a parent (other than kingdoms) or without a rank
pub async fn orphans(pool: &SqlitePool) -> Result<Vec<String>> {
    let orphans = list_orphans(pool).await?;
    Ok(orphans
        .into_iter()
        .map(|t| {
            let rank = if t.rank.is_empty() { "no rank" } else { t.rank.as_str() };
            format!("{} [{}] #{}", t.name, rank, t.id)
        })
        .collect())
}

/// Best accepted WoRMS record for a name
pub async fn worms_match(client: &AphiaClient, name: &str) -> Result<Vec<String>> {
    let record = client
        .best_match(name)
        .await
        .with_context(|| format!("WoRMS lookup of '{}' failed", name))?;

    Ok(match record {
        Some(r) => vec![format!(
            "{} {} [{}] AphiaID {}",
            r.scientific_name,
            r.authority.as_deref().unwrap_or(""),
            r.rank.as_deref().unwrap_or("?"),
            r.aphia_id
        )],
        None => vec![format!("No accepted record for '{}'", name)],
    })
}

/// Import the classification of an AphiaID into the catalog
pub async fn worms_import(client: &AphiaClient, catalog: &Catalog, aphia_id: i64) -> Result<Vec<String>> {
    let path = client
        .import_classification(catalog, aphia_id)
        .await
        .with_context(|| format!("Failed to import AphiaID {}", aphia_id))?;

    Ok(path
        .into_iter()
        .map(|t| format!("{}{} ({})", "  ".repeat(t.level as usize), t.name, t.rank))
        .collect())
}

/// Look every orphan up in WoRMS and import its classification
///
/// Names WoRMS does not know are reported and left alone.
pub async fn worms_fix_orphans(client: &AphiaClient, catalog: &Catalog) -> Result<Vec<String>> {
    let orphans = list_orphans(catalog.pool()).await?;
    let mut lines = Vec::with_capacity(orphans.len());

    for orphan in orphans {
        let record = match client.best_match(&orphan.name).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                lines.push(format!("{}: not found in WoRMS", orphan.name));
                continue;
            }
            Err(e) => {
                warn!(taxon = %orphan.name, error = %e, "WoRMS lookup failed");
                lines.push(format!("{}: lookup failed ({})", orphan.name, e));
                continue;
            }
        };

        match client.import_classification(catalog, record.aphia_id).await {
            Ok(path) => lines.push(format!(
                "{}: {}",
                orphan.name,
                path.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(" > ")
            )),
            Err(e) => {
                warn!(taxon = %orphan.name, error = %e, "Import failed");
                lines.push(format!("{}: import failed ({})", orphan.name, e));
            }
        }
    }

    Ok(lines)
}
