//! Ancestor closure over nested-set coordinates
//!
//! For every input node `n` the query selects
//! `(tree_id = n.tree_id AND lft < n.lft AND rght > n.rght)`, which matches
//! exactly the ancestors of `n`, plus `(id = n.id)` so the node itself is
//! always part of the result. All predicates are OR-ed together, so a
//! whole media item's classification resolves in one query instead of one
//! parent hop at a time.
//!
//! Siblings share every ancestor: once a parent id has been seen for a
//! tree, further children of that parent add only their identity
//! predicate. This keeps the statement short; the result is the same.

use super::ranks::display_rank;
use super::TreeNode;
use crate::db::models::{Language, Taxon};
use crate::db::taxa::{taxa_for_media, TAXON_COLUMNS};
use crate::Result;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Predicates per statement; keeps the bind count (3 per range) under
/// SQLite's variable limit
pub const CHUNK_SIZE: usize = 200;

/// One OR-ed term of the closure query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClosurePredicate {
    /// Nodes whose range strictly contains `(lft, rght)` in `tree_id`
    Ancestors { tree_id: i64, lft: i64, rght: i64 },
    /// The node itself
    Identity { id: i64 },
}

/// Accumulates closure predicates for a set of nodes
#[derive(Debug, Default)]
pub struct AncestorClosureQuery {
    predicates: Vec<ClosurePredicate>,
    parents_by_tree: HashMap<i64, HashSet<Option<i64>>>,
    ids: HashSet<i64>,
}

impl AncestorClosureQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes<I>(nodes: I) -> Self
    where
        I: IntoIterator,
        I::Item: TreeNode,
    {
        let mut query = Self::new();
        for node in nodes {
            query.add(&node);
        }
        query
    }

    /// Add one node's ancestor and identity predicates
    pub fn add<N: TreeNode + ?Sized>(&mut self, node: &N) {
        let parents = self.parents_by_tree.entry(node.tree_id()).or_default();
        if parents.insert(node.parent_id()) {
            self.predicates.push(ClosurePredicate::Ancestors {
                tree_id: node.tree_id(),
                lft: node.lft(),
                rght: node.rght(),
            });
        }

        if self.ids.insert(node.id()) {
            self.predicates.push(ClosurePredicate::Identity { id: node.id() });
        }
    }

    pub fn predicates(&self) -> &[ClosurePredicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// One SELECT per chunk of predicates
    pub fn build_queries(&self) -> Vec<QueryBuilder<'static, Sqlite>> {
        self.predicates
            .chunks(CHUNK_SIZE)
            .map(|chunk| {
                let mut qb = QueryBuilder::new(format!("SELECT {} FROM taxa WHERE ", TAXON_COLUMNS));
                for (i, predicate) in chunk.iter().enumerate() {
                    if i > 0 {
                        qb.push(" OR ");
                    }
                    match *predicate {
                        ClosurePredicate::Ancestors { tree_id, lft, rght } => {
                            qb.push("(tree_id = ")
                                .push_bind(tree_id)
                                .push(" AND lft < ")
                                .push_bind(lft)
                                .push(" AND rght > ")
                                .push_bind(rght)
                                .push(")");
                        }
                        ClosurePredicate::Identity { id } => {
                            qb.push("(id = ").push_bind(id).push(")");
                        }
                    }
                }
                qb.push(" ORDER BY name");
                qb
            })
            .collect()
    }
}

/// The given taxa plus every ancestor, without duplicates, ordered by name
///
/// Empty input runs no query. Coordinates are trusted as stored: a node
/// with `lft >= rght` simply contributes fewer ancestors.
pub async fn resolve_ancestor_closure<I>(pool: &SqlitePool, nodes: I) -> Result<Vec<Taxon>>
where
    I: IntoIterator,
    I::Item: TreeNode,
{
    let query = AncestorClosureQuery::from_nodes(nodes);
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let mut builders = query.build_queries();
    debug!(
        predicates = query.predicates().len(),
        statements = builders.len(),
        "Resolving ancestor closure"
    );

    if builders.len() == 1 {
        let mut qb = builders.remove(0);
        return Ok(qb.build_query_as::<Taxon>().fetch_all(pool).await?);
    }

    let mut merged = BTreeMap::new();
    for mut qb in builders {
        for taxon in qb.build_query_as::<Taxon>().fetch_all(pool).await? {
            merged.entry(taxon.id).or_insert(taxon);
        }
    }

    let mut taxa: Vec<Taxon> = merged.into_values().collect();
    taxa.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(taxa)
}

/// Taxa tagged on a media item together with all their ancestors
pub async fn taxa_with_parents_for_media(pool: &SqlitePool, media_id: i64) -> Result<Vec<Taxon>> {
    let direct = taxa_for_media(pool, media_id).await?;
    resolve_ancestor_closure(pool, &direct).await
}

/// Names of a media item's full classification joined by `separator`
pub async fn taxon_name_list(pool: &SqlitePool, media_id: i64, separator: &str) -> Result<String> {
    let taxa = taxa_with_parents_for_media(pool, media_id).await?;
    Ok(taxa
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(separator))
}

/// Ids of the taxa tagged directly on a media item, as `"3, 7"`
///
/// Ancestors are not included. Ordered by taxon name.
pub async fn taxon_id_list(pool: &SqlitePool, media_id: i64) -> Result<String> {
    let taxa = taxa_for_media(pool, media_id).await?;
    Ok(taxa
        .iter()
        .map(|t| t.id.to_string())
        .collect::<Vec<_>>()
        .join(", "))
}

/// Ranks of the taxa tagged directly on a media item, in `language`
///
/// Unranked taxa are skipped.
pub async fn taxon_rank_list(
    pool: &SqlitePool,
    media_id: i64,
    language: Language,
    separator: &str,
) -> Result<String> {
    let taxa = taxa_for_media(pool, media_id).await?;
    Ok(taxa
        .iter()
        .filter(|t| !t.rank.is_empty())
        .map(|t| display_rank(&t.rank, language))
        .collect::<Vec<_>>()
        .join(separator))
}
