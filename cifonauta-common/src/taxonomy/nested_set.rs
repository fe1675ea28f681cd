//! Nested-set coordinate maintenance for the taxa table
//!
//! Each tree has its own `tree_id`; inside a tree every node owns the
//! interval `[lft, rght]` and its descendants' intervals nest strictly
//! inside it. Inserts use the classic "open a gap of 2" shift; moves and
//! deletes rebuild the coordinates from parent pointers.
//!
//! All functions take a connection so callers can run them inside a
//! transaction: readers must never observe a half-shifted tree.

use crate::{Error, Result};
use sqlx::{Row, SqliteConnection};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Coordinates assigned to one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinates {
    pub tree_id: i64,
    pub lft: i64,
    pub rght: i64,
    pub level: i64,
}

/// Coordinates for a node about to be inserted as the last child of
/// `parent_id`, or as the root of a new tree
///
/// Shifts the existing nodes of the parent's tree to open the gap.
pub async fn open_slot(conn: &mut SqliteConnection, parent_id: Option<i64>) -> Result<Coordinates> {
    let Some(parent_id) = parent_id else {
        let max_tree: Option<i64> = sqlx::query_scalar("SELECT MAX(tree_id) FROM taxa")
            .fetch_one(&mut *conn)
            .await?;
        return Ok(Coordinates {
            tree_id: max_tree.unwrap_or(0) + 1,
            lft: 1,
            rght: 2,
            level: 0,
        });
    };

    let parent = sqlx::query("SELECT tree_id, rght, level FROM taxa WHERE id = ?")
        .bind(parent_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("taxon#{}", parent_id)))?;

    let tree_id: i64 = parent.try_get("tree_id")?;
    let parent_rght: i64 = parent.try_get("rght")?;
    let parent_level: i64 = parent.try_get("level")?;

    sqlx::query("UPDATE taxa SET rght = rght + 2 WHERE tree_id = ? AND rght >= ?")
        .bind(tree_id)
        .bind(parent_rght)
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE taxa SET lft = lft + 2 WHERE tree_id = ? AND lft > ?")
        .bind(tree_id)
        .bind(parent_rght)
        .execute(&mut *conn)
        .await?;

    Ok(Coordinates {
        tree_id,
        lft: parent_rght,
        rght: parent_rght + 1,
        level: parent_level + 1,
    })
}

/// Compute coordinates for a forest given `(id, parent_id)` pairs
///
/// Roots and siblings are visited in id order, which matches the order
/// produced by repeated last-child inserts. Trees are numbered from 1.
/// Nodes unreachable from any root (parent cycles) get no coordinates.
pub fn compute_coordinates(nodes: &[(i64, Option<i64>)]) -> HashMap<i64, Coordinates> {
    let mut children: HashMap<Option<i64>, Vec<i64>> = HashMap::new();
    for &(id, parent_id) in nodes {
        children.entry(parent_id).or_default().push(id);
    }
    for list in children.values_mut() {
        list.sort_unstable();
    }

    let mut coords = HashMap::with_capacity(nodes.len());
    let roots = children.get(&None).cloned().unwrap_or_default();

    for (index, root) in roots.into_iter().enumerate() {
        let tree_id = index as i64 + 1;
        let mut counter = 1i64;
        // (node, level, lft, next child index)
        let mut stack: Vec<(i64, i64, i64, usize)> = vec![(root, 0, counter, 0)];

        while let Some(top) = stack.last_mut() {
            let (node, level, lft, next) = *top;
            let kids = children.get(&Some(node));
            match kids.and_then(|k| k.get(next)) {
                Some(&child) => {
                    top.3 += 1;
                    counter += 1;
                    stack.push((child, level + 1, counter, 0));
                }
                None => {
                    counter += 1;
                    coords.insert(
                        node,
                        Coordinates {
                            tree_id,
                            lft,
                            rght: counter,
                            level,
                        },
                    );
                    stack.pop();
                }
            }
        }
    }

    coords
}

/// Recompute the coordinates of every taxon from parent pointers
pub async fn rebuild(conn: &mut SqliteConnection) -> Result<usize> {
    let rows = sqlx::query("SELECT id, parent_id FROM taxa")
        .fetch_all(&mut *conn)
        .await?;

    let mut nodes = Vec::with_capacity(rows.len());
    for row in &rows {
        nodes.push((row.try_get::<i64, _>("id")?, row.try_get::<Option<i64>, _>("parent_id")?));
    }

    let coords = compute_coordinates(&nodes);
    if coords.len() < nodes.len() {
        warn!(
            unreachable = nodes.len() - coords.len(),
            "Taxa with cyclic parent pointers were left untouched"
        );
    }

    for (id, c) in &coords {
        sqlx::query("UPDATE taxa SET tree_id = ?, lft = ?, rght = ?, level = ? WHERE id = ?")
            .bind(c.tree_id)
            .bind(c.lft)
            .bind(c.rght)
            .bind(c.level)
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }

    debug!(nodes = coords.len(), "Rebuilt taxon tree coordinates");
    Ok(coords.len())
}
