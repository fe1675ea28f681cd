//! Taxonomic tree support
//!
//! Taxa are stored as a forest of nested sets. [`closure`] answers
//! "these taxa and all their ancestors" with range predicates;
//! [`nested_set`] keeps the coordinates valid on structural changes.
//! [`ranks`] translates rank names between Portuguese and English.

pub mod closure;
pub mod nested_set;
pub mod ranks;

pub use closure::{
    resolve_ancestor_closure, taxa_with_parents_for_media, taxon_id_list, taxon_name_list,
    taxon_rank_list, AncestorClosureQuery, ClosurePredicate,
};

use crate::db::models::Taxon;

/// Anything carrying nested-set coordinates
pub trait TreeNode {
    fn id(&self) -> i64;
    fn parent_id(&self) -> Option<i64>;
    fn tree_id(&self) -> i64;
    fn lft(&self) -> i64;
    fn rght(&self) -> i64;
}

impl TreeNode for Taxon {
    fn id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> Option<i64> {
        self.parent_id
    }

    fn tree_id(&self) -> i64 {
        self.tree_id
    }

    fn lft(&self) -> i64 {
        self.lft
    }

    fn rght(&self) -> i64 {
        self.rght
    }
}

impl<T: TreeNode + ?Sized> TreeNode for &T {
    fn id(&self) -> i64 {
        (**self).id()
    }

    fn parent_id(&self) -> Option<i64> {
        (**self).parent_id()
    }

    fn tree_id(&self) -> i64 {
        (**self).tree_id()
    }

    fn lft(&self) -> i64 {
        (**self).lft()
    }

    fn rght(&self) -> i64 {
        (**self).rght()
    }
}
