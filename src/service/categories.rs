//! Category operations on top of the materialized-path hierarchy.

use super::found;
use crate::error::{CatalogError, CatalogResult};
use crate::hierarchy::{self, CategoryNode};
use crate::model::{validate, Category, CategoryPatch, NewCategory};
use crate::store::DirectoryStore;
use std::collections::BTreeSet;

/// Creates a category and stores its path and level.
///
/// An unknown `parent_id` fails with `NotFound` before anything is written;
/// the insert and the path update share one transaction.
pub fn create<S: DirectoryStore>(store: &S, new: NewCategory) -> CatalogResult<Category> {
    new.validate()?;
    let category = store.transaction(|s| {
        let parent = hierarchy::resolve_parent(s, new.parent_id)?;
        hierarchy::create_with_path(s, &new.name, parent.as_ref())
    })?;
    log::info!("created category {} ({})", category.id, category.path);
    Ok(category)
}

/// A category with its direct children ordered by name
pub fn get<S: DirectoryStore>(store: &S, id: i64) -> CatalogResult<CategoryNode> {
    validate::id("category_id", id)?;
    store.transaction(|s| {
        let category = found(s.find_category(id)?, "Category")?;
        let children = s
            .find_child_categories(id)?
            .into_iter()
            .map(CategoryNode::leaf)
            .collect();
        Ok(CategoryNode { category, children })
    })
}

/// The whole taxonomy, as a forest or as a flat list ordered by level then name
pub fn list<S: DirectoryStore>(store: &S, flat: bool) -> CatalogResult<Vec<CategoryNode>> {
    let mut categories = store.transaction(|s| s.list_categories())?;
    if flat {
        hierarchy::sort_flat(&mut categories);
        return Ok(categories.into_iter().map(CategoryNode::leaf).collect());
    }
    Ok(hierarchy::build_forest(categories))
}

/// Ids of the category and all of its descendants
pub fn subtree<S: DirectoryStore>(store: &S, id: i64) -> CatalogResult<BTreeSet<i64>> {
    validate::id("category_id", id)?;
    store.transaction(|s| hierarchy::resolve_subtree_ids(s, id))
}

/// Renames a category.
///
/// `parent_id` may only repeat the current parent: descendant paths are never
/// rewritten, so moving a node is rejected with `InvalidArgument`.
pub fn update<S: DirectoryStore>(store: &S, id: i64, patch: CategoryPatch) -> CatalogResult<Category> {
    validate::id("category_id", id)?;
    patch.validate()?;
    store.transaction(|s| {
        let current = found(s.find_category(id)?, "Category")?;
        if let Some(parent_id) = patch.parent_id.as_set() {
            if *parent_id != current.parent_id {
                return Err(CatalogError::invalid(
                    "Moving a category to a different parent is not supported",
                ));
            }
        }
        match patch.name.as_set() {
            Some(name) if *name != current.name => s.rename_category(id, name),
            _ => Ok(current),
        }
    })
}

/// Deletes the category with its whole subtree.
///
/// Associations from companies to any removed category are dropped; the
/// companies themselves stay. Returns the number of categories removed.
pub fn delete<S: DirectoryStore>(store: &S, id: i64) -> CatalogResult<usize> {
    validate::id("category_id", id)?;
    store.transaction(|s| {
        let ids = hierarchy::resolve_subtree_ids(s, id)?;
        let unlinked = s.unlink_categories(&ids)?;
        s.delete_categories(&ids)?;
        log::info!(
            "deleted category {id} with {} descendant(s), {unlinked} company link(s) dropped",
            ids.len() - 1
        );
        Ok(ids.len())
    })
}
