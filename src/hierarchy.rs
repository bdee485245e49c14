//! Category hierarchy maintenance and traversal.
//!
//! Every category stores a materialized `path`: the ids from its root down to
//! itself joined by [`PATH_DELIMITER`], and a `level` equal to its depth.
//!
//! * root: `path == id`, `level == 0`
//! * child: `path == parent.path + "/" + id`, `level == parent.level + 1`
//!
//! The path embeds the node's own id, so creation is a two-step write inside
//! one transaction: insert the row to obtain the id, then derive and store the
//! path. Subtree queries are a single prefix match on `path`; no recursive walk
//! happens at read time. Paths of descendants are never rewritten, which is why
//! moving a node under another parent is not supported.

use crate::error::{CatalogError, CatalogResult};
use crate::model::Category;
use crate::store::StoreSession;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

pub const PATH_DELIMITER: char = '/';

/// Derived placement of a category in the forest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLevel {
    pub path: String,
    pub level: i32,
}

/// Computes the path and level of node `id` placed under `parent`.
pub fn derive_path(id: i64, parent: Option<&Category>) -> PathLevel {
    match parent {
        None => PathLevel {
            path: id.to_string(),
            level: 0,
        },
        Some(parent) => PathLevel {
            path: format!("{}{}{}", parent.path, PATH_DELIMITER, id),
            level: parent.level + 1,
        },
    }
}

/// Looks up the parent a new category will hang under.
///
/// A supplied but unknown parent id is `NotFound`, raised before anything is
/// written.
pub fn resolve_parent(
    session: &dyn StoreSession,
    parent_id: Option<i64>,
) -> CatalogResult<Option<Category>> {
    match parent_id {
        None => Ok(None),
        Some(id) => session
            .find_category(id)?
            .map(Some)
            .ok_or_else(|| CatalogError::not_found("Parent category not found")),
    }
}

/// Inserts a category and stores its derived path and level.
///
/// Must run inside the caller's transaction so no reader observes the row
/// between the insert and the path update.
pub fn create_with_path(
    session: &dyn StoreSession,
    name: &str,
    parent: Option<&Category>,
) -> CatalogResult<Category> {
    let inserted = session.insert_category(name, parent.map(|p| p.id))?;
    let placement = derive_path(inserted.id, parent);
    log::debug!(
        "category {} placed at path {} (level {})",
        inserted.id,
        placement.path,
        placement.level
    );
    session.update_category_path(inserted.id, &placement.path, placement.level)
}

/// True when `path` is `root_path` itself or lies strictly below it.
///
/// Matching is per path segment: `"1/2"` is not below `"1/23"` and `"12"` is
/// not below `"1"`.
pub fn in_subtree(root_path: &str, path: &str) -> bool {
    match path.strip_prefix(root_path) {
        Some("") => true,
        Some(rest) => rest.starts_with(PATH_DELIMITER),
        None => false,
    }
}

/// `LIKE` pattern matching every strict descendant of `root_path`
pub fn descendant_pattern(root_path: &str) -> String {
    format!("{root_path}{PATH_DELIMITER}%")
}

/// Ids of `root` and every candidate in its subtree
pub fn subtree_ids<'a>(
    root: &Category,
    candidates: impl IntoIterator<Item = &'a Category>,
) -> BTreeSet<i64> {
    let mut ids: BTreeSet<i64> = candidates
        .into_iter()
        .filter(|c| in_subtree(&root.path, &c.path))
        .map(|c| c.id)
        .collect();
    ids.insert(root.id);
    ids
}

/// Expands `category_id` into itself plus all of its descendants.
///
/// Fails with `NotFound` when the category does not exist.
pub fn resolve_subtree_ids(
    session: &dyn StoreSession,
    category_id: i64,
) -> CatalogResult<BTreeSet<i64>> {
    let root = session
        .find_category(category_id)?
        .ok_or_else(|| CatalogError::not_found("Category not found"))?;
    let matched = session.find_categories_in_subtree(&root.path)?;
    Ok(subtree_ids(&root, &matched))
}

/// A category with its children, as returned by the tree listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

impl CategoryNode {
    pub fn leaf(category: Category) -> Self {
        Self {
            category,
            children: Vec::new(),
        }
    }
}

fn by_name(a: &Category, b: &Category) -> std::cmp::Ordering {
    a.name.cmp(&b.name).then(a.id.cmp(&b.id))
}

/// Assembles the forest from a flat list: roots and every sibling group
/// ordered by name.
///
/// Nodes are kept in an arena indexed by position; each node records the
/// indices of its children. Subtrees are then built bottom-up from an explicit
/// stack, so the depth of the hierarchy never reaches the call stack.
pub fn build_forest(mut categories: Vec<Category>) -> Vec<CategoryNode> {
    categories.sort_by(by_name);

    let index: HashMap<i64, usize> = categories
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id, i))
        .collect();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); categories.len()];
    let mut roots = Vec::new();
    for (i, category) in categories.iter().enumerate() {
        match category.parent_id.and_then(|p| index.get(&p)) {
            Some(&parent) => children[parent].push(i),
            None if category.parent_id.is_none() => roots.push(i),
            None => log::warn!(
                "category {} references missing parent {:?}",
                category.id,
                category.parent_id
            ),
        }
    }

    let mut pending: Vec<Option<Category>> = categories.into_iter().map(Some).collect();
    let mut built: Vec<Option<CategoryNode>> = (0..pending.len()).map(|_| None).collect();
    // (node, children already built)
    let mut stack: Vec<(usize, bool)> = roots.iter().map(|&i| (i, false)).collect();
    while let Some((i, ready)) = stack.pop() {
        if !ready {
            stack.push((i, true));
            stack.extend(children[i].iter().map(|&c| (c, false)));
            continue;
        }
        let Some(category) = pending[i].take() else {
            continue;
        };
        built[i] = Some(CategoryNode {
            category,
            children: children[i].iter().filter_map(|&c| built[c].take()).collect(),
        });
    }

    roots.into_iter().filter_map(|i| built[i].take()).collect()
}

/// Flat listing order: by level, then by name
pub fn sort_flat(categories: &mut [Category]) {
    categories.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| by_name(a, b)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn category(id: i64, name: &str, parent: Option<&Category>) -> Category {
        let placement = derive_path(id, parent);
        Category {
            id,
            name: name.to_string(),
            parent_id: parent.map(|p| p.id),
            level: placement.level,
            path: placement.path,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn test_root_path() {
        let placement = derive_path(7, None);
        assert_eq!(placement.path, "7");
        assert_eq!(placement.level, 0);
    }

    #[test]
    fn test_child_path_extends_parent() {
        let food = category(1, "Food", None);
        let meat = category(4, "Meat", Some(&food));
        let beef = category(9, "Beef", Some(&meat));
        assert_eq!(meat.path, "1/4");
        assert_eq!(meat.level, 1);
        assert_eq!(beef.path, "1/4/9");
        assert_eq!(beef.level, 2);
    }

    #[test]
    fn test_in_subtree_is_segment_exact() {
        assert!(in_subtree("1", "1"));
        assert!(in_subtree("1", "1/2"));
        assert!(in_subtree("1/2", "1/2/3"));
        assert!(!in_subtree("1", "12"));
        assert!(!in_subtree("1/2", "1/23"));
        assert!(!in_subtree("1/2", "1"));
    }

    #[test]
    fn test_subtree_ids_reflexive_and_exact() {
        let one = category(1, "One", None);
        let two = category(2, "Two", Some(&one));
        let twenty_three = category(23, "TwentyThree", Some(&one));
        let twelve = category(12, "Twelve", None);
        let under_two = category(5, "UnderTwo", Some(&two));
        let all = vec![
            one.clone(),
            two.clone(),
            twenty_three.clone(),
            twelve,
            under_two,
        ];

        let from_two = subtree_ids(&two, &all);
        assert_eq!(from_two, BTreeSet::from([2, 5]));

        let from_one = subtree_ids(&one, &all);
        assert_eq!(from_one, BTreeSet::from([1, 2, 5, 23]));

        let lonely = subtree_ids(&twenty_three, &[]);
        assert_eq!(lonely, BTreeSet::from([23]));
    }

    #[test]
    fn test_descendant_pattern() {
        assert_eq!(descendant_pattern("3/8"), "3/8/%");
    }

    #[test]
    fn test_build_forest_orders_by_name() {
        let auto = category(2, "Автомобили", None);
        let food = category(1, "Еда", None);
        let parts = category(6, "Запчасти", Some(&auto));
        let trucks = category(4, "Грузовые", Some(&auto));
        let tires = category(8, "Шины/Диски", Some(&parts));

        let forest = build_forest(vec![food, tires, parts, trucks, auto]);
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].category.name, "Автомобили");
        assert_eq!(forest[1].category.name, "Еда");
        let auto_children: Vec<&str> = forest[0]
            .children
            .iter()
            .map(|n| n.category.name.as_str())
            .collect();
        assert_eq!(auto_children, vec!["Грузовые", "Запчасти"]);
        assert_eq!(forest[0].children[1].children[0].category.id, 8);
        assert!(forest[1].children.is_empty());
    }

    #[test]
    fn test_build_forest_handles_deep_chains() {
        const DEPTH: i64 = 10_000;
        let chain: Vec<Category> = (1..=DEPTH)
            .rev()
            .map(|id| Category {
                id,
                name: format!("level-{id}"),
                parent_id: (id > 1).then(|| id - 1),
                level: (id - 1) as i32,
                path: String::new(),
                created_at: NaiveDateTime::default(),
                updated_at: NaiveDateTime::default(),
            })
            .collect();

        let mut forest = build_forest(chain);
        assert_eq!(forest.len(), 1);

        // Walk and take apart the chain by hand; the default drop recurses.
        let mut ids = Vec::new();
        let mut next = forest.pop();
        while let Some(mut node) = next {
            ids.push(node.category.id);
            assert!(node.children.len() <= 1);
            next = node.children.pop();
        }
        assert_eq!(ids, (1..=DEPTH).collect::<Vec<_>>());
    }

    #[test]
    fn test_sort_flat_by_level_then_name() {
        let b = category(1, "B", None);
        let a = category(2, "A", None);
        let child = category(3, "0-child", Some(&b));
        let mut flat = vec![child, b, a];
        sort_flat(&mut flat);
        let ids: Vec<i64> = flat.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }
}
