//! Categories: a forest of named nodes with a materialized id path.

use crate::error::CatalogResult;
use crate::model::patch::Patch;
use crate::model::validate;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    /// Depth in the forest; roots are 0
    pub level: i32,
    /// Ids from the root down to this node joined by `/`
    pub path: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Creation payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

impl NewCategory {
    pub fn validate(&self) -> CatalogResult<()> {
        validate::text("name", &self.name, validate::NAME_MAX_LEN)?;
        if let Some(parent_id) = self.parent_id {
            validate::id("parent_id", parent_id)?;
        }
        Ok(())
    }
}

/// Partial update payload.
///
/// `parent_id` is accepted only when it repeats the current parent;
/// moving a node under a different parent is rejected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CategoryPatch {
    pub name: Patch<String>,
    pub parent_id: Patch<Option<i64>>,
}

impl CategoryPatch {
    pub fn validate(&self) -> CatalogResult<()> {
        if let Some(name) = self.name.as_set() {
            validate::text("name", name, validate::NAME_MAX_LEN)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_category_parent_optional() {
        let root: NewCategory = serde_json::from_str(r#"{"name": "Еда"}"#).unwrap();
        assert_eq!(root.parent_id, None);
        assert!(root.validate().is_ok());

        let child: NewCategory =
            serde_json::from_str(r#"{"name": "Мясная продукция", "parent_id": 1}"#).unwrap();
        assert_eq!(child.parent_id, Some(1));
    }

    #[test]
    fn test_invalid_parent_id() {
        let bad = NewCategory {
            name: "x".into(),
            parent_id: Some(0),
        };
        assert!(bad.validate().is_err());
    }
}
