//! Companies: located in one building, tagged with one or more categories.

use crate::error::{CatalogError, CatalogResult};
use crate::model::building::Building;
use crate::model::category::Category;
use crate::model::patch::Patch;
use crate::model::{phones, validate};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A company as stored: references instead of embedded relations
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyRecord {
    pub id: i64,
    pub name: String,
    pub phones: Vec<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub building_id: i64,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Persisted form of the active flag
pub fn active_flag(active: bool) -> i32 {
    i32::from(active)
}

pub fn is_active_flag(flag: i32) -> bool {
    flag != 0
}

fn default_active() -> bool {
    true
}

/// Creation payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewCompany {
    pub name: String,
    pub phones: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub building_id: i64,
    pub category_ids: Vec<i64>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl NewCompany {
    pub fn validate(&self) -> CatalogResult<()> {
        validate::text("name", &self.name, validate::NAME_MAX_LEN)?;
        phones::validate(&self.phones)?;
        validate::optional_text("website", self.website.as_deref(), validate::CONTACT_MAX_LEN)?;
        validate::email(self.email.as_deref())?;
        validate::id("building_id", self.building_id)?;
        validate_category_ids(&self.category_ids)
    }
}

fn validate_category_ids(ids: &[i64]) -> CatalogResult<()> {
    if ids.is_empty() {
        return Err(CatalogError::invalid("At least one category id is required"));
    }
    for id in ids {
        validate::id("category_ids", *id)?;
    }
    Ok(())
}

/// Partial update payload; only supplied fields change
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompanyPatch {
    pub name: Patch<String>,
    pub phones: Patch<Vec<String>>,
    pub description: Patch<Option<String>>,
    pub website: Patch<Option<String>>,
    pub email: Patch<Option<String>>,
    pub building_id: Patch<i64>,
    pub category_ids: Patch<Vec<i64>>,
    pub is_active: Patch<bool>,
}

impl CompanyPatch {
    pub fn validate(&self) -> CatalogResult<()> {
        if let Some(name) = self.name.as_set() {
            validate::text("name", name, validate::NAME_MAX_LEN)?;
        }
        if let Some(list) = self.phones.as_set() {
            phones::validate(list)?;
        }
        if let Some(website) = self.website.as_set() {
            validate::optional_text("website", website.as_deref(), validate::CONTACT_MAX_LEN)?;
        }
        if let Some(email) = self.email.as_set() {
            validate::email(email.as_deref())?;
        }
        if let Some(building_id) = self.building_id.as_set() {
            validate::id("building_id", *building_id)?;
        }
        if let Some(ids) = self.category_ids.as_set() {
            validate_category_ids(ids)?;
        }
        Ok(())
    }

    /// Applies the scalar fields onto `record`; relations are handled by the caller
    pub fn apply_fields(&self, record: &mut CompanyRecord) {
        self.name.clone().apply_to(&mut record.name);
        self.phones.clone().apply_to(&mut record.phones);
        self.description.clone().apply_to(&mut record.description);
        self.website.clone().apply_to(&mut record.website);
        self.email.clone().apply_to(&mut record.email);
        self.building_id.clone().apply_to(&mut record.building_id);
        self.is_active.clone().apply_to(&mut record.is_active);
    }
}

/// Full company view with its building and categories embedded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub phones: Vec<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub building: Building,
    pub categories: Vec<Category>,
}

impl Company {
    pub fn from_parts(record: CompanyRecord, building: Building, categories: Vec<Category>) -> Self {
        Self {
            id: record.id,
            name: record.name,
            phones: record.phones,
            description: record.description,
            website: record.website,
            email: record.email,
            is_active: record.is_active,
            created_at: record.created_at,
            updated_at: record.updated_at,
            building,
            categories,
        }
    }

    pub fn summary(self) -> CompanySummary {
        CompanySummary {
            id: self.id,
            name: self.name,
            phones: self.phones,
            is_active: self.is_active,
            building: self.building,
            categories: self.categories,
        }
    }
}

/// Listing form of a company
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanySummary {
    pub id: i64,
    pub name: String,
    pub phones: Vec<String>,
    pub is_active: bool,
    pub building: Building,
    pub categories: Vec<Category>,
}
