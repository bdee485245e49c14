//! Entities, request payloads and their validation rules.

pub mod building;
pub mod category;
pub mod company;
pub mod patch;
pub mod phones;
pub mod validate;

pub use building::{Building, BuildingPatch, NewBuilding};
pub use category::{Category, CategoryPatch, NewCategory};
pub use company::{Company, CompanyPatch, CompanyRecord, CompanySummary, NewCompany};
pub use patch::Patch;
