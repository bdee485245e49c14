//! Table definitions and idempotent schema bootstrap.
//!
//! ```text
//! buildings            id, address, latitude, longitude, created_at, updated_at
//! categories           id, name, parent_id -> categories (cascade), level, path, timestamps
//! companies            id, name, phones, description, website, email,
//!                      building_id -> buildings (no cascade), is_active 0/1, timestamps
//! company_categories   (company_id, category_id), both cascading
//! ```

use crate::executor::{DbError, Executor};
use sea_query::{
    ColumnDef, Expr, ForeignKey, ForeignKeyAction, Index, IndexCreateStatement, PostgresQueryBuilder,
    Table, TableCreateStatement,
};

pub const BUILDINGS: &str = "buildings";
pub const CATEGORIES: &str = "categories";
pub const COMPANIES: &str = "companies";
pub const COMPANY_CATEGORIES: &str = "company_categories";

/// Column names shared by the statement builders
pub mod col {
    pub const ID: &str = "id";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";

    pub const ADDRESS: &str = "address";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";

    pub const NAME: &str = "name";
    pub const PARENT_ID: &str = "parent_id";
    pub const LEVEL: &str = "level";
    pub const PATH: &str = "path";

    pub const PHONES: &str = "phones";
    pub const DESCRIPTION: &str = "description";
    pub const WEBSITE: &str = "website";
    pub const EMAIL: &str = "email";
    pub const BUILDING_ID: &str = "building_id";
    pub const IS_ACTIVE: &str = "is_active";

    pub const COMPANY_ID: &str = "company_id";
    pub const CATEGORY_ID: &str = "category_id";
}

fn id_column() -> ColumnDef {
    ColumnDef::new(col::ID)
        .big_integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn timestamp_column(name: &'static str) -> ColumnDef {
    ColumnDef::new(name)
        .timestamp()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

pub fn create_buildings_table() -> TableCreateStatement {
    Table::create()
        .table(BUILDINGS)
        .if_not_exists()
        .col(id_column())
        .col(ColumnDef::new(col::ADDRESS).string_len(500).not_null())
        .col(ColumnDef::new(col::LATITUDE).double().not_null())
        .col(ColumnDef::new(col::LONGITUDE).double().not_null())
        .col(timestamp_column(col::CREATED_AT))
        .col(timestamp_column(col::UPDATED_AT))
        .to_owned()
}

pub fn create_categories_table() -> TableCreateStatement {
    Table::create()
        .table(CATEGORIES)
        .if_not_exists()
        .col(id_column())
        .col(ColumnDef::new(col::NAME).string_len(255).not_null())
        .col(ColumnDef::new(col::PARENT_ID).big_integer().null())
        .col(ColumnDef::new(col::LEVEL).integer().not_null().default(0))
        .col(ColumnDef::new(col::PATH).text().not_null().default(""))
        .col(timestamp_column(col::CREATED_AT))
        .col(timestamp_column(col::UPDATED_AT))
        .foreign_key(
            ForeignKey::create()
                .name("fk_categories_parent")
                .from(CATEGORIES, col::PARENT_ID)
                .to(CATEGORIES, col::ID)
                .on_delete(ForeignKeyAction::Cascade),
        )
        .to_owned()
}

pub fn create_companies_table() -> TableCreateStatement {
    Table::create()
        .table(COMPANIES)
        .if_not_exists()
        .col(id_column())
        .col(ColumnDef::new(col::NAME).string_len(255).not_null())
        .col(ColumnDef::new(col::PHONES).text().not_null())
        .col(ColumnDef::new(col::DESCRIPTION).text().null())
        .col(ColumnDef::new(col::WEBSITE).string_len(255).null())
        .col(ColumnDef::new(col::EMAIL).string_len(255).null())
        .col(ColumnDef::new(col::BUILDING_ID).big_integer().not_null())
        .col(ColumnDef::new(col::IS_ACTIVE).integer().not_null().default(1))
        .col(timestamp_column(col::CREATED_AT))
        .col(timestamp_column(col::UPDATED_AT))
        .foreign_key(
            ForeignKey::create()
                .name("fk_companies_building")
                .from(COMPANIES, col::BUILDING_ID)
                .to(BUILDINGS, col::ID),
        )
        .to_owned()
}

pub fn create_company_categories_table() -> TableCreateStatement {
    Table::create()
        .table(COMPANY_CATEGORIES)
        .if_not_exists()
        .col(ColumnDef::new(col::COMPANY_ID).big_integer().not_null())
        .col(ColumnDef::new(col::CATEGORY_ID).big_integer().not_null())
        .primary_key(Index::create().col(col::COMPANY_ID).col(col::CATEGORY_ID))
        .foreign_key(
            ForeignKey::create()
                .name("fk_company_categories_company")
                .from(COMPANY_CATEGORIES, col::COMPANY_ID)
                .to(COMPANIES, col::ID)
                .on_delete(ForeignKeyAction::Cascade),
        )
        .foreign_key(
            ForeignKey::create()
                .name("fk_company_categories_category")
                .from(COMPANY_CATEGORIES, col::CATEGORY_ID)
                .to(CATEGORIES, col::ID)
                .on_delete(ForeignKeyAction::Cascade),
        )
        .to_owned()
}

fn index(name: &'static str, table: &'static str, column: &'static str) -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name(name)
        .table(table)
        .col(column)
        .to_owned()
}

pub fn create_indexes() -> Vec<IndexCreateStatement> {
    vec![
        index("idx_buildings_address", BUILDINGS, col::ADDRESS),
        index("idx_categories_name", CATEGORIES, col::NAME),
        index("idx_categories_path", CATEGORIES, col::PATH),
        index("idx_categories_parent_id", CATEGORIES, col::PARENT_ID),
        index("idx_companies_name", COMPANIES, col::NAME),
        index("idx_companies_building_id", COMPANIES, col::BUILDING_ID),
    ]
}

/// Every DDL statement in dependency order
pub fn statements() -> Vec<String> {
    let tables = [
        create_buildings_table(),
        create_categories_table(),
        create_companies_table(),
        create_company_categories_table(),
    ];
    tables
        .iter()
        .map(|t| t.to_string(PostgresQueryBuilder))
        .chain(create_indexes().iter().map(|i| i.to_string(PostgresQueryBuilder)))
        .collect()
}

/// Creates any missing table or index. Safe to run on every startup.
pub fn initialize_schema(executor: &dyn Executor) -> Result<(), DbError> {
    for sql in statements() {
        executor.execute(&sql, &[])?;
    }
    log::info!("schema ready");
    Ok(())
}
