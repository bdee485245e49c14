//! Postgres-backed directory store.
//!
//! Each [`DirectoryStore::transaction`] checks one connection out of the pool,
//! opens a [`Transaction`] on it and hands the work closure a session whose
//! statements all run inside that transaction. The connection goes back to
//! the pool when the guard drops.

use super::{CompanyFilter, DirectoryStore, Page, StoreSession, StoreStats};
use crate::connection::check_connection_health;
use crate::error::{CatalogError, CatalogResult};
use crate::executor::{DbError, Executor, PgExecutor};
use crate::hierarchy;
use crate::model::company::{active_flag, is_active_flag};
use crate::model::{phones, Building, Category, CompanyRecord, NewBuilding, NewCompany};
use crate::pool::{DatabaseConfig, DbPool};
use crate::query::{execute_built, query_count, query_models, query_optional, query_rows, FromRow};
use crate::schema::{self, col, BUILDINGS, CATEGORIES, COMPANIES, COMPANY_CATEGORIES};
use crate::transaction::{IsolationLevel, Transaction};
use may_postgres::Row;
use sea_query::{
    Asterisk, Cond, Expr, ExprTrait, Func, Order, PostgresQueryBuilder, Query, SelectStatement,
    Values,
};
use std::collections::BTreeSet;

impl FromRow for Building {
    fn from_row(row: &Row) -> Result<Self, may_postgres::Error> {
        Ok(Building {
            id: row.try_get(col::ID)?,
            address: row.try_get(col::ADDRESS)?,
            latitude: row.try_get(col::LATITUDE)?,
            longitude: row.try_get(col::LONGITUDE)?,
            created_at: row.try_get(col::CREATED_AT)?,
            updated_at: row.try_get(col::UPDATED_AT)?,
        })
    }
}

impl FromRow for Category {
    fn from_row(row: &Row) -> Result<Self, may_postgres::Error> {
        Ok(Category {
            id: row.try_get(col::ID)?,
            name: row.try_get(col::NAME)?,
            parent_id: row.try_get(col::PARENT_ID)?,
            level: row.try_get(col::LEVEL)?,
            path: row.try_get(col::PATH)?,
            created_at: row.try_get(col::CREATED_AT)?,
            updated_at: row.try_get(col::UPDATED_AT)?,
        })
    }
}

impl FromRow for CompanyRecord {
    fn from_row(row: &Row) -> Result<Self, may_postgres::Error> {
        let stored_phones: String = row.try_get(col::PHONES)?;
        let flag: i32 = row.try_get(col::IS_ACTIVE)?;
        Ok(CompanyRecord {
            id: row.try_get(col::ID)?,
            name: row.try_get(col::NAME)?,
            phones: phones::decode(&stored_phones),
            description: row.try_get(col::DESCRIPTION)?,
            website: row.try_get(col::WEBSITE)?,
            email: row.try_get(col::EMAIL)?,
            building_id: row.try_get(col::BUILDING_ID)?,
            is_active: is_active_flag(flag),
            created_at: row.try_get(col::CREATED_AT)?,
            updated_at: row.try_get(col::UPDATED_AT)?,
        })
    }
}

/// Store over a fixed pool of `may_postgres` connections
pub struct PgStore {
    pool: DbPool,
    isolation: IsolationLevel,
}

impl PgStore {
    pub fn new(pool: DbPool, isolation: IsolationLevel) -> Self {
        Self { pool, isolation }
    }

    /// Opens the pool described by `config`
    pub fn connect(config: &DatabaseConfig) -> CatalogResult<Self> {
        config.validate()?;
        log::info!("store transactions run at {:?}", config.isolation_level);
        Ok(Self::new(DbPool::connect(config)?, config.isolation_level))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Creates any missing table or index
    pub fn initialize_schema(&self) -> CatalogResult<()> {
        let conn = self.pool.checkout()?;
        let executor = PgExecutor::new((*conn).clone());
        schema::initialize_schema(&executor)?;
        Ok(())
    }

    /// Raw `SELECT 1` outside any transaction. A connection that fails the
    /// probe is discarded from the pool.
    pub fn check_health(&self) -> CatalogResult<bool> {
        let mut conn = self.pool.checkout()?;
        match check_connection_health(&conn) {
            Ok(healthy) => Ok(healthy),
            Err(e) => {
                conn.mark_broken();
                Err(e.into())
            }
        }
    }
}

impl DirectoryStore for PgStore {
    fn transaction<R, F>(&self, work: F) -> CatalogResult<R>
    where
        F: FnOnce(&dyn StoreSession) -> CatalogResult<R>,
    {
        let mut conn = self.pool.checkout()?;
        // A connection that cannot even open a transaction is dead; let the
        // pool reconnect that slot.
        let tx = match Transaction::begin((*conn).clone(), self.isolation) {
            Ok(tx) => tx,
            Err(e) => {
                conn.mark_broken();
                return Err(e.into());
            }
        };
        let outcome = {
            let session = PgSession { tx: &tx };
            work(&session)
        };
        match outcome {
            Ok(result) => {
                tx.commit()?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    log::error!("rollback after failed request also failed: {rollback}");
                    conn.mark_broken();
                }
                Err(e)
            }
        }
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

struct PgSession<'a> {
    tx: &'a Transaction,
}

/// Escapes `LIKE` wildcards so `needle` matches literally
fn like_literal(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn paginate(select: &mut SelectStatement, page: Page) {
    if page.skip > 0 {
        select.offset(page.skip);
    }
    if page.limit < i64::MAX as u64 {
        select.limit(page.limit);
    }
}

fn company_select(filter: &CompanyFilter, page: Page) -> SelectStatement {
    let mut select = Query::select();
    select.column(Asterisk).from(COMPANIES);

    if filter.active_only {
        select.and_where(Expr::col(col::IS_ACTIVE).eq(active_flag(true)));
    }
    if let Some(building_id) = filter.building_id {
        select.and_where(Expr::col(col::BUILDING_ID).eq(building_id));
    }
    if let Some(category_ids) = &filter.category_ids {
        let linked = Query::select()
            .column(col::COMPANY_ID)
            .from(COMPANY_CATEGORIES)
            .and_where(Expr::col(col::CATEGORY_ID).is_in(category_ids.iter().copied()))
            .to_owned();
        select.and_where(Expr::col(col::ID).in_subquery(linked));
    }
    if let Some(needle) = &filter.name_contains {
        select.and_where(Expr::col(col::NAME).like(like_literal(needle)));
    }
    if let Some(bbox) = &filter.within {
        let inside = Query::select()
            .column(col::ID)
            .from(BUILDINGS)
            .and_where(Expr::col(col::LATITUDE).gte(bbox.min_lat))
            .and_where(Expr::col(col::LATITUDE).lte(bbox.max_lat))
            .and_where(Expr::col(col::LONGITUDE).gte(bbox.min_lng))
            .and_where(Expr::col(col::LONGITUDE).lte(bbox.max_lng))
            .to_owned();
        select.and_where(Expr::col(col::BUILDING_ID).in_subquery(inside));
    }

    select.order_by(col::ID, Order::Asc);
    paginate(&mut select, page);
    select
}

fn count_all(table: &'static str) -> (String, Values) {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(table)
        .build(PostgresQueryBuilder)
}

impl PgSession<'_> {
    fn executor(&self) -> &dyn Executor {
        self.tx
    }

    fn fetch_one<T: FromRow>(&self, sql: &str, values: &Values) -> CatalogResult<T> {
        query_optional::<T>(self.executor(), sql, values)?
            .ok_or_else(|| CatalogError::Internal("statement returned no row".to_string()))
    }
}

impl StoreSession for PgSession<'_> {
    fn ping(&self) -> CatalogResult<()> {
        let row = self.executor().query_one("SELECT 1", &[])?;
        let value: i32 = row
            .try_get(0)
            .map_err(|e| DbError::ParseError(format!("health probe: {e}")))?;
        if value != 1 {
            return Err(CatalogError::Internal(format!("health probe returned {value}")));
        }
        Ok(())
    }

    fn find_building(&self, id: i64) -> CatalogResult<Option<Building>> {
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(BUILDINGS)
            .and_where(Expr::col(col::ID).eq(id))
            .build(PostgresQueryBuilder);
        Ok(query_optional(self.executor(), &sql, &values)?)
    }

    fn find_buildings(&self, ids: &[i64]) -> CatalogResult<Vec<Building>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(BUILDINGS)
            .and_where(Expr::col(col::ID).is_in(ids.iter().copied()))
            .order_by(col::ID, Order::Asc)
            .build(PostgresQueryBuilder);
        Ok(query_models(self.executor(), &sql, &values)?)
    }

    fn list_buildings(&self, page: Page) -> CatalogResult<Vec<Building>> {
        let mut select = Query::select();
        select.column(Asterisk).from(BUILDINGS).order_by(col::ID, Order::Asc);
        paginate(&mut select, page);
        let (sql, values) = select.build(PostgresQueryBuilder);
        Ok(query_models(self.executor(), &sql, &values)?)
    }

    fn insert_building(&self, new: &NewBuilding) -> CatalogResult<Building> {
        let (sql, values) = Query::insert()
            .into_table(BUILDINGS)
            .columns([col::ADDRESS, col::LATITUDE, col::LONGITUDE])
            .values_panic([
                Expr::value(new.address.clone()),
                Expr::value(new.latitude),
                Expr::value(new.longitude),
            ])
            .returning_col(Asterisk)
            .build(PostgresQueryBuilder);
        self.fetch_one(&sql, &values)
    }

    fn update_building(&self, building: &Building) -> CatalogResult<Building> {
        let (sql, values) = Query::update()
            .table(BUILDINGS)
            .value(col::ADDRESS, building.address.clone())
            .value(col::LATITUDE, building.latitude)
            .value(col::LONGITUDE, building.longitude)
            .value(col::UPDATED_AT, Expr::current_timestamp())
            .and_where(Expr::col(col::ID).eq(building.id))
            .returning_col(Asterisk)
            .build(PostgresQueryBuilder);
        query_optional(self.executor(), &sql, &values)?
            .ok_or_else(|| CatalogError::not_found("Building not found"))
    }

    fn delete_building(&self, id: i64) -> CatalogResult<bool> {
        let (sql, values) = Query::delete()
            .from_table(BUILDINGS)
            .and_where(Expr::col(col::ID).eq(id))
            .build(PostgresQueryBuilder);
        Ok(execute_built(self.executor(), &sql, &values)? > 0)
    }

    fn count_companies_in_building(&self, building_id: i64) -> CatalogResult<i64> {
        let (sql, values) = Query::select()
            .expr(Func::count(Expr::col(Asterisk)))
            .from(COMPANIES)
            .and_where(Expr::col(col::BUILDING_ID).eq(building_id))
            .build(PostgresQueryBuilder);
        Ok(query_count(self.executor(), &sql, &values)?)
    }

    fn find_category(&self, id: i64) -> CatalogResult<Option<Category>> {
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(CATEGORIES)
            .and_where(Expr::col(col::ID).eq(id))
            .build(PostgresQueryBuilder);
        Ok(query_optional(self.executor(), &sql, &values)?)
    }

    fn find_categories(&self, ids: &[i64]) -> CatalogResult<Vec<Category>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(CATEGORIES)
            .and_where(Expr::col(col::ID).is_in(ids.iter().copied()))
            .order_by(col::ID, Order::Asc)
            .build(PostgresQueryBuilder);
        Ok(query_models(self.executor(), &sql, &values)?)
    }

    fn list_categories(&self) -> CatalogResult<Vec<Category>> {
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(CATEGORIES)
            .order_by(col::ID, Order::Asc)
            .build(PostgresQueryBuilder);
        Ok(query_models(self.executor(), &sql, &values)?)
    }

    fn find_child_categories(&self, parent_id: i64) -> CatalogResult<Vec<Category>> {
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(CATEGORIES)
            .and_where(Expr::col(col::PARENT_ID).eq(parent_id))
            .order_by(col::NAME, Order::Asc)
            .order_by(col::ID, Order::Asc)
            .build(PostgresQueryBuilder);
        Ok(query_models(self.executor(), &sql, &values)?)
    }

    fn find_categories_in_subtree(&self, root_path: &str) -> CatalogResult<Vec<Category>> {
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(CATEGORIES)
            .cond_where(
                Cond::any()
                    .add(Expr::col(col::PATH).eq(root_path))
                    .add(Expr::col(col::PATH).like(hierarchy::descendant_pattern(root_path))),
            )
            .order_by(col::ID, Order::Asc)
            .build(PostgresQueryBuilder);
        Ok(query_models(self.executor(), &sql, &values)?)
    }

    fn insert_category(&self, name: &str, parent_id: Option<i64>) -> CatalogResult<Category> {
        let (sql, values) = Query::insert()
            .into_table(CATEGORIES)
            .columns([col::NAME, col::PARENT_ID, col::LEVEL, col::PATH])
            .values_panic([
                Expr::value(name.to_string()),
                Expr::value(parent_id),
                Expr::value(0_i32),
                Expr::value(String::new()),
            ])
            .returning_col(Asterisk)
            .build(PostgresQueryBuilder);
        self.fetch_one(&sql, &values)
    }

    fn update_category_path(&self, id: i64, path: &str, level: i32) -> CatalogResult<Category> {
        let (sql, values) = Query::update()
            .table(CATEGORIES)
            .value(col::PATH, path.to_string())
            .value(col::LEVEL, level)
            .value(col::UPDATED_AT, Expr::current_timestamp())
            .and_where(Expr::col(col::ID).eq(id))
            .returning_col(Asterisk)
            .build(PostgresQueryBuilder);
        query_optional(self.executor(), &sql, &values)?
            .ok_or_else(|| CatalogError::not_found("Category not found"))
    }

    fn rename_category(&self, id: i64, name: &str) -> CatalogResult<Category> {
        let (sql, values) = Query::update()
            .table(CATEGORIES)
            .value(col::NAME, name.to_string())
            .value(col::UPDATED_AT, Expr::current_timestamp())
            .and_where(Expr::col(col::ID).eq(id))
            .returning_col(Asterisk)
            .build(PostgresQueryBuilder);
        query_optional(self.executor(), &sql, &values)?
            .ok_or_else(|| CatalogError::not_found("Category not found"))
    }

    fn delete_categories(&self, ids: &BTreeSet<i64>) -> CatalogResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let (sql, values) = Query::delete()
            .from_table(CATEGORIES)
            .and_where(Expr::col(col::ID).is_in(ids.iter().copied()))
            .build(PostgresQueryBuilder);
        Ok(execute_built(self.executor(), &sql, &values)?)
    }

    fn find_company(&self, id: i64) -> CatalogResult<Option<CompanyRecord>> {
        let (sql, values) = Query::select()
            .column(Asterisk)
            .from(COMPANIES)
            .and_where(Expr::col(col::ID).eq(id))
            .build(PostgresQueryBuilder);
        Ok(query_optional(self.executor(), &sql, &values)?)
    }

    fn find_companies(&self, filter: &CompanyFilter, page: Page) -> CatalogResult<Vec<CompanyRecord>> {
        let (sql, values) = company_select(filter, page).build(PostgresQueryBuilder);
        Ok(query_models(self.executor(), &sql, &values)?)
    }

    fn insert_company(&self, new: &NewCompany) -> CatalogResult<CompanyRecord> {
        let (sql, values) = Query::insert()
            .into_table(COMPANIES)
            .columns([
                col::NAME,
                col::PHONES,
                col::DESCRIPTION,
                col::WEBSITE,
                col::EMAIL,
                col::BUILDING_ID,
                col::IS_ACTIVE,
            ])
            .values_panic([
                Expr::value(new.name.clone()),
                Expr::value(phones::encode(&new.phones)),
                Expr::value(new.description.clone()),
                Expr::value(new.website.clone()),
                Expr::value(new.email.clone()),
                Expr::value(new.building_id),
                Expr::value(active_flag(new.is_active)),
            ])
            .returning_col(Asterisk)
            .build(PostgresQueryBuilder);
        self.fetch_one(&sql, &values)
    }

    fn update_company(&self, record: &CompanyRecord) -> CatalogResult<CompanyRecord> {
        let (sql, values) = Query::update()
            .table(COMPANIES)
            .value(col::NAME, record.name.clone())
            .value(col::PHONES, phones::encode(&record.phones))
            .value(col::DESCRIPTION, record.description.clone())
            .value(col::WEBSITE, record.website.clone())
            .value(col::EMAIL, record.email.clone())
            .value(col::BUILDING_ID, record.building_id)
            .value(col::IS_ACTIVE, active_flag(record.is_active))
            .value(col::UPDATED_AT, Expr::current_timestamp())
            .and_where(Expr::col(col::ID).eq(record.id))
            .returning_col(Asterisk)
            .build(PostgresQueryBuilder);
        query_optional(self.executor(), &sql, &values)?
            .ok_or_else(|| CatalogError::not_found("Company not found"))
    }

    fn delete_company(&self, id: i64) -> CatalogResult<bool> {
        let (sql, values) = Query::delete()
            .from_table(COMPANIES)
            .and_where(Expr::col(col::ID).eq(id))
            .build(PostgresQueryBuilder);
        Ok(execute_built(self.executor(), &sql, &values)? > 0)
    }

    fn company_category_links(&self, company_ids: &[i64]) -> CatalogResult<Vec<(i64, i64)>> {
        if company_ids.is_empty() {
            return Ok(Vec::new());
        }
        let (sql, values) = Query::select()
            .columns([col::COMPANY_ID, col::CATEGORY_ID])
            .from(COMPANY_CATEGORIES)
            .and_where(Expr::col(col::COMPANY_ID).is_in(company_ids.iter().copied()))
            .order_by(col::COMPANY_ID, Order::Asc)
            .order_by(col::CATEGORY_ID, Order::Asc)
            .build(PostgresQueryBuilder);
        query_rows(self.executor(), &sql, &values)?
            .iter()
            .map(|row| {
                let pair = (row.try_get::<_, i64>(0)?, row.try_get::<_, i64>(1)?);
                Ok(pair)
            })
            .collect::<Result<Vec<_>, may_postgres::Error>>()
            .map_err(|e| DbError::ParseError(format!("Failed to parse link: {e}")).into())
    }

    fn replace_company_categories(&self, company_id: i64, category_ids: &[i64]) -> CatalogResult<()> {
        let (sql, values) = Query::delete()
            .from_table(COMPANY_CATEGORIES)
            .and_where(Expr::col(col::COMPANY_ID).eq(company_id))
            .build(PostgresQueryBuilder);
        execute_built(self.executor(), &sql, &values)?;

        let distinct: BTreeSet<i64> = category_ids.iter().copied().collect();
        if distinct.is_empty() {
            return Ok(());
        }
        let mut insert = Query::insert();
        insert
            .into_table(COMPANY_CATEGORIES)
            .columns([col::COMPANY_ID, col::CATEGORY_ID]);
        for category_id in distinct {
            insert.values_panic([Expr::value(company_id), Expr::value(category_id)]);
        }
        let (sql, values) = insert.build(PostgresQueryBuilder);
        execute_built(self.executor(), &sql, &values)?;
        Ok(())
    }

    fn unlink_categories(&self, category_ids: &BTreeSet<i64>) -> CatalogResult<u64> {
        if category_ids.is_empty() {
            return Ok(0);
        }
        let (sql, values) = Query::delete()
            .from_table(COMPANY_CATEGORIES)
            .and_where(Expr::col(col::CATEGORY_ID).is_in(category_ids.iter().copied()))
            .build(PostgresQueryBuilder);
        Ok(execute_built(self.executor(), &sql, &values)?)
    }

    fn stats(&self) -> CatalogResult<StoreStats> {
        let count = |table: &'static str| -> CatalogResult<i64> {
            let (sql, values) = count_all(table);
            Ok(query_count(self.executor(), &sql, &values)?)
        };
        let (sql, values) = Query::select()
            .expr(Func::count(Expr::col(Asterisk)))
            .from(COMPANIES)
            .and_where(Expr::col(col::IS_ACTIVE).eq(active_flag(true)))
            .build(PostgresQueryBuilder);
        Ok(StoreStats {
            buildings: count(BUILDINGS)?,
            categories: count(CATEGORIES)?,
            companies: count(COMPANIES)?,
            active_companies: query_count(self.executor(), &sql, &values)?,
        })
    }

    fn clear_all(&self) -> CatalogResult<()> {
        for table in [COMPANY_CATEGORIES, COMPANIES, CATEGORIES, BUILDINGS] {
            let (sql, values) = Query::delete().from_table(table).build(PostgresQueryBuilder);
            execute_built(self.executor(), &sql, &values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::BoundingBox;

    #[test]
    fn test_like_literal_escapes_wildcards() {
        assert_eq!(like_literal("Рога"), "%Рога%");
        assert_eq!(like_literal("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_company_select_binds_every_predicate() {
        let filter = CompanyFilter::active_only(true)
            .in_building(3)
            .in_categories(BTreeSet::from([1, 2]))
            .name_contains("Авто")
            .within(BoundingBox::new(55.0, 56.0, 37.0, 38.0).unwrap());
        let (sql, values) = company_select(&filter, Page::new(10, 20)).build(PostgresQueryBuilder);

        assert!(sql.contains("\"company_categories\""));
        assert!(sql.contains("LIKE"));
        assert!(sql.contains("ORDER BY \"id\" ASC"));
        // is_active, building_id, 2 category ids, name, 4 bounds, limit, offset
        assert_eq!(values.0.len(), 11);
    }

    #[test]
    fn test_unpaginated_select_has_no_limit() {
        let (sql, _) = company_select(&CompanyFilter::default(), Page::ALL).build(PostgresQueryBuilder);
        assert!(!sql.contains("LIMIT"));
        assert!(!sql.contains("OFFSET"));
    }
}
