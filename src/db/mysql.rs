use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::mysql::{MySql, MySqlPool, MySqlPoolOptions};
use sqlx::QueryBuilder;

use super::{now, DispatchListStore, DriverStore, RecordSink, StoreError};
use crate::auth::ScopedQuery;
use crate::filter::{Lookup, Predicate, Value};
use crate::models::{DispatchList, Driver, NewDriver};

const DRIVER_COLUMNS: &str =
    "id, driver_name, license_plate, contact, creater, openid, is_delete, create_time, update_time";
const DISPATCH_LIST_COLUMNS: &str =
    "id, driver_name, dn_code, contact, creater, openid, create_time, update_time";

/// MySQL-backed store over the `driver` and `dispatchlist` tables
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = MySqlPoolOptions::new()
            .max_connections(25)
            .min_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(300))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

/// `SELECT <columns> FROM <table> WHERE openid = ? [AND is_delete = FALSE] ...`
fn scoped_select<'a>(
    select: &str,
    table: &str,
    query: &ScopedQuery,
    live_only: bool,
) -> QueryBuilder<'a, MySql> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM {} WHERE openid = ", select, table));
    qb.push_bind(query.owner.clone());
    if live_only {
        qb.push(" AND is_delete = FALSE");
    }
    if let Some(id) = query.id {
        qb.push(" AND id = ").push_bind(id);
    }
    for predicate in &query.criteria.predicates {
        push_predicate(&mut qb, predicate);
    }
    qb
}

fn push_predicate(qb: &mut QueryBuilder<'_, MySql>, predicate: &Predicate) {
    qb.push(" AND ").push(predicate.field);

    match (predicate.lookup, &predicate.value) {
        (Lookup::IExact, Value::Text(s)) => {
            qb.push(" LIKE ").push_bind(escape_like(s));
        }
        (Lookup::Contains, Value::Text(s)) => {
            qb.push(" LIKE BINARY ")
                .push_bind(format!("%{}%", escape_like(s)));
        }
        (Lookup::IContains, Value::Text(s)) => {
            qb.push(" LIKE ").push_bind(format!("%{}%", escape_like(s)));
        }
        (lookup, value) => {
            let op = match lookup {
                Lookup::Gt => " > ",
                Lookup::Gte => " >= ",
                Lookup::Lt => " < ",
                Lookup::Lte => " <= ",
                _ => " = ",
            };
            qb.push(op);
            match value {
                Value::Int(i) => qb.push_bind(*i),
                Value::Text(s) => qb.push_bind(s.clone()),
                Value::DateTime(dt) => qb.push_bind(*dt),
            };
        }
    }
}

fn push_order_by(qb: &mut QueryBuilder<'_, MySql>, query: &ScopedQuery) {
    let mut terms: Vec<String> = query
        .criteria
        .ordering
        .iter()
        .map(|key| format!("{} {}", key.field, if key.descending { "DESC" } else { "ASC" }))
        .collect();
    if !query.criteria.ordering.iter().any(|key| key.field == "id") {
        terms.push("id ASC".to_string());
    }
    qb.push(" ORDER BY ").push(terms.join(", "));
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl DriverStore for MySqlStore {
    async fn find(&self, id: i64) -> Result<Option<Driver>, StoreError> {
        let sql = format!("SELECT {} FROM driver WHERE id = ? LIMIT 1", DRIVER_COLUMNS);
        let driver = sqlx::query_as::<_, Driver>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(driver)
    }

    async fn name_taken(
        &self,
        owner: &str,
        driver_name: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM driver
             WHERE openid = ? AND driver_name = ? AND is_delete = FALSE AND id <> ?
             LIMIT 1",
        )
        .bind(owner)
        .bind(driver_name)
        .bind(exclude_id.unwrap_or(0))
        .fetch_optional(self.pool())
        .await?;

        Ok(row.is_some())
    }

    async fn insert(&self, new: NewDriver) -> Result<Driver, StoreError> {
        let timestamp = now();
        let result = sqlx::query(
            "INSERT INTO driver
             (driver_name, license_plate, contact, creater, openid, is_delete, create_time, update_time)
             VALUES (?, ?, ?, ?, ?, FALSE, ?, ?)",
        )
        .bind(&new.driver_name)
        .bind(&new.license_plate)
        .bind(&new.contact)
        .bind(&new.creater)
        .bind(&new.openid)
        .bind(timestamp)
        .bind(timestamp)
        .execute(self.pool())
        .await?;

        let id = result.last_insert_id() as i64;
        self.find(id).await?.ok_or(StoreError::Missing(id))
    }

    async fn save(&self, driver: &Driver) -> Result<Driver, StoreError> {
        sqlx::query(
            "UPDATE driver
             SET driver_name = ?, license_plate = ?, contact = ?, creater = ?,
                 is_delete = ?, update_time = ?
             WHERE id = ?",
        )
        .bind(&driver.driver_name)
        .bind(&driver.license_plate)
        .bind(&driver.contact)
        .bind(&driver.creater)
        .bind(driver.is_delete)
        .bind(now())
        .bind(driver.id)
        .execute(self.pool())
        .await?;

        self.find(driver.id)
            .await?
            .ok_or(StoreError::Missing(driver.id))
    }

    async fn count(&self, query: &ScopedQuery) -> Result<i64, StoreError> {
        let mut qb = scoped_select("COUNT(*)", "driver", query, true);
        let count = qb.build_query_scalar::<i64>().fetch_one(self.pool()).await?;
        Ok(count)
    }

    async fn fetch(
        &self,
        query: &ScopedQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Driver>, StoreError> {
        let mut qb = scoped_select(DRIVER_COLUMNS, "driver", query, true);
        push_order_by(&mut qb, query);
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);

        let drivers = qb.build_query_as::<Driver>().fetch_all(self.pool()).await?;
        Ok(drivers)
    }

    async fn scan(&self, query: &ScopedQuery, sink: &RecordSink<Driver>) -> Result<(), StoreError> {
        let mut qb = scoped_select(DRIVER_COLUMNS, "driver", query, true);
        push_order_by(&mut qb, query);

        let mut rows = qb.build_query_as::<Driver>().fetch(self.pool());
        while let Some(driver) = rows.try_next().await? {
            if sink.send(Ok(driver)).await.is_err() {
                // 受信側が切断済み
                tracing::debug!("Export consumer dropped, stopping scan");
                break;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DispatchListStore for MySqlStore {
    async fn count(&self, query: &ScopedQuery) -> Result<i64, StoreError> {
        let mut qb = scoped_select("COUNT(*)", "dispatchlist", query, false);
        let count = qb.build_query_scalar::<i64>().fetch_one(self.pool()).await?;
        Ok(count)
    }

    async fn fetch(
        &self,
        query: &ScopedQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<DispatchList>, StoreError> {
        let mut qb = scoped_select(DISPATCH_LIST_COLUMNS, "dispatchlist", query, false);
        push_order_by(&mut qb, query);
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);

        let items = qb
            .build_query_as::<DispatchList>()
            .fetch_all(self.pool())
            .await?;
        Ok(items)
    }
}
