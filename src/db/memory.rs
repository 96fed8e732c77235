// In-process store used by `STORE_BACKEND=memory` and the test-suite

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::{now, DispatchListStore, DriverStore, RecordSink, StoreError};
use crate::auth::ScopedQuery;
use crate::filter::Filterable;
use crate::models::{DispatchList, Driver, NewDriver};

#[derive(Default)]
pub struct MemoryStore {
    drivers: DashMap<i64, Driver>,
    dispatch_lists: DashMap<i64, DispatchList>,
    next_id: AtomicI64,
    // 名前チェックと書き込みを一括で行うためのロック
    writes: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn name_in_use(&self, owner: &str, driver_name: &str, exclude_id: Option<i64>) -> bool {
        self.drivers.iter().any(|entry| {
            let d = entry.value();
            d.openid == owner
                && d.driver_name == driver_name
                && !d.is_delete
                && Some(d.id) != exclude_id
        })
    }

    /// Backdate a driver row
    #[cfg(test)]
    pub fn set_create_time(&self, id: i64, at: chrono::NaiveDateTime) {
        if let Some(mut driver) = self.drivers.get_mut(&id) {
            driver.create_time = at;
        }
    }

    /// Add a dispatch list row the way the dispatch workflow would
    #[cfg(test)]
    pub fn insert_dispatch_list(
        &self,
        openid: &str,
        driver_name: &str,
        dn_code: &str,
    ) -> DispatchList {
        let timestamp = now();
        let item = DispatchList {
            id: self.allocate_id(),
            driver_name: driver_name.to_string(),
            dn_code: dn_code.to_string(),
            contact: String::new(),
            creater: "system".to_string(),
            openid: openid.to_string(),
            create_time: timestamp,
            update_time: timestamp,
        };
        self.dispatch_lists.insert(item.id, item.clone());
        item
    }
}

/// Matching rows of `map` in query order
fn select<T, F>(map: &DashMap<i64, T>, query: &ScopedQuery, visible: F) -> Vec<T>
where
    T: Filterable + Clone,
    F: Fn(&T) -> bool,
{
    let mut rows: Vec<T> = map
        .iter()
        .map(|entry| entry.value().clone())
        .filter(|row| visible(row))
        .filter(|row| query.id.map_or(true, |id| row.id() == id))
        .filter(|row| query.criteria.matches(row))
        .collect();
    rows.sort_by(|a, b| query.criteria.compare(a, b));
    rows
}

fn page<T>(rows: Vec<T>, offset: i64, limit: i64) -> Vec<T> {
    rows.into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

impl MemoryStore {
    fn live_drivers(&self, query: &ScopedQuery) -> Vec<Driver> {
        select(&self.drivers, query, |d: &Driver| {
            d.openid == query.owner && !d.is_delete
        })
    }

    fn owned_dispatch_lists(&self, query: &ScopedQuery) -> Vec<DispatchList> {
        select(&self.dispatch_lists, query, |d: &DispatchList| {
            d.openid == query.owner
        })
    }
}

#[async_trait]
impl DriverStore for MemoryStore {
    async fn find(&self, id: i64) -> Result<Option<Driver>, StoreError> {
        Ok(self.drivers.get(&id).map(|d| d.value().clone()))
    }

    async fn name_taken(
        &self,
        owner: &str,
        driver_name: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        Ok(self.name_in_use(owner, driver_name, exclude_id))
    }

    async fn insert(&self, new: NewDriver) -> Result<Driver, StoreError> {
        let _guard = self.writes.lock().await;
        if self.name_in_use(&new.openid, &new.driver_name, None) {
            return Err(StoreError::NameTaken);
        }

        let timestamp = now();
        let driver = Driver {
            id: self.allocate_id(),
            driver_name: new.driver_name,
            license_plate: new.license_plate,
            contact: new.contact,
            creater: new.creater,
            openid: new.openid,
            is_delete: false,
            create_time: timestamp,
            update_time: timestamp,
        };
        self.drivers.insert(driver.id, driver.clone());
        Ok(driver)
    }

    async fn save(&self, driver: &Driver) -> Result<Driver, StoreError> {
        let _guard = self.writes.lock().await;
        // iter() must finish before get_mut() takes the shard lock
        if !driver.is_delete
            && self.name_in_use(&driver.openid, &driver.driver_name, Some(driver.id))
        {
            return Err(StoreError::NameTaken);
        }

        let mut stored = self
            .drivers
            .get_mut(&driver.id)
            .ok_or(StoreError::Missing(driver.id))?;

        stored.driver_name = driver.driver_name.clone();
        stored.license_plate = driver.license_plate.clone();
        stored.contact = driver.contact.clone();
        stored.creater = driver.creater.clone();
        stored.is_delete = driver.is_delete;
        stored.update_time = now();

        Ok(stored.value().clone())
    }

    async fn count(&self, query: &ScopedQuery) -> Result<i64, StoreError> {
        Ok(self.live_drivers(query).len() as i64)
    }

    async fn fetch(
        &self,
        query: &ScopedQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Driver>, StoreError> {
        Ok(page(self.live_drivers(query), offset, limit))
    }

    async fn scan(&self, query: &ScopedQuery, sink: &RecordSink<Driver>) -> Result<(), StoreError> {
        for driver in self.live_drivers(query) {
            if sink.send(Ok(driver)).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DispatchListStore for MemoryStore {
    async fn count(&self, query: &ScopedQuery) -> Result<i64, StoreError> {
        Ok(self.owned_dispatch_lists(query).len() as i64)
    }

    async fn fetch(
        &self,
        query: &ScopedQuery,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<DispatchList>, StoreError> {
        Ok(page(self.owned_dispatch_lists(query), offset, limit))
    }
}
