use std::sync::Arc;

use tracing::info;

use crate::auth::{ensure_owner, Mutation, Requester};
use crate::db::{DriverStore, StoreError};
use crate::error::ApiError;
use crate::filter::DRIVER_FILTERS;
use crate::models::{Driver, DriverPayload, NewDriver};
use crate::pagination::{Page, PageRequest};
use crate::schema::{Action, Resource};

/// Driver CRUD scoped to the requester's openid
#[derive(Clone)]
pub struct DriverService {
    store: Arc<dyn DriverStore>,
}

impl DriverService {
    pub fn new(store: Arc<dyn DriverStore>) -> Self {
        Self { store }
    }

    pub async fn list(
        &self,
        requester: &Requester,
        params: &[(String, String)],
        path: &str,
    ) -> Result<Page<Driver>, ApiError> {
        Resource::Driver.schema(Action::List)?;
        let criteria = DRIVER_FILTERS.parse(params)?;
        let request = PageRequest::from_params(params)?;

        // 認証情報なしは空リスト
        let Some(query) = requester.scope(criteria) else {
            return Ok(Page::empty());
        };

        let count = self.store.count(&query).await?;
        let request = request.resolve(count)?;
        let results = self
            .store
            .fetch(&query, request.offset(), request.size)
            .await?;

        Ok(Page::new(request, count, results, path, params))
    }

    pub async fn retrieve(&self, requester: &Requester, id: i64) -> Result<Driver, ApiError> {
        Resource::Driver.schema(Action::Retrieve)?;
        let query = requester.scope_id(id).ok_or(ApiError::NotFound)?;

        self.store
            .fetch(&query, 0, 1)
            .await?
            .into_iter()
            .next()
            .ok_or(ApiError::NotFound)
    }

    pub async fn create(
        &self,
        requester: &Requester,
        payload: DriverPayload,
    ) -> Result<Driver, ApiError> {
        let schema = Resource::Driver.schema(Action::Create)?;
        let openid = requester.require()?;

        // 同名ドライバーの重複チェック
        if let Some(name) = payload.driver_name.as_deref().map(str::trim) {
            if self.store.name_taken(openid, name, None).await? {
                return Err(ApiError::Conflict);
            }
        }

        let fields = schema.validate(payload)?;
        let driver = self
            .store
            .insert(NewDriver {
                openid: openid.to_string(),
                driver_name: fields.driver_name.unwrap_or_default(),
                license_plate: fields.license_plate.unwrap_or_default(),
                contact: fields.contact.unwrap_or_default(),
                creater: fields.creater.unwrap_or_default(),
            })
            .await
            .map_err(|e| match e {
                StoreError::NameTaken => ApiError::Conflict,
                e => e.into(),
            })?;

        info!("Driver {} created by {}", driver.id, openid);
        Ok(driver)
    }

    pub async fn update(
        &self,
        requester: &Requester,
        id: i64,
        payload: DriverPayload,
    ) -> Result<Driver, ApiError> {
        self.write(requester, id, Action::Update, payload).await
    }

    pub async fn partial_update(
        &self,
        requester: &Requester,
        id: i64,
        payload: DriverPayload,
    ) -> Result<Driver, ApiError> {
        self.write(requester, id, Action::PartialUpdate, payload)
            .await
    }

    /// Soft delete: the row stays, flagged `is_delete`
    pub async fn destroy(&self, requester: &Requester, id: i64) -> Result<Driver, ApiError> {
        Resource::Driver.schema(Action::Destroy)?;
        let mut driver = self.owned(requester, id, Mutation::Destroy).await?;

        driver.is_delete = true;
        let driver = self.store.save(&driver).await?;

        info!("Driver {} soft-deleted", driver.id);
        Ok(driver)
    }

    async fn write(
        &self,
        requester: &Requester,
        id: i64,
        action: Action,
        payload: DriverPayload,
    ) -> Result<Driver, ApiError> {
        let schema = Resource::Driver.schema(action)?;
        let mutation = if action == Action::Update {
            Mutation::Update
        } else {
            Mutation::PartialUpdate
        };
        let mut driver = self.owned(requester, id, mutation).await?;
        let fields = schema.validate(payload)?;

        if let Some(name) = &fields.driver_name {
            if self.store.name_taken(&driver.openid, name, Some(id)).await? {
                return Err(ApiError::field("driver_name", "Data Exists"));
            }
        }

        fields.apply(&mut driver);
        let driver = self.store.save(&driver).await.map_err(|e| match e {
            StoreError::NameTaken => ApiError::field("driver_name", "Data Exists"),
            e => e.into(),
        })?;

        info!("Driver {} updated ({:?})", driver.id, action);
        Ok(driver)
    }

    /// Live record by id, unscoped, then checked against the requester
    async fn owned(
        &self,
        requester: &Requester,
        id: i64,
        mutation: Mutation,
    ) -> Result<Driver, ApiError> {
        requester.require()?;

        let driver = self
            .store
            .find(id)
            .await?
            .filter(|d| !d.is_delete)
            .ok_or(ApiError::NotFound)?;

        ensure_owner(requester, &driver.openid, mutation)?;
        Ok(driver)
    }
}
