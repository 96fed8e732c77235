use std::sync::Arc;

use crate::auth::Requester;
use crate::db::DispatchListStore;
use crate::error::ApiError;
use crate::filter::DISPATCH_LIST_FILTERS;
use crate::models::DispatchList;
use crate::pagination::{Page, PageRequest};
use crate::schema::{Action, Resource, Schema};

/// Read-only access to the requester's dispatch lists
#[derive(Clone)]
pub struct DispatchListService {
    store: Arc<dyn DispatchListStore>,
}

impl DispatchListService {
    pub fn new(store: Arc<dyn DispatchListStore>) -> Self {
        Self { store }
    }

    /// Only list and retrieve are exposed; everything else is MethodNotAllowed
    pub fn resolve(&self, action: Action) -> Result<Schema, ApiError> {
        Resource::DispatchList.schema(action)
    }

    pub async fn list(
        &self,
        requester: &Requester,
        params: &[(String, String)],
        path: &str,
    ) -> Result<Page<DispatchList>, ApiError> {
        self.resolve(Action::List)?;
        let criteria = DISPATCH_LIST_FILTERS.parse(params)?;
        let request = PageRequest::from_params(params)?;

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

    pub async fn retrieve(&self, requester: &Requester, id: i64) -> Result<DispatchList, ApiError> {
        self.resolve(Action::Retrieve)?;
        let query = requester.scope_id(id).ok_or(ApiError::NotFound)?;

        self.store
            .fetch(&query, 0, 1)
            .await?
            .into_iter()
            .next()
            .ok_or(ApiError::NotFound)
    }
}
