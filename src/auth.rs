// Requester identity and ownership checks
//
// The hosting gateway authenticates the caller and forwards its openid in the
// `token` header. Reads are scoped by injecting that openid into the store
// query; writes re-check the fetched record's owner before mutating.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;
use crate::filter::Criteria;

pub const TOKEN_HEADER: &str = "token";

/// The caller's owner identity, if any
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requester {
    openid: Option<String>,
}

impl Requester {
    pub fn new(openid: impl Into<String>) -> Self {
        Self {
            openid: Some(openid.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { openid: None }
    }

    pub fn openid(&self) -> Option<&str> {
        self.openid.as_deref()
    }

    /// Owner-scoped query for a list. `None` means the caller can see nothing.
    pub fn scope(&self, criteria: Criteria) -> Option<ScopedQuery> {
        self.openid.as_ref().map(|owner| ScopedQuery {
            owner: owner.clone(),
            id: None,
            criteria,
        })
    }

    /// Owner-scoped query for a single id
    pub fn scope_id(&self, id: i64) -> Option<ScopedQuery> {
        self.scope(Criteria::default()).map(|mut q| {
            q.id = Some(id);
            q
        })
    }

    /// Identity required for writes
    pub fn require(&self) -> Result<&str, ApiError> {
        self.openid()
            .ok_or(ApiError::Forbidden("Authentication credentials were not provided"))
    }
}

impl<S> FromRequestParts<S> for Requester
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let openid = parts
            .headers
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        Ok(openid.map_or_else(Requester::anonymous, Requester::new))
    }
}

/// A store query that always carries an owner predicate
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedQuery {
    pub owner: String,
    pub id: Option<i64>,
    pub criteria: Criteria,
}

/// Mutating operations, each with its own rejection text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Update,
    PartialUpdate,
    Destroy,
}

impl Mutation {
    fn denied(self) -> &'static str {
        match self {
            Mutation::Update => "Cannot Update Data Which Not Yours",
            Mutation::PartialUpdate => "Cannot Partial Update Data Which Not Yours",
            Mutation::Destroy => "Cannot Delete Data Which Not Yours",
        }
    }
}

/// Reject the mutation unless `requester` owns the record
pub fn ensure_owner(requester: &Requester, owner: &str, mutation: Mutation) -> Result<(), ApiError> {
    match requester.openid() {
        Some(openid) if openid == owner => Ok(()),
        Some(openid) => {
            tracing::warn!(
                "Ownership check failed for {:?}: requester={} owner={}",
                mutation,
                openid,
                owner
            );
            Err(ApiError::Forbidden(mutation.denied()))
        }
        None => Err(ApiError::Forbidden(mutation.denied())),
    }
}
