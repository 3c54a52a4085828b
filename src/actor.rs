//! Actor descriptors
//!
//! A pull is scoped to the actor resolved by the authentication layer. The
//! sync engine only branches on the actor kind and compares actors by value;
//! everything else about identity is owned by the resolver.

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Resolved identity a pull runs as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "properties", rename_all = "kebab-case")]
pub enum Actor {
    /// A user acting inside one tenant (workspace)
    TenantMember(TenantMember),
    /// An authenticated account not yet scoped to a tenant
    AccountHolder(AccountHolder),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMember {
    #[serde(rename = "tenantID")]
    pub tenant_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountHolder {
    #[serde(rename = "accountID")]
    pub account_id: String,
    pub email: String,
}

/// Finite set of actor kinds, used to pick table visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorKind {
    TenantMember,
    AccountHolder,
}

impl Actor {
    pub fn kind(&self) -> ActorKind {
        match self {
            Actor::TenantMember(_) => ActorKind::TenantMember,
            Actor::AccountHolder(_) => ActorKind::AccountHolder,
        }
    }

    /// Tenant the actor is scoped to, if any
    pub fn tenant_id(&self) -> Option<&str> {
        match self {
            Actor::TenantMember(member) => Some(&member.tenant_id),
            Actor::AccountHolder(_) => None,
        }
    }
}

/// Resolves the actor for an incoming request
#[async_trait]
pub trait ActorResolver: Send + Sync {
    /// Returns `None` when the request carries no usable identity
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<Actor>>;
}

/// Trusts an actor descriptor injected by the authentication gateway
/// in front of this service.
pub struct HeaderActorResolver {
    header: HeaderName,
}

impl HeaderActorResolver {
    pub fn new(header: &str) -> Result<Self> {
        let header = HeaderName::try_from(header)
            .map_err(|e| AppError::Internal(format!("Invalid actor header {}: {}", header, e)))?;
        Ok(Self { header })
    }
}

#[async_trait]
impl ActorResolver for HeaderActorResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<Actor>> {
        let Some(value) = headers.get(&self.header) else {
            return Ok(None);
        };

        let raw = value
            .to_str()
            .map_err(|_| AppError::BadRequest("Actor header is not valid UTF-8".to_string()))?;
        let actor = serde_json::from_str(raw)
            .map_err(|e| AppError::BadRequest(format!("Malformed actor descriptor: {}", e)))?;

        Ok(Some(actor))
    }
}
