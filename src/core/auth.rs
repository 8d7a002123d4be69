//! Caller identity and authorization policies
//!
//! Identity is asserted by an upstream gateway through two headers:
//! - `X-User-Id`: the caller's UUID
//! - `X-User-Role`: `tenant`, `landlord` or `admin`
//!
//! A request without both headers is [`AuthContext::Anonymous`]; a request
//! with malformed headers is rejected with 401.

use crate::core::error::{LedgerError, LedgerResult, RequestError};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Tenant,
    Landlord,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Tenant => "tenant",
            Role::Landlord => "landlord",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tenant" => Ok(Role::Tenant),
            "landlord" => Ok(Role::Landlord),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Authorization context extracted from a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthContext {
    Tenant { user_id: Uuid },
    Landlord { user_id: Uuid },
    Admin { admin_id: Uuid },
    /// No identity headers
    Anonymous,
}

impl AuthContext {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        match role {
            Role::Tenant => AuthContext::Tenant { user_id },
            Role::Landlord => AuthContext::Landlord { user_id },
            Role::Admin => AuthContext::Admin { admin_id: user_id },
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            AuthContext::Tenant { .. } => Some(Role::Tenant),
            AuthContext::Landlord { .. } => Some(Role::Landlord),
            AuthContext::Admin { .. } => Some(Role::Admin),
            AuthContext::Anonymous => None,
        }
    }

    /// Caller id, including admins
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            AuthContext::Tenant { user_id } | AuthContext::Landlord { user_id } => Some(*user_id),
            AuthContext::Admin { admin_id } => Some(*admin_id),
            AuthContext::Anonymous => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, AuthContext::Admin { .. })
    }

    /// Fail with 401 for anonymous callers and 403 when `policy` rejects
    pub fn require(&self, policy: &AuthPolicy) -> LedgerResult<()> {
        if policy.check(self) {
            return Ok(());
        }
        match self {
            AuthContext::Anonymous => Err(RequestError::Unauthorized {
                message: "missing X-User-Id / X-User-Role headers".to_string(),
            }
            .into()),
            other => Err(RequestError::Forbidden {
                message: format!(
                    "{} '{}' may not perform this operation",
                    other.role().map(|r| r.as_str()).unwrap_or("caller"),
                    other.user_id().unwrap_or_default()
                ),
            }
            .into()),
        }
    }
}

/// Authorization policy for an operation
#[derive(Debug, Clone)]
pub enum AuthPolicy {
    /// Public access (no auth required)
    Public,

    /// Any identified caller
    Authenticated,

    /// Admin only
    AdminOnly,

    /// Caller must have one of these roles
    HasRole(Vec<Role>),

    /// Caller must be one of these users
    Owner(Vec<Uuid>),

    /// Combination of policies (AND)
    And(Vec<AuthPolicy>),

    /// Combination of policies (OR)
    Or(Vec<AuthPolicy>),
}

impl AuthPolicy {
    /// Check if auth context satisfies this policy
    pub fn check(&self, context: &AuthContext) -> bool {
        match self {
            AuthPolicy::Public => true,

            AuthPolicy::Authenticated => !matches!(context, AuthContext::Anonymous),

            AuthPolicy::AdminOnly => context.is_admin(),

            AuthPolicy::HasRole(roles) => context.role().is_some_and(|r| roles.contains(&r)),

            AuthPolicy::Owner(ids) => context.user_id().is_some_and(|id| ids.contains(&id)),

            AuthPolicy::And(policies) => policies.iter().all(|p| p.check(context)),

            AuthPolicy::Or(policies) => policies.iter().any(|p| p.check(context)),
        }
    }

    /// Owner of the resource, or an admin
    pub fn owner_or_admin(ids: impl IntoIterator<Item = Uuid>) -> Self {
        AuthPolicy::Or(vec![
            AuthPolicy::Owner(ids.into_iter().collect()),
            AuthPolicy::AdminOnly,
        ])
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> LedgerResult<Option<&'a str>> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => value.to_str().map(Some).map_err(|_| {
            RequestError::Unauthorized {
                message: format!("header {} is not valid text", name),
            }
            .into()
        }),
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = LedgerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_str(parts, USER_ID_HEADER)?;
        let role = header_str(parts, USER_ROLE_HEADER)?;

        let (user_id, role) = match (user_id, role) {
            (None, None) => return Ok(AuthContext::Anonymous),
            (Some(user_id), Some(role)) => (user_id, role),
            _ => {
                return Err(RequestError::Unauthorized {
                    message: "X-User-Id and X-User-Role must be sent together".to_string(),
                }
                .into());
            }
        };

        let user_id = Uuid::parse_str(user_id.trim()).map_err(|_| RequestError::Unauthorized {
            message: format!("invalid user id '{}'", user_id),
        })?;
        let role: Role = role
            .parse()
            .map_err(|message| RequestError::Unauthorized { message })?;

        Ok(AuthContext::new(user_id, role))
    }
}
