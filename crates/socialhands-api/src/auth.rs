//! Bearer-token authentication against the configured operators.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use tracing::debug;

use socialhands_config::ApiConfig;

use crate::error::ApiError;

/// Permission names understood by the routes.
pub mod permissions {
    /// Read jobs, schedules and status.
    pub const READ: &str = "read";
    /// Submit work and flip control switches. Implies `read`.
    pub const OPERATE: &str = "operate";
    /// Everything, including system reset.
    pub const ADMIN: &str = "admin";
}

/// The operator behind a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub permissions: Vec<String>,
}

impl User {
    pub fn can(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| {
            p == permission
                || p == permissions::ADMIN
                || (p == permissions::OPERATE && permission == permissions::READ)
        })
    }

    pub fn require(&self, permission: &str) -> Result<(), ApiError> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(permission.to_string()))
        }
    }
}

/// Token to user lookup.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: Arc<HashMap<String, User>>,
}

impl UserDirectory {
    pub fn from_config(config: &ApiConfig) -> Self {
        let users = config
            .users
            .iter()
            .map(|u| {
                (
                    u.token.clone(),
                    User {
                        id: u.user_id.clone(),
                        permissions: u.permissions.clone(),
                    },
                )
            })
            .collect();
        Self {
            users: Arc::new(users),
        }
    }

    pub fn current_user(&self, token: &str) -> Option<User> {
        self.users.get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Reject requests without a known bearer token; otherwise make the
/// [`User`] available as a request extension.
pub async fn require_user(
    State(directory): State<UserDirectory>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = bearer_token(&request)
        .and_then(|token| directory.current_user(token))
        .ok_or(ApiError::Unauthorized)?;
    debug!("{} {} by {}", request.method(), request.uri().path(), user.id);
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
