use std::sync::Arc;
use tracing::{debug, warn};

use super::token::{TokenError, TokenIssuer};
use crate::domain::{OrganizationId, Role, UserId};
use crate::error::CoreError;
use crate::store::{TenantScope, UserDirectory};

/// Authenticated caller. Only [`TenantResolver`] can produce one, so holding
/// an `ActorContext` means the credential was verified against current
/// membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    user_id: UserId,
    username: String,
    role: Role,
    organization_id: OrganizationId,
}

impl ActorContext {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    /// The tenant filter for every store call made on behalf of this actor.
    pub fn scope(&self) -> TenantScope {
        TenantScope::new(self.organization_id)
    }
}

pub struct TenantResolver {
    issuer: TokenIssuer,
    directory: Arc<dyn UserDirectory>,
}

impl TenantResolver {
    pub fn new(issuer: TokenIssuer, directory: Arc<dyn UserDirectory>) -> Self {
        Self { issuer, directory }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Verify `credential` and re-check the user's current organization and
    /// role. A token whose organization no longer matches is rejected with
    /// `TenantMismatch`; one whose role changed since issue is treated as
    /// stale and rejected as unauthenticated.
    pub async fn resolve(&self, credential: &str) -> Result<ActorContext, CoreError> {
        let claims = self.issuer.decode(credential).map_err(|error| match error {
            TokenError::Expired => CoreError::Unauthenticated("token expired".to_string()),
            other => CoreError::Unauthenticated(other.to_string()),
        })?;

        let Some(user) = self.directory.find_user(claims.user_id).await? else {
            debug!(user.id = %claims.user_id, "Credential refers to unknown user");
            return Err(CoreError::Unauthenticated("unknown user".to_string()));
        };

        if user.organization_id != claims.organization_id {
            warn!(
                user.id = %user.id,
                token_org = %claims.organization_id,
                current_org = %user.organization_id,
                "Credential organization does not match membership"
            );
            return Err(CoreError::TenantMismatch);
        }

        if user.role != claims.role {
            debug!(user.id = %user.id, "Credential role is stale");
            return Err(CoreError::Unauthenticated("role changed since issue".to_string()));
        }

        Ok(ActorContext {
            user_id: user.id,
            username: user.username,
            role: claims.role,
            organization_id: user.organization_id,
        })
    }
}
