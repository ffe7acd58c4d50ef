//! Access guard — resolves opaque bearer credentials to an acting user and
//! company, and enforces the role hierarchy on workflow operations.
//!
//! Roles form a total order (`user < manager < admin < super_admin`); a role
//! carries every capability of the roles below it, so authorization checks
//! are a single comparison rather than string matching.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::storage::Storage;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

/// Minimal shape check for registration e-mails. Deliverability is the
/// notification collaborator's problem, not ours.
pub fn validate_email(email: &str) -> WorkflowResult<()> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(WorkflowError::validation(format!(
            "'{email}' is not a valid e-mail address"
        )))
    }
}

// ─── Roles ───────────────────────────────────────────────────────────────────

/// Platform roles, ordered by privilege. Derived `Ord` gives the
/// "permission implies lower" rule for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    User,
    Manager,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Manager => "manager",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "manager" => Some(Role::Manager),
            "admin" => Some(Role::Admin),
            "super_admin" => Some(Role::SuperAdmin),
            _ => None,
        }
    }

    /// Whether this role carries the capabilities of `required`.
    pub fn allows(&self, required: Role) -> bool {
        *self >= required
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// The resolved caller: user plus the company they act on behalf of.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    /// None for platform staff not attached to any company.
    pub company_id: Option<String>,
    /// Status string of the company at authentication time.
    pub company_status: Option<String>,
}

impl Identity {
    pub fn require_role(&self, required: Role) -> WorkflowResult<()> {
        if self.role.allows(required) {
            Ok(())
        } else {
            Err(WorkflowError::forbidden(format!(
                "requires role {required} or above"
            )))
        }
    }

    /// The company this caller acts for. Platform staff without a company
    /// cannot perform company-scoped workflow operations.
    pub fn acting_company(&self) -> WorkflowResult<&str> {
        self.company_id
            .as_deref()
            .ok_or_else(|| WorkflowError::forbidden("caller is not attached to a company"))
    }

    /// Company-scoped mutations additionally require the company to be in
    /// good standing — a pending or suspended company can read but not act.
    pub fn require_active_company(&self) -> WorkflowResult<&str> {
        let company = self.acting_company()?;
        match self.company_status.as_deref() {
            Some("active") => Ok(company),
            Some("pending") => Err(WorkflowError::forbidden(
                "company is awaiting platform approval",
            )),
            Some("suspended") => Err(WorkflowError::forbidden("company is suspended")),
            _ => Err(WorkflowError::forbidden("company is not in good standing")),
        }
    }
}

// ─── Guard ───────────────────────────────────────────────────────────────────

pub struct AccessGuard {
    storage: Arc<Storage>,
    token_ttl: Duration,
}

impl AccessGuard {
    pub fn new(storage: Arc<Storage>, token_ttl_hours: i64) -> Self {
        Self {
            storage,
            token_ttl: Duration::hours(token_ttl_hours),
        }
    }

    /// Resolve an opaque bearer token to an [`Identity`].
    ///
    /// Tokens are stored as SHA-256 digests; expiry is checked here and
    /// expired rows are left for the janitor to prune.
    pub async fn authenticate(&self, token: &str) -> WorkflowResult<Identity> {
        if token.is_empty() {
            return Err(WorkflowError::Unauthenticated("missing credential"));
        }
        let row = self
            .storage
            .get_auth_token(&hash_token(token))
            .await?
            .ok_or(WorkflowError::Unauthenticated("unknown or revoked credential"))?;

        let expires = DateTime::parse_from_rfc3339(&row.expires_at)
            .map_err(|_| WorkflowError::Unauthenticated("malformed credential record"))?;
        if expires < Utc::now() {
            return Err(WorkflowError::Unauthenticated("expired credential"));
        }

        let user = self
            .storage
            .get_user(&row.user_id)
            .await?
            .ok_or(WorkflowError::Unauthenticated("credential owner no longer exists"))?;

        // Unknown role strings fail closed to the least-privileged role.
        let role = Role::parse(&user.role).unwrap_or(Role::User);

        let company_status = match user.company_id.as_deref() {
            Some(cid) => self.storage.get_company(cid).await?.map(|c| c.status),
            None => None,
        };

        Ok(Identity {
            user_id: user.id,
            email: user.email,
            role,
            company_id: user.company_id,
            company_status,
        })
    }

    /// Ensure the caller acts on behalf of `company_id` and nothing else.
    /// Membership is exact — platform staff are not implicit members.
    pub fn require_company_membership(
        &self,
        identity: &Identity,
        company_id: &str,
    ) -> WorkflowResult<()> {
        match identity.company_id.as_deref() {
            Some(own) if own == company_id => Ok(()),
            _ => Err(WorkflowError::forbidden(
                "caller does not belong to this company",
            )),
        }
    }

    /// Verify e-mail + password and issue a fresh opaque bearer token.
    /// Returns the token (shown once — only its hash is stored) and identity.
    pub async fn login(&self, email: &str, password: &str) -> WorkflowResult<(String, Identity)> {
        let user = self
            .storage
            .get_user_by_email(email)
            .await?
            .ok_or(WorkflowError::Unauthenticated("invalid email or password"))?;

        if hash_password(&user.password_salt, password) != user.password_hash {
            return Err(WorkflowError::Unauthenticated("invalid email or password"));
        }

        let token = self.issue_token(&user.id).await?;
        let identity = self.authenticate(&token).await?;
        Ok((token, identity))
    }

    /// Revoke a bearer token. Returns `false` when it was already gone.
    pub async fn logout(&self, token: &str) -> WorkflowResult<bool> {
        Ok(self.storage.delete_auth_token(&hash_token(token)).await?)
    }

    /// Mint an opaque token for a user (login and bootstrap paths).
    pub async fn issue_token(&self, user_id: &str) -> WorkflowResult<String> {
        let token = format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        );
        let expires_at = (Utc::now() + self.token_ttl).to_rfc3339();
        self.storage
            .create_auth_token(user_id, &hash_token(&token), &expires_at)
            .await?;
        Ok(token)
    }
}

// ─── Credential hashing ──────────────────────────────────────────────────────

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn new_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_order_is_total() {
        assert!(Role::User < Role::Manager);
        assert!(Role::Manager < Role::Admin);
        assert!(Role::Admin < Role::SuperAdmin);
    }

    #[test]
    fn higher_roles_imply_lower() {
        assert!(Role::SuperAdmin.allows(Role::User));
        assert!(Role::Admin.allows(Role::Manager));
        assert!(Role::Manager.allows(Role::Manager));
        assert!(!Role::User.allows(Role::Manager));
        assert!(!Role::Admin.allows(Role::SuperAdmin));
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in [Role::User, Role::Manager, Role::Admin, Role::SuperAdmin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn password_hash_depends_on_salt() {
        let a = hash_password("salt-a", "hunter2");
        let b = hash_password("salt-b", "hunter2");
        assert_ne!(a, b);
        assert_eq!(a, hash_password("salt-a", "hunter2"));
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("ops@acme.example").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a b@x.example").is_err());
    }
}
