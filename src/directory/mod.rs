//! Company directory, product catalog, and platform administration.
//!
//! Companies register in `pending` state and cannot act until a platform
//! admin approves them. Suspension and reinstatement are soft status
//! changes; company records are never hard-deleted.

use std::sync::Arc;

use crate::error::{WorkflowError, WorkflowResult};
use crate::guard::{self, Identity, Role};
use crate::notify::{Notifier, WorkflowEvent};
use crate::storage::{CompanyRow, ProductRow, Storage, UserRow};

const MIN_PASSWORD_LEN: usize = 8;

// ─── Vocabulary ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyKind {
    Supplier,
    Buyer,
    Hybrid,
}

impl CompanyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyKind::Supplier => "supplier",
            CompanyKind::Buyer => "buyer",
            CompanyKind::Hybrid => "hybrid",
        }
    }

    pub fn parse(s: &str) -> WorkflowResult<Self> {
        match s {
            "supplier" => Ok(CompanyKind::Supplier),
            "buyer" => Ok(CompanyKind::Buyer),
            "hybrid" => Ok(CompanyKind::Hybrid),
            other => Err(WorkflowError::validation(format!(
                "unknown company kind '{other}'"
            ))),
        }
    }
}

/// Registration input: the company plus its first manager account.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub sector: String,
    pub kind: String,
    pub manager_email: String,
    pub manager_password: String,
}

/// A user as exposed over RPC — no credential material.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub role: String,
    pub company_id: Option<String>,
    pub created_at: String,
}

impl From<UserRow> for UserView {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            role: row.role,
            company_id: row.company_id,
            created_at: row.created_at,
        }
    }
}

// ─── Directory ───────────────────────────────────────────────────────────────

pub struct Directory {
    storage: Arc<Storage>,
    notifier: Notifier,
}

impl Directory {
    pub fn new(storage: Arc<Storage>, notifier: Notifier) -> Self {
        Self { storage, notifier }
    }

    // ─── Registration & lookup ──────────────────────────────────────────────

    /// Onboard a company with its first manager. The company starts
    /// `pending` and must be approved before it can act.
    pub async fn register(&self, reg: Registration) -> WorkflowResult<(CompanyRow, UserView)> {
        let name = reg.name.trim();
        let sector = reg.sector.trim();
        if name.is_empty() {
            return Err(WorkflowError::validation("company name must not be empty"));
        }
        if sector.is_empty() {
            return Err(WorkflowError::validation("sector must not be empty"));
        }
        let kind = CompanyKind::parse(&reg.kind)?;
        guard::validate_email(&reg.manager_email)?;
        if reg.manager_password.len() < MIN_PASSWORD_LEN {
            return Err(WorkflowError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let salt = guard::new_salt();
        let hash = guard::hash_password(&salt, &reg.manager_password);
        let (company, user) = match self
            .storage
            .register_company_with_manager(
                name,
                sector,
                kind.as_str(),
                &reg.manager_email,
                &hash,
                &salt,
            )
            .await
        {
            Ok(pair) => pair,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(WorkflowError::validation("e-mail is already registered"))
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!(company = %company.id, name = %company.name, "company registered (pending approval)");
        Ok((company, user.into()))
    }

    pub async fn get(&self, company_id: &str) -> WorkflowResult<CompanyRow> {
        self.storage
            .get_company(company_id)
            .await?
            .ok_or(WorkflowError::NotFound("company"))
    }

    /// Public directory search — active companies only.
    pub async fn search(
        &self,
        name: Option<&str>,
        sector: Option<&str>,
    ) -> WorkflowResult<Vec<CompanyRow>> {
        Ok(self
            .storage
            .search_companies(name, sector, Some("active"))
            .await?)
    }

    // ─── Product catalog ────────────────────────────────────────────────────

    pub async fn add_product(
        &self,
        identity: &Identity,
        name: &str,
        description: &str,
        category: &str,
        unit_price: f64,
    ) -> WorkflowResult<ProductRow> {
        identity.require_role(Role::Manager)?;
        let company = identity.require_active_company()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(WorkflowError::validation("product name must not be empty"));
        }
        if unit_price < 0.0 {
            return Err(WorkflowError::validation("unit price must not be negative"));
        }
        Ok(self
            .storage
            .create_product(company, name, description, category, unit_price)
            .await?)
    }

    pub async fn update_product(
        &self,
        identity: &Identity,
        product_id: &str,
        name: &str,
        description: &str,
        category: &str,
        unit_price: f64,
    ) -> WorkflowResult<ProductRow> {
        identity.require_role(Role::Manager)?;
        let company = identity.require_active_company()?;
        let existing = self
            .storage
            .get_product(product_id)
            .await?
            .ok_or(WorkflowError::NotFound("product"))?;
        if existing.company_id != company {
            return Err(WorkflowError::forbidden(
                "product belongs to another company",
            ));
        }
        if name.trim().is_empty() {
            return Err(WorkflowError::validation("product name must not be empty"));
        }
        if unit_price < 0.0 {
            return Err(WorkflowError::validation("unit price must not be negative"));
        }
        self.storage
            .update_product(product_id, name.trim(), description, category, unit_price)
            .await?;
        self.storage
            .get_product(product_id)
            .await?
            .ok_or(WorkflowError::NotFound("product"))
    }

    pub async fn remove_product(
        &self,
        identity: &Identity,
        product_id: &str,
    ) -> WorkflowResult<()> {
        identity.require_role(Role::Manager)?;
        let company = identity.require_active_company()?;
        let existing = self
            .storage
            .get_product(product_id)
            .await?
            .ok_or(WorkflowError::NotFound("product"))?;
        if existing.company_id != company {
            return Err(WorkflowError::forbidden(
                "product belongs to another company",
            ));
        }
        self.storage.delete_product(product_id).await?;
        Ok(())
    }

    /// Anyone may browse an active company's catalog.
    pub async fn list_products(&self, company_id: &str) -> WorkflowResult<Vec<ProductRow>> {
        self.storage
            .get_company(company_id)
            .await?
            .ok_or(WorkflowError::NotFound("company"))?;
        Ok(self.storage.list_products(company_id).await?)
    }

    // ─── Platform administration ────────────────────────────────────────────

    pub async fn approve_company(
        &self,
        identity: &Identity,
        company_id: &str,
    ) -> WorkflowResult<CompanyRow> {
        identity.require_role(Role::Admin)?;
        self.transition(company_id, "pending", "active").await
    }

    pub async fn suspend_company(
        &self,
        identity: &Identity,
        company_id: &str,
    ) -> WorkflowResult<CompanyRow> {
        identity.require_role(Role::Admin)?;
        self.transition(company_id, "active", "suspended").await
    }

    pub async fn reinstate_company(
        &self,
        identity: &Identity,
        company_id: &str,
    ) -> WorkflowResult<CompanyRow> {
        identity.require_role(Role::Admin)?;
        self.transition(company_id, "suspended", "active").await
    }

    async fn transition(
        &self,
        company_id: &str,
        from: &str,
        to: &str,
    ) -> WorkflowResult<CompanyRow> {
        self.storage
            .get_company(company_id)
            .await?
            .ok_or(WorkflowError::NotFound("company"))?;
        if !self
            .storage
            .transition_company_status(company_id, from, to)
            .await?
        {
            return Err(WorkflowError::invalid_state(format!(
                "company is not '{from}'"
            )));
        }
        self.notifier.send(WorkflowEvent::CompanyStatusChanged {
            company_id: company_id.to_string(),
            status: to.to_string(),
        });
        tracing::info!(company = company_id, from, to, "company status changed");
        self.get(company_id).await
    }

    /// Admin listing — any status.
    pub async fn list_companies(
        &self,
        identity: &Identity,
        status: Option<&str>,
    ) -> WorkflowResult<Vec<CompanyRow>> {
        identity.require_role(Role::Admin)?;
        Ok(self.storage.search_companies(None, None, status).await?)
    }

    pub async fn list_users(
        &self,
        identity: &Identity,
        company_id: Option<&str>,
    ) -> WorkflowResult<Vec<UserView>> {
        identity.require_role(Role::Admin)?;
        let rows = self.storage.list_users(company_id).await?;
        Ok(rows.into_iter().map(UserView::from).collect())
    }

    /// Change a user's role. Granting admin or above takes a super admin.
    pub async fn set_user_role(
        &self,
        identity: &Identity,
        user_id: &str,
        role: &str,
    ) -> WorkflowResult<UserView> {
        identity.require_role(Role::Admin)?;
        let role = Role::parse(role)
            .ok_or_else(|| WorkflowError::validation(format!("unknown role '{role}'")))?;
        if role >= Role::Admin {
            identity.require_role(Role::SuperAdmin)?;
        }
        let user = self
            .storage
            .get_user(user_id)
            .await?
            .ok_or(WorkflowError::NotFound("user"))?;
        self.storage.set_user_role(&user.id, role.as_str()).await?;
        let user = self
            .storage
            .get_user(user_id)
            .await?
            .ok_or(WorkflowError::NotFound("user"))?;
        Ok(user.into())
    }
}
