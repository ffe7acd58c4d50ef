use anyhow::{Context as _, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};
use uuid::Uuid;

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the daemon indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
/// Returns an error if the operation takes longer than `QUERY_TIMEOUT`.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

// ─── Row types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CompanyRow {
    pub id: String,
    pub name: String,
    pub sector: String,
    /// supplier | buyer | hybrid
    pub kind: String,
    /// pending | active | suspended — companies are never hard-deleted.
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
    /// user | manager | admin | super_admin
    pub role: String,
    /// NULL for platform staff.
    pub company_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthTokenRow {
    pub id: String,
    pub user_id: String,
    /// SHA-256 hex of the opaque bearer token; the token itself is never stored.
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ProductRow {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub unit_price: f64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct RelationshipRow {
    pub id: String,
    /// Normalized pair: a_company_id < b_company_id.
    pub a_company_id: String,
    pub b_company_id: String,
    pub initiator_company_id: String,
    /// supplier | client | partner | distributor
    pub kind: String,
    /// pending | active
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl RelationshipRow {
    /// The side that must acknowledge the request.
    pub fn target_company_id(&self) -> &str {
        if self.initiator_company_id == self.a_company_id {
            &self.b_company_id
        } else {
            &self.a_company_id
        }
    }

    pub fn involves(&self, company_id: &str) -> bool {
        self.a_company_id == company_id || self.b_company_id == company_id
    }
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct RfqRow {
    pub id: String,
    pub requester_company_id: String,
    pub title: String,
    pub description: String,
    pub quantity: i64,
    pub budget: Option<f64>,
    /// Sector scope for public RFQs. NULL = visible to every sector.
    pub sector: Option<String>,
    /// RFC-3339 deadline. NULL = no deadline.
    pub deadline: Option<String>,
    /// open | closed | expired
    pub status: String,
    /// Set when the RFQ was closed by accepting this quote.
    pub awarded_quote_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct QuoteRow {
    pub id: String,
    pub rfq_id: String,
    pub company_id: String,
    pub price: f64,
    pub delivery_days: i64,
    pub notes: String,
    /// submitted | accepted | rejected | withdrawn
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct MessageRow {
    pub id: String,
    pub sender_company_id: String,
    pub recipient_company_id: String,
    pub sender_user_id: String,
    pub body: String,
    pub created_at: String,
}

/// Outcome of the atomic quote-award transaction.
#[derive(Debug, PartialEq)]
pub enum QuoteAward {
    /// The RFQ closed on this quote; `rejected_siblings` other submitted
    /// quotes were rejected in the same transaction.
    Awarded { rejected_siblings: u64 },
    /// Lost the race — the RFQ was already closed or expired.
    RfqNotOpen,
    /// The quote vanished from `submitted` between validation and commit
    /// (withdrawn concurrently). The RFQ claim was rolled back.
    QuoteNotEligible,
}

// ─── Storage ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding it
    /// are logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("nexusd.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .foreign_keys(true)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            use sqlx::ConnectOptions as _;
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("src/storage/migrations")
            .run(pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    // ─── Companies ──────────────────────────────────────────────────────────

    pub async fn create_company(&self, name: &str, sector: &str, kind: &str) -> Result<CompanyRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO companies (id, name, sector, kind, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(sector)
        .bind(kind)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_company(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("company not found after insert"))
    }

    pub async fn get_company(&self, id: &str) -> Result<Option<CompanyRow>> {
        Ok(sqlx::query_as("SELECT * FROM companies WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Insert a pending company together with its first manager user in one
    /// transaction. The raw `sqlx::Error` is surfaced so a unique violation
    /// on the user's e-mail can be classified by the caller.
    #[allow(clippy::too_many_arguments)]
    pub async fn register_company_with_manager(
        &self,
        name: &str,
        sector: &str,
        kind: &str,
        email: &str,
        password_hash: &str,
        password_salt: &str,
    ) -> std::result::Result<(CompanyRow, UserRow), sqlx::Error> {
        let company_id = Uuid::new_v4().to_string();
        let user_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO companies (id, name, sector, kind, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(&company_id)
        .bind(name)
        .bind(sector)
        .bind(kind)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, password_salt, role, company_id, created_at)
             VALUES (?, ?, ?, ?, 'manager', ?, ?)",
        )
        .bind(&user_id)
        .bind(email)
        .bind(password_hash)
        .bind(password_salt)
        .bind(&company_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let company = sqlx::query_as("SELECT * FROM companies WHERE id = ?")
            .bind(&company_id)
            .fetch_one(&self.pool)
            .await?;
        let user = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok((company, user))
    }

    /// Directory search. `name` is a case-insensitive substring match.
    pub async fn search_companies(
        &self,
        name: Option<&str>,
        sector: Option<&str>,
        status: Option<&str>,
    ) -> Result<Vec<CompanyRow>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM companies
                 WHERE (?1 IS NULL OR instr(lower(name), ?1) > 0)
                   AND (?2 IS NULL OR sector = ?2)
                   AND (?3 IS NULL OR status = ?3)
                 ORDER BY name ASC",
            )
            .bind(name.map(|n| n.to_lowercase()))
            .bind(sector)
            .bind(status)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    /// Compare-and-swap a company's status. Returns `false` when the company
    /// is missing or already in a state other than `from`.
    pub async fn transition_company_status(
        &self,
        id: &str,
        from: &str,
        to: &str,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE companies SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to)
        .bind(&now)
        .bind(id)
        .bind(from)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_companies(&self, status: Option<&str>) -> Result<u64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM companies WHERE ?1 IS NULL OR status = ?1")
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0 as u64)
    }

    // ─── Users ──────────────────────────────────────────────────────────────

    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        password_salt: &str,
        role: &str,
        company_id: Option<&str>,
    ) -> Result<UserRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, password_salt, role, company_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(password_hash)
        .bind(password_salt)
        .bind(role)
        .bind(company_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_user(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user not found after insert"))
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_users(&self, company_id: Option<&str>) -> Result<Vec<UserRow>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM users WHERE ?1 IS NULL OR company_id = ?1 ORDER BY created_at ASC",
            )
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    pub async fn set_user_role(&self, id: &str, role: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_users(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    // ─── Auth tokens ────────────────────────────────────────────────────────

    pub async fn create_auth_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: &str,
    ) -> Result<()> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO auth_tokens (id, user_id, token_hash, expires_at, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_auth_token(&self, token_hash: &str) -> Result<Option<AuthTokenRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM auth_tokens WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn delete_auth_token(&self, token_hash: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete tokens whose expiry has passed. Lexicographic comparison is
    /// sound — all timestamps are RFC-3339 UTC written by this process.
    pub async fn prune_expired_tokens(&self, now: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ─── Products ───────────────────────────────────────────────────────────

    pub async fn create_product(
        &self,
        company_id: &str,
        name: &str,
        description: &str,
        category: &str,
        unit_price: f64,
    ) -> Result<ProductRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO products (id, company_id, name, description, category, unit_price, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(company_id)
        .bind(name)
        .bind(description)
        .bind(category)
        .bind(unit_price)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_product(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("product not found after insert"))
    }

    pub async fn get_product(&self, id: &str) -> Result<Option<ProductRow>> {
        Ok(sqlx::query_as("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn update_product(
        &self,
        id: &str,
        name: &str,
        description: &str,
        category: &str,
        unit_price: f64,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE products SET name = ?, description = ?, category = ?, unit_price = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(category)
        .bind(unit_price)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_product(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_products(&self, company_id: &str) -> Result<Vec<ProductRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM products WHERE company_id = ? ORDER BY name ASC")
                .bind(company_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    // ─── Relationships ──────────────────────────────────────────────────────

    /// Insert a pending relationship for the normalized pair.
    ///
    /// The duplicate check and the insert are one atomic statement: the
    /// partial unique index on (a, b, kind) raises a unique violation when a
    /// live relationship already links the pair. The raw `sqlx::Error` is
    /// returned so the caller can map that violation to a domain error.
    pub async fn insert_relationship(
        &self,
        a_company_id: &str,
        b_company_id: &str,
        initiator_company_id: &str,
        kind: &str,
    ) -> std::result::Result<RelationshipRow, sqlx::Error> {
        debug_assert!(a_company_id < b_company_id);
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO relationships
             (id, a_company_id, b_company_id, initiator_company_id, kind, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(&id)
        .bind(a_company_id)
        .bind(b_company_id)
        .bind(initiator_company_id)
        .bind(kind)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        sqlx::query_as("SELECT * FROM relationships WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn get_relationship(&self, id: &str) -> Result<Option<RelationshipRow>> {
        Ok(sqlx::query_as("SELECT * FROM relationships WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// CAS `pending → active`. Returns `false` when the row is missing or no
    /// longer pending.
    pub async fn activate_relationship(&self, id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE relationships SET status = 'active', updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a relationship, but only out of the expected state (reject needs
    /// `pending`, disconnect needs `active`). Returns `false` on a state race.
    pub async fn remove_relationship(&self, id: &str, expected_status: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM relationships WHERE id = ? AND status = ?")
            .bind(id)
            .bind(expected_status)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_relationships(
        &self,
        company_id: &str,
        kind: Option<&str>,
        status: Option<&str>,
    ) -> Result<Vec<RelationshipRow>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM relationships
                 WHERE (a_company_id = ?1 OR b_company_id = ?1)
                   AND (?2 IS NULL OR kind = ?2)
                   AND (?3 IS NULL OR status = ?3)
                 ORDER BY created_at DESC",
            )
            .bind(company_id)
            .bind(kind)
            .bind(status)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    /// True when an `active` relationship of any kind links the pair.
    pub async fn has_active_relationship(&self, a: &str, b: &str) -> Result<bool> {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM relationships
             WHERE a_company_id = ? AND b_company_id = ? AND status = 'active'",
        )
        .bind(lo)
        .bind(hi)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    // ─── RFQs ───────────────────────────────────────────────────────────────

    /// Insert an RFQ and its target list in one transaction.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_rfq(
        &self,
        requester_company_id: &str,
        title: &str,
        description: &str,
        quantity: i64,
        budget: Option<f64>,
        sector: Option<&str>,
        deadline: Option<&str>,
        targets: &[String],
    ) -> Result<RfqRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO rfqs
             (id, requester_company_id, title, description, quantity, budget, sector, deadline, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'open', ?, ?)",
        )
        .bind(&id)
        .bind(requester_company_id)
        .bind(title)
        .bind(description)
        .bind(quantity)
        .bind(budget)
        .bind(sector)
        .bind(deadline)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        for target in targets {
            sqlx::query("INSERT INTO rfq_targets (rfq_id, company_id) VALUES (?, ?)")
                .bind(&id)
                .bind(target)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        self.get_rfq(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("rfq not found after insert"))
    }

    pub async fn get_rfq(&self, id: &str) -> Result<Option<RfqRow>> {
        Ok(sqlx::query_as("SELECT * FROM rfqs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_rfq_targets(&self, rfq_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT company_id FROM rfq_targets WHERE rfq_id = ?")
                .bind(rfq_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    /// RFQs visible to a company: its own, those explicitly targeting it, and
    /// open public ones matching its sector. Mirrors
    /// `rfq::visibility::is_visible_to` — keep the two in sync.
    pub async fn list_visible_rfqs(
        &self,
        company_id: &str,
        company_sector: &str,
        status: Option<&str>,
    ) -> Result<Vec<RfqRow>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT DISTINCT r.* FROM rfqs r
                 LEFT JOIN rfq_targets t ON t.rfq_id = r.id
                 WHERE (
                       r.requester_company_id = ?1
                    OR t.company_id = ?1
                    OR (NOT EXISTS (SELECT 1 FROM rfq_targets x WHERE x.rfq_id = r.id)
                        AND r.status = 'open'
                        AND (r.sector IS NULL OR r.sector = ?2))
                 )
                   AND (?3 IS NULL OR r.status = ?3)
                 ORDER BY r.created_at DESC",
            )
            .bind(company_id)
            .bind(company_sector)
            .bind(status)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    pub async fn list_rfqs_by_requester(&self, company_id: &str) -> Result<Vec<RfqRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM rfqs WHERE requester_company_id = ? ORDER BY created_at DESC",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Atomically close an RFQ without awarding (`to` is `closed` or
    /// `expired`) and reject its submitted quotes. Returns `None` when the
    /// CAS on `open` lost, otherwise the number of rejected quotes.
    pub async fn close_rfq_unawarded(&self, rfq_id: &str, to: &str) -> Result<Option<u64>> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query(
            "UPDATE rfqs SET status = ?, updated_at = ? WHERE id = ? AND status = 'open'",
        )
        .bind(to)
        .bind(&now)
        .bind(rfq_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if claimed == 0 {
            return Ok(None);
        }
        let rejected = sqlx::query(
            "UPDATE quotes SET status = 'rejected', updated_at = ?
             WHERE rfq_id = ? AND status = 'submitted'",
        )
        .bind(&now)
        .bind(rfq_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;
        Ok(Some(rejected))
    }

    /// The accept-quote transaction.
    ///
    /// Serialization point for concurrent accepts: the first statement claims
    /// the RFQ with `status = 'open' → 'closed'`. Zero rows affected means
    /// another accept (or a close/expiry) already won — the caller observes
    /// that as an invalid-state condition, never a silent double accept.
    pub async fn award_quote(&self, rfq_id: &str, quote_id: &str) -> Result<QuoteAward> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE rfqs SET status = 'closed', awarded_quote_id = ?, updated_at = ?
             WHERE id = ? AND status = 'open'",
        )
        .bind(quote_id)
        .bind(&now)
        .bind(rfq_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if claimed == 0 {
            return Ok(QuoteAward::RfqNotOpen);
        }

        let accepted = sqlx::query(
            "UPDATE quotes SET status = 'accepted', updated_at = ?
             WHERE id = ? AND rfq_id = ? AND status = 'submitted'",
        )
        .bind(&now)
        .bind(quote_id)
        .bind(rfq_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if accepted == 0 {
            tx.rollback().await?;
            return Ok(QuoteAward::QuoteNotEligible);
        }

        let rejected_siblings = sqlx::query(
            "UPDATE quotes SET status = 'rejected', updated_at = ?
             WHERE rfq_id = ? AND id != ? AND status = 'submitted'",
        )
        .bind(&now)
        .bind(rfq_id)
        .bind(quote_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(QuoteAward::Awarded { rejected_siblings })
    }

    /// Ids of open RFQs whose deadline has passed (janitor sweep input).
    pub async fn list_overdue_rfq_ids(&self, now: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM rfqs
             WHERE status = 'open' AND deadline IS NOT NULL AND deadline < ?",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn count_rfqs(&self, status: Option<&str>) -> Result<u64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM rfqs WHERE ?1 IS NULL OR status = ?1")
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0 as u64)
    }

    // ─── Quotes ─────────────────────────────────────────────────────────────

    /// Insert a quote, guarded on the parent RFQ still being `open`.
    ///
    /// `Ok(None)` means the RFQ was not open at insert time (the guard and the
    /// insert are one statement, so a concurrent close cannot slip a quote
    /// in). A unique violation on the partial index means the company already
    /// has a submitted quote — surfaced raw for the caller to classify.
    pub async fn insert_quote_if_open(
        &self,
        rfq_id: &str,
        company_id: &str,
        price: f64,
        delivery_days: i64,
        notes: &str,
    ) -> std::result::Result<Option<QuoteRow>, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let inserted = sqlx::query(
            "INSERT INTO quotes (id, rfq_id, company_id, price, delivery_days, notes, status, created_at, updated_at)
             SELECT ?, ?, ?, ?, ?, ?, 'submitted', ?, ?
             WHERE EXISTS (SELECT 1 FROM rfqs WHERE id = ? AND status = 'open')",
        )
        .bind(&id)
        .bind(rfq_id)
        .bind(company_id)
        .bind(price)
        .bind(delivery_days)
        .bind(notes)
        .bind(&now)
        .bind(&now)
        .bind(rfq_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if inserted == 0 {
            return Ok(None);
        }
        sqlx::query_as("SELECT * FROM quotes WHERE id = ?")
            .bind(&id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_quote(&self, id: &str) -> Result<Option<QuoteRow>> {
        Ok(sqlx::query_as("SELECT * FROM quotes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_quotes_for_rfq(&self, rfq_id: &str) -> Result<Vec<QuoteRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM quotes WHERE rfq_id = ? ORDER BY created_at ASC")
                .bind(rfq_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn list_quotes_by_company(&self, company_id: &str) -> Result<Vec<QuoteRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM quotes WHERE company_id = ? ORDER BY created_at DESC")
                .bind(company_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// CAS `submitted → withdrawn`. Frees the (RFQ, company) slot in the
    /// partial unique index.
    pub async fn withdraw_quote(&self, id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE quotes SET status = 'withdrawn', updated_at = ?
             WHERE id = ? AND status = 'submitted'",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count quotes under an RFQ in a given status.
    pub async fn count_quotes(&self, rfq_id: &str, status: &str) -> Result<u64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM quotes WHERE rfq_id = ? AND status = ?")
                .bind(rfq_id)
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0 as u64)
    }

    // ─── Messages ───────────────────────────────────────────────────────────

    pub async fn create_message(
        &self,
        sender_company_id: &str,
        recipient_company_id: &str,
        sender_user_id: &str,
        body: &str,
    ) -> Result<MessageRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO messages (id, sender_company_id, recipient_company_id, sender_user_id, body, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(sender_company_id)
        .bind(recipient_company_id)
        .bind(sender_user_id)
        .bind(body)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(MessageRow {
            id,
            sender_company_id: sender_company_id.to_string(),
            recipient_company_id: recipient_company_id.to_string(),
            sender_user_id: sender_user_id.to_string(),
            body: body.to_string(),
            created_at: now,
        })
    }

    /// Newest-first page of the thread between two companies. The `before`
    /// cursor is a message id; a composite (created_at, id) cursor keeps the
    /// pagination stable when timestamps collide.
    pub async fn list_thread(
        &self,
        company_a: &str,
        company_b: &str,
        limit: i64,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        let rows = if let Some(msg_id) = before {
            sqlx::query_as(
                "SELECT * FROM messages
                 WHERE ((sender_company_id = ?1 AND recipient_company_id = ?2)
                     OR (sender_company_id = ?2 AND recipient_company_id = ?1))
                   AND (
                       created_at < (SELECT created_at FROM messages WHERE id = ?3)
                       OR (created_at = (SELECT created_at FROM messages WHERE id = ?3) AND id < ?3)
                   )
                 ORDER BY created_at DESC, id DESC LIMIT ?4",
            )
            .bind(company_a)
            .bind(company_b)
            .bind(msg_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                "SELECT * FROM messages
                 WHERE ((sender_company_id = ?1 AND recipient_company_id = ?2)
                     OR (sender_company_id = ?2 AND recipient_company_id = ?1))
                 ORDER BY created_at DESC, id DESC LIMIT ?3",
            )
            .bind(company_a)
            .bind(company_b)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows)
    }

    /// Delete messages older than `days` days. Pass `0` to skip pruning.
    pub async fn prune_old_messages(&self, days: u32) -> Result<u64> {
        if days == 0 {
            return Ok(0);
        }
        with_timeout(async {
            let cutoff = (Utc::now() - chrono::Duration::days(days as i64)).to_rfc3339();
            let n = sqlx::query("DELETE FROM messages WHERE created_at < ?")
                .bind(&cutoff)
                .execute(&self.pool)
                .await?
                .rows_affected();
            Ok(n)
        })
        .await
    }
}
