//! RFQ workflow engine — request-for-quote lifecycle, quote submission, and
//! the exclusive-accept transition.
//!
//! The engine owns every mutation of RFQ and quote records; nothing else in
//! the daemon writes them. Races are settled in storage: quote submission is
//! a guarded insert against an open RFQ plus a partial unique index, and
//! acceptance is a single transaction serialized by a compare-and-swap on
//! the RFQ status. The loser of a concurrent accept observes an
//! invalid-state error — retrying after re-reading state is the caller's
//! decision, never the engine's.

pub mod visibility;

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::{WorkflowError, WorkflowResult};
use crate::guard::Identity;
use crate::notify::{Notifier, WorkflowEvent};
use crate::storage::{QuoteAward, QuoteRow, RfqRow, Storage};

/// Input record for [`RfqEngine::create`].
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RfqDraft {
    pub title: String,
    pub description: String,
    pub quantity: i64,
    pub budget: Option<f64>,
    /// Sector scope for public RFQs; ignored when `targets` is non-empty.
    pub sector: Option<String>,
    /// RFC-3339. Must be in the future when present.
    pub deadline: Option<String>,
    /// Company ids invited to quote. Empty = public RFQ.
    #[serde(default)]
    pub targets: Vec<String>,
}

/// An RFQ with its target list, as returned to callers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RfqView {
    #[serde(flatten)]
    pub rfq: RfqRow,
    pub targets: Vec<String>,
}

pub struct RfqEngine {
    storage: Arc<Storage>,
    notifier: Notifier,
}

impl RfqEngine {
    pub fn new(storage: Arc<Storage>, notifier: Notifier) -> Self {
        Self { storage, notifier }
    }

    // ─── Creation ───────────────────────────────────────────────────────────

    pub async fn create(&self, identity: &Identity, draft: RfqDraft) -> WorkflowResult<RfqView> {
        let requester = identity.require_active_company()?.to_string();

        let title = draft.title.trim();
        let description = draft.description.trim();
        if title.is_empty() {
            return Err(WorkflowError::validation("title must not be empty"));
        }
        if description.is_empty() {
            return Err(WorkflowError::validation("description must not be empty"));
        }
        if draft.quantity <= 0 {
            return Err(WorkflowError::validation("quantity must be positive"));
        }
        if let Some(budget) = draft.budget {
            if budget < 0.0 {
                return Err(WorkflowError::validation("budget must not be negative"));
            }
        }

        // Normalize the deadline to UTC RFC-3339 so stored timestamps compare
        // lexicographically.
        let deadline = match draft.deadline.as_deref() {
            Some(raw) => {
                let parsed = DateTime::parse_from_rfc3339(raw).map_err(|_| {
                    WorkflowError::validation("deadline is not a valid RFC-3339 timestamp")
                })?;
                if parsed < Utc::now() {
                    return Err(WorkflowError::validation("deadline is in the past"));
                }
                Some(parsed.with_timezone(&Utc).to_rfc3339())
            }
            None => None,
        };

        let mut targets = draft.targets.clone();
        targets.sort();
        targets.dedup();
        for target in &targets {
            if *target == requester {
                return Err(WorkflowError::validation(
                    "an RFQ cannot target its own requester",
                ));
            }
            self.storage
                .get_company(target)
                .await?
                .ok_or(WorkflowError::NotFound("company"))?;
        }

        let row = self
            .storage
            .create_rfq(
                &requester,
                title,
                description,
                draft.quantity,
                draft.budget,
                draft.sector.as_deref(),
                deadline.as_deref(),
                &targets,
            )
            .await?;

        self.notifier.send(WorkflowEvent::RfqCreated {
            rfq_id: row.id.clone(),
            requester_company_id: requester,
            target_company_ids: targets.clone(),
        });
        Ok(RfqView { rfq: row, targets })
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    /// RFQs visible to the caller's company, newest first.
    pub async fn list_visible(
        &self,
        identity: &Identity,
        status: Option<&str>,
    ) -> WorkflowResult<Vec<RfqRow>> {
        let company = identity.acting_company()?;
        let sector = self
            .storage
            .get_company(company)
            .await?
            .map(|c| c.sector)
            .unwrap_or_default();
        Ok(self
            .storage
            .list_visible_rfqs(company, &sector, status)
            .await?)
    }

    /// Fetch one RFQ. Invisible RFQs are indistinguishable from missing ones.
    pub async fn get(&self, identity: &Identity, rfq_id: &str) -> WorkflowResult<RfqView> {
        let company = identity.acting_company()?;
        let rfq = self
            .storage
            .get_rfq(rfq_id)
            .await?
            .ok_or(WorkflowError::NotFound("RFQ"))?;
        let targets = self.storage.list_rfq_targets(rfq_id).await?;
        let sector = self
            .storage
            .get_company(company)
            .await?
            .map(|c| c.sector)
            .unwrap_or_default();
        if !visibility::is_visible_to(&rfq, &targets, company, &sector) {
            return Err(WorkflowError::NotFound("RFQ"));
        }
        Ok(RfqView { rfq, targets })
    }

    /// Quotes on an RFQ. The requester sees every quote; a responding company
    /// sees only its own.
    pub async fn list_quotes(
        &self,
        identity: &Identity,
        rfq_id: &str,
    ) -> WorkflowResult<Vec<QuoteRow>> {
        let company = identity.acting_company()?;
        let rfq = self
            .storage
            .get_rfq(rfq_id)
            .await?
            .ok_or(WorkflowError::NotFound("RFQ"))?;
        let mut quotes = self.storage.list_quotes_for_rfq(rfq_id).await?;
        if rfq.requester_company_id != company {
            quotes.retain(|q| q.company_id == company);
        }
        Ok(quotes)
    }

    // ─── Quote submission ───────────────────────────────────────────────────

    pub async fn submit_quote(
        &self,
        identity: &Identity,
        rfq_id: &str,
        price: f64,
        delivery_days: i64,
        notes: Option<&str>,
    ) -> WorkflowResult<QuoteRow> {
        let responder = identity.require_active_company()?.to_string();

        if price < 0.0 {
            return Err(WorkflowError::validation("price must not be negative"));
        }
        if delivery_days < 0 {
            return Err(WorkflowError::validation(
                "delivery days must not be negative",
            ));
        }

        let rfq = self
            .storage
            .get_rfq(rfq_id)
            .await?
            .ok_or(WorkflowError::NotFound("RFQ"))?;
        if rfq.requester_company_id == responder {
            return Err(WorkflowError::unauthorized(
                "a company cannot quote its own RFQ",
            ));
        }
        let targets = self.storage.list_rfq_targets(rfq_id).await?;
        if !targets.is_empty() && !targets.iter().any(|t| *t == responder) {
            return Err(WorkflowError::unauthorized(
                "this RFQ does not invite quotes from the caller's company",
            ));
        }
        if rfq.status != "open" {
            return Err(WorkflowError::invalid_state("RFQ is not open"));
        }
        if let Some(deadline) = &rfq.deadline {
            if *deadline < Utc::now().to_rfc3339() {
                return Err(WorkflowError::invalid_state("RFQ deadline has passed"));
            }
        }

        // Guarded insert: the open check and the row insert are one
        // statement, and the partial unique index holds off a duplicate from
        // the same company racing itself.
        let quote = match self
            .storage
            .insert_quote_if_open(
                rfq_id,
                &responder,
                price,
                delivery_days,
                notes.unwrap_or_default(),
            )
            .await
        {
            Ok(Some(row)) => row,
            Ok(None) => return Err(WorkflowError::invalid_state("RFQ is not open")),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(WorkflowError::DuplicateQuote)
            }
            Err(e) => return Err(e.into()),
        };

        self.notifier.send(WorkflowEvent::QuoteSubmitted {
            rfq_id: rfq_id.to_string(),
            quote_id: quote.id.clone(),
            responder_company_id: responder,
        });
        Ok(quote)
    }

    /// Withdraw a submitted quote, freeing the slot for a replacement.
    pub async fn withdraw_quote(
        &self,
        identity: &Identity,
        quote_id: &str,
    ) -> WorkflowResult<QuoteRow> {
        let responder = identity.require_active_company()?;
        let quote = self
            .storage
            .get_quote(quote_id)
            .await?
            .ok_or(WorkflowError::NotFound("quote"))?;
        if quote.company_id != responder {
            return Err(WorkflowError::unauthorized(
                "only the submitting company may withdraw a quote",
            ));
        }
        if !self.storage.withdraw_quote(quote_id).await? {
            return Err(WorkflowError::invalid_state(
                "quote is not awaiting decision",
            ));
        }
        let quote = self
            .storage
            .get_quote(quote_id)
            .await?
            .ok_or(WorkflowError::NotFound("quote"))?;
        Ok(quote)
    }

    // ─── Acceptance ─────────────────────────────────────────────────────────

    /// Accept one quote, reject its siblings, close the RFQ — atomically.
    ///
    /// Two concurrent accepts on the same RFQ cannot both succeed: the
    /// storage transaction claims the RFQ `open → closed` first, and the
    /// second caller's claim affects zero rows.
    pub async fn accept_quote(
        &self,
        identity: &Identity,
        rfq_id: &str,
        quote_id: &str,
    ) -> WorkflowResult<QuoteRow> {
        let acting = identity.require_active_company()?;

        let rfq = self
            .storage
            .get_rfq(rfq_id)
            .await?
            .ok_or(WorkflowError::NotFound("RFQ"))?;
        if rfq.requester_company_id != acting {
            return Err(WorkflowError::unauthorized(
                "only the requesting company may accept a quote",
            ));
        }

        let quote = self
            .storage
            .get_quote(quote_id)
            .await?
            .ok_or(WorkflowError::NotFound("quote"))?;
        if quote.rfq_id != rfq_id {
            return Err(WorkflowError::invalid_state(
                "quote does not belong to this RFQ",
            ));
        }
        if quote.status != "submitted" {
            return Err(WorkflowError::invalid_state(
                "quote is not awaiting decision",
            ));
        }

        match self.storage.award_quote(rfq_id, quote_id).await? {
            QuoteAward::Awarded { rejected_siblings } => {
                tracing::info!(
                    rfq = rfq_id,
                    quote = quote_id,
                    rejected = rejected_siblings,
                    "quote accepted — RFQ closed"
                );
            }
            QuoteAward::RfqNotOpen => {
                return Err(WorkflowError::invalid_state("RFQ is not open"))
            }
            QuoteAward::QuoteNotEligible => {
                return Err(WorkflowError::invalid_state(
                    "quote is not awaiting decision",
                ))
            }
        }

        self.notifier.send(WorkflowEvent::QuoteAccepted {
            rfq_id: rfq_id.to_string(),
            quote_id: quote_id.to_string(),
            requester_company_id: rfq.requester_company_id.clone(),
            responder_company_id: quote.company_id.clone(),
        });

        let quote = self
            .storage
            .get_quote(quote_id)
            .await?
            .ok_or(WorkflowError::NotFound("quote"))?;
        Ok(quote)
    }

    /// Close an open RFQ without awarding anything.
    pub async fn close(&self, identity: &Identity, rfq_id: &str) -> WorkflowResult<()> {
        let acting = identity.require_active_company()?;
        let rfq = self
            .storage
            .get_rfq(rfq_id)
            .await?
            .ok_or(WorkflowError::NotFound("RFQ"))?;
        if rfq.requester_company_id != acting {
            return Err(WorkflowError::unauthorized(
                "only the requesting company may close an RFQ",
            ));
        }
        match self.storage.close_rfq_unawarded(rfq_id, "closed").await? {
            Some(rejected) => {
                tracing::info!(rfq = rfq_id, rejected, "RFQ closed without award");
                Ok(())
            }
            None => Err(WorkflowError::invalid_state("RFQ is not open")),
        }
    }

    // ─── Maintenance ────────────────────────────────────────────────────────

    /// Expire open RFQs whose deadline has passed. Returns how many flipped.
    /// Each expiry uses the same CAS discipline as acceptance, so a sweep
    /// racing a concurrent accept simply loses.
    pub async fn expire_overdue(&self) -> WorkflowResult<u64> {
        let now = Utc::now().to_rfc3339();
        let overdue = self.storage.list_overdue_rfq_ids(&now).await?;
        let mut expired = 0u64;
        for rfq_id in overdue {
            if let Some(rejected) = self.storage.close_rfq_unawarded(&rfq_id, "expired").await? {
                tracing::info!(rfq = %rfq_id, rejected, "RFQ expired past deadline");
                expired += 1;
            }
        }
        Ok(expired)
    }
}
