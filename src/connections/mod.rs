//! Connection graph — directed-then-bilateral relationships between
//! companies.
//!
//! A request is proposed by one company and conceptually owned by the other,
//! who must acknowledge it. The only legal transitions are
//! `pending → active` (accept), `pending → removed` (reject), and
//! `active → removed` (either party disconnects); everything else is an
//! invalid-state error. Uniqueness per unordered (pair, kind) is a database
//! index, so the duplicate check and the insert are a single atomic step.

use std::sync::Arc;

use crate::error::{WorkflowError, WorkflowResult};
use crate::guard::{Identity, Role};
use crate::notify::{Notifier, WorkflowEvent};
use crate::storage::{RelationshipRow, Storage};

// ─── Vocabulary ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    Supplier,
    Client,
    Partner,
    Distributor,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Supplier => "supplier",
            RelationshipKind::Client => "client",
            RelationshipKind::Partner => "partner",
            RelationshipKind::Distributor => "distributor",
        }
    }

    pub fn parse(s: &str) -> WorkflowResult<Self> {
        match s {
            "supplier" => Ok(RelationshipKind::Supplier),
            "client" => Ok(RelationshipKind::Client),
            "partner" => Ok(RelationshipKind::Partner),
            "distributor" => Ok(RelationshipKind::Distributor),
            other => Err(WorkflowError::validation(format!(
                "unknown connection kind '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionDecision {
    Accept,
    Reject,
}

impl ConnectionDecision {
    pub fn parse(s: &str) -> WorkflowResult<Self> {
        match s {
            "accept" => Ok(ConnectionDecision::Accept),
            "reject" => Ok(ConnectionDecision::Reject),
            other => Err(WorkflowError::validation(format!(
                "decision must be 'accept' or 'reject', got '{other}'"
            ))),
        }
    }
}

/// Optional filter for [`ConnectionGraph::list`].
#[derive(Debug, Default, Clone)]
pub struct ConnectionFilter {
    pub kind: Option<RelationshipKind>,
    /// "pending" | "active"
    pub status: Option<String>,
}

// ─── Manager ─────────────────────────────────────────────────────────────────

pub struct ConnectionGraph {
    storage: Arc<Storage>,
    notifier: Notifier,
}

impl ConnectionGraph {
    pub fn new(storage: Arc<Storage>, notifier: Notifier) -> Self {
        Self { storage, notifier }
    }

    /// Propose a connection from the caller's company to `target_company_id`.
    pub async fn request(
        &self,
        identity: &Identity,
        target_company_id: &str,
        kind: RelationshipKind,
    ) -> WorkflowResult<RelationshipRow> {
        let source = identity.require_active_company()?.to_string();

        if source == target_company_id {
            return Err(WorkflowError::InvalidTarget(
                "a company cannot connect to itself".into(),
            ));
        }

        let target = self
            .storage
            .get_company(target_company_id)
            .await?
            .ok_or(WorkflowError::NotFound("company"))?;
        if target.status != "active" {
            return Err(WorkflowError::invalid_state(
                "target company is not active on the platform",
            ));
        }

        // Normalized pair ordering; the unique index does the duplicate check.
        let (lo, hi) = if source.as_str() < target_company_id {
            (source.as_str(), target_company_id)
        } else {
            (target_company_id, source.as_str())
        };
        let row = match self
            .storage
            .insert_relationship(lo, hi, &source, kind.as_str())
            .await
        {
            Ok(row) => row,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(WorkflowError::DuplicateRelationship)
            }
            Err(e) => return Err(e.into()),
        };

        self.notifier.send(WorkflowEvent::ConnectionRequested {
            relationship_id: row.id.clone(),
            from_company_id: source,
            to_company_id: target_company_id.to_string(),
            connection_kind: kind.as_str().to_string(),
        });
        Ok(row)
    }

    /// Accept or reject a pending request. Only the target side may respond.
    /// Returns the activated row on accept, `None` after a reject (the row is
    /// removed).
    pub async fn respond(
        &self,
        identity: &Identity,
        relationship_id: &str,
        decision: ConnectionDecision,
    ) -> WorkflowResult<Option<RelationshipRow>> {
        let acting = identity.require_active_company()?;

        let rel = self
            .storage
            .get_relationship(relationship_id)
            .await?
            .ok_or(WorkflowError::NotFound("relationship"))?;

        if rel.target_company_id() != acting {
            return Err(WorkflowError::unauthorized(
                "only the requested company may respond to a connection request",
            ));
        }
        if rel.status != "pending" {
            return Err(WorkflowError::invalid_state(format!(
                "relationship is '{}', not pending",
                rel.status
            )));
        }

        match decision {
            ConnectionDecision::Accept => {
                // CAS pending → active; losing the race to a concurrent
                // response surfaces as invalid state, not a double accept.
                if !self.storage.activate_relationship(relationship_id).await? {
                    return Err(WorkflowError::invalid_state(
                        "relationship is no longer pending",
                    ));
                }
                let row = self
                    .storage
                    .get_relationship(relationship_id)
                    .await?
                    .ok_or(WorkflowError::NotFound("relationship"))?;
                self.notifier.send(WorkflowEvent::ConnectionAccepted {
                    relationship_id: row.id.clone(),
                    a_company_id: row.a_company_id.clone(),
                    b_company_id: row.b_company_id.clone(),
                    connection_kind: row.kind.clone(),
                });
                Ok(Some(row))
            }
            ConnectionDecision::Reject => {
                if !self
                    .storage
                    .remove_relationship(relationship_id, "pending")
                    .await?
                {
                    return Err(WorkflowError::invalid_state(
                        "relationship is no longer pending",
                    ));
                }
                Ok(None)
            }
        }
    }

    /// Terminally remove an active relationship. Either party may disconnect.
    pub async fn disconnect(
        &self,
        identity: &Identity,
        relationship_id: &str,
    ) -> WorkflowResult<()> {
        let acting = identity.require_active_company()?;

        let rel = self
            .storage
            .get_relationship(relationship_id)
            .await?
            .ok_or(WorkflowError::NotFound("relationship"))?;
        if !rel.involves(acting) {
            return Err(WorkflowError::unauthorized(
                "caller's company is not a party to this relationship",
            ));
        }
        if rel.status != "active" {
            return Err(WorkflowError::invalid_state(format!(
                "relationship is '{}', not active",
                rel.status
            )));
        }
        if !self
            .storage
            .remove_relationship(relationship_id, "active")
            .await?
        {
            return Err(WorkflowError::invalid_state(
                "relationship is no longer active",
            ));
        }
        Ok(())
    }

    /// Relationships where `company_id` is either party. A company may list
    /// its own; platform admins may list anyone's.
    pub async fn list(
        &self,
        identity: &Identity,
        company_id: &str,
        filter: ConnectionFilter,
    ) -> WorkflowResult<Vec<RelationshipRow>> {
        if identity.company_id.as_deref() != Some(company_id) {
            identity.require_role(Role::Admin)?;
        }
        Ok(self
            .storage
            .list_relationships(
                company_id,
                filter.kind.map(|k| k.as_str()),
                filter.status.as_deref(),
            )
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips() {
        for kind in [
            RelationshipKind::Supplier,
            RelationshipKind::Client,
            RelationshipKind::Partner,
            RelationshipKind::Distributor,
        ] {
            assert_eq!(RelationshipKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(RelationshipKind::parse("frenemy").is_err());
    }

    #[test]
    fn decision_parses() {
        assert_eq!(
            ConnectionDecision::parse("accept").unwrap(),
            ConnectionDecision::Accept
        );
        assert!(ConnectionDecision::parse("maybe").is_err());
    }
}
