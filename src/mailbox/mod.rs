//! Company-to-company messaging. Delivery rides on the connection graph:
//! a message can only pass between companies linked by an active
//! relationship.

use std::sync::Arc;

use crate::error::{WorkflowError, WorkflowResult};
use crate::guard::{AccessGuard, Identity, Role};
use crate::notify::{Notifier, WorkflowEvent};
use crate::storage::{MessageRow, Storage};

const MAX_BODY_LEN: usize = 10_000;
const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 200;

pub struct Mailbox {
    storage: Arc<Storage>,
    guard: Arc<AccessGuard>,
    notifier: Notifier,
}

impl Mailbox {
    pub fn new(storage: Arc<Storage>, guard: Arc<AccessGuard>, notifier: Notifier) -> Self {
        Self {
            storage,
            guard,
            notifier,
        }
    }

    pub async fn send(
        &self,
        identity: &Identity,
        recipient_company_id: &str,
        body: &str,
    ) -> WorkflowResult<MessageRow> {
        let sender = identity.require_active_company()?.to_string();

        let body = body.trim();
        if body.is_empty() {
            return Err(WorkflowError::validation("message body must not be empty"));
        }
        if body.len() > MAX_BODY_LEN {
            return Err(WorkflowError::validation(format!(
                "message body exceeds {MAX_BODY_LEN} bytes"
            )));
        }
        if recipient_company_id == sender {
            return Err(WorkflowError::InvalidTarget(
                "a company cannot message itself".into(),
            ));
        }
        self.storage
            .get_company(recipient_company_id)
            .await?
            .ok_or(WorkflowError::NotFound("company"))?;

        if !self
            .storage
            .has_active_relationship(&sender, recipient_company_id)
            .await?
        {
            return Err(WorkflowError::forbidden(
                "messaging requires an active connection between the companies",
            ));
        }

        let row = self
            .storage
            .create_message(&sender, recipient_company_id, &identity.user_id, body)
            .await?;

        self.notifier.send(WorkflowEvent::MessageReceived {
            message_id: row.id.clone(),
            from_company_id: sender,
            to_company_id: recipient_company_id.to_string(),
        });
        Ok(row)
    }

    /// Newest-first page of the thread with another company. Only members of
    /// either company (or platform admins) may read it.
    pub async fn thread(
        &self,
        identity: &Identity,
        company_a: &str,
        company_b: &str,
        limit: Option<i64>,
        before: Option<&str>,
    ) -> WorkflowResult<Vec<MessageRow>> {
        if self
            .guard
            .require_company_membership(identity, company_a)
            .is_err()
            && self
                .guard
                .require_company_membership(identity, company_b)
                .is_err()
        {
            identity.require_role(Role::Admin)?;
        }
        let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
        Ok(self
            .storage
            .list_thread(company_a, company_b, limit, before)
            .await?)
    }
}
