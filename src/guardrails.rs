use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;

/// Injected time source so expiry is testable without sleeping.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// A write operation held back until the user confirms it.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub action_id: String,
    pub user_id: String,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    /// Execution hints consumed on confirm, e.g. `is_navigation`.
    pub data: Value,
    /// Human-readable summary shown to the user before confirming.
    pub preview: Value,
    pub created_at_secs: u64,
}

#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    /// User declined; nothing executes.
    Rejected,
    /// User approved; the caller runs the held operation.
    Execute {
        tool_name: String,
        arguments: Map<String, Value>,
        data: Value,
    },
}

/// In-memory store of pending confirmations, one entry per proposed write.
///
/// Entries are single-use and owner-bound: a confirmation consumes the
/// entry, and only the proposing user may confirm or reject it. Expiry is
/// lazy, checked on access, with `sweep_expired` available for periodic
/// cleanup.
pub struct GuardrailStore {
    pending: Mutex<HashMap<String, PendingAction>>,
    ttl_secs: u64,
    clock: Box<dyn Clock>,
}

impl GuardrailStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self::with_clock(ttl_secs, Box::new(SystemClock))
    }

    pub fn with_clock(ttl_secs: u64, clock: Box<dyn Clock>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ttl_secs,
            clock,
        }
    }

    /// Park a write operation and hand back the entry the model relays to
    /// the user (the action_id is what `confirm_action` keys on).
    pub fn propose(
        &self,
        user_id: &str,
        tool_name: &str,
        arguments: Map<String, Value>,
        data: Value,
        preview: Value,
    ) -> PendingAction {
        let action = PendingAction {
            action_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            tool_name: tool_name.to_string(),
            arguments,
            data,
            preview,
            created_at_secs: self.clock.now_secs(),
        };
        debug!(action_id = %action.action_id, tool = %tool_name, "pending action stored");
        self.pending
            .lock()
            .expect("guardrail mutex poisoned")
            .insert(action.action_id.clone(), action.clone());
        action
    }

    /// Resolve a pending action. The entry is consumed on any owner
    /// decision; a wrong-user attempt leaves it in place for its owner.
    pub fn confirm(
        &self,
        action_id: &str,
        user_id: &str,
        confirmed: bool,
    ) -> Result<ConfirmOutcome, AppError> {
        let mut pending = self.pending.lock().expect("guardrail mutex poisoned");

        let Some(action) = pending.get(action_id) else {
            return Err(AppError::ActionNotFound);
        };

        if self.is_expired(action) {
            pending.remove(action_id);
            return Err(AppError::ActionNotFound);
        }

        if action.user_id != user_id {
            return Err(AppError::ActionForbidden);
        }

        let action = pending
            .remove(action_id)
            .ok_or(AppError::ActionNotFound)?;

        if !confirmed {
            debug!(action_id = %action_id, "pending action rejected by user");
            return Ok(ConfirmOutcome::Rejected);
        }

        debug!(action_id = %action_id, tool = %action.tool_name, "pending action confirmed");
        Ok(ConfirmOutcome::Execute {
            tool_name: action.tool_name,
            arguments: action.arguments,
            data: action.data,
        })
    }

    pub fn sweep_expired(&self) {
        let mut pending = self.pending.lock().expect("guardrail mutex poisoned");
        pending.retain(|_, action| !self.is_expired(action));
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("guardrail mutex poisoned").len()
    }

    fn is_expired(&self, action: &PendingAction) -> bool {
        self.clock.now_secs().saturating_sub(action.created_at_secs) > self.ttl_secs
    }
}
