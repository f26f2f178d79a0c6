//! EditTransaction - private working copy of the plan

use tracing::debug;

use super::edit::{EditError, PlanEdit};
use super::error::{SessionError, SessionResult};
use crate::domain::StructuredPlan;

/// A scoped, cancellable mutation context over a deep copy of the plan
///
/// Nothing outside the transaction sees the copy until it is committed. Dropping
/// the transaction is a cancel.
#[derive(Debug, Clone)]
pub struct EditTransaction {
    draft: StructuredPlan,
    base_revision: u64,
}

impl EditTransaction {
    /// Copy `plan`, remembering the plan revision it was taken from
    pub fn open(plan: Option<&StructuredPlan>, revision: u64) -> SessionResult<Self> {
        debug!(revision, "EditTransaction::open: called");
        let plan = plan.ok_or(SessionError::NoPlanToEdit)?;
        Ok(Self {
            draft: plan.clone(),
            base_revision: revision,
        })
    }

    /// Apply an arbitrary change to the copy
    pub fn mutate<F>(&mut self, updater: F)
    where
        F: FnOnce(&mut StructuredPlan),
    {
        updater(&mut self.draft);
    }

    /// Apply one list-editing primitive to the copy
    pub fn apply(&mut self, edit: &PlanEdit) -> Result<(), EditError> {
        debug!(?edit, "EditTransaction::apply: called");
        edit.apply(&mut self.draft)
    }

    pub fn draft(&self) -> &StructuredPlan {
        &self.draft
    }

    pub fn base_revision(&self) -> u64 {
        self.base_revision
    }

    /// True when the committed plan has moved on since the copy was taken
    pub fn is_stale(&self, current_revision: u64) -> bool {
        current_revision != self.base_revision
    }

    pub fn into_plan(self) -> StructuredPlan {
        self.draft
    }
}
