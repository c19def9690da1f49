//! Respawn trigger evaluation.

use tracing::debug;

use crate::driver::WorkStore;
use crate::models::identity::AgentIdentity;
use crate::models::policy::RespawnTrigger;
use crate::models::work_item::{WorkFilter, MERGE_REQUEST_ITEM_TYPE, TASK_ITEM_TYPE};
use crate::Result;

/// Whether `trigger` currently allows respawning `identity`.
///
/// Queue and work triggers are scoped to the agent's project; an agent
/// without a project scope is always allowed.
///
/// # Errors
///
/// Returns `AppError::Store` if the store cannot be queried.
pub async fn trigger_satisfied(
    store: &dyn WorkStore,
    identity: &AgentIdentity,
    trigger: RespawnTrigger,
) -> Result<bool> {
    let filter = match (trigger, identity.project()) {
        (RespawnTrigger::Always, _) | (_, None) => return Ok(true),
        (RespawnTrigger::QueueNotEmpty, Some(project)) => WorkFilter::of_type(MERGE_REQUEST_ITEM_TYPE)
            .open()
            .in_project(project),
        (RespawnTrigger::WorkAvailable, Some(project)) => WorkFilter::of_type(TASK_ITEM_TYPE)
            .open()
            .in_project(project)
            .unassigned(),
    };

    let pending = store.list(&filter).await?.len();
    debug!(agent = %identity, ?trigger, pending, "evaluated respawn trigger");
    Ok(pending > 0)
}
