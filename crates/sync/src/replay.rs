//! Dispatching queued operations back at the remote store.

use crate::manager::CacheManager;
use async_trait::async_trait;
use lectern_model::{ProjectorRef, Translation};
use lectern_queue::{OperationKind, PendingOperation, ReplayError, ReplayHandler};
use serde::{Deserialize, Serialize};

/// Queue payload for a deferred projection-channel write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectorPayload {
    pub channel: String,
    pub reference: ProjectorRef,
}

/// Map a remote failure onto retry semantics: permission failures are
/// permanent (a credential change is required for success), everything
/// else gets retried.
fn classify(err: lectern_remote::error::Error) -> ReplayError {
    match (*err).is_permission() {
        true => ReplayError::Permanent(err.to_string()),
        false => ReplayError::Transient(err.to_string()),
    }
}

/// A payload that doesn't decode can never succeed, no matter how often
/// it's retried.
fn undecodable(err: lectern_queue::error::Error) -> ReplayError {
    ReplayError::Permanent(err.to_string())
}

#[async_trait]
impl ReplayHandler for CacheManager {
    async fn replay(&self, operation: &PendingOperation) -> Result<(), ReplayError> {
        match operation.kind() {
            Some(OperationKind::SaveTranslation) => {
                // Raw re-attempt of the original save.
                let translation: Translation = operation.payload_as().map_err(undecodable)?;
                self.push_remote(&translation).await.map_err(classify)
            },
            Some(OperationKind::MergeTranslation) => {
                let incoming: Translation = operation.payload_as().map_err(undecodable)?;
                self.replay_merge(incoming).await.map_err(classify)
            },
            Some(OperationKind::SendToProjector) => {
                let payload: ProjectorPayload = operation.payload_as().map_err(undecodable)?;
                self.remote_store()
                    .save_projection_channel(&payload.channel, &payload.reference)
                    .await
                    .map_err(classify)
            },
            // The queue drops unrecognized tags before dispatching.
            None => Err(ReplayError::Permanent(format!("unrecognized operation tag: {}", operation.tag))),
        }
    }
}
