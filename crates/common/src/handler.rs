use async_trait::async_trait;

use crate::types::GameOutcomeEvent;

/// Consumer of enriched outcome events.
///
/// The ingestor calls this once per decoded chain event, each call in its own
/// task. Implementations handle their own failures; nothing is propagated back
/// to the subscription.
#[async_trait]
pub trait OutcomeHandler: Send + Sync {
    async fn handle(&self, event: GameOutcomeEvent);
}
