use std::sync::Mutex;

use async_trait::async_trait;
use metrics::counter;

use common_types::UserAction;

use crate::api::CollectError;

pub mod kafka;

/// Where validated actions go. The gateway itself is stateless: a sink
/// either acknowledges durable hand-off or returns an error the caller can
/// act on, it never buffers past the request.
#[async_trait]
pub trait ActionSink {
    async fn send(&self, action: UserAction) -> Result<(), CollectError>;
}

/// Logs actions instead of publishing them. For local runs.
pub struct PrintSink {}

#[async_trait]
impl ActionSink for PrintSink {
    async fn send(&self, action: UserAction) -> Result<(), CollectError> {
        tracing::info!("action: {:?}", action);
        counter!("capture_actions_ingested_total").increment(1);

        Ok(())
    }
}

/// Collects actions in memory. For tests.
#[derive(Default)]
pub struct MemorySink {
    actions: Mutex<Vec<UserAction>>,
}

impl MemorySink {
    pub fn actions(&self) -> Vec<UserAction> {
        self.actions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionSink for MemorySink {
    async fn send(&self, action: UserAction) -> Result<(), CollectError> {
        self.actions.lock().unwrap().push(action);
        Ok(())
    }
}
