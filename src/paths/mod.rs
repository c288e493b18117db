use async_trait::async_trait;

use crate::models::{AutomationResult, ExecutionKind, ProductData, RegistrationAttempt};

pub mod api;
pub mod automation;

pub use api::DirectApiPath;
pub use automation::{BrowserAutomationPath, BrowserSession, DriverPool};

/// One way of driving a marketplace: a documented HTTP API or a scripted
/// browser session. Implementations never propagate errors; every outcome,
/// including infrastructure failure, comes back as an `AutomationResult`
/// with an error code the orchestrator can classify.
#[async_trait]
pub trait ExecutionPath: Send + Sync {
    fn kind(&self) -> ExecutionKind;

    async fn execute(
        &self,
        attempt: &RegistrationAttempt,
        product: &ProductData,
    ) -> AutomationResult;
}
