//! Actions and their invocation
//!
//! An action is a schema-typed side effect. An invocation runs on its own
//! task and reports through a bounded channel: any number of progress events
//! followed by exactly one completion event.

use crate::context::Context;
use crate::error::PlugkitError;
use crate::protocol::InvokeActionEvent;
use crate::schema::Schema;
use crate::types::{ClientCapabilities, Deferred, Diagnostics};
use crate::value::Value;
use async_trait::async_trait;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

const EVENT_BUFFER: usize = 16;

/// Base trait for actions
#[async_trait]
pub trait Action: Send + Sync {
    /// MUST match the key used in Provider.actions()
    fn type_name(&self) -> &str;

    async fn schema(&self, ctx: Context, request: ActionSchemaRequest) -> ActionSchemaResponse;

    async fn configure(
        &mut self,
        _ctx: Context,
        _request: ConfigureActionRequest,
    ) -> ConfigureActionResponse {
        ConfigureActionResponse::default()
    }

    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateActionConfigRequest,
    ) -> ValidateActionConfigResponse {
        ValidateActionConfigResponse::default()
    }

    /// Planning an unchanged configuration must give the same result
    async fn plan(&self, _ctx: Context, _request: PlanActionRequest) -> PlanActionResponse {
        PlanActionResponse::default()
    }

    /// Runs the side effect, reporting progress through `progress`
    async fn invoke(
        &self,
        ctx: Context,
        request: InvokeActionRequest,
        progress: ProgressSink,
    ) -> InvokeActionResponse;
}

pub struct ActionSchemaRequest;

pub struct ActionSchemaResponse {
    pub schema: Schema,
    pub diagnostics: Diagnostics,
}

pub struct ConfigureActionRequest {
    pub provider_data: Option<Arc<dyn Any + Send + Sync>>,
}

#[derive(Default)]
pub struct ConfigureActionResponse {
    pub diagnostics: Diagnostics,
}

pub struct ValidateActionConfigRequest {
    pub action_type: String,
    pub config: Value,
}

#[derive(Default)]
pub struct ValidateActionConfigResponse {
    pub diagnostics: Diagnostics,
}

pub struct PlanActionRequest {
    pub action_type: String,
    pub config: Value,
    pub client_capabilities: ClientCapabilities,
}

#[derive(Default)]
pub struct PlanActionResponse {
    pub diagnostics: Diagnostics,
    pub deferred: Option<Deferred>,
}

pub struct InvokeActionRequest {
    pub action_type: String,
    pub config: Value,
}

#[derive(Default)]
pub struct InvokeActionResponse {
    pub diagnostics: Diagnostics,
}

/// Handed to an action while it runs.
#[derive(Clone)]
pub struct ProgressSink {
    tx: mpsc::Sender<InvokeActionEvent>,
}

impl ProgressSink {
    /// Sends a progress message. Returns false once the caller has stopped
    /// listening.
    pub async fn send(&self, message: impl Into<String>) -> bool {
        self.tx
            .send(InvokeActionEvent::Progress {
                message: message.into(),
            })
            .await
            .is_ok()
    }
}

/// Runs `invoke` on a new task and returns its event stream. Cancelling
/// `ctx` abandons the invocation and completes the stream with a
/// cancellation diagnostic.
pub fn spawn_invocation<F, Fut>(
    ctx: Context,
    action_type: &str,
    invoke: F,
) -> ReceiverStream<InvokeActionEvent>
where
    F: FnOnce(ProgressSink) -> Fut + Send + 'static,
    Fut: Future<Output = Diagnostics> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let sink = ProgressSink { tx: tx.clone() };
    let action_type = action_type.to_string();

    tokio::spawn(async move {
        debug!(action_type = %action_type, "action invocation started");
        let diagnostics = tokio::select! {
            diagnostics = invoke(sink) => diagnostics,
            _ = ctx.cancelled() => {
                let err = ctx.err().unwrap_or(PlugkitError::Cancelled);
                warn!(action_type = %action_type, error = %err, "action invocation abandoned");
                Diagnostics::from(err.into_diagnostic())
            }
        };
        debug!(
            action_type = %action_type,
            errors = diagnostics.has_errors(),
            "action invocation finished"
        );
        let _ = tx.send(InvokeActionEvent::Completed { diagnostics }).await;
    });

    ReceiverStream::new(rx)
}

/// The observable result of an invocation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ActionOutcome {
    pub progress: Vec<String>,
    pub diagnostics: Diagnostics,
    pub completed: bool,
}

/// Drains an event stream.
pub async fn collect(mut events: ReceiverStream<InvokeActionEvent>) -> ActionOutcome {
    let mut outcome = ActionOutcome::default();
    while let Some(event) = events.next().await {
        match event {
            InvokeActionEvent::Progress { message } => outcome.progress.push(message),
            InvokeActionEvent::Completed { diagnostics } => {
                outcome.diagnostics = diagnostics;
                outcome.completed = true;
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn progress_precedes_single_completion() {
        let events = spawn_invocation(Context::new(), "corner_action", |sink| async move {
            for step in 1..=3 {
                sink.send(format!("step {}", step)).await;
            }
            Diagnostics::new()
        });

        let outcome = collect(events).await;
        assert_eq!(outcome.progress, vec!["step 1", "step 2", "step 3"]);
        assert!(outcome.completed);
        assert!(!outcome.diagnostics.has_errors());
    }

    #[tokio::test]
    async fn failure_is_reported_in_completion() {
        let events = spawn_invocation(Context::new(), "corner_action", |_| async {
            let mut diagnostics = Diagnostics::new();
            diagnostics.add_error("Invocation Failed", "boom");
            diagnostics
        });

        let outcome = collect(events).await;
        assert!(outcome.progress.is_empty());
        assert!(outcome.diagnostics.has_errors());
    }

    #[tokio::test]
    async fn cancellation_completes_the_stream() {
        let ctx = Context::new();
        let events = spawn_invocation(ctx.clone(), "corner_action", |sink| async move {
            sink.send("waiting").await;
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Diagnostics::new()
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel();

        let outcome = collect(events).await;
        assert!(outcome.completed);
        assert_eq!(
            outcome.diagnostics.iter().next().unwrap().summary,
            "Operation Cancelled"
        );
    }
}
