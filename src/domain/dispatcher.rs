//! Tool dispatch
//!
//! Resolves an invocation against the registry, validates its arguments, and runs the
//! handler between the start and terminal progress events. Every request ends in
//! exactly one [`InvocationResult`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    domain::{
        progress::{
            ProgressNotifier, ProgressReporter, ProgressToken, DEFAULT_START_PROGRESS,
            PROGRESS_TOTAL,
        },
        registry::{Registry, ToolDescriptor},
        schema::{validate, UnknownFieldPolicy, ValidatedArguments},
    },
    errors::InvocationError,
};

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    /// Fraction sent as the start event when the caller asked for progress.
    fn start_progress(&self) -> f64 {
        DEFAULT_START_PROGRESS
    }

    /// Runs the tool and returns its text output. Intermediate progress, if any,
    /// must stay above [`ToolHandler::start_progress`] and below the total.
    async fn call(
        &self,
        arguments: ValidatedArguments,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<String, InvocationError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub correlation_token: Option<ProgressToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text",
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: Vec<ContentItem>,
}

pub type InvocationResult = Result<ToolOutput, InvocationError>;

pub struct Dispatcher {
    registry: Arc<Registry>,
    notifier: ProgressNotifier,
    unknown_fields: UnknownFieldPolicy,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        notifier: ProgressNotifier,
        unknown_fields: UnknownFieldPolicy,
    ) -> Self {
        Self {
            registry,
            notifier,
            unknown_fields,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn dispatch(&self, request: InvocationRequest) -> InvocationResult {
        let InvocationRequest {
            tool_name,
            arguments,
            correlation_token,
        } = request;

        let Some((descriptor, handler)) = self.registry.resolve(&tool_name) else {
            debug!(tool = %tool_name, state = "rejected", "unknown tool");
            return Err(InvocationError::unknown_tool(tool_name));
        };

        let arguments = validate(&descriptor.input_schema, &arguments, self.unknown_fields)?;
        debug!(tool = %tool_name, state = "validated", "arguments accepted");

        let mut progress = ProgressReporter::new(&self.notifier, correlation_token, PROGRESS_TOTAL);
        if progress.is_active() {
            progress.report(handler.start_progress()).await?;
            debug!(tool = %tool_name, state = "notified", "start progress sent");
        }

        debug!(tool = %tool_name, state = "executing", "invoking handler");
        let text = handler.call(arguments, &mut progress).await?;

        if progress.is_active() {
            progress.complete().await?;
            debug!(tool = %tool_name, state = "notified_complete", "terminal progress sent");
        }

        Ok(ToolOutput {
            content: vec![ContentItem::text(text)],
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::{
        domain::{
            registry::ToolName,
            schema::{FieldType, InputSchema},
        },
        errors::FailureKind,
        mcp::transport::testing::RecordingSink,
    };

    enum Behavior {
        Echo,
        Fail,
        Steps(Vec<f64>),
    }

    struct ScriptedTool {
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl ScriptedTool {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ToolHandler for ScriptedTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: ToolName::AskHuman,
                description: "scripted",
                input_schema: InputSchema::new().required("question", FieldType::String),
            }
        }

        async fn call(
            &self,
            arguments: ValidatedArguments,
            progress: &mut ProgressReporter<'_>,
        ) -> Result<String, InvocationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Echo => Ok(format!(
                    "echo: {}",
                    arguments.get_str("question").unwrap_or_default()
                )),
                Behavior::Fail => Err(InvocationError::handler("nobody answered")),
                Behavior::Steps(steps) => {
                    for step in steps {
                        progress.report(*step).await?;
                    }
                    Ok("stepped".to_string())
                }
            }
        }
    }

    fn dispatcher_with(
        tool: Arc<ScriptedTool>,
        sink: Arc<RecordingSink>,
        policy: UnknownFieldPolicy,
    ) -> Dispatcher {
        let tool: Arc<dyn ToolHandler> = tool;
        let registry = Registry::new(vec![tool]).expect("registry");
        Dispatcher::new(Arc::new(registry), ProgressNotifier::new(sink), policy)
    }

    fn request(name: &str, arguments: Value, token: Option<&str>) -> InvocationRequest {
        InvocationRequest {
            tool_name: name.to_string(),
            arguments: arguments.as_object().cloned().unwrap_or_default(),
            correlation_token: token.map(|token| ProgressToken::String(token.to_string())),
        }
    }

    fn progress_values(sink: &RecordingSink) -> Vec<(Value, f64, f64)> {
        sink.messages()
            .into_iter()
            .map(|message| {
                let params = &message["params"];
                (
                    params["progressToken"].clone(),
                    params["progress"].as_f64().expect("progress"),
                    params["total"].as_f64().expect("total"),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn success_with_token_sends_start_then_terminal() {
        let sink = Arc::new(RecordingSink::default());
        let tool = ScriptedTool::new(Behavior::Echo);
        let dispatcher = dispatcher_with(tool.clone(), sink.clone(), UnknownFieldPolicy::Reject);

        let output = dispatcher
            .dispatch(request(
                "ask_human",
                json!({"question": "Is this safe?"}),
                Some("t1"),
            ))
            .await
            .expect("dispatch succeeds");

        assert_eq!(
            output.content,
            vec![ContentItem::text("echo: Is this safe?")]
        );
        assert_eq!(
            progress_values(&sink),
            vec![(json!("t1"), 0.5, 1.0), (json!("t1"), 1.0, 1.0)]
        );
        assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_without_token_sends_no_progress() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher_with(
            ScriptedTool::new(Behavior::Echo),
            sink.clone(),
            UnknownFieldPolicy::Reject,
        );

        dispatcher
            .dispatch(request("ask_human", json!({"question": "q"}), None))
            .await
            .expect("dispatch succeeds");

        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_never_validates_or_notifies() {
        let sink = Arc::new(RecordingSink::default());
        let tool = ScriptedTool::new(Behavior::Echo);
        let dispatcher = dispatcher_with(tool.clone(), sink.clone(), UnknownFieldPolicy::Reject);

        let error = dispatcher
            .dispatch(request("bogus_tool", json!({}), Some("t1")))
            .await
            .expect_err("unknown tool");

        assert_eq!(error.kind(), FailureKind::UnknownTool);
        assert!(sink.messages().is_empty());
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_question_never_reaches_handler() {
        let sink = Arc::new(RecordingSink::default());
        let tool = ScriptedTool::new(Behavior::Echo);
        let dispatcher = dispatcher_with(tool.clone(), sink.clone(), UnknownFieldPolicy::Reject);

        let error = dispatcher
            .dispatch(request("ask_human", json!({}), Some("t1")))
            .await
            .expect_err("invalid arguments");

        assert_eq!(error.kind(), FailureKind::InvalidArguments);
        assert!(sink.messages().is_empty());
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_argument_follows_configured_policy() {
        let sink = Arc::new(RecordingSink::default());
        let strict = dispatcher_with(
            ScriptedTool::new(Behavior::Echo),
            sink.clone(),
            UnknownFieldPolicy::Reject,
        );
        let error = strict
            .dispatch(request("ask_human", json!({"question": "q", "extra": 1}), None))
            .await
            .expect_err("reject policy");
        assert_eq!(error.kind(), FailureKind::InvalidArguments);

        let lenient = dispatcher_with(
            ScriptedTool::new(Behavior::Echo),
            sink,
            UnknownFieldPolicy::Ignore,
        );
        lenient
            .dispatch(request("ask_human", json!({"question": "q", "extra": 1}), None))
            .await
            .expect("ignore policy");
    }

    #[tokio::test]
    async fn handler_failure_suppresses_terminal_progress() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher_with(
            ScriptedTool::new(Behavior::Fail),
            sink.clone(),
            UnknownFieldPolicy::Reject,
        );

        let error = dispatcher
            .dispatch(request("ask_human", json!({"question": "q"}), Some("t1")))
            .await
            .expect_err("handler fails");

        assert_eq!(error.kind(), FailureKind::HandlerError);
        assert_eq!(progress_values(&sink), vec![(json!("t1"), 0.5, 1.0)]);
    }

    #[tokio::test]
    async fn handler_failure_without_token_sends_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher_with(
            ScriptedTool::new(Behavior::Fail),
            sink.clone(),
            UnknownFieldPolicy::Reject,
        );

        dispatcher
            .dispatch(request("ask_human", json!({"question": "q"}), None))
            .await
            .expect_err("handler fails");

        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn handler_may_report_intermediate_progress() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher_with(
            ScriptedTool::new(Behavior::Steps(vec![0.6, 0.9])),
            sink.clone(),
            UnknownFieldPolicy::Reject,
        );

        dispatcher
            .dispatch(request("ask_human", json!({"question": "q"}), Some("t1")))
            .await
            .expect("dispatch succeeds");

        let progress = progress_values(&sink)
            .into_iter()
            .map(|(_, progress, _)| progress)
            .collect::<Vec<_>>();
        assert_eq!(progress, vec![0.5, 0.6, 0.9, 1.0]);
    }

    #[tokio::test]
    async fn start_notification_write_failure_is_transport_error() {
        let sink = Arc::new(RecordingSink::failing_after(0));
        let tool = ScriptedTool::new(Behavior::Echo);
        let dispatcher = dispatcher_with(tool.clone(), sink, UnknownFieldPolicy::Reject);

        let error = dispatcher
            .dispatch(request("ask_human", json!({"question": "q"}), Some("t1")))
            .await
            .expect_err("transport fails");

        assert_eq!(error.kind(), FailureKind::TransportError);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn terminal_notification_write_failure_is_transport_error() {
        let sink = Arc::new(RecordingSink::failing_after(1));
        let dispatcher = dispatcher_with(
            ScriptedTool::new(Behavior::Echo),
            sink.clone(),
            UnknownFieldPolicy::Reject,
        );

        let error = dispatcher
            .dispatch(request("ask_human", json!({"question": "q"}), Some("t1")))
            .await
            .expect_err("transport fails");

        assert_eq!(error.kind(), FailureKind::TransportError);
        assert_eq!(sink.messages().len(), 1);
    }
}
