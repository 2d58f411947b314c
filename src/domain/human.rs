//! The `ask_human` tool and the responders that actually reach a person
//!
//! [`PlaceholderResponder`] answers immediately with a canned reply; [`CommandResponder`]
//! hands the question to an external program (a dialog, a chat bridge, ...) and
//! uses whatever it prints as the answer.

use std::{process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{info, warn};

use crate::{
    domain::{
        dispatcher::ToolHandler,
        progress::ProgressReporter,
        registry::{ToolDescriptor, ToolName},
        schema::{FieldType, InputSchema, ValidatedArguments},
    },
    errors::InvocationError,
};

#[async_trait]
pub trait HumanResponder: Send + Sync {
    async fn answer(&self, question: &str) -> Result<String, InvocationError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderResponder;

#[async_trait]
impl HumanResponder for PlaceholderResponder {
    async fn answer(&self, question: &str) -> Result<String, InvocationError> {
        Ok(format!("hello, I am human!, you question is: {question}"))
    }
}

#[derive(Debug, Clone)]
pub struct CommandResponder {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandResponder {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl HumanResponder for CommandResponder {
    async fn answer(&self, question: &str) -> Result<String, InvocationError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(question)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                warn!(program = %self.program, timeout = ?self.timeout, "responder timed out");
                InvocationError::handler(format!("no answer within {:?}", self.timeout))
            })?
            .map_err(|err| {
                InvocationError::handler(format!("failed to run `{}`: {err}", self.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InvocationError::handler(format!(
                "`{}` exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let answer = String::from_utf8(output.stdout)
            .map_err(|_| InvocationError::handler("answer is not valid UTF-8"))?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(InvocationError::handler("the human gave no answer"));
        }

        Ok(answer.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct AskHumanArgs {
    pub question: String,
}

pub struct AskHumanTool {
    responder: Arc<dyn HumanResponder>,
    start_progress: f64,
}

impl AskHumanTool {
    pub fn new(responder: Arc<dyn HumanResponder>, start_progress: f64) -> Self {
        Self {
            responder,
            start_progress,
        }
    }
}

#[async_trait]
impl ToolHandler for AskHumanTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: ToolName::AskHuman,
            description: "Ask any question to real human",
            input_schema: InputSchema::new()
                .required("question", FieldType::String)
                .described("The question to put to the human"),
        }
    }

    fn start_progress(&self) -> f64 {
        self.start_progress
    }

    async fn call(
        &self,
        arguments: ValidatedArguments,
        _progress: &mut ProgressReporter<'_>,
    ) -> Result<String, InvocationError> {
        let args: AskHumanArgs = arguments.into_typed()?;
        info!(question_chars = args.question.chars().count(), "soliciting human answer");

        let answer = self.responder.answer(&args.question).await?;
        Ok(format!("Human answer:\n{answer}"))
    }
}
