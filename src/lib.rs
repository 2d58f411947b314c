use std::sync::Arc;

pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod mcp;

use config::Config;
use domain::{
    dispatcher::{Dispatcher, ToolHandler},
    human::{AskHumanTool, CommandResponder, HumanResponder, PlaceholderResponder},
    progress::ProgressNotifier,
    registry::{Registry, RegistryError},
};
use mcp::{session::Session, transport::MessageSink};

/// Picks the responder the configuration asks for.
pub fn build_responder(config: &Config) -> Arc<dyn HumanResponder> {
    match &config.responder_command {
        Some(command) => Arc::new(CommandResponder::new(
            command.program.clone(),
            command.args.clone(),
            config.responder_timeout,
        )),
        None => Arc::new(PlaceholderResponder),
    }
}

pub fn build_session(config: &Config, sink: Arc<dyn MessageSink>) -> Result<Session, RegistryError> {
    build_session_with(config, build_responder(config), sink)
}

pub fn build_session_with(
    config: &Config,
    responder: Arc<dyn HumanResponder>,
    sink: Arc<dyn MessageSink>,
) -> Result<Session, RegistryError> {
    let ask_human: Arc<dyn ToolHandler> =
        Arc::new(AskHumanTool::new(responder, config.start_progress));
    let registry = Arc::new(Registry::new(vec![ask_human])?);
    let notifier = ProgressNotifier::new(Arc::clone(&sink));
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        notifier,
        config.unknown_arguments,
    ));

    Ok(Session::new(dispatcher, sink))
}
