use std::sync::Arc;

use ask_human_mcp::{
    build_session,
    config::Config,
    logging,
    mcp::transport::{LineSink, MessageSink},
};
use tokio::io::BufReader;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let sink: Arc<dyn MessageSink> = Arc::new(LineSink::new(tokio::io::stdout()));
    let session = build_session(&config, sink)?;

    info!(
        unknown_arguments = ?config.unknown_arguments,
        start_progress = config.start_progress,
        responder = config
            .responder_command
            .as_ref()
            .map_or("placeholder", |command| command.program.as_str()),
        "server starting on stdio"
    );

    session.run(BufReader::new(tokio::io::stdin())).await?;
    Ok(())
}
