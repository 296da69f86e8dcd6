//! Application orchestrator: wires the configuration into the server.

use std::sync::Arc;

use wsecho_server::{EchoHandler, EchoServer};

use crate::config::Config;

/// Runs the server until Ctrl-C or until the accept loop fails.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let handler = EchoHandler::new(config.echo_suffix.clone());
    let server = EchoServer::new(config.server_config(), handler);

    let server_run = Arc::clone(&server);
    let mut accept_loop = tokio::spawn(async move { server_run.run().await });

    let finished_early = tokio::select! {
        result = &mut accept_loop => Some(result),
        result = tokio::signal::ctrl_c() => {
            result?;
            None
        }
    };

    match finished_early {
        // Only a bind or socket failure ends the loop on its own.
        Some(result) => result??,
        None => {
            tracing::info!("Ctrl-C received, shutting down");
            server.shutdown();
            accept_loop.await??;
        }
    }

    Ok(())
}
