//! second-brain-voice: development harness for the voice engine
//!
//! Runs the lifecycle controller against the simulated platform:
//! - reads script lines (JSON) from stdin to inject speech, audio and requests
//! - writes every emitted event as one JSON line to stdout
//! - logs to stderr, filtered by `RUST_LOG`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use second_brain_voice::lifecycle::ShutdownSignal;
use second_brain_voice::sim::{simulated_platform, ScriptLine};
use second_brain_voice::{Config, ControlRequest, LifecycleController, SharedSettings, VoiceEvent};

/// Time given to in-flight events after the script ends
const SCRIPT_DRAIN_GRACE: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "second-brain-voice starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    let table = Arc::new(config.command_table()?);
    info!(
        hands_free = config.hands_free,
        commands = table.commands().len(),
        "configuration loaded"
    );

    let shutdown = ShutdownSignal::new();
    let settings = Arc::new(SharedSettings::new(config.hands_free));

    // Platform and requests -> controller
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    // Controller -> event printer
    let (event_tx, mut event_rx) = broadcast::channel::<VoiceEvent>(256);

    let (platform, sim) = simulated_platform(input_tx.clone());
    let mut controller = LifecycleController::new(
        platform,
        table,
        settings.clone(),
        config.controller.clone(),
        event_tx,
        input_tx.clone(),
    );

    if config.hands_free {
        input_tx.send(ControlRequest::StartAmbient.into())?;
    }

    let script_shutdown = shutdown.clone();
    let script_tx = input_tx.clone();
    let script_settings = settings.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    let step = match ScriptLine::parse(&line) {
                        Ok(step) => step,
                        Err(e) => {
                            warn!(error = %e, "skipping script line");
                            continue;
                        }
                    };
                    if let Err(e) = step.apply(&sim, &script_settings, &script_tx).await {
                        error!(error = %e, "script step failed");
                        break;
                    }
                }
                Ok(None) => {
                    info!("script input exhausted");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "failed to read script input");
                    break;
                }
            }
        }
        tokio::time::sleep(SCRIPT_DRAIN_GRACE).await;
        script_shutdown.trigger();
    });

    info!("voice engine initialized, entering main loop");

    tokio::select! {
        // Run the controller (processes requests and platform events)
        _ = controller.run(input_rx) => {
            info!("controller exited");
        }

        // Print emitted events for the consumer on stdout
        _ = async {
            let mut stdout = tokio::io::stdout();
            loop {
                match event_rx.recv().await {
                    Ok(event) => {
                        let mut line = match serde_json::to_vec(&event) {
                            Ok(line) => line,
                            Err(e) => {
                                error!(error = %e, "failed to encode event");
                                continue;
                            }
                        };
                        line.push(b'\n');
                        if let Err(e) = stdout.write_all(&line).await {
                            error!(error = %e, "failed to write event");
                            break;
                        }
                        let _ = stdout.flush().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event printer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("event printer exited");
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown requested"),
                Err(e) => error!(error = %e, "failed to listen for shutdown signals"),
            }
        }
    }

    info!("second-brain-voice stopped");

    Ok(())
}
