use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use tiergate_config::{ConfigLoader, GateConfig};

use super::Host;
use crate::protocol;

pub(super) async fn cmd_run(config: GateConfig, config_loader: ConfigLoader) -> tiergate_core::Result<()> {
    let Host { gate, store, audit } = Host::open(&config)?;

    let audit_task = audit.map(|(log, rx)| tokio::spawn(log.follow(rx)));

    // Start config hot-reload watcher (kept alive until shutdown)
    let reload_gate = Arc::clone(&gate);
    let watcher = match config_loader.watch(move |new_config| {
        if let Err(e) = reload_gate.load_constraint_catalog(new_config.catalog.clone()) {
            warn!(error = %e, "catalog reload rejected, keeping current catalog");
        }
    }) {
        Ok(w) => {
            info!(path = %config_loader.path().display(), "config hot-reload enabled");
            Some(w)
        }
        Err(e) => {
            warn!(error = %e, "config hot-reload disabled");
            None
        }
    };

    info!(
        state = %store.path().display(),
        initial_tier = %config.catalog.initial_tier,
        "serving decisions on stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut served = 0u64;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let (reply, tier_changed) = protocol::respond(&gate, line);
                stdout.write_all(reply.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
                served += 1;

                if tier_changed {
                    if let Err(e) = store.save(&gate.export()) {
                        warn!(error = %e, "failed to persist tier state");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("interrupt received, shutting down");
                break;
            }
        }
    }

    store.save(&gate.export())?;
    info!(served, "decision stream closed");

    // Dropping every gate handle closes the event bus and ends the audit task.
    drop(watcher);
    drop(gate);
    if let Some(task) = audit_task {
        let _ = task.await;
    }
    Ok(())
}
