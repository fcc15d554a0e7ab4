//! `run`: long-running host.
//!
//! Brings every selected account online, then serves JSON-line commands
//! from stdin (`{"device": "...", ...params}`) until Ctrl-C.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use sonofly_core::{Hub, RawCommand};

use crate::cli::{GlobalOpts, RunArgs};
use crate::config;
use crate::error::CliError;

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = config::load(global)?;
    let legacy = config::legacy_file(global);
    if sonofly_config::import_legacy_yaml(&mut cfg, &legacy) {
        sonofly_config::save_config_to(&cfg, &config::config_file(global))?;
        info!(path = %legacy.display(), "legacy account imported");
    }

    let accounts = config::selected_accounts(&cfg, global)?;
    let hub = config::build_hub(&cfg)?;

    for account in accounts {
        let id = account.id();
        if let Err(e) = hub.setup_account(account).await {
            error!(account = %id, error = %e, "cannot set up account");
        }
    }
    info!("running, press Ctrl-C to stop");

    let served = if args.no_stdin {
        tokio::signal::ctrl_c().await.map_err(CliError::from)
    } else {
        serve_stdin(&hub).await
    };

    hub.shutdown().await;
    served
}

async fn serve_stdin(hub: &Hub) -> Result<(), CliError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res?;
                return Ok(());
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => handle_line(hub, &line).await,
                None => {
                    debug!("stdin closed, waiting for Ctrl-C");
                    stdin_open = false;
                }
            },
        }
    }
}

async fn handle_line(hub: &Hub, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<RawCommand>(line) {
        Ok(command) => {
            if let Some(done) = hub.handle(command).await {
                debug!(?done, "command handled");
            }
        }
        Err(e) => warn!(error = %e, "ignoring malformed command line"),
    }
}
