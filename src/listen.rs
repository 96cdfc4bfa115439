//! `tvcomet listen`: follow a server's live updates from the terminal.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tvcomet_client::{ChannelExit, CometContext, Transport, TransportKind};
use tvcomet_core::{LogPanel, ReloadReason};
use tvcomet_settings::ClientSettings;

/// Classes followed when none are named.
pub const DEFAULT_CLASSES: &[&str] = &["logmessage", "accessUpdate", "setServerIpPort"];

/// Print every event of `classes` as a JSON line on stdout.
///
/// `logmessage` events also go to the log panel, the way the console shows
/// server log lines.
pub fn register_printers(ctx: &CometContext, classes: &[String]) {
    for class in classes {
        let log = Arc::clone(ctx.log());
        let is_log = class == "logmessage";
        let _ = ctx.dispatcher().on(class.clone(), move |event| {
            println!("{}", event.to_value());
            if let Some(text) = event.get_str("logtxt").filter(|_| is_log) {
                log.info(text);
            }
            Ok(())
        });
    }
}

/// Run channels until cancelled, rebuilding all client state on every
/// reload.
///
/// The log panel survives reloads. Returns the number of reloads.
/// Reloads are separated by the short retry delay.
pub async fn run(
    settings: ClientSettings,
    classes: &[String],
    forced: Option<TransportKind>,
    cancel: CancellationToken,
) -> Result<u32> {
    let log = Arc::new(LogPanel::new(settings.log_panel_capacity));
    let mut reloads = 0u32;
    loop {
        let ctx = CometContext::with_log(settings.clone(), Arc::clone(&log))
            .context("Failed to build live update client")?;
        register_printers(&ctx, classes);
        let kind = forced.unwrap_or_else(|| ctx.select_transport());
        info!(transport = %kind, base_url = %ctx.endpoints().base(), "following live updates");

        let transport =
            Transport::start(Arc::new(ctx), kind).context("Failed to start live update channel")?;
        match transport.run(cancel.clone()).await {
            ChannelExit::Cancelled => return Ok(reloads),
            ChannelExit::Reload(reason) => {
                reloads += 1;
                warn!(%reason, reloads, "reloading live update client");
                if let ReloadReason::TooManyFailures { .. } = reason {
                    log.error(format!("Reloading: {reason}"));
                }
                tokio::select! {
                    () = cancel.cancelled() => return Ok(reloads),
                    () = tokio::time::sleep(settings.short_retry_delay()) => {}
                }
            }
        }
    }
}
