//! Subscriber setup for the binary.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tvcomet_server::{CometLogLayer, MailboxHub};
use tvcomet_settings::LoggingSettings;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. When `hub` is given and the
/// bridge is enabled, log lines are also delivered to connected consoles as
/// `logmessage` events. Later calls are no-ops.
pub fn init(settings: &LoggingSettings, hub: Option<Arc<MailboxHub>>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_filter_str()));

    let compact = (!settings.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
    });
    let json = settings.json.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .json()
    });
    let bridge = hub
        .filter(|_| settings.comet_bridge)
        .map(CometLogLayer::new);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(compact)
        .with(json)
        .with(bridge)
        .try_init();
}
