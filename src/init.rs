use crate::client::Client;
use crate::layer::RavenLayer;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the global subscriber installed by [`init_tracing_with_config`].
///
/// **Fields**
/// - `min_level`: least severe `tracing` level forwarded to Sentry.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is added
///   next to [`RavenLayer`] and every event is also printed to the console.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub min_level: Level,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            min_level: Level::ERROR,
            enable_stdout: true,
        }
    }
}

/// Install a global `tracing` subscriber that reports events through `client`.
///
/// **Parameters**
/// - `client`: started [`Client`] receiving the forwarded events.
/// - `config`: [`LayerConfig`] controlling level filtering and console output.
///
/// **Effects**
///
/// Installs a [`Registry`] combined with [`RavenLayer`] as the global default
/// subscriber, so all `tracing` events in the process are observed by the
/// layer. Fails if a global subscriber is already set.
pub fn init_tracing_with_config(client: Client, config: LayerConfig) -> Result<(), SetGlobalDefaultError> {
    let layer = RavenLayer::with_level(client, config.min_level);

    // The two subscriber shapes have different types, so each branch
    // installs its own.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Initialize tracing with [`LayerConfig::default`].
pub fn init_tracing(client: Client) -> Result<(), SetGlobalDefaultError> {
    init_tracing_with_config(client, LayerConfig::default())
}
