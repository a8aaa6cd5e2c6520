//! Host-side glue for the SSHFS adapter: logging bootstrap, configuration
//! loading and mounting. The driver framework registers the returned
//! [`SshFs`] as its callback target.

use std::sync::Arc;

pub use sorng_sshfs::sshfs;
use sorng_sshfs::sshfs::{Connector, MountConfig, Ssh2Connector, SshFs};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `debug` selects `debug` level output,
/// otherwise only warnings and errors are shown. `RUST_LOG` overrides both.
///
/// Records emitted through the `log` facade are forwarded as well.
pub fn init_logging(debug: bool) -> Result<(), String> {
  let level = if debug { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

  #[cfg(feature = "logs-json")]
  let result = builder.json().try_init();
  #[cfg(not(feature = "logs-json"))]
  let result = builder.try_init();

  result.map_err(|e| format!("failed to install logger: {}", e))
}

/// Parse and validate a JSON mount configuration.
pub fn load_config(json: &str) -> Result<MountConfig, String> {
  let config: MountConfig =
    serde_json::from_str(json).map_err(|e| format!("invalid mount config: {}", e))?;
  config.validate()?;
  Ok(config)
}

/// Connect over SSH and return the adapter ready to be handed to the driver.
pub fn mount(config: MountConfig) -> Result<SshFs, String> {
  mount_with(config, Arc::new(Ssh2Connector))
}

/// Like [`mount`], with a caller-supplied transport.
///
/// Installs the subscriber at the level `config.debug` selects unless the
/// host already installed one.
pub fn mount_with(config: MountConfig, connector: Arc<dyn Connector>) -> Result<SshFs, String> {
  config.validate()?;
  if let Err(e) = init_logging(config.debug) {
    tracing::debug!("keeping existing subscriber: {}", e);
  }
  let fs = SshFs::new(config, connector);
  fs.connect().map_err(|e| {
    tracing::error!("mount failed: {}", e);
    String::from(e)
  })?;
  tracing::info!(
    "mounted {}@{} (root '{}')",
    fs.config().username,
    fs.config().address(),
    fs.config().root
  );
  Ok(fs)
}
