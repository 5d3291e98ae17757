use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize logging/tracing for the gateway.
///
/// Default: info for our crates, warn for everything else.
/// Can be overridden with `RUST_LOG`.
pub fn init(service_name: &str, json: bool) -> Result<()> {
    let crate_name = service_name.replace('-', "_");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,chatgate_core=info,chatgate_http=info,chatgate_cohere=info,{crate_name}=info"
        ))
    });

    let builder = fmt().with_env_filter(filter).with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.with_ansi(true).try_init()
    };

    installed.map_err(|e| Error::Config(format!("failed to install tracing subscriber: {e}")))
}
