use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins when set; otherwise `info`,
/// or `debug` for this crate with `verbose`. Logs go to stderr so stdout can
/// carry the XML document.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose))),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "info,promptweave=debug"
    } else {
        "info"
    }
}
