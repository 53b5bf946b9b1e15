use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Filter preset for a verbosity level.
///
/// 0 = errors only, 1 = bridge lifecycle at info/debug, 2+ = everything including per-chunk traces.
pub fn default_filter(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "error",
		1 => "info,loper::bridge=debug,loper::session=debug",
		_ => "trace",
	}
}

/// Installs the global stderr subscriber. `RUST_LOG` overrides the verbosity preset.
pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
