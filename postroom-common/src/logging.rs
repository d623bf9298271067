use tracing_subscriber::EnvFilter;

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// Install the process-wide subscriber.
///
/// The `LOG_LEVEL` environment variable takes filter directives in the
/// usual `EnvFilter` syntax (`debug`, `postroom_dispatch=trace`, ...);
/// without it, debug builds log everything and release builds log `INFO`
/// and up.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        "trace"
    } else {
        "info"
    };

    let filter =
        EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .compact()
        .with_ansi(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
        .with_env_filter(filter)
        .init();
}
