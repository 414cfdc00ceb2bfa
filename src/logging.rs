use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Install the stderr subscriber. stdout carries the protocol, so nothing
/// may log there. An unparseable `filter` falls back to `info`.
pub fn init(filter: &str) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|e| {
        eprintln!("invalid log filter {filter:?} ({e}); using info");
        EnvFilter::new("info")
    });
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(false)
        .with_filter(env_filter);

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = Registry::default().with(stderr_layer).try_init();
}
