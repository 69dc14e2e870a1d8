use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the global subscriber. Log lines go to stderr so command output on stdout stays clean.
pub(crate) fn init(level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

pub(crate) fn parse_level(raw: &str) -> Option<Level> {
    raw.trim().parse::<Level>().ok()
}
