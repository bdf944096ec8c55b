use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs the fmt subscriber. The level comes from `LOG_LEVEL`.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let level = std::env::var("LOG_LEVEL").map_or(default, |level| {
        LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_filter(level),
        )
        .init();
}
