use tracing::{debug, level_filters::LevelFilter};
use tracing_subscriber::{
    filter::Directive,
    fmt::format::{Format, Writer},
    EnvFilter,
};

struct CustomTimer;

impl tracing_subscriber::fmt::time::FormatTime for CustomTimer {
    fn format_time(&self, writer: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(writer, "{} - {}", now.format("%d %B"), now.format("%H:%M:%S%.6f"))
    }
}

fn install(filter: EnvFilter) {
    let format = Format::default().with_timer(CustomTimer).with_level(true).with_target(false);

    let subscriber =
        tracing_subscriber::fmt().with_env_filter(filter).event_format(format).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!("Logger has already been set up, continuing...");
    }
}

/// Installs a global subscriber at `log_level`; `RUST_LOG` directives still apply.
pub fn setup_logger(log_level: LevelFilter) {
    install(EnvFilter::from_default_env().add_directive(log_level.into()));
}

pub fn setup_info_logger() {
    setup_logger(LevelFilter::INFO);
}

/// Info for everything else, debug for this crate so generated statements are visible.
pub fn setup_statement_logger() {
    let mut filter = EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into());
    if let Ok(directive) = "bulkmerge=debug".parse::<Directive>() {
        filter = filter.add_directive(directive);
    }
    install(filter);
}
