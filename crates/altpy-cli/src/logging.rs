use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

pub(crate) fn log_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Routes `log` records from the altpy crates to stderr.
pub(crate) fn init_logging(verbose: bool) {
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .add_filter_allow_str("altpy")
        .build();

    let _ = TermLogger::init(
        log_level(verbose),
        config,
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );
}
