// logging.rs — `log` + `env_logger` initialisation
//
// Stages log through the `log` facade:
//
// - `info!`  pipeline completion
// - `debug!` per-stage summaries (variables created, borrows spliced, ...)
// - `trace!` per-node decisions
//
// `RUST_LOG=lifewire::auto_borrow=trace` narrows output to one stage.
//
// Side effects: installs the global logger on first call; later calls are
//               no-ops.

use std::io::Write;
use std::sync::Once;

use env_logger::Builder;
use log::LevelFilter;

static INIT: Once = Once::new();

/// Initialise at `Warn`.
pub fn init() {
    init_with_level(LevelFilter::Warn);
}

pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        Builder::new()
            .filter_level(level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{:5}] {}:{} - {}",
                    record.level(),
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .init();
    });
}

/// Initialise from `RUST_LOG`, falling back to `warn`.
pub fn init_from_env() {
    INIT.call_once(|| {
        Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    });
}

/// Test-friendly logger; safe to call from every test.
pub fn init_test() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Warn)
        .is_test(true)
        .try_init();
}
