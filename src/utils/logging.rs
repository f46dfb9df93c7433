use chrono::Local;
use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the logging system. This crate is a library embedded in a host
/// process; output goes to stderr and the host decides where that lands.
pub fn init_logger() {
    INIT.call_once(|| {
        // Get log level from environment
        let env = Env::default().filter_or("LOG_LEVEL", "info");

        let mut builder = Builder::from_env(env);
        builder
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{} [{}] - {}: {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .filter(None, LevelFilter::Info)
            .init();
    });
}
