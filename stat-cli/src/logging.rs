//! Installs `env_logger` as the process-wide `log` subscriber. `stat-core`
//! only emits through the `log` facade; the driver owns the subscriber.

use crate::config::CliOptions;

pub fn init(options: &CliOptions) {
    env_logger::Builder::new().filter_level(options.log_level()).init();
}
