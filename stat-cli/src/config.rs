//! CLI surface: `-c PORT -d PATH -f FILE -t SECONDS -v/-vv -h`.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time voltage-statistics engine driver", long_about = None)]
pub struct CliOptions {
    /// Start RPC monitoring on this port.
    #[arg(short = 'c', long = "port")]
    pub port: Option<u16>,

    /// Base output directory for HDF5 monitoring-stats files.
    #[arg(short = 'd', long = "output-dir", default_value = "/tmp")]
    pub output_dir: std::path::PathBuf,

    /// Configuration file (AsciiHeader format), alternative to RPC control.
    #[arg(short = 'f', long = "config-file")]
    pub config_file: Option<std::path::PathBuf>,

    /// Self-termination timeout in seconds for non-RPC mode.
    #[arg(short = 't', long = "timeout-secs")]
    pub timeout_secs: Option<u64>,

    /// Increase verbosity; repeat for more (-v, -vv).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl CliOptions {
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        }
    }
}
