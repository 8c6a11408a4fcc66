use std::{path::PathBuf, time::Duration};

use clap::Args;
use tracing::level_filters::LevelFilter;

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    pub dir: Option<PathBuf>,
    /// How often the running session is written to the store and reported to the host.
    #[arg(long = "tick-ms", default_value_t = 1000)]
    pub tick_ms: u64,
    /// Only report on ticks, time is written on transitions.
    #[arg(long = "no-flush-on-tick")]
    pub no_flush_on_tick: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
}

/// Resolved settings of a running tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub dir: PathBuf,
    pub tick_interval: Duration,
    pub flush_on_tick: bool,
}

impl TrackerConfig {
    pub fn new(dir: PathBuf, args: &ServeArgs) -> Self {
        Self {
            dir,
            // A zero interval would spin.
            tick_interval: Duration::from_millis(args.tick_ms.max(1)),
            flush_on_tick: !args.no_flush_on_tick,
        }
    }
}
