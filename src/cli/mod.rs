pub mod report;

use anyhow::Result;
use clap::{Parser, Subcommand};
use report::{process_report_command, ReportCommand};

use crate::{
    daemon::{
        args::{ServeArgs, TrackerConfig},
        start_daemon,
    },
    utils::{
        dir::resolve_application_path,
        logging::{enable_logging, CLI_PREFIX, DAEMON_PREFIX},
        runtime::single_thread_runtime,
    },
};

#[derive(Parser, Debug)]
#[command(name = "Sitetime", version, long_about = None)]
#[command(about = "Tracks time spent on web sites of a browser", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Run the tracker for a browser host. Signals and commands are read from stdin, responses and updates are written to stdout"
    )]
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },
    #[command(about = "Display stored time per site")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
}

pub fn run_cli() -> Result<()> {
    let args = Args::parse();

    match args.commands {
        Commands::Serve { args } => {
            let app_dir = resolve_application_path(args.dir.clone())?;
            enable_logging(DAEMON_PREFIX, &app_dir, args.log, args.log_console)?;

            let config = TrackerConfig::new(app_dir, &args);
            let runtime = single_thread_runtime()?;
            let result = runtime.block_on(start_daemon(config));
            // Blocking stdin reads never finish on their own.
            runtime.shutdown_background();
            result
        }
        Commands::Report { command } => {
            let app_dir = resolve_application_path(command.dir.clone())?;
            // Logging is best effort for one-shot commands.
            let _ = enable_logging(CLI_PREFIX, &app_dir, None, false);
            single_thread_runtime()?.block_on(process_report_command(app_dir, command))
        }
    }
}
