use clap::Parser;
use owo_colors::OwoColorize;

mod cli;

use cli::{Cli, Op, OpContext};

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let guard = match padsync_daemon::logging::init(args.log_level, args.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} failed to initialize logging: {}", "warning:".yellow(), e);
            None
        }
    };

    let ctx = match OpContext::load(args.config.clone(), args.remote.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            drop(guard);
            std::process::exit(1);
        }
    };
    tracing::debug!(config = ?ctx.config_path, "resolved config file");

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{output}");
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("{} {}", "error:".red().bold(), e);
            // flush the file appender before exiting
            drop(guard);
            std::process::exit(1);
        }
    }
}
