use std::process::ExitCode;

use clap::{Parser, Subcommand};
use postroom::Config;
use postroom_common::{Signal, logging};
use postroom_dispatch::{EventBus, RunOutcome};

#[derive(Parser)]
#[command(name = "postroom", version, about = "Durable outbound mail queue worker")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./postroom.config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the delivery worker until interrupted
    Serve,
    /// Drain the queue once and exit
    Process,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    logging::init();

    let args = Args::parse();
    let config = Config::from_config(&args.config)?;
    let mailer = postroom::build(config, EventBus::new()).await?;

    match args.command {
        Command::Serve => {
            let (shutdown, receiver) = tokio::sync::broadcast::channel(1);

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = shutdown.send(Signal::Shutdown);
                }
            });

            mailer.serve(receiver).await?;
            println!("Shutting down...");

            Ok(ExitCode::SUCCESS)
        }
        Command::Process => {
            let report = mailer.process_until_done().await?;
            println!(
                "{} sent, {} failed, {} requeued, {} skipped",
                report.sent, report.failed, report.requeued, report.skipped
            );

            // EX_TEMPFAIL when the run was cut short by its batch timeout
            Ok(if report.outcome == RunOutcome::Truncated {
                ExitCode::from(75)
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}
