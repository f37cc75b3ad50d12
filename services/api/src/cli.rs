use crate::offline::{run_assess, run_calendar, AssessArgs, CalendarArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use hebelwatch::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "HebelWatch",
    about = "Watch knock-out leverage, volatility and market events as traffic lights",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service and the polling loop (default command)
    Serve(ServeArgs),
    /// Evaluate a stored leverage series offline and print the lights
    Assess(AssessArgs),
    /// Show the event light and upcoming calendar entries for a day
    Calendar(CalendarArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Assess(args) => run_assess(args),
        Command::Calendar(args) => run_calendar(args).await,
    }
}
