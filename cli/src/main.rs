mod cli;
mod config;
mod error;
mod ops;
mod record_format;

use clap::Parser;
use cli::{Cli, Command};
use error::CliError;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_span_events(FmtSpan::NEW)
                .compact()
                .with_writer(std::io::stderr),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = config::open_store(&cli.config).await?;

    match cli.command {
        Command::RegisterSystem(args) => ops::register_system(&store, args).await,
        Command::GetSystem { system_id } => ops::get_system(&store, system_id).await,
        Command::RegisterFoi(args) => ops::register_foi(&store, args).await,
        Command::GetFoi { foi_id } => ops::get_foi(&store, foi_id).await,
        Command::RegisterStream(args) => ops::register_stream(&store, args).await,
        Command::GetStream { stream_id } => ops::get_stream(&store, stream_id).await,
        Command::RetireStream { stream_id, end_time_secs } => {
            ops::retire_stream(&store, stream_id, end_time_secs).await
        }
        Command::DeleteStream { stream_id } => ops::delete_stream(&store, stream_id).await,
        Command::Ingest(args) => ops::ingest(&store, args).await,
        Command::Remove { observation_id } => ops::remove(&store, observation_id).await,
        Command::Select(args) => ops::select(&store, args).await,
        Command::Count(args) => ops::count(&store, args).await,
        Command::Stats(args) => ops::stats(&store, args).await,
        Command::NumRecords => ops::num_records(&store).await,
        Command::Clear => ops::clear(&store).await,
    }
}
