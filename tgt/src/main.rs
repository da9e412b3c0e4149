use clap::{Parser, Subcommand};

use common::telemetry::init_telemetry;

use tgt::command::capacity::{capacity, CapacityArgs};
use tgt::command::serve::{serve, ServeArgs};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
enum Cmd {
    /// Run the target (storage node) HTTP server
    Serve(ServeArgs),
    /// Report mountpath capacity status
    Capacity(CapacityArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry("tgt");

    let args = Args::parse();

    match args.cmd {
        Cmd::Serve(serve_args) => {
            serve(serve_args).await?;
        }
        Cmd::Capacity(capacity_args) => {
            capacity(capacity_args)?;
        }
    }

    Ok(())
}
