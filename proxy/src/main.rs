use clap::{Parser, Subcommand};

use common::telemetry::init_telemetry;

use proxy::command::serve::{serve, ServeArgs};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
enum Cmd {
    /// Run the proxy (gateway) HTTP server
    Serve(ServeArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry("proxy");

    let args = Args::parse();

    match args.cmd {
        Cmd::Serve(serve_args) => {
            serve(serve_args).await?;
        }
    }

    Ok(())
}
