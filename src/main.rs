use clap::Parser;
use tracing_subscriber::EnvFilter;

use wealth_projection::api::{Cli, Command, run_cli_projection, run_http_server};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("PROJECTION_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Project(args) => match run_cli_projection(args) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Projection error: {e}");
                std::process::exit(1);
            }
        },
        Command::Serve { port } => {
            if let Err(e) = run_http_server(port).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
    }
}
