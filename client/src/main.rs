use clap::Parser;
use client::network::Client;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:23400")]
    server: String,

    /// Worm name
    #[arg(short = 'n', long, default_value = "player")]
    name: String,

    /// Team index, 0 to 3
    #[arg(short = 't', long, default_value = "0")]
    team: u8,

    /// Fire the worm every this many milliseconds while playing, 0 to never fire
    #[arg(short = 'f', long, default_value = "0")]
    fire_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let mut client = Client::new(&args.server, &args.name, args.team, args.fire_interval_ms).await?;

    tokio::select! {
        result = client.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, leaving"),
    }

    client.disconnect().await?;

    Ok(())
}
