use clap::Parser;
use log::{error, info};
use server::config::GameSettings;
use server::network::Server;
use shared::GameMode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "23400")]
    port: u16,

    /// Simulation tick in milliseconds
    #[arg(long, default_value = "10")]
    tick_ms: u64,

    /// Lag in milliseconds above which missed ticks are skipped
    #[arg(long, default_value = "200")]
    serious_delay_ms: u64,

    /// Maximum number of connected players
    #[arg(short = 'm', long, default_value = "8")]
    max_clients: usize,

    /// Game mode: dm, tdm, tag or vip
    #[arg(short = 'g', long, default_value = "dm")]
    mode: GameMode,

    /// Starting lives, unlimited if omitted
    #[arg(short, long)]
    lives: Option<u32>,

    /// Disable pickups
    #[arg(long)]
    no_bonuses: bool,

    /// Seconds between two pickup spawns
    #[arg(long, default_value = "30")]
    bonus_frequency: u64,

    /// Seconds a pickup stays before it expires
    #[arg(long, default_value = "60")]
    bonus_life: u64,

    /// Seconds the scoreboard is shown before returning to the lobby
    #[arg(long, default_value = "9")]
    game_over_wait: u64,

    /// Start a round as soon as this many players joined
    #[arg(short = 's', long, default_value = "2")]
    start_players: usize,

    /// Arena size in collision cells
    #[arg(long, default_value = "64")]
    map_cols: usize,
    #[arg(long, default_value = "48")]
    map_rows: usize,

    /// Outer frame rate cap, 0 for uncapped
    #[arg(long, default_value = "100")]
    max_fps: u32,

    /// Seed for spawn spots and pickups
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn settings(&self) -> GameSettings {
        let defaults = GameSettings::default();
        let tick = Duration::from_millis(self.tick_ms);
        GameSettings {
            tick,
            high_delay: tick * 10,
            serious_delay: Duration::from_millis(self.serious_delay_ms),
            mode: self.mode,
            lives: self.lives,
            bonuses_on: !self.no_bonuses,
            bonus_frequency: Duration::from_secs(self.bonus_frequency),
            bonus_life: Duration::from_secs(self.bonus_life),
            game_over_wait: Duration::from_secs(self.game_over_wait),
            max_clients: self.max_clients,
            max_fps: self.max_fps,
            dedicated: true,
            auto_start_players: self.start_players,
            map_cols: self.map_cols,
            map_rows: self.map_rows,
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let settings = args.settings();
    let seed = args.seed.unwrap_or_else(rand::random);

    info!("Starting server...");
    info!(
        "Mode {:?}, tick {:?}, up to {} players",
        settings.mode, settings.tick, settings.max_clients
    );

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, settings, seed).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}
