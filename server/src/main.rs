use clap::Parser;
use log::{debug, info};
use rand::Rng;
use server::network::Server;
use shared::action::{GameAction, GameEffect};
use tokio::time::{interval, Duration};

/// Command line arguments for the host.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Maximum number of peers in the session
    #[arg(short, long, default_value = "16")]
    max_peers: usize,

    /// Seconds between demo obstacle spawns (0 disables)
    #[arg(long, default_value = "5")]
    spawn_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate as f64);

    let mut server = Server::new(&address, tick_duration, args.max_peers).await?;

    // Log whatever the session commits; a real game would feed these into
    // its simulation instead.
    if let Some(mut effects) = server.effect_receiver() {
        tokio::spawn(async move {
            while let Some(effect) = effects.recv().await {
                match effect {
                    GameEffect::StateUpdate { .. } => debug!("Effect: {:?}", effect),
                    other => info!("Effect: {:?}", other),
                }
            }
        });
    }

    // Demo session driver: scatter obstacles on a fixed cadence, through the
    // same lockstep cycle every other action uses.
    if args.spawn_interval > 0 {
        let actions = server.action_sender();
        tokio::spawn(async move {
            let mut cadence = interval(Duration::from_secs(args.spawn_interval));
            cadence.tick().await; // skip the immediate first fire
            loop {
                cadence.tick().await;
                let action = {
                    let mut rng = rand::thread_rng();
                    GameAction::SpawnObstacle {
                        position: (rng.gen_range(-300.0..300.0), rng.gen_range(-200.0..200.0)),
                        scale: (rng.gen_range(0.5..2.0), rng.gen_range(0.5..2.0)),
                        velocity: (rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0)),
                    }
                };
                if actions.send(action).is_err() {
                    break;
                }
            }
        });
    }

    server.run().await?;

    Ok(())
}
