use clap::Parser;
use client::network::Client;
use log::{debug, info};
use shared::action::{GameAction, GameEffect};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name sent with the connection request
    #[arg(short = 'n', long, default_value = "player")]
    name: String,
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

    let mut client = Client::new(&args.server, &args.name).await?;
    if !client.connect().await? {
        return Err("could not reach host, giving up".into());
    }

    // Log whatever the session commits; a real game would feed these into
    // its simulation instead.
    if let Some(mut effects) = client.effect_receiver() {
        tokio::spawn(async move {
            while let Some(effect) = effects.recv().await {
                match effect {
                    GameEffect::TickSync { .. } | GameEffect::StateUpdate { .. } => {
                        debug!("Effect: {:?}", effect)
                    }
                    other => info!("Effect: {:?}", other),
                }
            }
        });
    }

    client.send_action(GameAction::StartSession).await?;
    client.run().await?;

    Ok(())
}
