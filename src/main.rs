use ringstore::config::NodeConfig;
use ringstore::replication::Coordinator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<String> = None;
    let mut bind_addr: Option<String> = None;
    let mut join_addr: Option<String> = None;
    let mut position: Option<String> = None;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--config" => {
                config_path = value;
                i += 2;
            }
            "--bind" => {
                bind_addr = value;
                i += 2;
            }
            "--join" => {
                join_addr = value;
                i += 2;
            }
            "--position" => {
                position = value;
                i += 2;
            }
            "--verbose" => {
                verbose = true;
                i += 1;
            }
            "--help" | "-h" => {
                usage(&args[0]);
                return Ok(());
            }
            _ => {
                i += 1;
            }
        }
    }

    tracing_subscriber::fmt()
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let mut config = match config_path {
        Some(path) => serde_json::from_str::<NodeConfig>(&std::fs::read_to_string(&path)?)?,
        None => NodeConfig::default(),
    };
    if let Some(addr) = bind_addr {
        config.addr = addr;
    }
    if position.is_some() {
        config.position = position;
    }

    let coordinator = Coordinator::new(config)?;
    coordinator.start().await?;
    tracing::info!("Node {} started", coordinator.node().remote());

    match join_addr {
        Some(addr) => {
            coordinator.join(&addr).await?;
            tracing::info!("Joined via {} at {}", addr, coordinator.node().position());
        }
        None => tracing::info!("Starting as first member"),
    }

    tracing::info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    coordinator.stop().await;
    tracing::info!("Node {} stopped", coordinator.node().addr());
    Ok(())
}

fn usage(program: &str) {
    eprintln!(
        "Usage: {} [--config <file.json>] [--bind <addr:port>] [--join <addr:port>] [--position <hex>] [--verbose]",
        program
    );
    eprintln!("Example: {} --bind 127.0.0.1:5000", program);
    eprintln!("Example: {} --bind 127.0.0.1:5001 --join 127.0.0.1:5000", program);
}
