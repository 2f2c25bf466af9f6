mod api;
mod blockchain;
mod config;
mod miner;
mod network;
mod node;
mod transaction;

use std::io;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::{error, info};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use api::AppState;
use blockchain::{Block, Blockchain, ChainParams};
use config::NodeConfig;
use miner::Miner;
use node::Node;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = NodeConfig::from_env();
    let params = ChainParams {
        fork_policy: config.fork_policy,
        ..ChainParams::default()
    };
    let genesis = config
        .genesis_timestamp
        .map(Block::genesis_at)
        .unwrap_or_else(Block::genesis);
    let chain = Arc::new(Blockchain::with_params(params, genesis));
    info!("genesis {}", chain.get_root().hash());

    let node = Arc::new(Node::new(&config, chain.clone()));
    let listener = TcpListener::bind(&config.node_address).await.map_err(|err| {
        error!("cannot listen on {}: {err}", config.node_address);
        err
    })?;

    let (stop, shutdown) = watch::channel(false);

    if let Some(bootstrap) = config.join_target() {
        node.join(bootstrap).await;
    }
    tokio::spawn(node.clone().serve(listener, shutdown.clone()));
    if let Some(bootstrap) = config.join_target() {
        node.request_sync(bootstrap).await;
    }

    let (announce, announcements) = mpsc::unbounded_channel();
    let broadcaster = node.clone().spawn_broadcaster(announcements, shutdown.clone());

    let miner = if config.mining_enabled {
        let miner = Miner::new(chain, announce, config.mine_interval);
        let shutdown = shutdown.clone();
        Some(tokio::task::spawn_blocking(move || miner.run(shutdown)))
    } else {
        info!("mining disabled");
        drop(announce);
        None
    };

    println!(
        "⛓️ Node {} serving status at http://{}:{}",
        config.node_address, config.host, config.port
    );

    let state = web::Data::new(AppState { node });
    let served = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await;

    info!("shutting down");
    let _ = stop.send(true);
    let _ = broadcaster.await;
    if let Some(miner) = miner {
        let _ = miner.await;
    }
    served
}
