use anyhow::{Context, Result};
use clap::Parser;
use gtpc::config::Config;
use gtpc::gtpv2::{Conn, GtpcServer, Recycler, SessionEvent};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "gtpc")]
#[command(about = "GTPv2-C control plane endpoint", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Open a session for this IMSI at startup. May be repeated.
    #[arg(long = "imsi")]
    imsis: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_file(&args.config)?;
    config.subscribers.extend(args.imsis);
    config.validate()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting GTPv2-C endpoint");
    info!("Listen address: {}", config.listen_address);
    info!("Peer address: {}", config.peer_address);
    info!(
        "Interfaces: local {:?}, peer {:?}",
        config.local_interface, config.peer_interface
    );

    let recycler = Arc::new(Recycler::new(&config.pool));
    let (conn, handles) = Conn::new(config.conn_config(), recycler);
    let conn = Arc::new(conn);

    let server = GtpcServer::bind(config.listen_address, Arc::clone(&conn))
        .await
        .context("Failed to bind GTPv2-C socket")?;
    server.spawn_outbound(handles.outbound);
    server.spawn_timeouts(Duration::from_millis(
        (config.retry.timeout_ms / 4).max(100),
    ));

    let mut events = handles.events;
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Created { imsi } => info!("Session active for {}", imsi),
                SessionEvent::Modified {
                    imsi,
                    ebi,
                    remote,
                    teid,
                } => info!(
                    "Bearer {} for {} bound to {} TEID {:#x}",
                    ebi, imsi, remote, teid
                ),
                SessionEvent::Deleted { imsi } => info!("Session deleted for {}", imsi),
                SessionEvent::Discarded { imsi, reason } => {
                    error!("Session for {} discarded: {}", imsi, reason)
                }
            }
        }
    });

    if let Err(e) = conn.echo(config.peer_address) {
        error!("Failed to send Echo Request: {}", e);
    }
    for imsi in &config.subscribers {
        conn.create_session(imsi)
            .with_context(|| format!("Failed to start session for {}", imsi))?;
    }

    info!("GTPv2-C endpoint initialized successfully");
    server.run().await?;

    Ok(())
}
