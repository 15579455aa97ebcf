use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

use stonelink::{AppResult, Packet, Server, ServerConfig, STATUS_OK};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Parser)]
pub enum Command {
    PrintConfig,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let commandline: CommandLine = CommandLine::parse();

    let max_level = match commandline.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let timer = ChronoLocal::new("%Y-%m-%d %H:%M:%S%.6f".to_string());
    let subscriber = tracing_subscriber::fmt()
        .with_timer(timer)
        .with_max_level(max_level)
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| stonelink::AppError::IllegalState(e.to_string()))?;

    let config_path = commandline
        .conf
        .as_ref()
        .map_or_else(|| PathBuf::from("conf.toml"), PathBuf::from);
    let config = Arc::new(ServerConfig::set_up_config(config_path)?);

    if let Some(Command::PrintConfig) = commandline.command {
        println!("{:#?}", config);
        return Ok(());
    }

    let server = Server::new(config);
    server.registry().register("Echo", |session, packet| async move {
        let mut reply = Packet::with_id("Echo", packet.data().clone());
        reply.set_session_id(packet.session_id());
        reply.set_sequence(packet.sequence());
        reply.set_status(STATUS_OK);
        session.write_packet(reply).await;
        true
    });

    tokio::select! {
        served = server.run() => served?,
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
            server.stop();
        }
    }

    Ok(())
}
