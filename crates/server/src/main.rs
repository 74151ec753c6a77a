use std::io::BufRead;
use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use skirmish::{Level, ServerConfig, ServerHost};

#[derive(Parser)]
#[command(name = "skirmish-server")]
#[command(about = "Skirmish arena server")]
struct Args {
    #[arg(short, long, default_value = "Skirmish Server")]
    name: String,

    #[arg(short, long, default_value = "::")]
    bind: IpAddr,

    #[arg(short, long, default_value_t = skirmish::DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value_t = skirmish::SERVER_UPDATE_FREQUENCY)]
    tick_rate: u32,

    #[arg(long, help = "Level file; the built-in arena when omitted")]
    level: Option<PathBuf>,

    #[arg(long, default_value_t = 0, help = "Bots to add on startup")]
    bots: u32,

    #[arg(long, help = "Disable the LAN discovery beacon")]
    no_discovery: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let level = match &args.level {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("reading level {}", path.display()))?;
            Some(Level::from_bytes(&bytes).context("parsing level")?)
        }
        None => None,
    };

    let config = ServerConfig {
        name: args.name,
        bind_addr: args.bind,
        port: args.port,
        tick_rate: args.tick_rate,
        enable_discovery: !args.no_discovery,
        level,
        initial_bots: args.bots,
    };

    let mut host = ServerHost::new();
    let addr = host.start(config)?;
    log::info!("listening on {addr}; commands: add_bot, remove_bot, quit");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        host.check_for_errors()?;
        let line = line.context("reading stdin")?;
        match line.trim() {
            "" => {}
            "add_bot" => host.add_bot(),
            "remove_bot" => host.remove_bot(),
            "quit" | "stop" | "exit" => break,
            other => log::warn!("unknown command: {other}"),
        }
    }

    host.stop()?;
    Ok(())
}
