mod config;
mod local;
mod raw;
mod tun;

use crate::config::DaemonConfig;
use crate::raw::RawLink;
use crate::tun::Tun;
use async_std::io;
use async_std::task;
use bytes::BytesMut;
use clap::{ArgAction, Parser};
use dtn::{Controller, LinkId, Stats, TickReport};
use log::{debug, info, trace, warn, LevelFilter};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/dtnd/dtnd.toml";
const EXAMPLE_CONFIG: &str = include_str!("../dtnd.example.toml");
const FRAME_LEN: usize = 65536;
const TUN_LINK: LinkId = 1;

#[derive(Parser, Debug)]
#[command(name = "dtnd", about = "Custody forwarding for scheduled IPv6 contacts")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    #[arg(short = 'q', long, action = ArgAction::Count)]
    quiet: u8,

    #[arg(long, action = ArgAction::SetTrue)]
    exampleconfig: bool,
}

fn effective_log_level(config: &DaemonConfig, args: &Args) -> u8 {
    let base = i32::from(config.log_level());
    (base + i32::from(args.verbose) - i32::from(args.quiet)).max(0) as u8
}

fn init_logging(level: u8) {
    let filter = match level {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(filter);
    let _ = builder.try_init();
}

fn load_config(path: Option<&Path>) -> Result<DaemonConfig, failure::Error> {
    match path {
        Some(path) => Ok(DaemonConfig::read(path)?),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Ok(DaemonConfig::read(Path::new(DEFAULT_CONFIG_PATH))?)
        }
        None => Ok(DaemonConfig::parse("")?),
    }
}

async fn write_local_output(controller: &mut Controller<RawLink>, tun: &mut Tun) {
    while let Some(packet) = controller.link_mut().pop_local_output() {
        if let Err(err) = tun.send(packet.as_bytes()).await {
            warn!("writing to {} failed: {}", tun.name(), err);
        }
    }
}

async fn run(config: DaemonConfig) -> Result<Stats, failure::Error> {
    let links = config.links()?;
    let link = RawLink::open(&links, config.default_interface.as_deref())?;
    let mut controller = config.controller_builder()?.build(link);
    let mut tun = Tun::open(config.tun_name())?;
    info!("reading {} as {}", tun.name(), controller.local_addr());

    let interval = config.tick_interval_ms();
    let mut next_tick = controller.now() + interval;
    let mut buf = vec![0u8; FRAME_LEN];
    loop {
        let now = controller.now();
        if now >= next_tick {
            let report = controller.on_tick(now);
            if report != TickReport::default() {
                debug!("tick at {}: {:?}", now, report);
            }
            next_tick = now + interval;
            write_local_output(&mut controller, &mut tun).await;
            continue;
        }

        let wait = Duration::from_millis(next_tick - now);
        match io::timeout(wait, tun.recv(&mut buf)).await {
            Ok(0) => {
                info!("{} closed", tun.name());
                break;
            }
            Ok(len) => {
                let outcome = controller.on_inbound(BytesMut::from(&buf[..len]), TUN_LINK);
                trace!("{} bytes: {:?}", len, outcome);
                write_local_output(&mut controller, &mut tun).await;
            }
            Err(err) if err.kind() == ErrorKind::TimedOut => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(controller.stats())
}

fn main() -> Result<(), failure::Error> {
    let args = Args::parse();
    if args.exampleconfig {
        print!("{}", EXAMPLE_CONFIG);
        return Ok(());
    }

    let config = load_config(args.config.as_deref())?;
    init_logging(effective_log_level(&config, &args));
    if args.config.is_none() {
        debug!("config from {} or defaults", DEFAULT_CONFIG_PATH);
    }

    let stats = task::block_on(run(config))?;
    info!("{:?}", stats);
    Ok(())
}
