//! # Lalabot
//!
//! 配送机器人主程序。
//!
//! ```bash
//! # 仿真轨道 + 内存存储，预置一个 2 号房间到 4 号房间的请求
//! lalabot run --sim --request 2:4
//!
//! # 真实硬件 + Firebase
//! lalabot run --config /etc/lalabot/lalabot.toml
//!
//! # 只校验配置
//! lalabot check-config lalabot.toml
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lalabot_core::{
    HardwareBackend, Orchestrator, RobotConfig, ShutdownFlag, StoreBackend, SystemClock,
};
use lalabot_hal::{RobotHardware, sim, sysfs};
use lalabot_protocol::{DeliveryRecord, RoomIndex};
use lalabot_store::{FirebaseStore, MemoryStore, RemoteStateStore};

/// Lalabot 配送机器人
#[derive(Parser, Debug)]
#[command(name = "lalabot")]
#[command(about = "Lalabot delivery robot controller", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 运行控制循环直到 Ctrl+C
    Run {
        /// 配置文件（缺省使用默认配置）
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// 强制使用仿真轨道和内存存储
        #[arg(long)]
        sim: bool,

        /// 向内存存储预置请求，格式 PICKUP:DEST，可重复
        #[arg(long, value_parser = parse_request)]
        request: Vec<(RoomIndex, RoomIndex)>,
    },

    /// 校验配置文件并打印摘要
    CheckConfig {
        path: PathBuf,
    },

    /// 打印默认配置
    DefaultConfig,
}

fn parse_request(s: &str) -> Result<(RoomIndex, RoomIndex), String> {
    let (pickup, destination) = s
        .split_once(':')
        .ok_or_else(|| format!("expected PICKUP:DEST, got '{}'", s))?;
    let room = |v: &str| {
        v.trim()
            .parse::<RoomIndex>()
            .map_err(|e| format!("invalid room '{}': {}", v, e))
    };
    Ok((room(pickup)?, room(destination)?))
}

fn load_config(path: Option<&Path>) -> Result<RobotConfig> {
    match path {
        Some(path) => RobotConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(RobotConfig::default()),
    }
}

fn init_logging(config: &RobotConfig) -> Result<()> {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("lalabot=info,lalabot_core=info,lalabot_store=info,lalabot_hal=info")
    });
    if let Some(level) = &config.logging.level {
        for directive in level.split(',').filter(|d| !d.trim().is_empty()) {
            filter = filter.add_directive(
                directive
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid logging.level directive '{}'", directive))?,
            );
        }
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn print_summary(config: &RobotConfig) {
    let ring = config.ring();
    let settings = config.orchestrator_settings();
    println!("Configuration OK");
    println!("  rooms:            {} (+ base)", ring.room_count());
    println!("  hardware:         {:?}", config.hardware.backend);
    println!("  store:            {:?}", config.store.backend);
    if config.store.backend == StoreBackend::Firebase {
        println!("  firebase:         {}", config.store.firebase.base_url);
    }
    println!("  tick:             {:?}", settings.tick);
    println!("  confirm timeout:  {:?}", settings.policy.confirm_timeout);
    println!("  max retries:      {}", settings.policy.max_retries);
    println!(
        "  obstacle:         {} cm",
        settings.navigation.obstacle_threshold_cm
    );
    println!("  off-line alarm:   {:?}", settings.safety.off_line_threshold);
    println!("  connectivity:     {:?}", settings.connectivity_bound);
}

fn build_hardware(config: &RobotConfig, force_sim: bool) -> Result<RobotHardware> {
    if force_sim || config.hardware.backend == HardwareBackend::Sim {
        let (hardware, _handle) = sim::build(config.ring(), &config.hardware.sim)
            .context("Failed to build simulated track")?;
        info!("Using simulated track with {} rooms", config.ring().room_count());
        return Ok(hardware);
    }
    sysfs::build(&config.hardware.sysfs, config.hardware.line_active_low)
        .context("Failed to claim GPIO/PWM peripherals")
}

fn run_loop<S: RemoteStateStore>(
    config: &RobotConfig,
    hardware: RobotHardware,
    store: S,
    shutdown: ShutdownFlag,
) {
    let mut robot = Orchestrator::new(
        config.orchestrator_settings(),
        hardware,
        store,
        SystemClock,
        shutdown,
    );
    robot.run();
}

fn run(config: RobotConfig, force_sim: bool, requests: &[(RoomIndex, RoomIndex)]) -> Result<()> {
    let shutdown = ShutdownFlag::new();
    let handler = shutdown.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt signal. Shutting down...");
        handler.request();
    })
    .context("Failed to set signal handler")?;

    let hardware = build_hardware(&config, force_sim)?;
    let ring = config.ring();

    if force_sim || config.store.backend == StoreBackend::Memory {
        let store = MemoryStore::new();
        for (n, &(pickup, destination)) in requests.iter().enumerate() {
            if !ring.contains(pickup) || !ring.contains(destination) {
                bail!(
                    "Request {}:{} is outside rooms 0..={}",
                    pickup,
                    destination,
                    ring.room_count()
                );
            }
            store.insert_request(
                &format!("local-{}", n + 1),
                &DeliveryRecord::new(pickup, destination, "local"),
            );
        }
        info!("Using in-memory store with {} seeded requests", requests.len());
        run_loop(&config, hardware, store, shutdown);
    } else {
        if !requests.is_empty() {
            warn!("--request is ignored with the firebase store");
        }
        let store = FirebaseStore::new(&config.store.firebase);
        run_loop(&config, hardware, store, shutdown);
    }

    info!("Robot stopped");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            sim,
            request,
        } => {
            let config = load_config(config.as_deref())?;
            init_logging(&config)?;
            run(config, sim, &request)
        },

        Commands::CheckConfig { path } => {
            let config = load_config(Some(&path))?;
            print_summary(&config);
            Ok(())
        },

        Commands::DefaultConfig => {
            print!("{}", RobotConfig::default().to_toml_string()?);
            Ok(())
        },
    }
}
