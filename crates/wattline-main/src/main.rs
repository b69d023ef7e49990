// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Wattline.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

mod config;

use anyhow::{Context, Result};
use bevy_app::{ScheduleRunnerPlugin, TaskPoolPlugin, prelude::*};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use config::{AppConfig, ConfigSource};
use wattline_core::{
    AsyncBridge, AsyncBridgeResource, BuildContext, DeviceRegistry, GridProtectionResource,
    PollTimer, PollingPlugin, RetainedBus, SharedStateResource, SharedStateStore, StoreBackend,
    StoreFactory, VendorRegistry,
};
use wattline_types::GridProtectionState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" => {
                println!("Wattline - energy telemetry polling");
                println!("Version: {VERSION}");
                println!();
                println!("Usage: wattline [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help    Print this help message");
                println!("  -v, --version Print version");
                println!();
                println!(
                    "Configuration is read from ${} or ./{}",
                    config::CONFIG_ENV,
                    config::DEFAULT_CONFIG_PATH
                );
                return Ok(());
            }
            "--version" | "-v" => {
                println!("{VERSION}");
                return Ok(());
            }
            _ => {}
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    // The ECS loop blocks; async component reads are bridged onto this runtime.
    runtime.block_on(async {
        tokio::task::spawn_blocking(initialize_and_run)
            .await
            .context("Polling loop panicked")?
    })
}

fn init_tracing(default_level: &str) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")
}

fn log_summary(config: &AppConfig) {
    info!("📋 Configuration Summary:");
    info!("   Control interval: {}s", config.general.control_interval);
    if config.storage.local_records {
        info!("   Storage: local records in {}", config.storage.record_dir.display());
    } else {
        info!("   Storage: bus topics under {}", config.storage.topic_prefix);
    }
    let grid = &config.general.grid_protection;
    info!(
        "   Grid protection: {} (reference counter: {})",
        if grid.configured { "enabled" } else { "disabled" },
        grid.reference_counter.map_or_else(|| "root".to_owned(), |id| id.to_string())
    );
    info!("   Devices: {}", config.devices.len());
    for device in &config.devices {
        info!(
            "     - {} ({}) [{}]: {} components",
            device.id,
            device.name,
            device.vendor,
            device.components.len()
        );
    }
}

fn initialize_and_run() -> Result<()> {
    let (config, source) = config::load_config_with_fallback()?;
    init_tracing(&config.system.log_level)?;

    info!("🚀 Starting Wattline {}", VERSION);
    match &source {
        ConfigSource::File(path) => info!("✅ Loaded configuration from {}", path.display()),
        ConfigSource::Defaults(path) => {
            warn!("⚠️  No configuration at {}, using defaults", path.display());
        }
    }
    log_summary(&config);

    let shared = SharedStateStore::new();
    // No external broker client is wired in; the retained bus holds the latest value per topic.
    let bus = Arc::new(RetainedBus::new());
    let stores = StoreFactory::new(StoreBackend::from_config(&config.storage, bus), shared.clone());

    let fleet = VendorRegistry::with_builtin()
        .build_fleet(&config.devices, &BuildContext { stores: &stores })
        .context("Invalid device topology")?;
    if !fleet.rejected.is_empty() {
        warn!(
            "⚠️  {} of {} devices rejected, see errors above",
            fleet.rejected.len(),
            config.devices.len()
        );
    }

    let bridge = AsyncBridge::current(config.async_timeout());
    if bridge.is_none() {
        warn!("⚠️  No async runtime available, per-call components will fail");
    }

    let mut app = App::new();
    app.add_plugins(TaskPoolPlugin::default())
        .add_plugins(ScheduleRunnerPlugin::run_loop(Duration::from_millis(100)))
        .add_plugins(PollingPlugin)
        .insert_resource(config.general.clone())
        .insert_resource(DeviceRegistry::from(fleet))
        .insert_resource(SharedStateResource(shared))
        .insert_resource(AsyncBridgeResource(bridge))
        .insert_resource(PollTimer::from_secs(config.general.control_interval))
        .insert_resource(GridProtectionResource::new(
            config.general.grid_protection.clone(),
            GridProtectionState::default(),
        ));

    info!("✅ Polling loop running");
    app.run();
    Ok(())
}
