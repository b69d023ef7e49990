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

//! Full polling flow through the ECS plugin: json_file devices -> correction ->
//! local records and shared state -> grid protection

use bevy_app::App;
use bevy_ecs::system::RunSystemOnce;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wattline_core::{
    BuildContext, CycleReport, DeviceOutcome, DeviceRegistry, GridProtectionResource, PollTimer,
    PollingPlugin, SharedStateResource, SharedStateStore, StoreBackend, StoreFactory,
    VendorRegistry, grid_protection_system, poll_devices_system,
};
use wattline_types::{ComponentKey, DeviceConfig, FaultKind, GeneralConfig, GridProtectionState};

struct Site {
    feed: TempDir,
    records: TempDir,
    shared: SharedStateStore,
    app: App,
}

fn write_feed(dir: &Path, name: &str, document: serde_json::Value) {
    fs::write(dir.join(name), document.to_string()).unwrap();
}

fn site() -> Site {
    let feed = TempDir::new().unwrap();
    let records = TempDir::new().unwrap();

    write_feed(
        feed.path(),
        "counter0.json",
        json!({ "power": 1200.0, "imported": 5000.0, "exported": 100.0, "frequency": 50.0 }),
    );
    write_feed(
        feed.path(),
        "pv1.json",
        json!({ "power": -4000.0, "imported": 0.0, "exported": 90000.0 }),
    );
    write_feed(feed.path(), "bat2.json", json!({ "power": -1000.0, "soc": 62.0 }));

    let config: DeviceConfig = serde_json::from_value(json!({
        "id": 1,
        "name": "hybrid feed",
        "type": "json_file",
        "configuration": { "directory": feed.path() },
        "components": [
            { "id": 0, "class": "counter" },
            { "id": 1, "class": "pv", "nameplate_capacity_w": 10000.0 },
            { "id": 2, "class": "bat", "parent": { "class": "inverter", "id": 1 } },
        ],
    }))
    .unwrap();

    let shared = SharedStateStore::new();
    let stores = StoreFactory::new(
        StoreBackend::LocalRecords {
            root: records.path().to_path_buf(),
        },
        shared.clone(),
    );
    let fleet = VendorRegistry::with_builtin()
        .build_fleet(&[config], &BuildContext { stores: &stores })
        .unwrap();

    let mut app = App::new();
    app.add_plugins(PollingPlugin);
    app.insert_resource(DeviceRegistry::from(fleet));
    app.insert_resource(SharedStateResource(shared.clone()));
    app.insert_resource(PollTimer::new(Duration::ZERO));
    app.insert_resource(GridProtectionResource::default().with_rng(StdRng::seed_from_u64(42)));

    Site {
        feed,
        records,
        shared,
        app,
    }
}

fn run_cycle(app: &mut App) {
    app.world_mut().run_system_once(poll_devices_system).unwrap();
    app.world_mut()
        .run_system_once(grid_protection_system)
        .unwrap();
}

fn set_frequency(site: &Site, frequency: f64) {
    write_feed(
        site.feed.path(),
        "counter0.json",
        json!({ "power": 1200.0, "imported": 5000.0, "exported": 100.0, "frequency": frequency }),
    );
}

#[test]
fn test_cycle_publishes_corrected_states() {
    let mut site = site();
    run_cycle(&mut site.app);

    let report = site.app.world().resource::<CycleReport>();
    assert_eq!(report.cycle, 1);
    assert_eq!(report.outcomes, vec![(1, DeviceOutcome::Succeeded { components: 3 })]);

    // Battery flow is taken out of the hybrid inverter's AC figure.
    let pv = site.shared.get(&ComponentKey::inverter(1)).unwrap();
    assert_eq!(pv.power(), Some(-3000.0));

    let pv_record = site.records.path().join("pv").join("1").join("power");
    assert_eq!(fs::read_to_string(pv_record).unwrap(), "-3000.0");
    let soc_record = site.records.path().join("bat").join("2").join("soc");
    assert_eq!(fs::read_to_string(soc_record).unwrap(), "62.0");
}

#[test]
fn test_grid_protection_trips_and_recovers() {
    let mut site = site();

    set_frequency(&site, 45.50);
    run_cycle(&mut site.app);

    let state = site.app.world().resource::<GridProtectionResource>().state.clone();
    assert!(state.active);
    assert!((1..=90).contains(&state.stagger_secs));
    assert!(state.tripped_at.is_some());
    assert_eq!(site.shared.grid_protection(), state);

    set_frequency(&site, 49.80);
    run_cycle(&mut site.app);

    let state = site.app.world().resource::<GridProtectionResource>().state.clone();
    assert_eq!(state, GridProtectionState::default());
    assert_eq!(site.shared.grid_protection(), state);
}

#[test]
fn test_lost_reference_reading_keeps_trip() {
    let mut site = site();
    set_frequency(&site, 46.0);
    run_cycle(&mut site.app);
    let tripped = site.app.world().resource::<GridProtectionResource>().state.clone();
    assert!(tripped.active);

    // Garbage from the grid meter: the counter fails, its last good reading
    // stays in shared state and the trip holds.
    write_feed(site.feed.path(), "counter0.json", json!("not an object"));
    run_cycle(&mut site.app);

    let report = site.app.world().resource::<CycleReport>();
    assert_eq!(
        report.outcomes,
        vec![(
            1,
            DeviceOutcome::PartiallySucceeded {
                succeeded: 2,
                total: 3,
                failures: vec![(ComponentKey::counter(0), FaultKind::Protocol)],
            }
        )]
    );
    let state = site.app.world().resource::<GridProtectionResource>().state.clone();
    assert_eq!(state, tripped);
}

#[test]
fn test_missing_feed_directory_fails_device() {
    let mut site = site();
    let feed_path = site.feed.path().to_path_buf();
    fs::remove_dir_all(&feed_path).unwrap();

    run_cycle(&mut site.app);

    let report = site.app.world().resource::<CycleReport>();
    assert!(matches!(
        report.outcomes.as_slice(),
        [(1, DeviceOutcome::Failed { .. })]
    ));
    assert!(site.shared.is_empty());
}

#[test]
fn test_app_update_respects_poll_interval() {
    let mut site = site();
    site.app.insert_resource(PollTimer::from_secs(3600));

    site.app.update();
    site.app.update();
    site.app.update();

    let report = site.app.world().resource::<CycleReport>();
    assert_eq!(report.cycle, 1);
    assert_eq!(site.shared.len(), 3);
}

#[test]
fn test_runtime_config_edits_reach_polling_resources() {
    let mut site = site();
    site.app.insert_resource(GeneralConfig::default());
    site.app.update();
    assert_eq!(site.app.world().resource::<PollTimer>().interval(), Duration::ZERO);

    set_frequency(&site, 45.5);
    site.app.update();
    assert!(site.app.world().resource::<GridProtectionResource>().state.active);

    {
        let mut config = site.app.world_mut().resource_mut::<GeneralConfig>();
        config.control_interval = 3600;
        config.grid_protection.configured = false;
    }
    site.app.update();

    let world = site.app.world();
    assert_eq!(world.resource::<PollTimer>().interval(), Duration::from_secs(3600));
    let grid = world.resource::<GridProtectionResource>();
    assert!(!grid.protection.config().configured);
    assert_eq!(grid.state, GridProtectionState::default());
    assert_eq!(world.resource::<CycleReport>().cycle, 2);
}
