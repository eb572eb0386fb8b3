/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, info, warn};

use tsn_switch::frame::{FrameDescriptor, MacAddress, PortId};
use tsn_switch::runtime::{SwitchInput, SwitchOutput, SwitchRuntime};
use tsn_switch::{Switch, SwitchConfig, SwitchConfigManager};

// ── CLI argument definition ───────────────────────────────────────────────────

/// TSN switch control plane simulator.
///
/// Example:
///   tsn-switch --config tsn-switch/config/switch.yaml --ticks 20000 --demo
#[derive(Debug, Parser)]
#[command(
    name = "tsn-switch",
    about = "TSN switch control plane – time sync, gate scheduling, forwarding",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML switch configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Number of ticks to run.
    #[arg(short = 't', long = "ticks", default_value_t = 10_000)]
    ticks: u64,

    /// Feed a deterministic demonstration workload into the switch.
    #[arg(short = 'd', long = "demo", default_value_t = false)]
    demo: bool,
}

/// Ticks per `Advance` batch.
const BATCH_TICKS: u64 = 1_000;

/// Gap between demo frames on one ingress port.
const DEMO_FRAME_INTERVAL_NS: u64 = 20_000;

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("tsn-switch starting up...");

    let cli = Cli::parse();
    info!(config = ?cli.config, ticks = cli.ticks, demo = cli.demo, "Configuration");

    // ── Load switch configuration ─────────────────────────────────────────────
    let mut manager = SwitchConfigManager::new();
    match &cli.config {
        Some(path) => {
            info!("Loading switch configuration from: {}", path.display());
            if let Err(e) = manager.load_from_file(path) {
                error!("Failed to load switch configuration: {:#}", e);
                process::exit(1);
            }
        }
        None => {
            warn!("No switch configuration file provided, using default switch settings");
        }
    }

    let cfg = manager.into_config();
    let tick_ns = cfg.tick_ns;
    let demo_frames = if cli.demo {
        demo_workload(&cfg, cli.ticks)
    } else {
        Vec::new()
    };

    let switch = match Switch::new(cfg) {
        Ok(s) => s,
        Err(e) => {
            error!("Invalid switch configuration: {e}");
            process::exit(1);
        }
    };

    // ── Run ───────────────────────────────────────────────────────────────────
    let mut runtime = SwitchRuntime::spawn(switch);
    let mut frames = demo_frames.into_iter().peekable();
    let mut granted = 0u64;
    let mut beacons = 0u64;
    let mut warmed = !cli.demo;
    let mut done = 0u64;

    'run: while done < cli.ticks {
        let batch = BATCH_TICKS.min(cli.ticks - done);
        // Frames are batched by arrival against the nominal tick rate.
        let horizon = (done + batch).saturating_mul(tick_ns);

        let mut inputs = Vec::new();
        if !warmed && done >= cli.ticks / 2 {
            // Warm the board up halfway through to exercise compensation.
            inputs.push(SwitchInput::Environment {
                temperature_c: 45.0,
                voltage_mv: 3_250.0,
            });
            warmed = true;
        }
        while let Some(frame) = frames.next_if(|f| f.arrival_time_ns < horizon) {
            inputs.push(SwitchInput::Frame(frame));
        }
        inputs.push(SwitchInput::Advance(batch));

        for input in inputs {
            if let Err(e) = runtime.send(input).await {
                error!("Switch stopped accepting input: {e}");
                break 'run;
            }
        }

        for out in runtime.recv_until_advance().await {
            match out {
                SwitchOutput::Grant(_) => granted += 1,
                SwitchOutput::SyncBeacon(_) => beacons += 1,
                SwitchOutput::AdvanceCompleted { ticks, network_time } => {
                    info!(
                        ticks,
                        now_ns = network_time.ns,
                        valid = network_time.valid,
                        granted,
                        "progress"
                    );
                }
            }
        }
        done += batch;
    }

    let switch = match runtime.shutdown().await {
        Ok((switch, _)) => switch,
        Err(e) => {
            error!("Switch task failed: {e}");
            process::exit(1);
        }
    };

    // ── Report ────────────────────────────────────────────────────────────────
    let stats = switch.statistics();
    info!(
        ticks = stats.ticks,
        grants = granted,
        beacons,
        learned = stats.learned_addresses,
        sync_state = ?stats.sync_state,
        average_latency_ns = ?stats.average_latency_ns,
        "Run complete"
    );
    match serde_yaml::to_string(&stats) {
        Ok(yaml) => info!("Final statistics:\n{yaml}"),
        Err(e) => warn!("Could not render statistics: {e}"),
    }
}

// ── Demo workload ─────────────────────────────────────────────────────────────

fn host(port: PortId) -> MacAddress {
    MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, port as u8 + 1])
}

/// Each port first broadcasts once (so every host is learned), then sends a
/// steady stream to its neighbour.  Port 0 carries a stream-reservation
/// flow; the others mix best-effort classes and frame sizes.
fn demo_workload(cfg: &SwitchConfig, ticks: u64) -> Vec<FrameDescriptor> {
    let end_ns = ticks.saturating_mul(cfg.tick_ns);
    let ports = cfg.port_count;
    let sr_class = cfg.schedule.sr_class_a.get();
    let mut frames = Vec::new();
    let mut handle = 0u64;

    for p in 0..ports {
        handle += 1;
        frames.push(FrameDescriptor {
            handle,
            src_mac: host(p),
            dst_mac: MacAddress::BROADCAST,
            ether_type: 0x0806,
            vlan_id: 1,
            priority: 0,
            length_bytes: 64,
            arrival_time_ns: p as u64 * 1_000,
            ingress_port: p,
        });
    }

    let mut t = 10_000u64;
    let mut round = 0u64;
    while t < end_ns {
        for p in 0..ports {
            handle += 1;
            let (priority, length_bytes) = if p == 0 {
                (sr_class, 256)
            } else {
                ((round % 3) as u8 * 2, [64, 512, 1_500][(round as usize + p) % 3])
            };
            frames.push(FrameDescriptor {
                handle,
                src_mac: host(p),
                dst_mac: host((p + 1) % ports),
                ether_type: 0x0800,
                vlan_id: 1,
                priority,
                length_bytes,
                arrival_time_ns: t + p as u64 * 250,
                ingress_port: p,
            });
        }
        t += DEMO_FRAME_INTERVAL_NS;
        round += 1;
    }

    frames.sort_by_key(|f| f.arrival_time_ns);
    frames
}
