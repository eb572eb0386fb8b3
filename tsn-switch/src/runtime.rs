/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Async driver: one tokio task owns the [`Switch`]; collaborators talk to it
//! over ordered channels.
//!
//! Inputs are applied strictly in the order they are sent.  `Advance(n)`
//! marks tick boundaries: everything sent before it is applied before those
//! `n` ticks run, and nothing sent after it can influence them.  Outputs
//! (grants, beacons, completion markers) come back in the order they were
//! produced.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::frame::{FrameDescriptor, FrameHandle, PortId, TransmissionGrant};
use crate::switch::Switch;
use crate::timesync::message::SyncMessage;
use crate::timesync::NetworkTime;

/// Bound on queued inputs; senders wait when the switch falls behind.
pub const INPUT_CHANNEL_CAPACITY: usize = 1_024;

/// Ticks run between cooperative yields inside one `Advance`.
const TICKS_PER_YIELD: u64 = 4_096;

#[derive(Debug, Clone, PartialEq)]
pub enum SwitchInput {
    Frame(FrameDescriptor),
    Sync(SyncMessage),
    Environment { temperature_c: f64, voltage_mv: f64 },
    DownstreamReady { port: PortId, ready: bool },
    SyncEnable(bool),
    AbortFrame { ingress: PortId, handle: FrameHandle },
    /// Run this many ticks.
    Advance(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutput {
    Grant(TransmissionGrant),
    SyncBeacon(SyncMessage),
    /// Emitted once after every `Advance`.
    AdvanceCompleted { ticks: u64, network_time: NetworkTime },
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("switch task has stopped")]
    Closed,
    #[error("switch task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub struct SwitchRuntime {
    input: mpsc::Sender<SwitchInput>,
    output: mpsc::UnboundedReceiver<SwitchOutput>,
    task: JoinHandle<Switch>,
}

impl SwitchRuntime {
    /// Move `switch` into a new task.  Must be called inside a tokio runtime.
    pub fn spawn(switch: Switch) -> Self {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(switch, input_rx, output_tx));
        Self {
            input: input_tx,
            output: output_rx,
            task,
        }
    }

    /// Cloneable handle for additional producers.  [`shutdown`](Self::shutdown)
    /// only completes once every clone has been dropped.
    pub fn sender(&self) -> mpsc::Sender<SwitchInput> {
        self.input.clone()
    }

    pub async fn send(&self, input: SwitchInput) -> Result<(), RuntimeError> {
        self.input.send(input).await.map_err(|_| RuntimeError::Closed)
    }

    pub async fn advance(&self, ticks: u64) -> Result<(), RuntimeError> {
        self.send(SwitchInput::Advance(ticks)).await
    }

    pub async fn recv(&mut self) -> Option<SwitchOutput> {
        self.output.recv().await
    }

    /// Outputs up to and including the next `AdvanceCompleted`.
    pub async fn recv_until_advance(&mut self) -> Vec<SwitchOutput> {
        let mut out = Vec::new();
        while let Some(o) = self.output.recv().await {
            let done = matches!(o, SwitchOutput::AdvanceCompleted { .. });
            out.push(o);
            if done {
                break;
            }
        }
        out
    }

    /// Close the input side, wait for every queued input to be applied, and
    /// hand back the switch plus any outputs not yet received.
    pub async fn shutdown(self) -> Result<(Switch, Vec<SwitchOutput>), RuntimeError> {
        let Self {
            input,
            mut output,
            task,
        } = self;
        drop(input);
        let switch = task.await?;
        let mut rest = Vec::new();
        while let Ok(o) = output.try_recv() {
            rest.push(o);
        }
        Ok((switch, rest))
    }
}

async fn drive(
    mut switch: Switch,
    mut input: mpsc::Receiver<SwitchInput>,
    output: mpsc::UnboundedSender<SwitchOutput>,
) -> Switch {
    info!("switch runtime started");

    while let Some(msg) = input.recv().await {
        match msg {
            SwitchInput::Frame(frame) => {
                switch.submit_frame(frame);
            }
            SwitchInput::Sync(m) => switch.deliver_sync_message(m),
            SwitchInput::Environment {
                temperature_c,
                voltage_mv,
            } => switch.set_environment(temperature_c, voltage_mv),
            SwitchInput::DownstreamReady { port, ready } => {
                switch.set_downstream_ready(port, ready)
            }
            SwitchInput::SyncEnable(enable) => switch.set_sync_enable(enable),
            SwitchInput::AbortFrame { ingress, handle } => {
                switch.abort_frame(ingress, handle);
            }
            SwitchInput::Advance(n) => {
                for i in 0..n {
                    for grant in switch.tick() {
                        emit(&output, SwitchOutput::Grant(grant));
                    }
                    for beacon in switch.take_sync_outbound() {
                        emit(&output, SwitchOutput::SyncBeacon(beacon));
                    }
                    if (i + 1) % TICKS_PER_YIELD == 0 {
                        tokio::task::yield_now().await;
                    }
                }
                emit(
                    &output,
                    SwitchOutput::AdvanceCompleted {
                        ticks: switch.ticks(),
                        network_time: switch.network_time(),
                    },
                );
            }
        }
    }

    info!(ticks = switch.ticks(), "switch runtime stopped (input channel closed)");
    switch
}

fn emit(output: &mpsc::UnboundedSender<SwitchOutput>, out: SwitchOutput) {
    if output.send(out).is_err() {
        debug!("output receiver dropped, discarding switch output");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
