//! Test helpers for goobert-wall integration tests
//!
//! Provides:
//! - TestWall: a `Wall` on simulated engines with its sink and event stream
//! - Builders for grid requests and fake media lists

#![allow(dead_code)]

use goobert_common::db::SinkOp;
use goobert_common::{EventBus, WallConfig, WallEvent};
use goobert_wall::accounting::SinkHandle;
use goobert_wall::engine::SimulatedEngineFactory;
use goobert_wall::{GridRequest, Wall};
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

/// `Wall` plus everything a test needs to observe it
pub struct TestWall {
    pub wall: Wall,
    pub factory: SimulatedEngineFactory,
    pub ops: mpsc::UnboundedReceiver<SinkOp>,
    pub events: broadcast::Receiver<WallEvent>,
}

impl TestWall {
    pub fn new(config: &WallConfig) -> Self {
        Self::with_factory(config, SimulatedEngineFactory::new())
    }

    pub fn with_factory(config: &WallConfig, factory: SimulatedEngineFactory) -> Self {
        let (sink, ops) = SinkHandle::channel();
        let bus = EventBus::new(4096);
        let events = bus.subscribe();
        let wall = Wall::new(config, Box::new(factory.clone()), sink, bus);
        Self {
            wall,
            factory,
            ops,
            events,
        }
    }

    /// Apply every pending engine event
    pub fn settle(&mut self) -> usize {
        self.wall.drain_engine_events(Instant::now())
    }

    /// Every sink op sent so far
    pub fn take_ops(&mut self) -> Vec<SinkOp> {
        let mut ops = Vec::new();
        while let Ok(op) = self.ops.try_recv() {
            ops.push(op);
        }
        ops
    }

    /// Every event broadcast so far
    pub fn take_events(&mut self) -> Vec<WallEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn current_file(&self, row: usize, col: usize) -> Option<String> {
        self.wall
            .registry()
            .get(row, col)
            .and_then(|c| c.state().current_file.clone())
    }
}

/// Config with the intro skipper off so seeks don't disturb scenarios
pub fn quiet_config() -> WallConfig {
    let mut config = WallConfig::default();
    config.skipper.enabled = false;
    config
}

pub fn media_files(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("/media/clip{:02}.mp4", i)).collect()
}

pub fn grid_request(rows: usize, cols: usize) -> GridRequest {
    GridRequest {
        rows,
        cols,
        source: PathBuf::from("/media"),
        filter: String::new(),
    }
}

/// Watch deltas of all aggregate upserts that recorded time
pub fn watch_deltas(ops: &[SinkOp]) -> Vec<i64> {
    ops.iter()
        .filter_map(|op| match op {
            SinkOp::UpsertAggregate(update) if update.watch_delta_ms > 0 => {
                Some(update.watch_delta_ms)
            }
            _ => None,
        })
        .collect()
}

pub fn session_count(ops: &[SinkOp]) -> usize {
    ops.iter()
        .filter(|op| matches!(op, SinkOp::AppendSession(_)))
        .count()
}
