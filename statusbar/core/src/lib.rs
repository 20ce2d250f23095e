//! Statusbar Core - Block Aggregation for swaybar / i3bar
//!
//! This crate implements the status command side of the swaybar / i3bar JSON
//! protocol: many independent producers publish blocks, one aggregator keeps
//! the ordered set the bar shows, and clicks coming back from the bar are
//! routed to the producer that owns the clicked block.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                           swaybar                                 │
//! │        click events (stdin)  ▲            │  block stream (stdout)│
//! └──────────────────────────────┼────────────┼───────────────────────┘
//!                                │            ▼
//! ┌──────────────────────────────┼────────────────────────────────────┐
//! │  STATUSBAR CORE              │                                    │
//! │  ┌──────────────┐     ┌──────┴───────┐     ┌──────────────────┐   │
//! │  │ input reader │────►│  Aggregator  │────►│  output writer   │   │
//! │  └──────────────┘     │  VisibleSet  │     └──────────────────┘   │
//! │                       │  ClickRouter │                            │
//! │                       └──────▲───────┘                            │
//! │                  Emitter     │   (command mailbox)                │
//! │        ┌──────────┬──────────┴─┬────────────┐                     │
//! │        │  clock   │  battery   │  network   │  ... producers      │
//! │        └──────────┴────────────┴────────────┘                     │
//! │                                                                   │
//! │  Supervisor: JoinSet + CancellationToken over all of the above    │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Supervisor`]: Starts, watches and drains every task of a run
//! - [`Producer`]: Trait implemented by block sources
//! - [`Emitter`]: Producer handle for publishing and removing blocks
//! - [`Block`]: One segment of the status line
//! - [`ClickEvent`]: A click reported by the bar
//!
//! # Quick Start
//!
//! ```ignore
//! use statusbar_core::{producer_fn, Block, Supervisor, SupervisorConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut supervisor = Supervisor::new(SupervisorConfig::default());
//!     supervisor.add_producer(producer_fn("hello", |ctx| async move {
//!         ctx.emitter().emit(Block::new("00-hello").with_full_text("hi"))?;
//!         ctx.cancelled().await;
//!         anyhow::Ok(())
//!     }));
//!     supervisor.run(tokio::io::stdin(), tokio::io::stdout()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`block`]: Block, key and header types
//! - [`events`]: Click events from the bar
//! - [`emitter`]: Producer-facing command interface
//! - [`aggregator`]: Visible set and snapshot publishing
//! - [`click_router`]: Click handler table
//! - [`producer`]: Producer trait and context
//! - [`protocol`]: Wire codecs for stdin and stdout
//! - [`supervisor`]: Task lifecycle
//! - [`config`]: TOML configuration
//! - [`error`]: Error types

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregator;
pub mod block;
pub mod click_router;
pub mod config;
pub mod emitter;
pub mod error;
pub mod events;
pub mod producer;
pub mod protocol;
pub mod supervisor;

// Re-exports for convenience
pub use aggregator::{Aggregator, Snapshot, VisibleSet};
pub use block::{Align, Block, BlockKey, Header, Markup};
pub use click_router::{ClickRouter, DispatchOutcome};
pub use emitter::{ClickHandler, Command, CommandBus, CommandReceiver, Emitter, ProducerId};
pub use error::{EmitError, StatusError};
pub use events::ClickEvent;
pub use producer::{producer_fn, FnProducer, Producer, ProducerContext};
pub use protocol::{ClickEventDecoder, ClickEventReader, SnapshotWriter};
pub use supervisor::{LifecycleState, ShutdownHandle, Supervisor, SupervisorConfig};

// Config re-exports
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env, BarConfig,
    BatteryConfig, ClockConfig, ConfigError, ConfigOverrides, ConfigSource, NetworkConfig,
    RuntimeConfig, StatusConfig,
};
