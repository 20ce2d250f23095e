//! Network blocks (`30-network`, one instance per interface)
//!
//! Scans `/sys/class/net` on every tick. Each interface gets its own block
//! keyed by the interface name; interfaces that disappear are removed from
//! the bar.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use statusbar_core::{Block, BlockKey, Emitter, NetworkConfig, Producer, ProducerContext};
use tracing::{debug, info, warn};

use super::sysfs;

/// Block name shared by every interface block
pub const BLOCK_NAME: &str = "30-network";

/// Default sysfs class directory
pub const NET_CLASS_ROOT: &str = "/sys/class/net";

const ICON_ETHERNET: &str = "🖧";
const ICON_WIRELESS: &str = "📶";

/// State of one interface at scan time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// Kernel interface name
    pub name: String,
    /// `operstate` is `up`
    pub up: bool,
    /// Has a `wireless` directory
    pub wireless: bool,
}

impl Interface {
    /// Render as a block
    #[must_use]
    pub fn to_block(&self) -> Block {
        let icon = if self.wireless {
            ICON_WIRELESS
        } else {
            ICON_ETHERNET
        };
        let state = if self.up { "up" } else { "down" };
        Block::new(BLOCK_NAME)
            .with_instance(self.name.clone())
            .with_full_text(format!("{icon} {} {state}", self.name))
    }
}

/// List interfaces under `root`, skipping ignored names
pub async fn scan(root: &Path, ignore: &[String]) -> Result<Vec<Interface>> {
    let mut entries = tokio::fs::read_dir(root)
        .await
        .with_context(|| format!("failed to list {}", root.display()))?;

    let mut interfaces = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if ignore.iter().any(|ignored| *ignored == name) {
            continue;
        }

        let dir = entry.path();
        let up = match sysfs::read_string(&dir.join("operstate")).await {
            Ok(state) => state == "up",
            Err(e) => {
                debug!(interface = %name, error = %e, "No operstate, assuming down");
                false
            }
        };
        let wireless = sysfs::is_dir(&dir.join("wireless")).await;
        interfaces.push(Interface { name, up, wireless });
    }
    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(interfaces)
}

/// Shows one block per network interface
pub struct NetworkProducer {
    root: PathBuf,
    config: NetworkConfig,
}

impl NetworkProducer {
    /// Interfaces under the system net class
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self::with_root(NET_CLASS_ROOT, config)
    }

    /// Interfaces under another class directory
    pub fn with_root(root: impl Into<PathBuf>, config: NetworkConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Scan once, emit every interface, remove vanished ones
    ///
    /// `shown` holds the interfaces currently on the bar and is updated.
    pub async fn refresh(&self, emitter: &Emitter, shown: &mut BTreeSet<String>) -> Result<()> {
        let interfaces = scan(&self.root, &self.config.ignore).await?;
        let current: BTreeSet<String> = interfaces.iter().map(|i| i.name.clone()).collect();

        for interface in &interfaces {
            emitter.emit(interface.to_block())?;
        }
        for gone in shown.difference(&current) {
            info!(interface = %gone, "Interface disappeared");
            emitter.remove(BlockKey::with_instance(BLOCK_NAME, gone.clone()))?;
        }

        *shown = current;
        Ok(())
    }
}

#[async_trait]
impl Producer for NetworkProducer {
    fn name(&self) -> &str {
        "network"
    }

    async fn run(self: Box<Self>, ctx: ProducerContext) -> Result<()> {
        if !sysfs::is_dir(&self.root).await {
            bail!("network class directory {} not found", self.root.display());
        }

        let mut shown = BTreeSet::new();
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while ctx.tick(&mut interval).await {
            if let Err(e) = self.refresh(ctx.emitter(), &mut shown).await {
                if e.downcast_ref::<statusbar_core::EmitError>().is_some() {
                    return Err(e);
                }
                warn!(error = %e, "Network scan skipped");
            }
        }
        Ok(())
    }
}
