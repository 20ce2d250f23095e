//! Battery block (`20-battery`)
//!
//! Polls `capacity` and `status` under `/sys/class/power_supply/<device>`.
//! A device that is missing at startup is fatal; a reading that fails later
//! is logged and the tick is skipped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use statusbar_core::{BatteryConfig, Block, Producer, ProducerContext};
use tracing::{info, warn};

use super::sysfs;

/// Block name of the battery
pub const BLOCK_NAME: &str = "20-battery";

/// Default sysfs class directory
pub const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

/// One reading of the battery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatteryReading {
    /// Charge in percent
    pub capacity: i64,
    /// Status label, lowercased (`charging`, `discharging`, `full`, ...)
    pub status: String,
}

impl BatteryReading {
    /// Read the device directory
    pub async fn read(device_dir: &Path) -> Result<Self> {
        let capacity = sysfs::read_int(&device_dir.join("capacity")).await?;
        let status = sysfs::read_string(&device_dir.join("status"))
            .await?
            .to_lowercase();
        Ok(Self { capacity, status })
    }

    /// Render as a block
    #[must_use]
    pub fn to_block(&self, urgent_below: u8) -> Block {
        Block::new(BLOCK_NAME)
            .with_full_text(format!("🔋{}% ({})", self.capacity, self.status))
            .with_urgent(self.capacity < i64::from(urgent_below))
    }
}

/// Polls one power supply device
pub struct BatteryProducer {
    device_dir: PathBuf,
    config: BatteryConfig,
}

impl BatteryProducer {
    /// Battery under the system power supply class
    #[must_use]
    pub fn new(config: BatteryConfig) -> Self {
        Self::with_root(POWER_SUPPLY_ROOT, config)
    }

    /// Battery under another class directory
    pub fn with_root(root: impl AsRef<Path>, config: BatteryConfig) -> Self {
        Self {
            device_dir: root.as_ref().join(&config.device),
            config,
        }
    }
}

#[async_trait]
impl Producer for BatteryProducer {
    fn name(&self) -> &str {
        "battery"
    }

    async fn run(self: Box<Self>, ctx: ProducerContext) -> Result<()> {
        if !sysfs::is_dir(&self.device_dir).await {
            bail!(
                "battery device {} not found at {}",
                self.config.device,
                self.device_dir.display()
            );
        }
        info!(device = %self.config.device, "Battery monitoring started");

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while ctx.tick(&mut interval).await {
            match BatteryReading::read(&self.device_dir).await {
                Ok(reading) => ctx
                    .emitter()
                    .emit(reading.to_block(self.config.urgent_below))?,
                Err(e) => warn!(device = %self.config.device, error = %e, "Battery reading skipped"),
            }
        }
        Ok(())
    }
}
