//! Clock block (`00-time`)
//!
//! Shows local time. A left click toggles between the full and the short
//! format and re-renders immediately.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeZone};
use statusbar_core::{Block, BlockKey, ClockConfig, Emitter, Producer, ProducerContext};
use tracing::{debug, warn};

/// Block name of the clock
pub const BLOCK_NAME: &str = "00-time";

/// Renders the current time
pub struct ClockProducer {
    config: ClockConfig,
}

impl ClockProducer {
    /// Create a clock from its configuration
    #[must_use]
    pub fn new(config: ClockConfig) -> Self {
        Self { config }
    }
}

/// Check that a strftime format only uses known specifiers
pub fn check_format(format: &str) -> Result<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        bail!("invalid clock format {format:?}");
    }
    Ok(())
}

/// Format a timestamp, `None` if chrono rejects the format
pub fn render_time<Tz>(now: &DateTime<Tz>, format: &str) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut text = String::new();
    write!(text, "{}", now.format(format)).ok()?;
    Some(text)
}

/// Shared state between the tick loop and the click handler
struct ClockState {
    key: BlockKey,
    format: String,
    short_format: String,
    short: AtomicBool,
}

impl ClockState {
    fn block(&self) -> Option<Block> {
        let format = if self.short.load(Ordering::Relaxed) {
            &self.short_format
        } else {
            &self.format
        };
        let text = render_time(&Local::now(), format)?;
        Some(Block::for_key(&self.key).with_full_text(text))
    }

    fn emit(&self, emitter: &Emitter) -> Result<()> {
        match self.block() {
            Some(block) => emitter.emit(block)?,
            None => warn!(key = %self.key, "Clock format could not be rendered"),
        }
        Ok(())
    }
}

#[async_trait]
impl Producer for ClockProducer {
    fn name(&self) -> &str {
        "clock"
    }

    async fn run(self: Box<Self>, ctx: ProducerContext) -> Result<()> {
        let config = self.config;
        check_format(&config.format)?;
        check_format(&config.short_format)?;

        let state = Arc::new(ClockState {
            key: BlockKey::new(BLOCK_NAME),
            format: config.format,
            short_format: config.short_format,
            short: AtomicBool::new(false),
        });
        let emitter = ctx.emitter().clone();

        let handler_state = Arc::clone(&state);
        let handler_emitter = emitter.clone();
        emitter.on_click(state.key.clone(), move |event| {
            if event.button != 1 {
                return;
            }
            let was_short = handler_state.short.fetch_xor(true, Ordering::Relaxed);
            debug!(short = !was_short, "Clock format toggled");
            if let Err(e) = handler_state.emit(&handler_emitter) {
                debug!(error = %e, "Clock re-render after click dropped");
            }
        })?;

        let mut interval =
            tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while ctx.tick(&mut interval).await {
            state.emit(&emitter)?;
        }
        Ok(())
    }
}
