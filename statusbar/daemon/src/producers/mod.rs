//! Built-in block producers
//!
//! | Block         | Producer            | Source                          |
//! |---------------|---------------------|---------------------------------|
//! | `00-time`     | [`ClockProducer`]   | local time                      |
//! | `20-battery`  | [`BatteryProducer`] | `/sys/class/power_supply/<dev>` |
//! | `30-network`  | [`NetworkProducer`] | `/sys/class/net`                |

pub mod battery;
pub mod clock;
pub mod network;
mod sysfs;

use statusbar_core::{Producer, StatusConfig};
use tracing::info;

pub use battery::BatteryProducer;
pub use clock::ClockProducer;
pub use network::NetworkProducer;

/// Build every producer enabled in `config`
pub fn build_producers(config: &StatusConfig) -> Vec<Box<dyn Producer>> {
    let mut producers: Vec<Box<dyn Producer>> = Vec::new();

    if config.clock.enabled {
        producers.push(Box::new(ClockProducer::new(config.clock.clone())));
    }
    if config.battery.enabled {
        producers.push(Box::new(BatteryProducer::new(config.battery.clone())));
    }
    if config.network.enabled {
        producers.push(Box::new(NetworkProducer::new(config.network.clone())));
    }

    let names: Vec<&str> = producers.iter().map(|p| p.name()).collect();
    info!(producers = ?names, "Producers configured");
    producers
}
