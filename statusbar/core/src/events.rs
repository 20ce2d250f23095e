//! Click Events
//!
//! Events sent by the bar on stdin when the user clicks a block. The bar only
//! knows about blocks through their `name` and `instance`, so that pair is all
//! the core uses to route an event back to a producer.

use serde::{Deserialize, Serialize};

use crate::block::BlockKey;

/// A click on a rendered block
///
/// Every field is optional on the wire; missing values decode as empty
/// strings or zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickEvent {
    /// Name of the clicked block
    pub name: String,
    /// Instance of the clicked block
    pub instance: String,
    /// X11 button number (0 if the button has no X11 mapping)
    pub button: u32,
    /// Input event code of the button
    pub event: u32,
    /// Absolute x coordinate of the click
    pub x: i32,
    /// Absolute y coordinate of the click
    pub y: i32,
    /// x coordinate relative to the block's top-left corner
    pub relative_x: i32,
    /// y coordinate relative to the block's top-left corner
    pub relative_y: i32,
    /// Block width in pixels
    pub width: u32,
    /// Block height in pixels
    pub height: u32,
}

impl ClickEvent {
    /// Create a left click on the given block
    #[must_use]
    pub fn left_click(key: &BlockKey) -> Self {
        Self {
            name: key.name.clone(),
            instance: key.instance.clone(),
            button: 1,
            ..Self::default()
        }
    }

    /// Key of the block this event targets
    #[must_use]
    pub fn key(&self) -> BlockKey {
        BlockKey {
            name: self.name.clone(),
            instance: self.instance.clone(),
        }
    }
}
