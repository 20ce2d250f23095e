//! Block Model
//!
//! Plain data types that travel between producers, the aggregator and the bar.
//!
//! A [`Block`] is one segment of the status line. It is identified by its
//! [`BlockKey`], the `(name, instance)` pair; everything else is presentation
//! payload that the core forwards untouched. Blocks are values: producers
//! build a fresh one for every update, and the aggregator compares them by
//! equality to suppress redundant output.
//!
//! Click handlers are deliberately *not* part of a block. They are registered
//! separately through the [`Emitter`](crate::emitter::Emitter) so that a block
//! stays `Clone + Eq + Serialize`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The `(name, instance)` pair identifying a block
///
/// Ordering is lexicographic on `name`, then on `instance`. This is the order
/// in which blocks appear on the bar.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockKey {
    /// Block name, never empty for a live block
    pub name: String,
    /// Disambiguates blocks sharing a name (e.g. one per network interface)
    pub instance: String,
}

impl BlockKey {
    /// Key for a block without an instance
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: String::new(),
        }
    }

    /// Key for a specific instance of a block
    pub fn with_instance(name: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: instance.into(),
        }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.name, self.instance)
        }
    }
}

/// Text alignment inside a block wider than its text
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    /// Left aligned (bar default)
    Left,
    /// Centered
    Center,
    /// Right aligned
    Right,
}

/// Markup language used to interpret `full_text`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Markup {
    /// Pango markup
    Pango,
    /// Plain text (bar default)
    None,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &u32) -> bool {
    *value == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

/// One element of a body array on the wire
///
/// Empty strings, zero widths and `false` flags are omitted when serialized so
/// the bar applies its own defaults. `full_text` is always written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Block {
    /// Text displayed in the block
    pub full_text: String,
    /// Shorter text used when the bar runs out of room
    #[serde(skip_serializing_if = "String::is_empty")]
    pub short_text: String,
    /// Text color, `#RRGGBB` or `#RRGGBBAA`
    #[serde(skip_serializing_if = "String::is_empty")]
    pub color: String,
    /// Background color
    #[serde(skip_serializing_if = "String::is_empty")]
    pub background: String,
    /// Border color
    #[serde(skip_serializing_if = "String::is_empty")]
    pub border: String,
    /// Top border height in pixels
    #[serde(skip_serializing_if = "is_zero")]
    pub border_top: u32,
    /// Bottom border height in pixels
    #[serde(skip_serializing_if = "is_zero")]
    pub border_bottom: u32,
    /// Left border width in pixels
    #[serde(skip_serializing_if = "is_zero")]
    pub border_left: u32,
    /// Right border width in pixels
    #[serde(skip_serializing_if = "is_zero")]
    pub border_right: u32,
    /// Minimum width, either pixels or a sample string
    #[serde(skip_serializing_if = "String::is_empty")]
    pub min_width: String,
    /// Alignment of the text inside `min_width`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    /// Block name, used to route click events
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Block instance, used to route click events
    #[serde(skip_serializing_if = "String::is_empty")]
    pub instance: String,
    /// Render the block as urgent
    #[serde(skip_serializing_if = "is_false")]
    pub urgent: bool,
    /// Draw the bar separator after this block
    #[serde(skip_serializing_if = "is_false")]
    pub separator: bool,
    /// Blank pixels after the block
    #[serde(skip_serializing_if = "is_zero")]
    pub separator_block_width: u32,
    /// Markup language for `full_text`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markup: Option<Markup>,
}

impl Block {
    /// Create an empty block with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create an empty block for the given key
    #[must_use]
    pub fn for_key(key: &BlockKey) -> Self {
        Self {
            name: key.name.clone(),
            instance: key.instance.clone(),
            ..Self::default()
        }
    }

    /// The key identifying this block
    #[must_use]
    pub fn key(&self) -> BlockKey {
        BlockKey {
            name: self.name.clone(),
            instance: self.instance.clone(),
        }
    }

    /// Set the instance
    #[must_use]
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    /// Set the displayed text
    #[must_use]
    pub fn with_full_text(mut self, text: impl Into<String>) -> Self {
        self.full_text = text.into();
        self
    }

    /// Set the short text
    #[must_use]
    pub fn with_short_text(mut self, text: impl Into<String>) -> Self {
        self.short_text = text.into();
        self
    }

    /// Set the text color
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Set the urgent flag
    #[must_use]
    pub fn with_urgent(mut self, urgent: bool) -> Self {
        self.urgent = urgent;
        self
    }
}

/// First object written on the block stream
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Protocol version, always 1
    pub version: u32,
    /// Ask the bar to send click events on stdin
    #[serde(default, skip_serializing_if = "is_false")]
    pub click_events: bool,
    /// Signal the bar sends to resume output (0 = bar default)
    #[serde(default, skip_serializing_if = "is_zero_signal")]
    pub cont_signal: i32,
    /// Signal the bar sends to pause output (0 = bar default)
    #[serde(default, skip_serializing_if = "is_zero_signal")]
    pub stop_signal: i32,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_signal(value: &i32) -> bool {
    *value == 0
}

impl Default for Header {
    fn default() -> Self {
        Self {
            version: 1,
            click_events: true,
            cont_signal: 0,
            stop_signal: 0,
        }
    }
}
