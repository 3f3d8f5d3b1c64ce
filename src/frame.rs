//! Captured frames and the metadata stamped on them.
//!
//! - `Stamp`: wall-clock capture instant, copied verbatim into every message
//!   derived from the same frame.
//! - `Header`: stamp plus coordinate-frame identifier.
//! - `FrameSample`: one decoded BGR frame. Created by the stream session,
//!   moved into an image message, dropped after emission.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Bytes per pixel for the single supported channel order.
pub const BGR8_CHANNELS: usize = 3;

/// Encoding name carried by image messages.
pub const BGR8_ENCODING: &str = "bgr8";

// ----------------------------------------------------------------------------
// Stamp / Header
// ----------------------------------------------------------------------------

/// Seconds and nanoseconds since the Unix epoch.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Stamp {
    pub secs: u32,
    pub nsecs: u32,
}

impl Stamp {
    pub fn now() -> Result<Self> {
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH)?;
        let secs = u32::try_from(since_epoch.as_secs())
            .map_err(|_| anyhow!("system clock is past the representable stamp range"))?;
        Ok(Self {
            secs,
            nsecs: since_epoch.subsec_nanos(),
        })
    }

    pub fn as_nanos(&self) -> u64 {
        u64::from(self.secs) * 1_000_000_000 + u64::from(self.nsecs)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Stamp,
    pub frame_id: String,
}

impl Header {
    pub fn new(stamp: Stamp, frame_id: impl Into<String>) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// FrameSample
// ----------------------------------------------------------------------------

/// One captured frame: `height` rows of `width` BGR pixels, row-major, no padding.
///
/// Not `Clone`: a sample has a single owner from capture to emission.
#[derive(Debug)]
pub struct FrameSample {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: Stamp,
}

impl FrameSample {
    /// Wrap a packed BGR buffer. Fails if the length does not match the dimensions.
    pub fn from_bgr(data: Vec<u8>, width: u32, height: u32, captured_at: Stamp) -> Result<Self> {
        let expected = (width as usize) * (height as usize) * BGR8_CHANNELS;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} bgr8",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            captured_at,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Row stride in bytes.
    pub fn step(&self) -> u32 {
        self.width * BGR8_CHANNELS as u32
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.data
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
