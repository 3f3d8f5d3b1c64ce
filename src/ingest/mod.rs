//! Frame sources.
//!
//! A `SourceConnector` turns a stream address into an open `FrameSource`
//! handle. The stream session owns at most one handle at a time and replaces
//! it wholesale on reconnect.
//!
//! Sources deliver packed BGR pixels and nothing else. Timestamps are applied
//! by the session at the moment a frame is handed over.

pub mod rtsp;

use anyhow::Result;

pub use rtsp::{RtspConnector, RtspSource, StubOptions};

/// Packed BGR pixels as produced by a source.
#[derive(Debug)]
pub struct RawImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// An open capture connection.
pub trait FrameSource {
    /// Whether the underlying connection is still usable.
    fn is_open(&self) -> bool;

    /// Block for the next frame. `Ok(None)` means the stream produced no frame.
    fn next_frame(&mut self) -> Result<Option<RawImage>>;

    /// Release the connection. Must tolerate repeated calls.
    fn release(&mut self);
}

/// Opens `FrameSource` handles for stream addresses.
pub trait SourceConnector {
    type Source: FrameSource;

    fn connect(&mut self, address: &str) -> Result<Self::Source>;
}
