//! RTSP frame source.
//!
//! `RtspConnector` opens one of two backends depending on the address scheme:
//! - `stub://name[?width=W&height=H&fail_after=N&refuse=1]`: synthetic frames for
//!   tests and demos. `fail_after` drops the connection after N frames,
//!   `refuse` makes every connection attempt fail.
//! - anything else: a GStreamer `rtspsrc` pipeline decoding to packed BGR
//!   (feature `rtsp-gstreamer`).
//!
//! Every `connect` builds a brand-new backend; nothing is reused across
//! reconnects.

use anyhow::{anyhow, Result};
#[cfg(feature = "rtsp-gstreamer")]
use anyhow::Context;

use super::{FrameSource, RawImage, SourceConnector};
use crate::frame::BGR8_CHANNELS;

const STUB_SCHEME: &str = "stub://";
const DEFAULT_STUB_WIDTH: u32 = 640;
const DEFAULT_STUB_HEIGHT: u32 = 480;

/// Opens RTSP (or synthetic) sources by address.
#[derive(Clone, Debug, Default)]
pub struct RtspConnector;

impl SourceConnector for RtspConnector {
    type Source = RtspSource;

    fn connect(&mut self, address: &str) -> Result<RtspSource> {
        RtspSource::open(address)
    }
}

/// An open RTSP connection.
pub struct RtspSource {
    backend: RtspBackend,
}

enum RtspBackend {
    Synthetic(SyntheticRtspSource),
    #[cfg(feature = "rtsp-gstreamer")]
    Gstreamer(GstreamerRtspSource),
}

impl RtspSource {
    pub fn open(address: &str) -> Result<Self> {
        if address.starts_with(STUB_SCHEME) {
            let options = StubOptions::parse(address)?;
            return Ok(Self {
                backend: RtspBackend::Synthetic(SyntheticRtspSource::connect(options)?),
            });
        }
        #[cfg(feature = "rtsp-gstreamer")]
        {
            Ok(Self {
                backend: RtspBackend::Gstreamer(GstreamerRtspSource::connect(address)?),
            })
        }
        #[cfg(not(feature = "rtsp-gstreamer"))]
        {
            Err(anyhow!(
                "cannot open {}: RTSP requires the rtsp-gstreamer feature",
                address
            ))
        }
    }
}

impl FrameSource for RtspSource {
    fn is_open(&self) -> bool {
        match &self.backend {
            RtspBackend::Synthetic(source) => source.is_open(),
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.is_open(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<RawImage>> {
        match &mut self.backend {
            RtspBackend::Synthetic(source) => Ok(source.next_frame()),
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.next_frame(),
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            RtspBackend::Synthetic(source) => source.release(),
            #[cfg(feature = "rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.release(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

/// Options encoded in a `stub://` address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StubOptions {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fail_after: Option<u64>,
    pub refuse: bool,
}

impl StubOptions {
    pub fn parse(address: &str) -> Result<Self> {
        let rest = address
            .strip_prefix(STUB_SCHEME)
            .ok_or_else(|| anyhow!("not a stub address: {}", address))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut options = Self {
            name: name.to_string(),
            width: DEFAULT_STUB_WIDTH,
            height: DEFAULT_STUB_HEIGHT,
            fail_after: None,
            refuse: false,
        };
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("stub option '{}' is missing a value", pair))?;
            match key {
                "width" => options.width = parse_option(key, value)?,
                "height" => options.height = parse_option(key, value)?,
                "fail_after" => options.fail_after = Some(parse_option(key, value)?),
                "refuse" => options.refuse = matches!(value, "1" | "true"),
                other => return Err(anyhow!("unknown stub option '{}'", other)),
            }
        }
        if options.width == 0 || options.height == 0 {
            return Err(anyhow!("stub frame dimensions must be non-zero"));
        }
        Ok(options)
    }
}

fn parse_option<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("stub option '{}' has invalid value '{}'", key, value))
}

struct SyntheticRtspSource {
    options: StubOptions,
    frame_count: u64,
    /// Shifts the pattern every 50 frames so consecutive scenes differ.
    scene_state: u8,
    open: bool,
}

impl SyntheticRtspSource {
    fn connect(options: StubOptions) -> Result<Self> {
        if options.refuse {
            return Err(anyhow!("stub://{} refused the connection", options.name));
        }
        log::info!("RtspSource: connected to stub://{} (synthetic)", options.name);
        Ok(Self {
            options,
            frame_count: 0,
            scene_state: 0,
            open: true,
        })
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn next_frame(&mut self) -> Option<RawImage> {
        if !self.open {
            return None;
        }
        if let Some(limit) = self.options.fail_after {
            if self.frame_count >= limit {
                log::debug!("stub://{} dropping connection", self.options.name);
                self.open = false;
                return None;
            }
        }
        self.frame_count += 1;
        Some(RawImage {
            data: self.generate_synthetic_pixels(),
            width: self.options.width,
            height: self.options.height,
        })
    }

    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        let pixel_count =
            (self.options.width as usize) * (self.options.height as usize) * BGR8_CHANNELS;

        if self.frame_count.is_multiple_of(50) {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let offset = self.frame_count + u64::from(self.scene_state);
        (0..pixel_count)
            .map(|i| ((i as u64 + offset) % 256) as u8)
            .collect()
    }

    fn release(&mut self) {
        self.open = false;
    }
}

// ----------------------------------------------------------------------------
// GStreamer source
// ----------------------------------------------------------------------------

#[cfg(feature = "rtsp-gstreamer")]
const PULL_TIMEOUT_MS: u64 = 2_000;
#[cfg(feature = "rtsp-gstreamer")]
const STATE_CHANGE_TIMEOUT_S: u64 = 5;

#[cfg(feature = "rtsp-gstreamer")]
struct GstreamerRtspSource {
    address: String,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    last_error: Option<String>,
    released: bool,
}

#[cfg(feature = "rtsp-gstreamer")]
impl GstreamerRtspSource {
    /// Build `rtspsrc ! decodebin ! videoconvert ! appsink` and bring it to Playing.
    fn connect(address: &str) -> Result<Self> {
        use gstreamer::prelude::*;

        gstreamer::init().context("initialize gstreamer")?;

        let pipeline_description = format!(
            "rtspsrc location={} latency=0 ! decodebin ! videoconvert ! video/x-raw,format=BGR ! \
             appsink name=appsink sync=false max-buffers=1 drop=true",
            address
        );
        let pipeline = gstreamer::parse::launch(&pipeline_description)
            .context("build RTSP pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("RTSP pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "BGR")
            .build();
        appsink.set_caps(Some(&caps));

        let mut source = Self {
            address: address.to_string(),
            pipeline,
            appsink,
            last_error: None,
            released: false,
        };

        let started = source
            .pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| anyhow!("set RTSP pipeline to Playing: {}", e))
            .and_then(|_| {
                let (result, _, _) = source
                    .pipeline
                    .state(gstreamer::ClockTime::from_seconds(STATE_CHANGE_TIMEOUT_S));
                result.map_err(|e| anyhow!("RTSP pipeline failed to start: {}", e))
            });
        if let Err(err) = started {
            source.release();
            return Err(err);
        }

        log::info!("RtspSource: connected to {}", source.address);
        Ok(source)
    }

    fn is_open(&self) -> bool {
        !self.released && self.last_error.is_none()
    }

    fn next_frame(&mut self) -> Result<Option<RawImage>> {
        self.poll_bus();
        if let Some(err) = &self.last_error {
            return Err(anyhow!("{}", err));
        }

        let Some(sample) = self
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_mseconds(PULL_TIMEOUT_MS))
        else {
            return Ok(None);
        };

        sample_to_image(&sample).map(Some)
    }

    fn release(&mut self) {
        use gstreamer::prelude::*;

        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("RtspSource: failed to stop pipeline for {}: {}", self.address, e);
        }
    }

    fn poll_bus(&mut self) {
        use gstreamer::prelude::*;

        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    self.last_error = Some(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => {
                    self.last_error = Some("gstreamer reached EOS".to_string());
                }
                _ => {}
            }
        }
    }
}

#[cfg(feature = "rtsp-gstreamer")]
impl Drop for GstreamerRtspSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(feature = "rtsp-gstreamer")]
fn sample_to_image(sample: &gstreamer::Sample) -> Result<RawImage> {
    let buffer = sample.buffer().context("RTSP sample missing buffer")?;
    let caps = sample.caps().context("RTSP sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse RTSP caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * BGR8_CHANNELS;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map RTSP buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let packed = data
            .get(..len)
            .context("RTSP buffer is shorter than its caps")?;
        return Ok(RawImage {
            data: packed.to_vec(),
            width,
            height,
        });
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("RTSP buffer row is out of bounds")?,
        );
    }

    Ok(RawImage {
        data: pixels,
        width,
        height,
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
