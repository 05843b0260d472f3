//! Per-session runtime state and frame processing.
//!
//! A [`Context`] is built once at startup and shared by reference; it owns the
//! configuration and the read-only asset library. Each client gets its own
//! [`Session`] holding the only mutable state: opacity, the selected asset,
//! the mouth tracker and an optional recording. Sessions share nothing
//! mutable, and each call handles exactly one frame.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::asset::{Asset, AssetKind};
use crate::capability::LandmarkDetector;
use crate::codec::{decode_frame, encode_frame, encode_jpeg};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::library::AssetLibrary;
use crate::mouth::{MouthEvent, MouthTracker};
use crate::overlay::place_overlay;
use crate::warp::warp_face;

/// Process-wide, read-only state.
#[derive(Debug, Clone)]
pub struct Context {
    config: Config,
    library: Arc<AssetLibrary>,
}

impl Context {
    pub fn new(config: Config, library: AssetLibrary) -> Self {
        Self {
            config,
            library: Arc::new(library),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn library(&self) -> &AssetLibrary {
        &self.library
    }
}

/// Audio instruction for the caller's player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "sound", rename_all = "lowercase")]
pub enum AudioEvent {
    /// Stop whatever is playing, then loop this file.
    Start(PathBuf),
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFrame {
    pub frame: RgbImage,
    pub face_found: bool,
    pub mouth_open: bool,
    pub audio: Option<AudioEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// The frame arrived after its budget and was discarded unprocessed.
    Dropped,
    Processed(ProcessedFrame),
}

/// Encoded request as it crosses the service boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRequest {
    /// Base64 image, optionally as a data URL.
    pub frame: String,
    pub asset_id: Option<String>,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

fn default_opacity() -> f32 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameResponse {
    /// Base64 JPEG.
    pub frame: String,
    pub face_found: bool,
    pub mouth_open: bool,
    pub audio: Option<AudioEvent>,
}

/// A finished Motion-JPEG recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub data: Vec<u8>,
    pub frames: usize,
    pub width: u32,
    pub height: u32,
}

impl Recording {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }
}

/// Appends JPEG frames to an in-memory Motion-JPEG stream. The first frame
/// fixes the dimensions; frames of another size are not recorded.
#[derive(Debug)]
struct Recorder {
    quality: u8,
    data: Vec<u8>,
    frames: usize,
    size: Option<(u32, u32)>,
}

impl Recorder {
    fn new(quality: u8) -> Self {
        Self {
            quality,
            data: Vec::new(),
            frames: 0,
            size: None,
        }
    }

    fn push(&mut self, frame: &RgbImage) -> Result<()> {
        let dims = frame.dimensions();
        match self.size {
            None => self.size = Some(dims),
            Some(size) if size != dims => {
                debug!(?size, ?dims, "frame size changed, not recorded");
                return Ok(());
            }
            Some(_) => {}
        }
        self.data.extend_from_slice(&encode_jpeg(frame, self.quality)?);
        self.frames += 1;
        Ok(())
    }

    fn finish(self) -> Option<Recording> {
        let (width, height) = self.size?;
        (self.frames > 0).then_some(Recording {
            data: self.data,
            frames: self.frames,
            width,
            height,
        })
    }
}

#[derive(Debug)]
pub struct Session {
    opacity: f32,
    asset: Option<Arc<Asset>>,
    mouth: MouthTracker,
    recorder: Option<Recorder>,
}

impl Session {
    pub fn new(ctx: &Context) -> Self {
        Self {
            opacity: 1.0,
            asset: None,
            mouth: MouthTracker::from_config(&ctx.config.mouth),
            recorder: None,
        }
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Clamped to `[0, 1]`.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = if opacity.is_nan() {
            0.0
        } else {
            opacity.clamp(0.0, 1.0)
        };
    }

    pub fn selected(&self) -> Option<&Arc<Asset>> {
        self.asset.as_ref()
    }

    pub fn mouth_open(&self) -> bool {
        self.mouth.is_open()
    }

    /// Select an asset by id, or clear the selection with `None`.
    ///
    /// Changing the asset resets the mouth state; if the mouth was open a
    /// `Stop` is returned so the caller silences the old sound. Re-selecting
    /// the current asset changes nothing.
    pub fn select_asset(&mut self, ctx: &Context, id: Option<&str>) -> Result<Option<AudioEvent>> {
        let current = self.asset.as_ref().map(|a| a.id());
        if current == id {
            return Ok(None);
        }

        let next = match id {
            Some(id) => Some(
                ctx.library
                    .get(id)
                    .ok_or_else(|| Error::UnknownAsset(id.to_string()))?,
            ),
            None => None,
        };
        debug!(from = ?current, to = ?id, "asset changed");
        self.asset = next;
        Ok(self.mouth.reset().map(|_| AudioEvent::Stop))
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    /// Start a fresh recording, discarding any unfinished one.
    pub fn start_recording(&mut self, ctx: &Context) {
        self.recorder = Some(Recorder::new(ctx.config.frames.jpeg_quality));
        info!("Recording started");
    }

    /// Stop recording. `None` when nothing was recorded.
    pub fn stop_recording(&mut self) -> Option<Recording> {
        let recording = self.recorder.take()?.finish();
        match &recording {
            Some(r) => info!("Recording stopped after {} frames", r.frames),
            None => info!("Recording stopped, no frames recorded"),
        }
        recording
    }

    /// Composite the selected asset onto one frame.
    ///
    /// Frames older than the configured budget are dropped without touching
    /// any state. Without a selected asset, or when no face is found, the
    /// frame passes through unchanged.
    pub fn process_frame(
        &mut self,
        ctx: &Context,
        frame: RgbImage,
        captured_at: Instant,
        detector: &dyn LandmarkDetector,
    ) -> Result<FrameOutcome> {
        if is_stale(ctx, captured_at) {
            return Ok(FrameOutcome::Dropped);
        }

        let Some(asset) = self.asset.clone() else {
            return self.finish(frame, false, None);
        };
        let Some(landmarks) = detector.detect(&frame) else {
            return self.finish(frame, false, None);
        };
        landmarks.check_range()?;

        let output = match asset.kind() {
            AssetKind::Mask => warp_face(
                &frame,
                &asset,
                &landmarks,
                self.opacity,
                ctx.config.warp.boundary_margin,
            )?,
            AssetKind::Overlay | AssetKind::Prop => place_overlay(
                &frame,
                &asset,
                &landmarks,
                &ctx.config.layout,
                self.opacity,
            )?,
        };

        let audio = match asset.sound() {
            Some(sound) => match self.mouth.update(&landmarks, &ctx.config.layout)? {
                Some(MouthEvent::Start) => Some(AudioEvent::Start(sound.to_path_buf())),
                Some(MouthEvent::Stop) => Some(AudioEvent::Stop),
                None => None,
            },
            None => None,
        };

        self.finish(output, true, audio)
    }

    fn finish(
        &mut self,
        frame: RgbImage,
        face_found: bool,
        audio: Option<AudioEvent>,
    ) -> Result<FrameOutcome> {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.push(&frame)?;
        }
        Ok(FrameOutcome::Processed(ProcessedFrame {
            frame,
            face_found,
            mouth_open: self.mouth.is_open(),
            audio,
        }))
    }

    /// Handle an encoded request end to end. `Ok(None)` means the frame was
    /// dropped for exceeding its budget.
    ///
    /// A request either applies completely or not at all: stale and failed
    /// requests leave the selection, opacity and mouth state as they were.
    /// Otherwise the asset change takes effect before the frame is processed,
    /// and a `Stop` caused by the change is reported unless the frame itself
    /// produces a newer event.
    pub fn process_request(
        &mut self,
        ctx: &Context,
        request: &FrameRequest,
        received_at: Instant,
        detector: &dyn LandmarkDetector,
    ) -> Result<Option<FrameResponse>> {
        if is_stale(ctx, received_at) {
            return Ok(None);
        }
        let frame = decode_frame(&request.frame)?;

        let saved = (self.asset.clone(), self.mouth.clone(), self.opacity);
        match self.apply_request(ctx, request, frame, received_at, detector) {
            Ok(Some(response)) => Ok(Some(response)),
            outcome => {
                debug!(failed = outcome.is_err(), "request not applied, session state restored");
                (self.asset, self.mouth, self.opacity) = saved;
                outcome
            }
        }
    }

    fn apply_request(
        &mut self,
        ctx: &Context,
        request: &FrameRequest,
        frame: RgbImage,
        received_at: Instant,
        detector: &dyn LandmarkDetector,
    ) -> Result<Option<FrameResponse>> {
        let switched = self.select_asset(ctx, request.asset_id.as_deref())?;
        self.set_opacity(request.opacity);

        match self.process_frame(ctx, frame, received_at, detector)? {
            FrameOutcome::Dropped => Ok(None),
            FrameOutcome::Processed(processed) => Ok(Some(FrameResponse {
                frame: encode_frame(&processed.frame, ctx.config.frames.jpeg_quality)?,
                face_found: processed.face_found,
                mouth_open: processed.mouth_open,
                audio: processed.audio.or(switched),
            })),
        }
    }
}

/// Whether a frame captured at `captured_at` has exceeded the frame budget.
fn is_stale(ctx: &Context, captured_at: Instant) -> bool {
    let budget = ctx.config.frames.frame_budget_ms;
    let stale = budget > 0 && captured_at.elapsed() > Duration::from_millis(budget);
    if stale {
        debug!(budget_ms = budget, "frame over budget, dropped");
    }
    stale
}
