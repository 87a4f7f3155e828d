//! Sound: a playback node streaming frames out of a [`DataSource`].
//!
//! The node resamples its source to the graph rate with linear
//! interpolation, scaled by the sound's pitch, and applies volume and an
//! optional timed fade on the way out. Control-side setters that touch
//! multi-word state take the graph lock so the audio thread never sees a
//! half-written fade.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use tracing::{debug, error};

use crate::bus::{BusConfig, NodeLayout, RawNode, Routing, Topology};
use crate::callback::ProcessCallbackData;
use crate::engine::Engine;
use crate::error::{EngineError, Status};
use crate::graph::{self, NodeCore, NodeVTable};
use crate::handle::{Resource, ResourceHandle};
use crate::source::{DataSource, PcmStreamSource};
use crate::vfs::OpenMode;

const NO_SEEK: u64 = u64::MAX;

#[repr(C)]
pub(crate) struct SoundCore {
    base: NodeCore,
    source: Option<Box<dyn DataSource>>,

    volume_bits: AtomicU32,
    pitch_bits: AtomicU32,
    looping: AtomicBool,
    at_end: AtomicBool,
    /// Frames consumed from the source, in the source's rate. Wraps at
    /// the source length while looping, tracking the source's rewind.
    cursor: AtomicU64,
    /// Seek request consumed by the next process call; `NO_SEEK` when none.
    pending_seek: AtomicU64,

    // Fade parameters; written under the graph lock, read by the audio
    // thread while it holds that lock.
    fade_start_bits: AtomicU32,
    fade_end_bits: AtomicU32,
    fade_length: AtomicU64,
    fade_progress: AtomicU64,

    length_frames: u64,
    source_rate: u32,
    source_channels: u32,
    engine_rate: u32,

    // Audio-thread-only resampler state.
    cur_frame: Vec<f32>,
    nxt_frame: Vec<f32>,
    frac: f64,
    primed: bool,
    /// Set once the lookahead frame has been flushed at end of source.
    tail_played: bool,
    src_buf: Vec<f32>,
    src_pos: usize,
    src_len: usize,
    refill_frames: u32,
}

impl Default for SoundCore {
    fn default() -> Self {
        Self {
            base: NodeCore::default(),
            source: None,
            volume_bits: AtomicU32::new(0),
            pitch_bits: AtomicU32::new(0),
            looping: AtomicBool::new(false),
            at_end: AtomicBool::new(false),
            cursor: AtomicU64::new(0),
            pending_seek: AtomicU64::new(NO_SEEK),
            fade_start_bits: AtomicU32::new(1.0f32.to_bits()),
            fade_end_bits: AtomicU32::new(1.0f32.to_bits()),
            fade_length: AtomicU64::new(0),
            fade_progress: AtomicU64::new(0),
            length_frames: 0,
            source_rate: 0,
            source_channels: 0,
            engine_rate: 0,
            cur_frame: Vec::new(),
            nxt_frame: Vec::new(),
            frac: 0.0,
            primed: false,
            tail_played: false,
            src_buf: Vec::new(),
            src_pos: 0,
            src_len: 0,
            refill_frames: 0,
        }
    }
}

impl Resource for SoundCore {
    fn destruct(&mut self) {
        self.base.detach_all();
        self.source = None;
    }
}

impl SoundCore {
    /// Pulls the next source frame out of the residue buffer, refilling
    /// from the source when empty. `None` means the source is exhausted.
    fn take_frame(&mut self) -> Option<usize> {
        let channels = self.source_channels as usize;
        if self.src_pos >= self.src_len {
            let source = self.source.as_mut()?;
            let want = self.refill_frames as u64;
            let info = source
                .read(&mut self.src_buf[..], want)
                .unwrap_or_default();
            self.src_pos = 0;
            self.src_len = info.frames_read as usize;
            if info.frames_read == 0 {
                return None;
            }
        }
        let offset = self.src_pos * channels;
        self.src_pos += 1;
        let mut next = self.cursor.load(Ordering::Acquire) + 1;
        if self.length_frames > 0
            && next >= self.length_frames
            && self.looping.load(Ordering::Acquire)
        {
            next %= self.length_frames;
        }
        self.cursor.store(next, Ordering::Release);
        Some(offset)
    }

    /// Advances the cur/nxt frame pair by one source frame. Returns
    /// `false` when the source ran out.
    fn advance(&mut self) -> bool {
        match self.take_frame() {
            Some(offset) => {
                let channels = self.source_channels as usize;
                self.cur_frame.copy_from_slice(&self.nxt_frame);
                let (buf, nxt) = (&self.src_buf, &mut self.nxt_frame);
                nxt.copy_from_slice(&buf[offset..offset + channels]);
                true
            }
            None => {
                // Interpolation looks one frame ahead; flush that frame
                // before declaring the end.
                if self.tail_played {
                    return false;
                }
                self.tail_played = true;
                let (cur, nxt) = (&mut self.cur_frame, &self.nxt_frame);
                cur.copy_from_slice(nxt);
                true
            }
        }
    }

    fn prime(&mut self) -> bool {
        let channels = self.source_channels as usize;
        match self.take_frame() {
            Some(offset) => {
                self.cur_frame
                    .copy_from_slice(&self.src_buf[offset..offset + channels]);
            }
            None => return false,
        }
        match self.take_frame() {
            Some(offset) => {
                self.nxt_frame
                    .copy_from_slice(&self.src_buf[offset..offset + channels]);
            }
            None => self.nxt_frame.copy_from_slice(&self.cur_frame),
        }
        self.frac = 0.0;
        self.primed = true;
        self.tail_played = false;
        true
    }

    fn fade_gain(&self) -> f32 {
        let length = self.fade_length.load(Ordering::Acquire);
        let end = f32::from_bits(self.fade_end_bits.load(Ordering::Acquire));
        if length == 0 {
            return end;
        }
        let start = f32::from_bits(self.fade_start_bits.load(Ordering::Acquire));
        let progress = self.fade_progress.load(Ordering::Acquire).min(length);
        start + (end - start) * (progress as f64 / length as f64) as f32
    }

    fn step_fade(&self) {
        let length = self.fade_length.load(Ordering::Acquire);
        if length == 0 {
            return;
        }
        let progress = self.fade_progress.load(Ordering::Acquire);
        if progress < length {
            self.fade_progress.store(progress + 1, Ordering::Release);
        }
    }
}

unsafe fn sound_process(node: *mut NodeCore, data: &mut ProcessCallbackData) {
    let core = &mut *(node as *mut SoundCore);
    data.fill_output_bus_with_silence(0);
    if core.source.is_none() {
        return;
    }

    let seek = core.pending_seek.swap(NO_SEEK, Ordering::AcqRel);
    if seek != NO_SEEK {
        if let Some(source) = core.source.as_mut() {
            if source.seek_to_frame(seek).is_ok() {
                core.cursor.store(seek, Ordering::Release);
                core.at_end.store(false, Ordering::Release);
                core.src_pos = 0;
                core.src_len = 0;
                core.primed = false;
                core.tail_played = false;
            }
        }
    }

    if core.at_end.load(Ordering::Acquire) {
        return;
    }
    if !core.primed && !core.prime() {
        core.at_end.store(true, Ordering::Release);
        return;
    }

    let pitch = f32::from_bits(core.pitch_bits.load(Ordering::Acquire)).max(f32::MIN_POSITIVE);
    let ratio = core.source_rate as f64 / core.engine_rate as f64 * pitch as f64;
    let volume = f32::from_bits(core.volume_bits.load(Ordering::Acquire));

    let mut out = data.output_buffer(0);
    let channels = core.source_channels as usize;
    for frame in 0..out.frames() {
        while core.frac >= 1.0 {
            if !core.advance() {
                core.at_end.store(true, Ordering::Release);
                return;
            }
            core.frac -= 1.0;
        }

        let gain = volume * core.fade_gain();
        core.step_fade();
        let t = core.frac as f32;
        let samples = out.frame_mut(frame);
        for ch in 0..channels.min(samples.len()) {
            let interp = core.cur_frame[ch] + (core.nxt_frame[ch] - core.cur_frame[ch]) * t;
            samples[ch] = interp * gain;
        }
        core.frac += ratio;
    }
}

const SOUND_VTABLE: NodeVTable = NodeVTable {
    on_process: sound_process,
    on_required_input_frames: None,
    flags: 0,
};

/// A playable sound: a data source wired into the graph as a source node
/// with volume, pitch, looping, seeking, and timed fades.
///
/// Constructed stopped; call [`Routing::start`] to make it audible. The
/// output bus carries the source's channel count and is attached to the
/// engine endpoint automatically when the counts match.
pub struct Sound {
    handle: ResourceHandle<SoundCore>,
}

impl Sound {
    pub fn new() -> Self {
        Self {
            handle: ResourceHandle::empty(),
        }
    }

    /// Wraps an already-built source. The source's declared format must
    /// have nonzero channels and sample rate.
    pub fn init_from_data_source(
        &mut self,
        engine: &Engine,
        source: Box<dyn DataSource>,
    ) -> bool {
        let cache_cap = engine.processing_size_in_frames();
        let engine_rate = engine.sample_rate();
        let status = self.handle.emplace(|core| {
            let format = source.data_format();
            if format.channels == 0 || format.sample_rate == 0 || engine_rate == 0 {
                return Err(EngineError::InvalidArgs);
            }
            core.length_frames = source.length().unwrap_or(0);
            core.source_rate = format.sample_rate;
            core.source_channels = format.channels;
            core.engine_rate = engine_rate;
            core.volume_bits.store(1.0f32.to_bits(), Ordering::Release);
            core.pitch_bits.store(1.0f32.to_bits(), Ordering::Release);
            core.cur_frame = vec![0.0; format.channels as usize];
            core.nxt_frame = vec![0.0; format.channels as usize];
            core.refill_frames = cache_cap;
            core.src_buf = vec![0.0; cache_cap as usize * format.channels as usize];
            core.source = Some(source);
            core.base.construct(
                SOUND_VTABLE,
                &NodeLayout::with_bus_config(
                    BusConfig::new().with_output(format.channels),
                ),
                cache_cap,
                false,
            )
        });
        match status {
            Ok(()) => {}
            Err(e) => {
                error!(error = %e, "sound init failed");
                self.handle.discard();
                return false;
            }
        }
        if !self.output_bus(0).attach_to(engine.endpoint_bus()) {
            debug!("sound not auto-attached: channel counts differ from endpoint");
        }
        true
    }

    /// Opens `path` through the engine's VFS as headerless interleaved
    /// little-endian `f32` PCM at the engine's channel count and sample
    /// rate. Fails when the engine has no VFS.
    pub fn init_from_file(&mut self, engine: &Engine, path: &str) -> bool {
        let vfs = match engine.vfs() {
            Some(vfs) => vfs,
            None => {
                error!(path, "sound init failed: engine has no vfs");
                return false;
            }
        };
        let source = vfs
            .open(path, OpenMode::Read)
            .and_then(|file| PcmStreamSource::new(file, engine.channels(), engine.sample_rate()));
        match source {
            Ok(source) => self.init_from_data_source(engine, Box::new(source)),
            Err(e) => {
                error!(error = %e, path, "sound init failed");
                false
            }
        }
    }

    pub fn set_volume(&self, volume: f32) -> bool {
        if !(volume >= 0.0) {
            return false;
        }
        match self.handle.get() {
            Some(core) => {
                core.volume_bits.store(volume.to_bits(), Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn volume(&self) -> f32 {
        self.handle
            .get()
            .map_or(0.0, |c| f32::from_bits(c.volume_bits.load(Ordering::Acquire)))
    }

    /// Playback rate multiplier. Rejects non-positive values.
    pub fn set_pitch(&self, pitch: f32) -> bool {
        if !(pitch > 0.0) {
            return false;
        }
        match self.handle.get() {
            Some(core) => {
                core.pitch_bits.store(pitch.to_bits(), Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// `0.0` when uninitialized.
    pub fn pitch(&self) -> f32 {
        self.handle
            .get()
            .map_or(0.0, |c| f32::from_bits(c.pitch_bits.load(Ordering::Acquire)))
    }

    /// Forwards looping to the source; fails when the source does not
    /// support rewinding.
    pub fn set_looping(&mut self, looping: bool) -> bool {
        let core = match self.handle.get_mut() {
            Some(core) => core,
            None => return false,
        };
        let status: Status = graph::with_topology_lock(|| match core.source.as_mut() {
            Some(source) => source.set_looping(looping),
            None => Err(EngineError::InvalidOperation),
        });
        match status {
            Ok(()) => {
                core.looping.store(looping, Ordering::Release);
                true
            }
            Err(_) => false,
        }
    }

    pub fn is_looping(&self) -> bool {
        self.handle
            .get()
            .map_or(false, |c| c.looping.load(Ordering::Acquire))
    }

    /// True once a non-looping source has been exhausted. Cleared by
    /// [`Sound::seek_to_frame`].
    pub fn at_end(&self) -> bool {
        self.handle
            .get()
            .map_or(false, |c| c.at_end.load(Ordering::Acquire))
    }

    /// Requests a reposition, honored at the start of the next process
    /// call. The reported cursor reflects the target immediately. Frames
    /// beyond the source length are accepted; playback there ends at
    /// once.
    pub fn seek_to_frame(&self, frame: u64) -> bool {
        match self.handle.get() {
            Some(core) => {
                if frame == NO_SEEK {
                    return false;
                }
                core.pending_seek.store(frame, Ordering::Release);
                core.cursor.store(frame, Ordering::Release);
                core.at_end.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Position in source frames.
    pub fn cursor_in_frames(&self) -> u64 {
        self.handle
            .get()
            .map_or(0, |c| c.cursor.load(Ordering::Acquire))
    }

    /// Source length in frames, captured at init; `0` when the source
    /// could not report one.
    pub fn length_in_frames(&self) -> u64 {
        self.handle.get().map_or(0, |c| c.length_frames)
    }

    pub fn cursor_in_seconds(&self) -> f64 {
        match self.handle.get() {
            Some(core) if core.source_rate > 0 => {
                core.cursor.load(Ordering::Acquire) as f64 / core.source_rate as f64
            }
            _ => 0.0,
        }
    }

    pub fn length_in_seconds(&self) -> f64 {
        match self.handle.get() {
            Some(core) if core.source_rate > 0 => {
                core.length_frames as f64 / core.source_rate as f64
            }
            _ => 0.0,
        }
    }

    /// Starts a linear gain ramp over `length_frames` output frames.
    /// A negative `volume_begin` means "from the current fade volume".
    pub fn set_fade_in_frames(
        &self,
        volume_begin: f32,
        volume_end: f32,
        length_frames: u64,
    ) -> bool {
        let core = match self.handle.get() {
            Some(core) => core,
            None => return false,
        };
        if !(volume_end >= 0.0) {
            return false;
        }
        graph::with_topology_lock(|| {
            let begin = if volume_begin < 0.0 {
                core.fade_gain()
            } else {
                volume_begin
            };
            core.fade_start_bits.store(begin.to_bits(), Ordering::Release);
            core.fade_end_bits
                .store(volume_end.to_bits(), Ordering::Release);
            core.fade_length.store(length_frames, Ordering::Release);
            core.fade_progress.store(0, Ordering::Release);
        });
        true
    }

    /// Like [`Sound::set_fade_in_frames`] with the length given in
    /// milliseconds of engine time.
    pub fn set_fade_in_milliseconds(
        &self,
        volume_begin: f32,
        volume_end: f32,
        length_ms: u64,
    ) -> bool {
        let rate = match self.handle.get() {
            Some(core) => core.engine_rate as u64,
            None => return false,
        };
        self.set_fade_in_frames(volume_begin, volume_end, length_ms * rate / 1000)
    }

    /// The fade gain as of the latest processed frame.
    pub fn current_fade_volume(&self) -> f32 {
        match self.handle.get() {
            Some(core) => graph::with_topology_lock(|| core.fade_gain()),
            None => 0.0,
        }
    }
}

impl Default for Sound {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology for Sound {
    fn raw(&self) -> RawNode {
        RawNode(self.handle.as_ptr().cast::<NodeCore>())
    }
}

impl Routing for Sound {}
