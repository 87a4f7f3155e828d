//! Data sources: the sample-producing side of a [`crate::nodes::Sound`].
//!
//! A source is anything that can deliver interleaved `f32` frames on
//! demand. The trait splits required operations (read, format) from
//! optional capabilities (seek, cursor, length, looping) so adapters over
//! non-seekable streams can exist without pretending; unsupported calls
//! return [`EngineError::NotImplemented`] rather than faking an answer.

use crate::error::{EngineError, Status};
use crate::vfs::{SeekOrigin, VfsFile};

/// Sample encoding of a source. The graph itself processes only `F32`;
/// the variant exists so formats are explicit at the source boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> u32 {
        match self {
            SampleFormat::F32 => 4,
        }
    }
}

/// Format of the frames a source produces, fixed for its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataFormat {
    pub format: SampleFormat,
    pub channels: u32,
    pub sample_rate: u32,
}

/// Result of one [`DataSource::read`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadInfo {
    pub frames_read: u64,
    /// Set on the read that exhausts a non-looping source. Looping
    /// sources never report it.
    pub at_end: bool,
}

/// Produces interleaved `f32` frames for a sound.
///
/// `read` is called from the audio thread; implementations should stay
/// allocation-free after warm-up. Everything except `read` and
/// `data_format` is optional.
pub trait DataSource: Send {
    /// Fills `out` with up to `frame_count` frames. `out` holds at least
    /// `frame_count * channels` samples; frames past `frames_read` are
    /// left untouched.
    fn read(&mut self, out: &mut [f32], frame_count: u64) -> Result<ReadInfo, EngineError>;

    fn data_format(&self) -> DataFormat;

    /// Repositions the source to an absolute frame.
    fn seek_to_frame(&mut self, _frame: u64) -> Status {
        Err(EngineError::NotImplemented)
    }

    /// Current position in frames.
    fn cursor(&self) -> Result<u64, EngineError> {
        Err(EngineError::NotImplemented)
    }

    /// Total length in frames, when knowable.
    fn length(&self) -> Result<u64, EngineError> {
        Err(EngineError::NotImplemented)
    }

    /// Makes `read` wrap instead of ending. Sources that cannot rewind
    /// keep the default.
    fn set_looping(&mut self, _looping: bool) -> Status {
        Err(EngineError::NotImplemented)
    }

    /// Speaker assignment per channel, for sources that carry one.
    fn channel_map(&self, _out: &mut [u8]) -> Status {
        Err(EngineError::NotImplemented)
    }
}

/// Raw interleaved little-endian `f32` PCM streamed out of a [`VfsFile`].
///
/// The file carries no header; channel count and sample rate are supplied
/// by the caller and the length is derived from the file size.
pub struct PcmStreamSource {
    file: VfsFile,
    channels: u32,
    sample_rate: u32,
    total_frames: u64,
    cursor_frames: u64,
    looping: bool,
    byte_scratch: Vec<u8>,
}

impl PcmStreamSource {
    pub fn new(file: VfsFile, channels: u32, sample_rate: u32) -> Result<Self, EngineError> {
        if channels == 0 || sample_rate == 0 {
            return Err(EngineError::InvalidArgs);
        }
        let frame_bytes = channels as u64 * 4;
        let total_frames = file.info().size_in_bytes / frame_bytes;
        Ok(Self {
            file,
            channels,
            sample_rate,
            total_frames,
            cursor_frames: 0,
            looping: false,
            byte_scratch: Vec::new(),
        })
    }

    fn frame_bytes(&self) -> u64 {
        self.channels as u64 * 4
    }

    /// Reads whole frames from the current file position into `out`,
    /// returning how many frames arrived.
    fn read_frames(&mut self, out: &mut [f32], frame_count: u64) -> Result<u64, EngineError> {
        let want_bytes = (frame_count * self.frame_bytes()) as usize;
        if self.byte_scratch.len() < want_bytes {
            self.byte_scratch.resize(want_bytes, 0);
        }
        let read = self.file.read(&mut self.byte_scratch[..want_bytes])?;
        let frames = read as u64 / self.frame_bytes();
        let samples = (frames * self.channels as u64) as usize;
        for (dst, chunk) in out[..samples]
            .iter_mut()
            .zip(self.byte_scratch.chunks_exact(4))
        {
            *dst = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(frames)
    }
}

impl DataSource for PcmStreamSource {
    fn read(&mut self, out: &mut [f32], frame_count: u64) -> Result<ReadInfo, EngineError> {
        let mut info = ReadInfo::default();
        let mut remaining = frame_count.min(out.len() as u64 / self.channels as u64);
        let mut offset = 0usize;

        while remaining > 0 {
            let frames = self.read_frames(
                &mut out[offset..offset + (remaining * self.channels as u64) as usize],
                remaining,
            )?;
            self.cursor_frames += frames;
            info.frames_read += frames;
            offset += (frames * self.channels as u64) as usize;
            remaining -= frames;

            if frames == 0 || self.cursor_frames >= self.total_frames {
                if self.looping && self.total_frames > 0 {
                    self.file.seek(SeekOrigin::Start, 0)?;
                    self.cursor_frames = 0;
                } else {
                    info.at_end = true;
                    break;
                }
            }
        }
        Ok(info)
    }

    fn data_format(&self) -> DataFormat {
        DataFormat {
            format: SampleFormat::F32,
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
    }

    fn seek_to_frame(&mut self, frame: u64) -> Status {
        let byte = frame
            .checked_mul(self.frame_bytes())
            .ok_or(EngineError::InvalidArgs)?;
        self.file.seek(SeekOrigin::Start, byte as i64)?;
        self.cursor_frames = frame;
        Ok(())
    }

    fn cursor(&self) -> Result<u64, EngineError> {
        Ok(self.cursor_frames)
    }

    fn length(&self) -> Result<u64, EngineError> {
        Ok(self.total_frames)
    }

    fn set_looping(&mut self, looping: bool) -> Status {
        self.looping = looping;
        Ok(())
    }
}
