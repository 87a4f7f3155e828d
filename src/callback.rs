//! The data contract handed to a node's process function on the audio thread.

/// Location of one bus inside a node's contiguous scratch storage.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BusSpan {
    pub(crate) offset: usize,
    pub(crate) channels: u32,
}

impl BusSpan {
    #[inline]
    fn len(&self, frames: u32) -> usize {
        self.channels as usize * frames as usize
    }
}

/// Read-only interleaved view of `channels x frames` samples.
#[derive(Clone, Copy)]
pub struct InterleavedView<'a> {
    samples: &'a [f32],
    channels: u32,
    frames: u32,
}

impl<'a> InterleavedView<'a> {
    #[inline]
    pub fn channels(&self) -> u32 {
        self.channels
    }

    #[inline]
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// All samples, frame-major: `samples()[frame * channels + channel]`.
    #[inline]
    pub fn samples(&self) -> &'a [f32] {
        self.samples
    }

    /// One frame's worth of samples.
    #[inline]
    pub fn frame(&self, frame: u32) -> &'a [f32] {
        let ch = self.channels as usize;
        let start = frame as usize * ch;
        &self.samples[start..start + ch]
    }
}

/// Mutable interleaved view of `channels x frames` samples.
pub struct InterleavedViewMut<'a> {
    samples: &'a mut [f32],
    channels: u32,
    frames: u32,
}

impl<'a> InterleavedViewMut<'a> {
    #[inline]
    pub fn channels(&self) -> u32 {
        self.channels
    }

    #[inline]
    pub fn frames(&self) -> u32 {
        self.frames
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        self.samples
    }

    #[inline]
    pub fn samples_mut(&mut self) -> &mut [f32] {
        self.samples
    }

    #[inline]
    pub fn frame_mut(&mut self, frame: u32) -> &mut [f32] {
        let ch = self.channels as usize;
        let start = frame as usize * ch;
        &mut self.samples[start..start + ch]
    }
}

/// Per-invocation view of a node's input and output bus buffers.
///
/// Created by the graph driver once per audio callback and passed to the
/// node's process function by reference. It borrows the node's scratch
/// storage and must not outlive the invocation; every operation runs in
/// bounded time with no heap access. Nodes are expected to uphold the
/// same contract in their own processing code.
pub struct ProcessCallbackData<'a> {
    inputs: Option<&'a [f32]>,
    outputs: &'a mut [f32],
    in_spans: &'a [BusSpan],
    out_spans: &'a [BusSpan],
    in_frames: u32,
    out_frames: u32,
}

impl<'a> ProcessCallbackData<'a> {
    pub(crate) fn new(
        inputs: Option<&'a [f32]>,
        outputs: &'a mut [f32],
        in_spans: &'a [BusSpan],
        out_spans: &'a [BusSpan],
        in_frames: u32,
        out_frames: u32,
    ) -> Self {
        Self {
            inputs,
            outputs,
            in_spans,
            out_spans,
            in_frames,
            out_frames,
        }
    }

    #[inline]
    pub fn input_bus_count(&self) -> u32 {
        self.in_spans.len() as u32
    }

    #[inline]
    pub fn output_bus_count(&self) -> u32 {
        self.out_spans.len() as u32
    }

    #[inline]
    pub fn input_frame_count(&self) -> u32 {
        self.in_frames
    }

    #[inline]
    pub fn output_frame_count(&self) -> u32 {
        self.out_frames
    }

    /// True when the engine supplied no input for this invocation
    /// (disconnected or silent upstream). Branch on this before reading
    /// input buffers.
    #[inline]
    pub fn is_null_input(&self) -> bool {
        self.inputs.is_none()
    }

    /// Interleaved view of one input bus. Empty when the input is null
    /// or the index is out of range. The view borrows the invocation's
    /// input storage directly, so it may be held across output access.
    pub fn input_buffer(&self, bus_index: u32) -> InterleavedView<'a> {
        match (self.inputs, self.in_spans.get(bus_index as usize)) {
            (Some(inputs), Some(span)) => InterleavedView {
                samples: &inputs[span.offset..span.offset + span.len(self.in_frames)],
                channels: span.channels,
                frames: self.in_frames,
            },
            _ => InterleavedView {
                samples: &[],
                channels: 0,
                frames: 0,
            },
        }
    }

    /// Mutable interleaved view of one output bus. Empty when the index
    /// is out of range.
    pub fn output_buffer(&mut self, bus_index: u32) -> InterleavedViewMut<'_> {
        match self.out_spans.get(bus_index as usize) {
            Some(span) => InterleavedViewMut {
                samples: &mut self.outputs[span.offset..span.offset + span.len(self.out_frames)],
                channels: span.channels,
                frames: self.out_frames,
            },
            None => InterleavedViewMut {
                samples: &mut [],
                channels: 0,
                frames: 0,
            },
        }
    }

    /// Writes zero to exactly the addressed output bus.
    pub fn fill_output_bus_with_silence(&mut self, output_bus_index: u32) {
        let mut buffer = self.output_buffer(output_bus_index);
        buffer.samples_mut().fill(0.0);
    }

    /// Writes zero to every output bus.
    pub fn fill_output_with_silence(&mut self) {
        for i in 0..self.output_bus_count() {
            self.fill_output_bus_with_silence(i);
        }
    }

    /// Copies one input bus into one output bus, covering
    /// `min(input_frames, output_frames) x min(channels)` samples.
    /// No-op when either index is out of range or the input is null.
    pub fn copy_bus(&mut self, input_bus: u32, output_bus: u32) {
        let inputs = match self.inputs {
            Some(inputs) => inputs,
            None => return,
        };
        let (in_span, out_span) = match (
            self.in_spans.get(input_bus as usize),
            self.out_spans.get(output_bus as usize),
        ) {
            (Some(i), Some(o)) => (*i, *o),
            _ => return,
        };

        let frames = self.in_frames.min(self.out_frames) as usize;
        let channels = in_span.channels.min(out_span.channels) as usize;
        let count = frames * channels;

        let src = &inputs[in_span.offset..in_span.offset + count];
        let dst = &mut self.outputs[out_span.offset..out_span.offset + count];
        dst.copy_from_slice(src);
    }

    /// For each bus index present in both ranges, copies
    /// `min(input_frames, output_frames) x min(input_channels, output_channels)`
    /// samples verbatim. Unmatched buses are left untouched.
    pub fn copy_inputs_to_outputs(&mut self) {
        let inputs = match self.inputs {
            Some(inputs) => inputs,
            None => return,
        };

        let buses = self.in_spans.len().min(self.out_spans.len());
        for i in 0..buses {
            let in_span = self.in_spans[i];
            let out_span = self.out_spans[i];

            // Matched buses normally share a channel count; take min anyway.
            let frames = self.in_frames.min(self.out_frames) as usize;
            let channels = in_span.channels.min(out_span.channels) as usize;
            let count = frames * channels;

            let src = &inputs[in_span.offset..in_span.offset + count];
            let dst = &mut self.outputs[out_span.offset..out_span.offset + count];
            dst.copy_from_slice(src);
        }
    }
}
