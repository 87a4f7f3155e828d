use std::sync::Arc;

use klang::nodes::{GroupNode, GroupSettings, HpfNode, LpfNode, Sound, SplitterNode};
use klang::{
    node_flags, BaseNode, BusConfig, DataFormat, DataSource, Engine, EngineConfig, EngineError,
    InputBus, NodeLayout, OpenMode, OutputBus, PcmStreamSource, ProcessCallbackData, ProcessNode,
    ReadInfo, Routing, SampleFormat, SeekOrigin, StreamReader, Topology, Vfs,
};

const PERIOD: u32 = 32;

fn make_engine(channels: u32) -> Engine {
    let mut engine = Engine::new();
    assert!(engine.init(EngineConfig {
        channels,
        sample_rate: 48_000,
        period_size_in_frames: PERIOD,
        vfs: None,
    }));
    engine
}

/// Emits a constant value on its single output bus.
struct Dc {
    value: f32,
}

impl ProcessNode for Dc {
    fn process(&mut self, data: &mut ProcessCallbackData) {
        let mut out = data.output_buffer(0);
        out.samples_mut().fill(self.value);
    }
}

fn dc_node(engine: &Engine, channels: u32, value: f32) -> BaseNode<Dc> {
    let mut node = BaseNode::new();
    assert!(node.init(
        engine,
        Dc { value },
        NodeLayout::with_bus_config(BusConfig::new().with_output(channels)),
    ));
    node
}

/// Passthrough that scales its signal.
struct Gain {
    gain: f32,
}

impl ProcessNode for Gain {
    const FLAGS: u32 = node_flags::PASSTHROUGH;

    fn process(&mut self, data: &mut ProcessCallbackData) {
        data.copy_inputs_to_outputs();
        let mut out = data.output_buffer(0);
        for s in out.samples_mut() {
            *s *= self.gain;
        }
    }
}

fn read_period(engine: &mut Engine) -> Vec<f32> {
    let mut buf = vec![0.0; PERIOD as usize * engine.channels() as usize];
    let frames = engine.read(&mut buf);
    assert_eq!(frames, PERIOD as u64);
    buf
}

/// Mono ramp: frame n has value n. Supports seek and looping.
struct RampSource {
    len: u64,
    pos: u64,
    looping: bool,
}

impl RampSource {
    fn new(len: u64) -> Self {
        Self {
            len,
            pos: 0,
            looping: false,
        }
    }
}

impl DataSource for RampSource {
    fn read(&mut self, out: &mut [f32], frame_count: u64) -> Result<ReadInfo, EngineError> {
        let mut info = ReadInfo::default();
        for slot in out.iter_mut().take(frame_count as usize) {
            if self.pos >= self.len {
                if self.looping {
                    self.pos = 0;
                } else {
                    info.at_end = true;
                    break;
                }
            }
            *slot = self.pos as f32;
            self.pos += 1;
            info.frames_read += 1;
        }
        Ok(info)
    }

    fn data_format(&self) -> DataFormat {
        DataFormat {
            format: SampleFormat::F32,
            channels: 1,
            sample_rate: 48_000,
        }
    }

    fn seek_to_frame(&mut self, frame: u64) -> Result<(), EngineError> {
        self.pos = frame;
        Ok(())
    }

    fn cursor(&self) -> Result<u64, EngineError> {
        Ok(self.pos)
    }

    fn length(&self) -> Result<u64, EngineError> {
        Ok(self.len)
    }

    fn set_looping(&mut self, looping: bool) -> Result<(), EngineError> {
        self.looping = looping;
        Ok(())
    }

    fn channel_map(&self, out: &mut [u8]) -> Result<(), EngineError> {
        if out.is_empty() {
            return Err(EngineError::InvalidArgs);
        }
        out[0] = 0;
        Ok(())
    }
}

#[test]
fn failed_init_leaves_wrapper_empty() {
    let engine = make_engine(2);
    let mut splitter = SplitterNode::new();
    assert!(!splitter.init(&engine, 0, 2));
    assert_eq!(splitter.output_bus_count(), 0);
    assert!(!splitter.input_bus(0).is_valid());

    let mut no_outputs = SplitterNode::new();
    assert!(!no_outputs.init(&engine, 2, 0));
    assert_eq!(no_outputs.input_bus_count(), 0);

    let mut ok = SplitterNode::new();
    assert!(ok.init(&engine, 2, 2));
    assert_eq!(ok.input_bus_count(), 1);
    assert_eq!(ok.output_bus_count(), 2);
    assert_eq!(ok.input_bus_channels(0), 2);
    assert!(ok.input_bus(0).is_valid());
    assert!(ok.output_bus(1).is_valid());
    assert!(!ok.output_bus(2).is_valid());
}

#[test]
fn uninitialized_wrappers_degrade() {
    let sound = Sound::new();
    assert_eq!(sound.volume(), 0.0);
    assert_eq!(sound.pitch(), 0.0);
    assert_eq!(sound.cursor_in_frames(), 0);
    assert!(!sound.at_end());
    assert!(!sound.start());
    assert_eq!(sound.input_bus_count(), 0);
    assert!(!sound.output_bus(0).set_volume(1.0));

    let group = GroupNode::new();
    assert_eq!(group.pitch(), 0.0);
    assert!(!group.set_volume(1.0));

    let mut engine = Engine::new();
    let mut buf = vec![1.0; 64];
    assert_eq!(engine.read(&mut buf), 0);
    assert!(buf.iter().all(|&s| s == 0.0));
}

#[test]
fn dc_source_reaches_endpoint() {
    let mut engine = make_engine(1);
    let dc = dc_node(&engine, 1, 0.5);
    assert!(dc.attach_to(0, engine.endpoint_bus()));

    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
}

#[test]
fn stopped_node_contributes_silence() {
    let mut engine = make_engine(1);
    let dc = dc_node(&engine, 1, 0.5);
    assert!(dc.attach_to(0, engine.endpoint_bus()));

    assert!(dc.stop());
    assert!(!dc.is_started());
    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| s == 0.0));

    assert!(dc.start());
    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
}

#[test]
fn multiple_sources_are_summed() {
    let mut engine = make_engine(1);
    let a = dc_node(&engine, 1, 0.25);
    let b = dc_node(&engine, 1, 0.5);
    assert!(a.attach_to(0, engine.endpoint_bus()));
    assert!(b.attach_to(0, engine.endpoint_bus()));

    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| (s - 0.75).abs() < 1e-6));
}

#[test]
fn output_bus_volume_scales_the_mix() {
    let mut engine = make_engine(1);
    let dc = dc_node(&engine, 1, 1.0);
    assert!(dc.attach_to(0, engine.endpoint_bus()));

    assert!(dc.output_bus(0).set_volume(0.25));
    assert_eq!(dc.output_bus(0).volume(), 0.25);
    assert!(!dc.output_bus(0).set_volume(-1.0));
    assert_eq!(dc.output_bus(0).volume(), 0.25);

    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
}

#[test]
fn attach_replaces_previous_target() {
    let mut engine = make_engine(1);
    let dc = dc_node(&engine, 1, 1.0);
    let mut group = GroupNode::new();
    assert!(group.init(
        &engine,
        GroupSettings {
            num_in_channels: 1,
            num_out_channels: 1,
            ..GroupSettings::default()
        }
    ));

    assert!(dc.attach_to(0, engine.endpoint_bus()));
    // Re-attaching the same output bus moves the wire instead of adding one.
    assert!(dc.attach_to(0, group.input_bus(0)));

    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| s == 0.0));

    assert!(group.attach_to(0, engine.endpoint_bus()));
    let out = read_period(&mut engine);
    assert!(out.last().copied().unwrap() > 0.9);
}

#[test]
fn incompatible_attach_is_refused() {
    let engine = make_engine(2);
    let mono = dc_node(&engine, 1, 1.0);
    assert!(!mono.can_attach_to(0, engine.endpoint_bus()));
    assert!(!mono.attach_to(0, engine.endpoint_bus()));
    // A node can't feed itself.
    let mut gain = BaseNode::new();
    assert!(gain.init(&engine, Gain { gain: 1.0 }, NodeLayout::passthrough(2)));
    assert!(!gain.attach_to(0, gain.input_bus(0)));
}

#[test]
fn detached_bus_views_degrade() {
    let engine = make_engine(1);
    let dc = dc_node(&engine, 1, 0.5);

    let input = InputBus::detached();
    assert!(!input.is_valid());
    assert_eq!(input.num_channels(), 0);
    assert!(!dc.output_bus(0).can_attach_to(input));
    assert!(!dc.output_bus(0).attach_to(input));

    let output = OutputBus::detached();
    assert!(!output.attach_to(engine.endpoint_bus()));
    assert_eq!(output.volume(), 0.0);

    // Identity is by backend node; distinct wrappers never share one.
    assert!(engine.raw().same(engine.raw()));
    assert!(!engine.raw().same(dc.raw()));
}

#[test]
fn detach_silences_downstream() {
    let mut engine = make_engine(1);
    let dc = dc_node(&engine, 1, 0.5);
    assert!(dc.attach_to(0, engine.endpoint_bus()));
    read_period(&mut engine);

    assert!(dc.detach(0));
    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| s == 0.0));
}

#[test]
fn splitter_copies_input_to_every_output() {
    let mut engine = make_engine(1);
    let dc = dc_node(&engine, 1, 0.5);
    let mut splitter = SplitterNode::new();
    assert!(splitter.init(&engine, 1, 2));
    assert_eq!(splitter.output_bus_count(), 2);

    assert!(dc.attach_to(0, splitter.input_bus(0)));
    assert!(splitter.attach_to(0, engine.endpoint_bus()));
    assert!(splitter.attach_to(1, engine.endpoint_bus()));

    // Both copies land on the endpoint, so the mix doubles.
    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| (s - 1.0).abs() < 1e-6));

    // Per-destination level trim happens on the output bus.
    assert!(splitter.output_bus(1).set_volume(0.5));
    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| (s - 0.75).abs() < 1e-6));
}

#[test]
fn graph_cycle_does_not_hang() {
    let mut engine = make_engine(1);
    let dc = dc_node(&engine, 1, 0.5);
    let mut splitter = SplitterNode::new();
    assert!(splitter.init(&engine, 1, 2));
    let mut gain = BaseNode::new();
    assert!(gain.init(&engine, Gain { gain: 0.5 }, NodeLayout::passthrough(1)));

    assert!(dc.attach_to(0, splitter.input_bus(0)));
    assert!(splitter.attach_to(0, engine.endpoint_bus()));
    assert!(splitter.attach_to(1, gain.input_bus(0)));
    // Close the loop; the re-entrant pull reads silence instead of recursing.
    assert!(gain.attach_to(0, splitter.input_bus(0)));

    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| s.is_finite()));
}

#[test]
fn lpf_passes_dc_and_hpf_blocks_it() {
    let mut engine = make_engine(1);
    let dc = dc_node(&engine, 1, 1.0);
    let mut lpf = LpfNode::new();
    assert!(lpf.init(&engine, 1, 1000.0, 4));
    assert_eq!(lpf.order(), 4);
    assert!(dc.attach_to(0, lpf.input_bus(0)));
    assert!(lpf.attach_to(0, engine.endpoint_bus()));

    let mut last = 0.0;
    for _ in 0..100 {
        last = *read_period(&mut engine).last().unwrap();
    }
    assert!((last - 1.0).abs() < 1e-3, "lpf dc gain, got {last}");

    assert!(lpf.detach(0));
    let mut hpf = HpfNode::new();
    assert!(hpf.init(&engine, 1, 1000.0, 2));
    assert!(dc.attach_to(0, hpf.input_bus(0)));
    assert!(hpf.attach_to(0, engine.endpoint_bus()));

    for _ in 0..100 {
        last = *read_period(&mut engine).last().unwrap();
    }
    assert!(last.abs() < 1e-3, "hpf dc rejection, got {last}");
}

#[test]
fn filter_cutoff_is_retunable_in_place() {
    let engine = make_engine(2);
    let mut lpf = LpfNode::new();
    assert!(lpf.init(&engine, 2, 440.0, 9));
    // Order clamps to the supported maximum.
    assert_eq!(lpf.order(), klang::MAX_FILTER_ORDER);
    assert_eq!(lpf.cutoff_frequency(), 440.0);

    assert!(lpf.set_cutoff_frequency(880.0));
    assert_eq!(lpf.cutoff_frequency(), 880.0);
    // Out-of-nominal-range values are stored as given; only the derived
    // coefficient saturates.
    assert!(lpf.set_cutoff_frequency(-10.0));
    assert_eq!(lpf.cutoff_frequency(), -10.0);
    assert!(lpf.set_cutoff_frequency(1.0e9));
    assert_eq!(lpf.cutoff_frequency(), 1.0e9);
    assert!(!lpf.set_cutoff_frequency(f64::NAN));
    assert_eq!(lpf.cutoff_frequency(), 1.0e9);

    let uninit = LpfNode::new();
    assert!(!uninit.set_cutoff_frequency(440.0));
    assert_eq!(uninit.cutoff_frequency(), 0.0);
}

#[test]
fn group_volume_fades_to_target() {
    let fade = 64;
    let mut engine = make_engine(1);
    let dc = dc_node(&engine, 1, 1.0);
    let mut group = GroupNode::new();
    assert!(group.init(
        &engine,
        GroupSettings {
            num_in_channels: 1,
            num_out_channels: 1,
            volume_fade_frame_count: fade,
            pitch_disabled: false,
        }
    ));
    assert!(dc.attach_to(0, group.input_bus(0)));
    assert!(group.attach_to(0, engine.endpoint_bus()));

    assert!(group.set_volume(0.0));
    assert_eq!(group.volume(), 0.0);
    let first = read_period(&mut engine);
    // Ramping, not jumping: early frames still carry signal.
    assert!(first[0] > 0.5);

    // After the fade length the target is reached exactly.
    for _ in 0..(fade / PERIOD + 1) {
        read_period(&mut engine);
    }
    let settled = read_period(&mut engine);
    assert!(settled.iter().all(|&s| s == 0.0));
}

#[test]
fn group_converts_channel_counts() {
    let mut engine = make_engine(2);
    let dc = dc_node(&engine, 1, 0.5);
    let mut group = GroupNode::new();
    assert!(group.init(
        &engine,
        GroupSettings {
            num_in_channels: 1,
            num_out_channels: 2,
            ..GroupSettings::default()
        }
    ));
    assert!(dc.attach_to(0, group.input_bus(0)));
    assert!(group.attach_to(0, engine.endpoint_bus()));

    let out = read_period(&mut engine);
    // Mono upmixes to both channels.
    assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
}

#[test]
fn group_pitch_is_validated_and_stored() {
    let engine = make_engine(2);
    let mut group = GroupNode::new();
    assert!(group.init(&engine, GroupSettings::default()));
    assert_eq!(group.pitch(), 1.0);
    assert!(group.set_pitch(1.5));
    assert_eq!(group.pitch(), 1.5);
    assert!(!group.set_pitch(0.0));
    assert!(!group.set_pitch(-2.0));
    assert_eq!(group.pitch(), 1.5);

    let mut fixed = GroupNode::new();
    assert!(fixed.init(
        &engine,
        GroupSettings {
            pitch_disabled: true,
            ..GroupSettings::default()
        }
    ));
    assert!(fixed.is_pitch_disabled());
    assert!(!fixed.set_pitch(2.0));
}

/// Writes 0.5 to both output buses, then silences bus 0 only.
struct SilenceBusZero;

impl ProcessNode for SilenceBusZero {
    fn process(&mut self, data: &mut ProcessCallbackData) {
        for bus in 0..data.output_bus_count() {
            let mut out = data.output_buffer(bus);
            out.samples_mut().fill(0.5);
        }
        data.fill_output_bus_with_silence(0);
    }
}

#[test]
fn silence_fill_touches_only_the_addressed_bus() {
    let mut engine = make_engine(1);
    let mut node = BaseNode::new();
    assert!(node.init(
        &engine,
        SilenceBusZero,
        NodeLayout::with_bus_config(BusConfig::new().with_output(1).with_output(1)),
    ));
    assert!(node.attach_to(0, engine.endpoint_bus()));
    assert!(node.attach_to(1, engine.endpoint_bus()));

    // Bus 0 was zeroed after the fill; only bus 1 reaches the mix.
    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
}

/// Copies each input bus verbatim to the matching output bus.
struct Copier;

impl ProcessNode for Copier {
    fn process(&mut self, data: &mut ProcessCallbackData) {
        data.copy_inputs_to_outputs();
    }
}

#[test]
fn copy_inputs_to_outputs_pairs_buses() {
    let mut engine = make_engine(2);
    let a = dc_node(&engine, 2, 0.2);
    let b = dc_node(&engine, 2, 0.3);
    let mut copier = BaseNode::new();
    assert!(copier.init(
        &engine,
        Copier,
        NodeLayout::with_bus_config(
            BusConfig::new().with_inputs(&[2, 2]).with_outputs(&[2, 2]),
        ),
    ));
    assert!(a.attach_to(0, copier.input_bus(0)));
    assert!(b.attach_to(0, copier.input_bus(1)));

    // Bus 0 carries bus 0's input, not a mix of both.
    assert!(copier.attach_to(0, engine.endpoint_bus()));
    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| (s - 0.2).abs() < 1e-6));

    assert!(copier.detach(0));
    assert!(copier.attach_to(1, engine.endpoint_bus()));
    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| (s - 0.3).abs() < 1e-6));
}

/// Emits 1.0 when the invocation carries no input, 0.0 otherwise.
struct InputFlag;

impl ProcessNode for InputFlag {
    fn process(&mut self, data: &mut ProcessCallbackData) {
        let null = data.is_null_input() && data.input_buffer(0).frames() == 0;
        let value = if null { 1.0 } else { 0.0 };
        let mut out = data.output_buffer(0);
        out.samples_mut().fill(value);
    }
}

#[test]
fn source_only_node_gets_null_input() {
    let mut engine = make_engine(1);
    let mut node = BaseNode::new();
    assert!(node.init(
        &engine,
        InputFlag,
        NodeLayout::with_bus_config(BusConfig::new().with_output(1)),
    ));
    assert!(node.attach_to(0, engine.endpoint_bus()));

    // No input buses were declared, so the callback sees a null input.
    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| s == 1.0));
}

#[test]
fn node_io_wires_a_chain() {
    let mut engine = make_engine(1);
    let dc = dc_node(&engine, 1, 0.5);
    let mut gain = BaseNode::new();
    assert!(gain.init(&engine, Gain { gain: 0.5 }, NodeLayout::passthrough(1)));

    let io = gain.node_io();
    assert!(io.is_valid());
    assert!(dc.output_bus(0).attach_to(io.input));
    assert!(io.output.attach_to(engine.endpoint_bus()));

    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));

    // A source has no input bus, so its primary pair is invalid.
    assert!(!dc.node_io().is_valid());
}

#[test]
fn sound_plays_source_frames() {
    let mut engine = make_engine(1);
    let mut sound = Sound::new();
    assert!(sound.init_from_data_source(&engine, Box::new(RampSource::new(1000))));
    assert_eq!(sound.length_in_frames(), 1000);
    assert!((sound.length_in_seconds() - 1000.0 / 48_000.0).abs() < 1e-9);
    assert_eq!(sound.cursor_in_seconds(), 0.0);
    assert!(!sound.is_started());
    assert!(sound.start());

    let out = read_period(&mut engine);
    for (i, &s) in out.iter().enumerate() {
        assert!((s - i as f32).abs() < 1e-3, "frame {i} got {s}");
    }
}

#[test]
fn sound_ends_and_reports_at_end() {
    let mut engine = make_engine(1);
    let mut sound = Sound::new();
    assert!(sound.init_from_data_source(&engine, Box::new(RampSource::new(10))));
    assert!(sound.start());

    let out = read_period(&mut engine);
    for (i, &s) in out.iter().enumerate().take(10) {
        assert!((s - i as f32).abs() < 1e-3, "frame {i} got {s}");
    }
    assert!(out[10..].iter().all(|&s| s == 0.0));
    assert!(sound.at_end());

    // Seeking rewinds and clears the end flag.
    assert!(sound.seek_to_frame(0));
    assert!(!sound.at_end());
    assert_eq!(sound.cursor_in_frames(), 0);
    let out = read_period(&mut engine);
    assert!((out[5] - 5.0).abs() < 1e-3);
}

#[test]
fn sound_seek_is_reflected_immediately() {
    let engine = make_engine(1);
    let mut sound = Sound::new();
    assert!(sound.init_from_data_source(&engine, Box::new(RampSource::new(100))));

    // No processing has happened yet; the cursor already reports the target.
    assert!(sound.seek_to_frame(40));
    assert_eq!(sound.cursor_in_frames(), 40);

    // Seeking past the end is accepted; playback there just ends.
    assert!(sound.seek_to_frame(5000));
    assert_eq!(sound.cursor_in_frames(), 5000);
    let mut engine = engine;
    assert!(sound.start());
    let out = read_period(&mut engine);
    assert!(out.iter().all(|&s| s == 0.0));
    assert!(sound.at_end());
}

#[test]
fn sound_loops_when_source_supports_it() {
    let mut engine = make_engine(1);
    let mut sound = Sound::new();
    assert!(sound.init_from_data_source(&engine, Box::new(RampSource::new(8))));
    assert!(sound.set_looping(true));
    assert!(sound.is_looping());
    assert!(sound.start());

    for _ in 0..10 {
        let out = read_period(&mut engine);
        assert!(out.iter().all(|&s| s < 8.0));
    }
    assert!(!sound.at_end());
}

#[test]
fn looping_sound_cursor_wraps_at_length() {
    let mut engine = make_engine(1);
    let mut sound = Sound::new();
    assert!(sound.init_from_data_source(&engine, Box::new(RampSource::new(8))));
    assert!(sound.set_looping(true));
    assert!(sound.start());

    for _ in 0..10 {
        read_period(&mut engine);
    }
    // The position rewinds with the source instead of counting forever.
    let cursor = sound.cursor_in_frames();
    assert!(cursor < 8, "cursor should wrap within the source, got {cursor}");
    assert!(sound.cursor_in_seconds() < 8.0 / 48_000.0);
}

#[test]
fn sound_volume_and_pitch() {
    let mut engine = make_engine(1);
    let mut sound = Sound::new();
    assert!(sound.init_from_data_source(&engine, Box::new(RampSource::new(10_000))));
    assert_eq!(sound.volume(), 1.0);
    assert_eq!(sound.pitch(), 1.0);
    assert!(!sound.set_volume(-1.0));
    assert!(!sound.set_pitch(0.0));

    assert!(sound.set_volume(0.5));
    assert!(sound.set_pitch(2.0));
    assert!(sound.start());

    let out = read_period(&mut engine);
    // Double pitch reads the ramp twice as fast; half volume scales it.
    for (i, &s) in out.iter().enumerate().skip(1) {
        assert!((s - i as f32 * 2.0 * 0.5).abs() < 1e-2, "frame {i} got {s}");
    }
}

#[test]
fn sound_fade_runs_to_completion() {
    let mut engine = make_engine(1);
    let mut sound = Sound::new();
    assert!(sound.init_from_data_source(&engine, Box::new(RampSource::new(100_000))));
    assert!(sound.set_fade_in_frames(0.0, 1.0, 64));
    assert_eq!(sound.current_fade_volume(), 0.0);
    assert!(sound.start());

    let first = read_period(&mut engine);
    assert!(first[0].abs() < 1e-6);

    for _ in 0..4 {
        read_period(&mut engine);
    }
    assert_eq!(sound.current_fade_volume(), 1.0);

    // Milliseconds variant converts through the engine rate.
    assert!(sound.set_fade_in_milliseconds(-1.0, 0.0, 10));
    assert_eq!(sound.current_fade_volume(), 1.0);
}

struct MemReader {
    data: Arc<Vec<u8>>,
    pos: u64,
}

impl StreamReader for MemReader {
    fn stream_position(&mut self) -> Result<u64, EngineError> {
        Ok(self.pos)
    }

    fn set_stream_position(&mut self, position: u64) -> Result<(), EngineError> {
        self.pos = position;
        Ok(())
    }

    fn read_data(&mut self, out: &mut [u8]) -> Result<usize, EngineError> {
        let start = (self.pos as usize).min(self.data.len());
        let n = out.len().min(self.data.len() - start);
        out[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

fn ramp_vfs(frames: u32) -> Arc<Vfs> {
    let mut bytes = Vec::with_capacity(frames as usize * 4);
    for i in 0..frames {
        bytes.extend_from_slice(&(i as f32).to_le_bytes());
    }
    let data = Arc::new(bytes);
    let size_data = data.clone();
    Vfs::new(
        move |_path| {
            Ok(Box::new(MemReader {
                data: data.clone(),
                pos: 0,
            }) as Box<dyn StreamReader>)
        },
        move |_path| Ok(size_data.len() as u64),
    )
}

#[test]
fn vfs_file_reads_are_clamped_and_seekable() {
    let vfs = ramp_vfs(16);
    assert!(matches!(
        vfs.open("ramp", OpenMode::Write),
        Err(EngineError::NotImplemented)
    ));

    let mut file = vfs.open("ramp", OpenMode::Read).unwrap();
    assert_eq!(file.info().size_in_bytes, 64);

    let mut buf = [0u8; 128];
    assert_eq!(file.read(&mut buf).unwrap(), 64);
    assert_eq!(file.read(&mut buf).unwrap(), 0);

    assert!(file.seek(SeekOrigin::End, -4).is_ok());
    assert_eq!(file.tell(), 60);
    assert_eq!(file.read(&mut buf).unwrap(), 4);
    assert_eq!(f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]), 15.0);

    assert!(file.seek(SeekOrigin::Start, -1).is_err());
    assert!(file.seek(SeekOrigin::Current, 1000).is_ok());
    assert_eq!(file.read(&mut buf).unwrap(), 0);
}

#[test]
fn channel_map_is_an_optional_capability() {
    let mut map = [9u8; 2];

    // Raw PCM carries no speaker assignment.
    let file = ramp_vfs(16).open("ramp", OpenMode::Read).unwrap();
    let pcm = PcmStreamSource::new(file, 1, 48_000).unwrap();
    assert_eq!(pcm.channel_map(&mut map), Err(EngineError::NotImplemented));
    assert_eq!(map[0], 9);

    let ramp = RampSource::new(4);
    assert!(ramp.channel_map(&mut map).is_ok());
    assert_eq!(map[0], 0);
    assert_eq!(ramp.channel_map(&mut []), Err(EngineError::InvalidArgs));
}

#[test]
fn sound_streams_pcm_through_the_vfs() {
    let mut engine = Engine::new();
    assert!(engine.init(EngineConfig {
        channels: 1,
        sample_rate: 48_000,
        period_size_in_frames: PERIOD,
        vfs: Some(ramp_vfs(1000)),
    }));

    let mut sound = Sound::new();
    assert!(sound.init_from_file(&engine, "ramp"));
    assert_eq!(sound.length_in_frames(), 1000);
    assert!(sound.start());

    let out = read_period(&mut engine);
    for (i, &s) in out.iter().enumerate() {
        assert!((s - i as f32).abs() < 1e-3, "frame {i} got {s}");
    }
}

#[test]
fn sound_without_vfs_fails_to_open() {
    let engine = make_engine(1);
    let mut sound = Sound::new();
    assert!(!sound.init_from_file(&engine, "missing"));
    assert_eq!(sound.length_in_frames(), 0);
}
