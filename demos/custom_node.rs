//! Builds a custom sine node, routes it into the engine, and pulls a
//! second of audio into a buffer. No audio device required.

use klang::{
    BaseNode, BusConfig, Engine, EngineConfig, NodeLayout, ProcessCallbackData, ProcessNode,
    Routing,
};

struct Sine {
    phase: f32,
    step: f32,
}

impl ProcessNode for Sine {
    fn process(&mut self, data: &mut ProcessCallbackData) {
        let mut out = data.output_buffer(0);
        for frame in 0..out.frames() {
            let sample = (self.phase * core::f32::consts::TAU).sin() * 0.2;
            self.phase = (self.phase + self.step).fract();
            out.frame_mut(frame).fill(sample);
        }
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let mut engine = Engine::new();
    assert!(engine.init(EngineConfig::default()));

    let mut sine = BaseNode::new();
    assert!(sine.init(
        &engine,
        Sine {
            phase: 0.0,
            step: 440.0 / engine.sample_rate() as f32,
        },
        NodeLayout::with_bus_config(BusConfig::new().with_output(engine.channels())),
    ));
    assert!(sine.attach_to(0, engine.endpoint_bus()));

    let mut buf = vec![0.0f32; engine.sample_rate() as usize * engine.channels() as usize];
    let frames = engine.read(&mut buf);

    let peak = buf.iter().fold(0.0f32, |p, s| p.max(s.abs()));
    let rms = (buf.iter().map(|s| s * s).sum::<f32>() / buf.len() as f32).sqrt();
    println!("rendered {frames} frames, peak {peak:.3}, rms {rms:.3}");
}
