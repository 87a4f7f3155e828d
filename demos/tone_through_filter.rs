//! Plays a sine tone through a sweeping low-pass filter on the default
//! output device. Requires the `device` feature.

use std::thread::sleep;
use std::time::Duration;

use klang::device::OutputDevice;
use klang::nodes::LpfNode;
use klang::{
    BaseNode, BusConfig, Engine, EngineConfig, NodeLayout, ProcessCallbackData, ProcessNode,
    Routing, Topology,
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
            step: 220.0 / engine.sample_rate() as f32,
        },
        NodeLayout::with_bus_config(BusConfig::new().with_output(engine.channels())),
    ));
    let mut lpf = LpfNode::new();
    assert!(lpf.init(&engine, engine.channels(), 200.0, 4));
    assert!(sine.attach_to(0, lpf.input_bus(0)));
    assert!(lpf.attach_to(0, engine.endpoint_bus()));

    let mut device = OutputDevice::open_default(engine.channels(), engine.sample_rate(), 4096)
        .expect("no default output device");

    // Sweep the cutoff up and back down over a few seconds.
    let mut scratch = Vec::new();
    for step in 0..600 {
        let sweep = (step as f64 / 600.0 * core::f64::consts::TAU).sin().abs();
        lpf.set_cutoff_frequency(200.0 + 4000.0 * sweep);
        device.pump(&mut engine, &mut scratch);
        sleep(Duration::from_millis(10));
    }
}
