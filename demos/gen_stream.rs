//! Generate a synthetic TUG motion stream for replay testing
//!
//! Prints one motion sample JSON object per line at 50 Hz, covering a full
//! scripted attempt: rest, stand up, walk out, turn, walk back, sit down.
//! Pipe it into the CLI:
//!
//!   cargo run --example gen_stream | cargo run --features cli --bin tug -- replay -i -

use tug_sense::types::{MotionSample, Vec3};

const G: f64 = 9.81;
const SAMPLE_MS: u64 = 20;

struct Stream {
    t_ms: u64,
}

impl Stream {
    fn emit(&mut self, accel: Vec3, rotation: Vec3) {
        let sample = MotionSample::new(self.t_ms, accel, rotation);
        match serde_json::to_string(&sample) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("Error: {e:?}"),
        }
        self.t_ms += SAMPLE_MS;
    }

    fn hold(&mut self, duration_ms: u64, accel: Vec3, rotation: Vec3) {
        for _ in 0..(duration_ms / SAMPLE_MS) {
            self.emit(accel, rotation);
        }
    }

    fn walk(&mut self, cycles: usize) {
        let samples_per_cycle = 25;
        for _ in 0..cycles {
            for i in 0..samples_per_cycle {
                let phase = 2.0 * std::f64::consts::PI * i as f64 / samples_per_cycle as f64;
                let vertical = -3.0 * phase.sin();
                let yaw = if i < samples_per_cycle / 2 { 20.0 } else { -20.0 };
                self.emit(Vec3::new(0.0, 0.0, G + vertical), Vec3::new(0.0, 0.0, yaw));
            }
        }
    }
}

fn main() {
    let still = Vec3::new(0.0, 0.0, G);
    let tilt = 35.0_f64.to_radians();
    let tilted = Vec3::new(G * tilt.sin(), 0.0, G * tilt.cos());

    let mut stream = Stream { t_ms: 0 };
    // Seated rest (also the calibration window).
    stream.hold(1200, still, Vec3::ZERO);
    // Stand up: thigh rotates to vertical and the trunk accelerates.
    stream.hold(2500, tilted, Vec3::ZERO);
    // Walk out.
    stream.walk(8);
    // Turn at roughly 100 deg/s, then settle.
    stream.hold(1800, still, Vec3::new(0.0, 0.0, 100.0));
    stream.hold(1300, still, Vec3::ZERO);
    // Walk back.
    stream.walk(8);
    // Sit down: impact spike followed by stillness.
    stream.hold(300, still, Vec3::ZERO);
    stream.emit(Vec3::new(0.0, 0.0, G + 8.0), Vec3::ZERO);
    stream.hold(1200, still, Vec3::ZERO);
}
