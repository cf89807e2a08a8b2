//! Closed-loop simulation of an averaged synchronous buck converter.
//!
//! Runs the full lifecycle, steps the target halfway through and records
//! every control period to `buck.mcap` as CBOR messages.

use std::{borrow::Cow, cell::Cell, collections::BTreeMap, fs::File, io::BufWriter, sync::Arc};

use pwrconv::{
    Config2p2z, Converter, Hardware, HwResult, InstanceConfig, Regulator2p2z, Topology, TriggerId,
};
use serde::Serialize;

const V_IN: f32 = 12.;
const INDUCTANCE: f32 = 10e-6;
const CAPACITANCE: f32 = 100e-6;
const LOAD: f32 = 3.3;

/// Modulator counts for 100 % duty.
const PWM_PERIOD: u32 = 1000;
const DT_NS: u64 = 5_000;
/// Plant integration steps per control period.
const SUBSTEPS: u32 = 10;
/// Window at the end of each half of the run used to report the residual
/// error.
const SETTLE_WINDOW_NS: u64 = 1_000_000;

/// Stands in for the PWM and ADC setup of a real board.
#[derive(Default)]
struct SimBoard {
    switching: Cell<bool>,
}

impl Hardware for SimBoard {
    fn init(&self) -> HwResult {
        println!("hw: init");
        Ok(())
    }

    fn enable(&self) -> HwResult {
        println!("hw: enable");
        Ok(())
    }

    fn disable(&self) -> HwResult {
        println!("hw: disable");
        self.switching.set(false);
        Ok(())
    }

    fn trigger_sync_start(&self, trigger: TriggerId) -> HwResult {
        println!("hw: start trigger {}", trigger.0);
        self.switching.set(true);
        Ok(())
    }
}

/// Inductor current and output voltage of the power stage.
#[derive(Default)]
struct PowerStage {
    current: f32,
    voltage: f32,
}

impl PowerStage {
    /// Semi-implicit Euler: the capacitor sees the updated inductor current,
    /// which keeps the lightly damped LC from gaining energy numerically.
    fn step(&mut self, duty: f32, dt: f32) {
        let h = dt / SUBSTEPS as f32;
        for _ in 0..SUBSTEPS {
            let di = (duty * V_IN - self.voltage) / INDUCTANCE;
            self.current = (self.current + di * h).max(0.);
            let dv = (self.current - self.voltage / LOAD) / CAPACITANCE;
            self.voltage += dv * h;
        }
    }

    /// ADC counts for the output voltage, using the same scaling as the
    /// converter's reference.
    fn sample(&self, config: &InstanceConfig<SimBoard>) -> u32 {
        let millivolts = (self.voltage * 1000.).max(0.);
        (millivolts * f32::from(config.ref_num) / f32::from(config.ref_den)) as u32
    }
}

#[derive(Serialize)]
struct Values {
    time_ns: u64,
    target: u32,
    reference: u32,
    measurement: u32,
    error: i32,
    modulator: u32,
    ramping: bool,
    inductor_current: f32,
    output_voltage: f32,
}

fn main() -> Result<(), anyhow::Error> {
    let mut writer = mcap::Writer::new(BufWriter::new(File::create("buck.mcap")?))?;
    let channel = mcap::Channel {
        topic: String::from("pwrconv"),
        schema: Some(Arc::new(mcap::Schema {
            name: "".to_owned(),
            encoding: "".to_owned(),
            data: Cow::default(),
        })),
        message_encoding: "cbor".to_owned(),
        metadata: BTreeMap::default(),
    };
    let channel_id = writer.add_channel(&channel)?;

    let converter = Converter::new(InstanceConfig {
        topology: Topology::Buck,
        initial_target: 3300,
        target_max: 5000,
        target_min: 1000,
        ref_num: 100,
        ref_den: 330,
        ramp_step: 1,
        sync_start_trigger: TriggerId(0),
        hardware: SimBoard::default(),
    });

    // Incremental PI: u[n] = u[n-1] + (kp + ki)·e[n] - kp·e[n-1]
    // Crossover near 230 Hz, well below the 5 kHz LC resonance.
    let (kp, ki) = (0.005f32, 0.002f32);
    let mut regulator = Regulator2p2z::new(Config2p2z {
        b0: kp + ki,
        b1: -kp,
        b2: 0.,
        a1: 1.,
        a2: 0.,
        min: 0.,
        max: 0.95 * PWM_PERIOD as f32,
    });

    converter.init()?;
    converter.enable()?;
    converter.start()?;

    let mut stage = PowerStage::default();
    let mut time_ns = 0;
    let dt = DT_NS as f32 / 1e9;
    let step_at = 10_000_000;
    let end = 20_000_000;
    let mut settled_error = [0i32; 2];

    while time_ns <= end {
        if time_ns == step_at {
            converter.set_target(1800)?;
        }

        let measurement = stage.sample(converter.config());
        let modulator = if converter.config().hardware.switching.get() {
            converter.run_period(&mut regulator, measurement)
        } else {
            0
        };
        stage.step(modulator as f32 / PWM_PERIOD as f32, dt);

        let mut buffer = Vec::with_capacity(128);
        ciborium::into_writer(
            &Values {
                time_ns,
                target: converter.target(),
                reference: converter.reference(),
                measurement,
                error: converter.last_error(),
                modulator,
                ramping: converter.is_ramping(),
                inductor_current: stage.current,
                output_voltage: stage.voltage,
            },
            &mut buffer,
        )?;
        writer.write_to_known_channel(
            &mcap::records::MessageHeader {
                channel_id,
                sequence: 0,
                log_time: time_ns,
                publish_time: time_ns,
            },
            &buffer,
        )?;

        for (half, half_end) in [step_at, end].into_iter().enumerate() {
            if time_ns + SETTLE_WINDOW_NS > half_end && time_ns < half_end {
                let worst = &mut settled_error[half];
                *worst = (*worst).max(converter.last_error().abs());
            }
        }

        time_ns += DT_NS;
    }

    println!(
        "3.3 V phase: worst error over the last ms {} counts",
        settled_error[0]
    );
    println!(
        "1.8 V phase: worst error over the last ms {} counts, output {:.3} V, reference {} counts",
        settled_error[1],
        stage.voltage,
        converter.reference()
    );

    converter.disable()?;
    writer.finish()?;

    Ok(())
}
