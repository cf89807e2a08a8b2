//! Two-pole two-zero (2P2Z) IIR compensator with anti-windup output limits.
//!
//! ```text
//! u[n] = b0·e[n] + b1·e[n-1] + b2·e[n-2] + a1·u[n-1] + a2·u[n-2]
//! ```
//!
//! The feedback coefficients are applied with a positive sign, so a design
//! tool producing `1 + a1·z⁻¹ + a2·z⁻²` denominators must negate them.

use fixed::types::I16F16;

/// Arithmetic used by [`Regulator2p2z`].
pub trait Sample: Copy + PartialOrd {
    const ZERO: Self;

    /// Convert a controller input (typically an error in ADC counts).
    fn from_input(input: i32) -> Self;

    /// Truncate toward zero into a modulator count. Negative values give 0.
    fn to_output(self) -> u32;

    /// `self + a * b`
    fn mul_acc(self, a: Self, b: Self) -> Self;
}

impl Sample for f32 {
    const ZERO: Self = 0.;

    fn from_input(input: i32) -> Self {
        input as f32
    }

    fn to_output(self) -> u32 {
        self as u32
    }

    fn mul_acc(self, a: Self, b: Self) -> Self {
        self + a * b
    }
}

/// Saturating fixed-point arithmetic. Inputs beyond ±32768 saturate.
impl Sample for I16F16 {
    const ZERO: Self = I16F16::ZERO;

    fn from_input(input: i32) -> Self {
        I16F16::saturating_from_num(input)
    }

    fn to_output(self) -> u32 {
        self.saturating_to_num()
    }

    fn mul_acc(self, a: Self, b: Self) -> Self {
        self.saturating_add(a.saturating_mul(b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config2p2z<S> {
    pub b0: S,
    pub b1: S,
    pub b2: S,
    pub a1: S,
    pub a2: S,
    /// Lower anti-windup limit.
    pub min: S,
    /// Upper anti-windup limit.
    pub max: S,
}

/// Input and output delay lines; index 0 holds the most recent sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct History<S> {
    pub inputs: [S; 2],
    pub outputs: [S; 2],
}

impl<S: Sample> History<S> {
    const ZERO: Self = Self {
        inputs: [S::ZERO; 2],
        outputs: [S::ZERO; 2],
    };
}

#[derive(Debug, Clone)]
pub struct Regulator2p2z<S> {
    config: Config2p2z<S>,
    history: History<S>,
}

impl<S: Sample> Regulator2p2z<S> {
    pub const fn new(config: Config2p2z<S>) -> Self {
        Self {
            config,
            history: History::ZERO,
        }
    }

    /// Clear the delay lines and load a new configuration.
    pub fn init(&mut self, config: Config2p2z<S>) {
        self.history = History::ZERO;
        self.config = config;
    }

    pub fn config(&self) -> &Config2p2z<S> {
        &self.config
    }

    pub fn history(&self) -> &History<S> {
        &self.history
    }

    /// Run one control period and return the modulator value.
    ///
    /// The output is limited to `max` first and then to `min`, so a
    /// configuration with `min > max` always yields `min`.
    #[inline]
    pub fn process(&mut self, input: i32) -> u32 {
        let cfg = &self.config;
        let dat = &mut self.history;

        let mut acc = S::ZERO.mul_acc(cfg.b2, dat.inputs[1]);
        dat.inputs[1] = dat.inputs[0];
        acc = acc.mul_acc(cfg.b1, dat.inputs[0]);
        dat.inputs[0] = S::from_input(input);
        acc = acc.mul_acc(cfg.b0, dat.inputs[0]);
        acc = acc.mul_acc(cfg.a2, dat.outputs[1]);
        dat.outputs[1] = dat.outputs[0];
        acc = acc.mul_acc(cfg.a1, dat.outputs[0]);

        // Anti-windup
        acc = if acc < cfg.max { acc } else { cfg.max };
        acc = if acc > cfg.min { acc } else { cfg.min };

        dat.outputs[0] = acc;
        acc.to_output()
    }
}
