//! A single converter instance: lifecycle, target handling and ramping.
//!
//! ```text
//! init ─► READY ─ enable ─► ENABLED ─ start ─► RUNNING (+RAMPING) ─ disable ─► READY
//! ```
//!
//! [`Converter::ramp`], [`Converter::error`] and [`Regulator2p2z::process`]
//! form the per-period path and are meant to run back to back from one
//! periodic interrupt which must not re-enter itself. Everything else may be
//! called from application code.

use crate::{
    config::InstanceConfig,
    context::{RuntimeContext, STATE_RAMP, STATE_RUN},
    error::{Error, Result},
    hardware::Hardware,
    regulator::{Regulator2p2z, Sample},
};

/// One converter instance: its static configuration and live data.
///
/// All methods take `&self`, so a `Converter` can sit in a `static` shared by
/// the control interrupt and the application.
#[derive(Debug)]
pub struct Converter<H> {
    config: InstanceConfig<H>,
    ctx: RuntimeContext,
}

impl<H: Hardware> Converter<H> {
    pub const fn new(config: InstanceConfig<H>) -> Self {
        Self {
            config,
            ctx: RuntimeContext::new(),
        }
    }

    pub fn config(&self) -> &InstanceConfig<H> {
        &self.config
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    /// Reset the live data, apply the initial target and initialize the
    /// hardware.
    ///
    /// The hardware is initialized even if the initial target is rejected.
    /// The two outcomes are merged with [`Error::combine`], so when both fail
    /// the returned code carries the bits of each and names neither.
    pub fn init(&self) -> Result<()> {
        if !self.config.is_valid() {
            warn!("init: invalid instance configuration");
            return Err(Error::InvalidParameter);
        }

        self.ctx.reset();
        let target = self.set_target(self.config.initial_target);
        let hardware = self.config.hardware.init().map_err(Error::from);

        debug!("init: target {}", self.ctx.target());
        Error::combine(target, hardware)
    }

    /// Initialize the regulator, if a callout for it exists, then enable
    /// the hardware. The regulator callout's result is ignored.
    pub fn enable(&self) -> Result<()> {
        if matches!(self.config.hardware.init_regulator(), Some(Err(_))) {
            warn!("enable: regulator init failed");
        }

        self.config.hardware.enable()?;
        Ok(())
    }

    /// Fire the synchronous start trigger and mark the converter running.
    ///
    /// Nothing changes if the trigger fails.
    pub fn start(&self) -> Result<()> {
        self.config
            .hardware
            .trigger_sync_start(self.config.sync_start_trigger)?;

        self.ctx.set_flags(STATE_RUN);
        if self.ctx.reference() != self.ctx.target() {
            self.ctx.set_flags(STATE_RAMP);
        }

        debug!("start: ramping {}", self.is_ramping());
        Ok(())
    }

    /// Stop the converter. The reference and status flags are reset before
    /// the hardware callout runs, whatever it returns.
    ///
    /// This writes fields the control interrupt owns. If a [`Converter::ramp`]
    /// already past its running check completes after this store, the
    /// reference is left one step away from zero and the next
    /// [`Converter::start`] ramps from there. Mask the control interrupt
    /// around this call when that matters.
    pub fn disable(&self) -> Result<()> {
        self.ctx.set_reference(0);
        self.ctx.clear_flags(STATE_RUN | STATE_RAMP);

        debug!("disable");
        self.config.hardware.disable()?;
        Ok(())
    }

    /// Set a new target in physical units.
    ///
    /// Values outside `[target_min, target_max]` are rejected and the
    /// current target is kept. While running, the ramp flag is raised even
    /// when the new target equals the current reference. [`Converter::ramp`]
    /// skips that case, so the flag then stays up until the target moves
    /// away from the reference and the ramp completes.
    pub fn set_target(&self, physical: u32) -> Result<()> {
        if !self.config.accepts(physical) {
            return Err(Error::InvalidParameter);
        }
        let targ = self
            .config
            .scale(physical)
            .ok_or(Error::InvalidParameter)?;

        self.ctx.set_target(targ);
        if self.is_running() {
            self.ctx.set_flags(STATE_RAMP);
        }
        Ok(())
    }

    /// Move the reference one step toward the target.
    ///
    /// The distance is evaluated on the low 16 bits of both values, as
    /// deployed firmware does. Once the remaining distance fits within one
    /// step the reference snaps to the target and the ramp flag clears.
    #[inline]
    pub fn ramp(&self) {
        let targ = self.ctx.target();
        let reference = self.ctx.reference();
        if !self.is_running() || reference == targ {
            return;
        }

        let step = self.config.ramp_step;
        let diff = i32::from((targ as i16).wrapping_sub(reference as i16));
        let limit = i32::from(step as i16);

        if diff <= limit && -diff <= limit {
            self.ctx.set_reference(targ);
            self.ctx.clear_flags(STATE_RAMP);
        } else if diff < 0 {
            self.ctx.set_reference(reference.wrapping_sub(u32::from(step)));
        } else {
            self.ctx.set_reference(reference.wrapping_add(u32::from(step)));
        }
    }

    /// Compute and store `reference - result`.
    #[inline]
    pub fn error(&self) -> i32 {
        self.ctx.error()
    }

    /// One full control period: ramp, take the measurement, compute the
    /// error, run the regulator and store the modulator value.
    ///
    /// Writing the returned value to the modulator hardware is up to the
    /// caller.
    #[inline]
    pub fn run_period<S: Sample>(&self, regulator: &mut Regulator2p2z<S>, measurement: u32) -> u32 {
        self.run_period_with(regulator, measurement, |err| err, |modulator| modulator)
    }

    /// [`Converter::run_period`] with user hooks around the regulator.
    ///
    /// `pre` sees the fresh error and returns the value fed to the
    /// regulator, which is also what [`Converter::last_error`] reports
    /// afterwards. It is the place for input filtering or protection checks.
    /// `post` filters the regulator output before it is stored.
    #[inline]
    pub fn run_period_with<S, Pre, Post>(
        &self,
        regulator: &mut Regulator2p2z<S>,
        measurement: u32,
        pre: Pre,
        post: Post,
    ) -> u32
    where
        S: Sample,
        Pre: FnOnce(i32) -> i32,
        Post: FnOnce(u32) -> u32,
    {
        self.ramp();
        self.ctx.set_result(measurement);
        let err = pre(self.ctx.error());
        self.ctx.set_error(err);
        let modulator = post(regulator.process(err));
        self.ctx.set_modulator(modulator);
        modulator
    }

    pub fn state(&self, mask: u32) -> u32 {
        self.ctx.state(mask)
    }

    pub fn is_running(&self) -> bool {
        self.ctx.state(STATE_RUN) != 0
    }

    pub fn is_ramping(&self) -> bool {
        self.ctx.state(STATE_RAMP) != 0
    }

    /// Target in internal reference units.
    pub fn target(&self) -> u32 {
        self.ctx.target()
    }

    pub fn reference(&self) -> u32 {
        self.ctx.reference()
    }

    pub fn result(&self) -> u32 {
        self.ctx.result()
    }

    pub fn set_result(&self, res: u32) {
        self.ctx.set_result(res);
    }

    pub fn last_error(&self) -> i32 {
        self.ctx.last_error()
    }

    pub fn modulator(&self) -> u32 {
        self.ctx.modulator()
    }

    pub fn set_modulator(&self, modulator: u32) {
        self.ctx.set_modulator(modulator);
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;
    use crate::{
        config::Topology,
        context::STATE_ALL,
        error::{HardwareCode, HwResult, INVALID_PARAMETER_CODE},
        hardware::{Callouts, TriggerId},
        regulator::Config2p2z,
    };

    struct Board {
        init_result: Cell<HwResult>,
        enable_result: Cell<HwResult>,
        disable_result: Cell<HwResult>,
        regulator_result: Cell<Option<HwResult>>,
        trigger_result: Cell<HwResult>,

        init_calls: Cell<u32>,
        enable_calls: Cell<u32>,
        disable_calls: Cell<u32>,
        regulator_calls: Cell<u32>,
        triggered: Cell<Option<TriggerId>>,
    }

    impl Default for Board {
        fn default() -> Self {
            Self {
                init_result: Cell::new(Ok(())),
                enable_result: Cell::new(Ok(())),
                disable_result: Cell::new(Ok(())),
                regulator_result: Cell::new(None),
                trigger_result: Cell::new(Ok(())),
                init_calls: Cell::new(0),
                enable_calls: Cell::new(0),
                disable_calls: Cell::new(0),
                regulator_calls: Cell::new(0),
                triggered: Cell::new(None),
            }
        }
    }

    fn bump(counter: &Cell<u32>) {
        counter.set(counter.get() + 1);
    }

    impl Hardware for Board {
        fn init(&self) -> HwResult {
            bump(&self.init_calls);
            self.init_result.get()
        }

        fn enable(&self) -> HwResult {
            bump(&self.enable_calls);
            self.enable_result.get()
        }

        fn disable(&self) -> HwResult {
            bump(&self.disable_calls);
            self.disable_result.get()
        }

        fn init_regulator(&self) -> Option<HwResult> {
            let result = self.regulator_result.get();
            if result.is_some() {
                bump(&self.regulator_calls);
            }
            result
        }

        fn trigger_sync_start(&self, trigger: TriggerId) -> HwResult {
            self.triggered.set(Some(trigger));
            self.trigger_result.get()
        }
    }

    fn code(code: u32) -> HardwareCode {
        HardwareCode::new(code).unwrap()
    }

    /// 2800..=3600 mV, 100/330 scaling, ramp step 64, initial target 3300 mV
    /// (1000 counts).
    fn converter(board: &Board) -> Converter<&Board> {
        Converter::new(InstanceConfig {
            topology: Topology::Buck,
            initial_target: 3300,
            target_max: 3600,
            target_min: 2800,
            ref_num: 100,
            ref_den: 330,
            ramp_step: 64,
            sync_start_trigger: TriggerId(7),
            hardware: board,
        })
    }

    #[track_caller]
    fn ramp_to_target(conv: &Converter<&Board>) -> u32 {
        let mut calls = 0;
        while conv.is_ramping() {
            conv.ramp();
            calls += 1;
            assert!(calls < 10_000, "ramp does not converge");
        }
        calls
    }

    fn snapshot(conv: &Converter<&Board>) -> (u32, u32, u32, i32, u32, u32) {
        (
            conv.target(),
            conv.reference(),
            conv.result(),
            conv.last_error(),
            conv.modulator(),
            conv.state(STATE_ALL),
        )
    }

    #[test]
    fn init_rejects_missing_callouts() {
        let conv = Converter::new(InstanceConfig {
            topology: Topology::Buck,
            initial_target: 3300,
            target_max: 3600,
            target_min: 2800,
            ref_num: 100,
            ref_den: 330,
            ramp_step: 64,
            sync_start_trigger: TriggerId(0),
            hardware: Callouts::new(),
        });
        conv.set_result(5);

        assert_eq!(conv.init(), Err(Error::InvalidParameter));
        // Rejected before the context is touched.
        assert_eq!(conv.result(), 5);
        assert_eq!(conv.target(), 0);
    }

    #[test]
    fn init_rejects_unusable_scaling_or_step() {
        let board = Board::default();

        let mut conv = converter(&board);
        conv.config.ramp_step = 0;
        assert_eq!(conv.init(), Err(Error::InvalidParameter));

        let mut conv = converter(&board);
        conv.config.ref_den = 0;
        assert_eq!(conv.init(), Err(Error::InvalidParameter));

        assert_eq!(board.init_calls.get(), 0);
    }

    #[test]
    fn init_zeroes_context_and_applies_initial_target() {
        let board = Board::default();
        let conv = converter(&board);
        conv.set_result(123);
        conv.set_modulator(456);
        conv.ctx.set_reference(789);
        conv.ctx.set_flags(STATE_RUN | STATE_RAMP);

        assert_eq!(conv.init(), Ok(()));
        assert_eq!(board.init_calls.get(), 1);
        assert_eq!(conv.target(), 1000);
        assert_eq!(conv.reference(), 0);
        assert_eq!(conv.result(), 0);
        assert_eq!(conv.modulator(), 0);
        assert_eq!(conv.state(STATE_ALL), 0);
    }

    #[test]
    fn init_reports_either_failure() {
        let board = Board::default();
        board.init_result.set(Err(code(0x10)));
        assert_eq!(converter(&board).init(), Err(Error::Hardware(code(0x10))));

        let board = Board::default();
        let mut conv = converter(&board);
        conv.config.initial_target = 2700;
        assert_eq!(conv.init(), Err(Error::InvalidParameter));
        // The hardware is still initialized.
        assert_eq!(board.init_calls.get(), 1);
        assert_eq!(conv.target(), 0);
    }

    #[test]
    fn init_merges_double_failure() {
        let board = Board::default();
        board.init_result.set(Err(code(0x10)));
        let mut conv = converter(&board);
        conv.config.initial_target = 4000;

        assert_eq!(
            conv.init(),
            Err(Error::Hardware(code(INVALID_PARAMETER_CODE | 0x10)))
        );
    }

    #[test]
    fn enable_runs_regulator_callout_and_ignores_its_result() {
        let board = Board::default();
        board.regulator_result.set(Some(Err(code(0x99))));
        let conv = converter(&board);
        conv.init().unwrap();

        assert_eq!(conv.enable(), Ok(()));
        assert_eq!(board.regulator_calls.get(), 1);
        assert_eq!(board.enable_calls.get(), 1);
    }

    #[test]
    fn enable_returns_hardware_result() {
        let board = Board::default();
        board.enable_result.set(Err(code(0x3)));
        let conv = converter(&board);
        conv.init().unwrap();

        assert_eq!(conv.enable(), Err(Error::Hardware(code(0x3))));
        assert_eq!(board.regulator_calls.get(), 0);
    }

    #[test]
    fn start_sets_run_and_ramp() {
        let board = Board::default();
        let conv = converter(&board);
        conv.init().unwrap();
        conv.enable().unwrap();

        assert_eq!(conv.start(), Ok(()));
        assert_eq!(board.triggered.get(), Some(TriggerId(7)));
        assert_eq!(conv.state(STATE_ALL), STATE_RUN | STATE_RAMP);
    }

    #[test]
    fn start_at_target_does_not_ramp() {
        let board = Board::default();
        let conv = converter(&board);
        conv.init().unwrap();
        conv.start().unwrap();
        ramp_to_target(&conv);
        assert_eq!(conv.reference(), conv.target());

        conv.start().unwrap();
        assert_eq!(conv.state(STATE_ALL), STATE_RUN);
    }

    #[test]
    fn failed_start_changes_nothing() {
        let board = Board::default();
        board.trigger_result.set(Err(code(0x21)));
        let conv = converter(&board);
        conv.init().unwrap();
        conv.enable().unwrap();
        let before = snapshot(&conv);

        assert_eq!(conv.start(), Err(Error::Hardware(code(0x21))));
        assert_eq!(snapshot(&conv), before);
        assert_eq!(conv.state(STATE_ALL), 0);
    }

    #[test]
    fn failed_start_while_running_keeps_flags() {
        let board = Board::default();
        let conv = converter(&board);
        conv.init().unwrap();
        conv.start().unwrap();
        conv.ramp();
        conv.ramp();

        board.trigger_result.set(Err(code(0x21)));
        let before = snapshot(&conv);

        assert_eq!(conv.start(), Err(Error::Hardware(code(0x21))));
        assert_eq!(snapshot(&conv), before);
        assert_eq!(conv.state(STATE_ALL), STATE_RUN | STATE_RAMP);
        assert_eq!(conv.reference(), 128);
    }

    #[test]
    fn disable_resets_even_when_hardware_fails() {
        let board = Board::default();
        board.disable_result.set(Err(code(0x44)));
        let conv = converter(&board);
        conv.init().unwrap();
        conv.start().unwrap();
        conv.ramp();
        conv.ramp();
        assert_eq!(conv.reference(), 128);

        assert_eq!(conv.disable(), Err(Error::Hardware(code(0x44))));
        assert_eq!(conv.reference(), 0);
        assert_eq!(conv.state(STATE_ALL), 0);
        assert_eq!(conv.target(), 1000);
    }

    #[test]
    fn disable_is_idempotent() {
        let board = Board::default();
        let conv = converter(&board);
        conv.init().unwrap();
        conv.start().unwrap();
        conv.ramp();

        assert_eq!(conv.disable(), Ok(()));
        let first = snapshot(&conv);
        assert_eq!(conv.disable(), Ok(()));
        assert_eq!(snapshot(&conv), first);
        assert_eq!(board.disable_calls.get(), 2);
    }

    #[test]
    fn set_target_rejects_out_of_range() {
        let board = Board::default();
        let conv = converter(&board);
        conv.init().unwrap();

        assert_eq!(conv.set_target(3000), Ok(()));
        assert_eq!(conv.target(), 909);

        assert_eq!(conv.set_target(2700), Err(Error::InvalidParameter));
        assert_eq!(conv.set_target(3601), Err(Error::InvalidParameter));
        assert_eq!(conv.target(), 909);
    }

    #[test]
    fn set_target_only_ramps_while_running() {
        let board = Board::default();
        let conv = converter(&board);
        conv.init().unwrap();

        conv.set_target(3000).unwrap();
        assert!(!conv.is_ramping());

        conv.start().unwrap();
        ramp_to_target(&conv);
        assert_eq!(conv.reference(), 909);

        // Same target again: the flag is raised anyway and, with nothing to
        // ramp, stays raised.
        conv.set_target(3000).unwrap();
        assert!(conv.is_ramping());
        conv.ramp();
        assert!(conv.is_ramping());
        assert_eq!(conv.reference(), 909);

        conv.set_target(3010).unwrap();
        conv.ramp();
        assert_eq!(conv.reference(), 912);
        assert!(!conv.is_ramping());
    }

    #[test]
    fn ramp_up_in_bounded_steps() {
        let board = Board::default();
        let conv = converter(&board);
        conv.init().unwrap();
        conv.start().unwrap();

        let mut last = conv.reference();
        for call in 1..=16 {
            assert!(conv.is_ramping(), "call {call}");
            conv.ramp();
            let reference = conv.reference();
            assert!(reference > last);
            assert!(reference <= 1000);
            last = reference;
        }

        assert_eq!(conv.reference(), 1000);
        assert!(!conv.is_ramping());
        assert!(conv.is_running());
    }

    #[test]
    fn ramp_down_snaps_on_last_step() {
        let board = Board::default();
        let conv = converter(&board);
        conv.init().unwrap();
        conv.start().unwrap();
        ramp_to_target(&conv);

        // 2800 mV -> 848 counts
        conv.set_target(2800).unwrap();
        conv.ramp();
        assert_eq!(conv.reference(), 936);
        conv.ramp();
        assert_eq!(conv.reference(), 872);
        assert!(conv.is_ramping());
        conv.ramp();
        assert_eq!(conv.reference(), 848);
        assert!(!conv.is_ramping());
    }

    #[test]
    fn ramp_waits_for_start() {
        let board = Board::default();
        let conv = converter(&board);
        conv.init().unwrap();

        conv.ramp();
        assert_eq!(conv.reference(), 0);

        conv.start().unwrap();
        conv.disable().unwrap();
        conv.ramp();
        assert_eq!(conv.reference(), 0);
    }

    #[test]
    fn large_delta_wraps_through_16_bit_window() {
        let board = Board::default();
        let conv = Converter::new(InstanceConfig {
            topology: Topology::Buck,
            initial_target: 40_000,
            target_max: 50_000,
            target_min: 0,
            ref_num: 1,
            ref_den: 1,
            ramp_step: 4096,
            sync_start_trigger: TriggerId(0),
            hardware: &board,
        });
        conv.init().unwrap();
        conv.start().unwrap();

        // 40000 reads as -25536 in 16 bits, so the reference moves down and
        // wraps instead of climbing.
        conv.ramp();
        assert_eq!(conv.reference(), 0u32.wrapping_sub(4096));

        let calls = 1 + ramp_to_target(&conv);
        assert_eq!(calls, 7);
        assert_eq!(conv.reference(), 40_000);
    }

    #[test]
    fn run_period_chains_ramp_error_and_regulator() {
        let board = Board::default();
        let conv = converter(&board);
        let mut regulator = Regulator2p2z::new(Config2p2z {
            b0: 1f32,
            b1: 0.,
            b2: 0.,
            a1: 0.,
            a2: 0.,
            min: 0.,
            max: 500.,
        });
        conv.init().unwrap();
        conv.start().unwrap();

        assert_eq!(conv.run_period(&mut regulator, 20), 44);
        assert_eq!(conv.reference(), 64);
        assert_eq!(conv.result(), 20);
        assert_eq!(conv.last_error(), 44);
        assert_eq!(conv.modulator(), 44);

        // Measurement above the reference: the output saturates at zero.
        assert_eq!(conv.run_period(&mut regulator, 400), 0);
        assert_eq!(conv.last_error(), 128 - 400);
    }

    fn unity_regulator() -> Regulator2p2z<f32> {
        Regulator2p2z::new(Config2p2z {
            b0: 1.,
            b1: 0.,
            b2: 0.,
            a1: 0.,
            a2: 0.,
            min: 0.,
            max: 500.,
        })
    }

    #[test]
    fn pre_hook_filters_error_before_regulation() {
        let board = Board::default();
        let conv = converter(&board);
        let mut regulator = unity_regulator();
        conv.init().unwrap();
        conv.start().unwrap();

        let modulator = conv.run_period_with(&mut regulator, 20, |err| err / 2, |m| m);
        assert_eq!(modulator, 22);
        assert_eq!(conv.last_error(), 22);
        assert_eq!(conv.modulator(), 22);
    }

    #[test]
    fn pre_hook_can_stop_the_converter() {
        let board = Board::default();
        let conv = converter(&board);
        let mut regulator = unity_regulator();
        conv.init().unwrap();
        conv.start().unwrap();

        let over_voltage = |err: i32| {
            if conv.result() > 900 {
                let _ = conv.disable();
                0
            } else {
                err
            }
        };
        assert_eq!(conv.run_period_with(&mut regulator, 950, over_voltage, |m| m), 0);
        assert!(!conv.is_running());
        assert_eq!(conv.reference(), 0);
        assert_eq!(board.disable_calls.get(), 1);

        // Stopped: the ramp no longer moves the reference.
        conv.run_period(&mut regulator, 0);
        assert_eq!(conv.reference(), 0);
    }

    #[test]
    fn post_hook_filters_modulator() {
        let board = Board::default();
        let conv = converter(&board);
        let mut regulator = unity_regulator();
        conv.init().unwrap();
        conv.start().unwrap();

        let modulator = conv.run_period_with(&mut regulator, 20, |err| err, |m| m.min(30));
        assert_eq!(modulator, 30);
        assert_eq!(conv.modulator(), 30);
        assert_eq!(conv.last_error(), 44);
        // The regulator keeps its own unfiltered output.
        assert_eq!(regulator.history().outputs[0], 44.);
    }

    fn ok() -> HwResult {
        Ok(())
    }

    static STATIC_CONVERTER: Converter<Callouts> = Converter::new(InstanceConfig {
        topology: Topology::Buck,
        initial_target: 3300,
        target_max: 3600,
        target_min: 2800,
        ref_num: 100,
        ref_den: 330,
        ramp_step: 64,
        sync_start_trigger: TriggerId(1),
        hardware: Callouts {
            init_hw: Some(ok),
            enable_hw: Some(ok),
            disable_hw: Some(ok),
            ..Callouts::new()
        },
    });

    #[test]
    fn converter_lives_in_a_static() {
        STATIC_CONVERTER.init().unwrap();
        STATIC_CONVERTER.enable().unwrap();
        STATIC_CONVERTER.start().unwrap();
        STATIC_CONVERTER.ramp();

        assert_eq!(STATIC_CONVERTER.reference(), 64);
        assert_eq!(STATIC_CONVERTER.state(STATE_ALL), STATE_RUN | STATE_RAMP);
    }
}
