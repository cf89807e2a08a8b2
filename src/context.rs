//! Live converter data shared between the control interrupt and the
//! application.
//!
//! Every field is a single word accessed with relaxed atomics, so reads and
//! writes from either context never tear and never block. The control
//! interrupt owns the reference, error, modulator and both status flags; the
//! application owns the target. Races between the two settle on the next
//! control period.

use core::sync::atomic::{AtomicI32, AtomicU32, Ordering::Relaxed};

/// The converter is running: the start trigger fired and `disable` has not
/// been called since.
pub const STATE_RUN: u32 = 0x01;
/// The reference is still moving toward the target.
pub const STATE_RAMP: u32 = 0x02;
/// Selects every status flag.
pub const STATE_ALL: u32 = u32::MAX;

/// Live data of one converter: target, reference, measurement, error,
/// modulator value and status flags.
#[derive(Debug, Default)]
pub struct RuntimeContext {
    targ: AtomicU32,
    reference: AtomicU32,
    res: AtomicU32,
    err: AtomicI32,
    modulator: AtomicU32,
    state: AtomicU32,
}

impl RuntimeContext {
    pub const fn new() -> Self {
        Self {
            targ: AtomicU32::new(0),
            reference: AtomicU32::new(0),
            res: AtomicU32::new(0),
            err: AtomicI32::new(0),
            modulator: AtomicU32::new(0),
            state: AtomicU32::new(0),
        }
    }

    /// Zero every field.
    pub(crate) fn reset(&self) {
        self.targ.store(0, Relaxed);
        self.reference.store(0, Relaxed);
        self.res.store(0, Relaxed);
        self.err.store(0, Relaxed);
        self.modulator.store(0, Relaxed);
        self.state.store(0, Relaxed);
    }

    /// Target in internal reference units.
    pub fn target(&self) -> u32 {
        self.targ.load(Relaxed)
    }

    pub(crate) fn set_target(&self, targ: u32) {
        self.targ.store(targ, Relaxed);
    }

    /// Working reference in internal units.
    pub fn reference(&self) -> u32 {
        self.reference.load(Relaxed)
    }

    pub(crate) fn set_reference(&self, reference: u32) {
        self.reference.store(reference, Relaxed);
    }

    /// Latest measurement, as deposited by the acquisition path.
    pub fn result(&self) -> u32 {
        self.res.load(Relaxed)
    }

    pub fn set_result(&self, res: u32) {
        self.res.store(res, Relaxed);
    }

    /// Error stored by the last call to [`RuntimeContext::error`], or the
    /// filtered value from the last control period's pre-process hook.
    pub fn last_error(&self) -> i32 {
        self.err.load(Relaxed)
    }

    pub(crate) fn set_error(&self, err: i32) {
        self.err.store(err, Relaxed);
    }

    pub fn modulator(&self) -> u32 {
        self.modulator.load(Relaxed)
    }

    pub fn set_modulator(&self, modulator: u32) {
        self.modulator.store(modulator, Relaxed);
    }

    /// Status flags selected by `mask`.
    pub fn state(&self, mask: u32) -> u32 {
        self.state.load(Relaxed) & mask
    }

    pub(crate) fn set_flags(&self, flags: u32) {
        self.state.fetch_or(flags, Relaxed);
    }

    pub(crate) fn clear_flags(&self, flags: u32) {
        self.state.fetch_and(!flags, Relaxed);
    }

    /// Difference between the working reference and the measurement.
    ///
    /// The result is stored for later inspection and returned. Nothing else
    /// is touched.
    #[inline]
    pub fn error(&self) -> i32 {
        let err = (self.reference() as i32).wrapping_sub(self.result() as i32);
        self.set_error(err);
        err
    }
}
