//! The capability set a converter instance needs from the board.
//!
//! The core never touches peripherals directly. Everything it needs from the
//! outside world goes through [`Hardware`], either implemented by a board
//! support type or assembled from plain functions with [`Callouts`].

use crate::error::HwResult;

/// Identifier of the trigger line that starts converter instances together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TriggerId(pub u32);

/// Board callouts used by the converter lifecycle.
///
/// Methods take `&self` so the implementation can be shared with the
/// control interrupt; boards owning peripherals wrap them in a critical
/// section mutex.
pub trait Hardware {
    /// Configure the topology-specific peripherals (PWM, ADC, comparators).
    fn init(&self) -> HwResult;

    /// Enable the peripherals so that a start trigger can launch them.
    fn enable(&self) -> HwResult;

    /// Stop switching and disable the peripherals.
    fn disable(&self) -> HwResult;

    /// Reset and configure the regulator. `None` when no regulator callout
    /// is configured.
    fn init_regulator(&self) -> Option<HwResult> {
        None
    }

    /// Fire the synchronous start trigger.
    fn trigger_sync_start(&self, trigger: TriggerId) -> HwResult;

    /// Whether the required init, enable and disable callouts are present.
    fn is_bound(&self) -> bool {
        true
    }
}

/// A plain init, enable or disable function for [`Callouts`].
pub type Callout = fn() -> HwResult;

/// A table of plain callout functions, suitable for a `static` instance
/// definition.
///
/// Missing required entries are reported through [`Hardware::is_bound`] and
/// rejected by [`Converter::init`](crate::Converter::init).
#[derive(Debug, Clone, Copy)]
pub struct Callouts {
    pub init_hw: Option<Callout>,
    pub enable_hw: Option<Callout>,
    pub disable_hw: Option<Callout>,
    pub init_reg: Option<Callout>,
    pub sync_start: fn(TriggerId) -> HwResult,
}

impl Callouts {
    /// An empty table whose start trigger always succeeds.
    pub const fn new() -> Self {
        fn no_trigger(_: TriggerId) -> HwResult {
            Ok(())
        }

        Self {
            init_hw: None,
            enable_hw: None,
            disable_hw: None,
            init_reg: None,
            sync_start: no_trigger,
        }
    }
}

impl Default for Callouts {
    fn default() -> Self {
        Self::new()
    }
}

fn call(callout: Option<Callout>) -> HwResult {
    callout.map_or(Ok(()), |f| f())
}

impl Hardware for Callouts {
    fn init(&self) -> HwResult {
        call(self.init_hw)
    }

    fn enable(&self) -> HwResult {
        call(self.enable_hw)
    }

    fn disable(&self) -> HwResult {
        call(self.disable_hw)
    }

    fn init_regulator(&self) -> Option<HwResult> {
        self.init_reg.map(|f| f())
    }

    fn trigger_sync_start(&self, trigger: TriggerId) -> HwResult {
        (self.sync_start)(trigger)
    }

    fn is_bound(&self) -> bool {
        self.init_hw.is_some() && self.enable_hw.is_some() && self.disable_hw.is_some()
    }
}

impl<H: Hardware + ?Sized> Hardware for &H {
    fn init(&self) -> HwResult {
        (**self).init()
    }

    fn enable(&self) -> HwResult {
        (**self).enable()
    }

    fn disable(&self) -> HwResult {
        (**self).disable()
    }

    fn init_regulator(&self) -> Option<HwResult> {
        (**self).init_regulator()
    }

    fn trigger_sync_start(&self, trigger: TriggerId) -> HwResult {
        (**self).trigger_sync_start(trigger)
    }

    fn is_bound(&self) -> bool {
        (**self).is_bound()
    }
}
