//! Static instance parameters.

use crate::hardware::{Hardware, TriggerId};

/// Converter topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Topology {
    #[default]
    Buck = 0,
    /// Reserved. Only the tag exists.
    Pfc = 1,
}

/// Read-only description of one converter instance, typically produced by a
/// configuration tool and placed in a `static`.
#[derive(Debug, Clone)]
pub struct InstanceConfig<H> {
    pub topology: Topology,

    /// Target applied by [`Converter::init`](crate::Converter::init), in
    /// physical units (for example millivolts).
    pub initial_target: u32,
    /// Highest acceptable target, in physical units.
    pub target_max: u32,
    /// Lowest acceptable target, in physical units.
    pub target_min: u32,
    /// Numerator of the physical to internal reference conversion, typically
    /// the ADC full scale count times the feedback divider ratio.
    pub ref_num: u16,
    /// Denominator of the physical to internal reference conversion,
    /// typically the ADC reference voltage in physical units.
    pub ref_den: u16,

    /// Reference change per control period. Must be positive.
    pub ramp_step: u16,

    pub sync_start_trigger: TriggerId,
    pub hardware: H,
}

impl<H: Hardware> InstanceConfig<H> {
    /// Whether the scaling and ramp parameters are usable.
    pub fn is_valid(&self) -> bool {
        self.ref_den != 0 && self.ramp_step != 0 && self.hardware.is_bound()
    }

    /// Whether `physical` lies within `[target_min, target_max]`.
    pub fn accepts(&self, physical: u32) -> bool {
        (self.target_min..=self.target_max).contains(&physical)
    }

    /// Convert a physical target into internal reference units.
    ///
    /// The product wraps at 32 bits, the quotient is truncated and the
    /// result is cut to 16 bits, matching deployed firmware bit for bit.
    /// Returns `None` when the denominator is zero.
    pub fn scale(&self, physical: u32) -> Option<u32> {
        let scaled = physical
            .wrapping_mul(u32::from(self.ref_num))
            .checked_div(u32::from(self.ref_den))?;
        Some(u32::from(scaled as u16))
    }
}
