//! Result codes shared by the core and the hardware callouts.

use core::num::NonZeroU32;

use thiserror::Error;

/// Module identifier placed in bits 18..32 of [`INVALID_PARAMETER_CODE`].
pub const MODULE_ID: u32 = 0x01A0;

const TYPE_ERROR: u32 = 2;

/// Result word used for [`Error::InvalidParameter`], laid out as
/// `code | type << 16 | module << 18`.
pub const INVALID_PARAMETER_CODE: u32 = 1 | (TYPE_ERROR << 16) | (MODULE_ID << 18);

/// Opaque, nonzero result code produced by a hardware callout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HardwareCode(NonZeroU32);

impl HardwareCode {
    /// Returns `None` for 0, which is the success code.
    pub const fn new(code: u32) -> Option<Self> {
        match NonZeroU32::new(code) {
            Some(code) => Some(Self(code)),
            None => None,
        }
    }

    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl core::fmt::Display for HardwareCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#010x}", self.get())
    }
}

/// Outcome of a single hardware callout.
pub type HwResult = Result<(), HardwareCode>;

/// Failure of a converter operation.
///
/// [`Error::code`] gives the equivalent 32-bit result word.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Missing callout, out-of-range target or unusable scaling.
    #[error("invalid parameter")]
    InvalidParameter,

    /// Code returned unmodified by a hardware callout or the start trigger.
    #[error("hardware callout failed with code {0}")]
    Hardware(HardwareCode),
}

impl Error {
    /// The 32-bit result word for this error.
    pub const fn code(self) -> u32 {
        match self {
            Error::InvalidParameter => INVALID_PARAMETER_CODE,
            Error::Hardware(code) => code.get(),
        }
    }

    /// Interprets a result word. 0 means success and yields `None`.
    pub const fn from_code(code: u32) -> Option<Self> {
        if code == INVALID_PARAMETER_CODE {
            return Some(Error::InvalidParameter);
        }
        match HardwareCode::new(code) {
            Some(code) => Some(Error::Hardware(code)),
            None => None,
        }
    }

    /// Merges two outcomes by OR-ing their result words.
    ///
    /// When both sides fail, the merged word no longer says which one did.
    pub fn combine(a: Result<(), Error>, b: Result<(), Error>) -> Result<(), Error> {
        let code = |r: Result<(), Error>| r.err().map_or(0, Error::code);
        match Error::from_code(code(a) | code(b)) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl From<HardwareCode> for Error {
    fn from(code: HardwareCode) -> Self {
        Error::Hardware(code)
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
