//! Logging shim. Forwards to `defmt` when the `defmt` feature is enabled and
//! expands to nothing otherwise.

#![allow(unused_macros)]

macro_rules! debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        ::defmt::debug!($($arg)*);
    };
}

macro_rules! warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($arg)*);
    };
}
