//! Control core for digitally regulated DC-DC converters.
//!
//! A [`Converter`] holds the static [`InstanceConfig`] of one power stage
//! together with its live [`RuntimeContext`]. Application code drives the
//! lifecycle and sets targets in physical units; a periodic control
//! interrupt ramps the reference, computes the feedback error and runs a
//! [`Regulator2p2z`] to produce the modulator value.
//!
//! ```
//! use pwrconv::{Callouts, Config2p2z, Converter, HwResult, InstanceConfig, Regulator2p2z, Topology, TriggerId};
//!
//! fn ok() -> HwResult {
//!     Ok(())
//! }
//!
//! static BUCK: Converter<Callouts> = Converter::new(InstanceConfig {
//!     topology: Topology::Buck,
//!     initial_target: 3300,
//!     target_max: 3600,
//!     target_min: 2800,
//!     ref_num: 100,
//!     ref_den: 330,
//!     ramp_step: 64,
//!     sync_start_trigger: TriggerId(0),
//!     hardware: Callouts {
//!         init_hw: Some(ok),
//!         enable_hw: Some(ok),
//!         disable_hw: Some(ok),
//!         ..Callouts::new()
//!     },
//! });
//!
//! let mut regulator = Regulator2p2z::new(Config2p2z {
//!     b0: 1.2f32,
//!     b1: -1.1,
//!     b2: 0.,
//!     a1: 1.,
//!     a2: 0.,
//!     min: 0.,
//!     max: 4000.,
//! });
//!
//! BUCK.init().unwrap();
//! BUCK.enable().unwrap();
//! BUCK.start().unwrap();
//!
//! // From the control interrupt, with a fresh ADC sample:
//! let duty = BUCK.run_period(&mut regulator, 0);
//! assert!(duty > 0);
//! ```

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

#[macro_use]
mod fmt;

pub mod config;
pub mod context;
pub mod converter;
pub mod error;
pub mod hardware;
pub mod regulator;

pub use config::{InstanceConfig, Topology};
pub use context::{RuntimeContext, STATE_ALL, STATE_RAMP, STATE_RUN};
pub use converter::Converter;
pub use error::{Error, HardwareCode, HwResult, Result};
pub use hardware::{Callout, Callouts, Hardware, TriggerId};
pub use regulator::{Config2p2z, History, Regulator2p2z, Sample};
