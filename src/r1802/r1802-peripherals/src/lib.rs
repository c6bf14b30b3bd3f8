//! Host-side devices for the 1802 I/O bus. Everything here needs `std`
//! and is only built with the `host-peripherals` feature.

#[cfg(feature = "host-peripherals")]
pub mod console;
#[cfg(feature = "host-peripherals")]
pub mod profile;
#[cfg(feature = "host-peripherals")]
pub mod sound;
#[cfg(feature = "host-peripherals")]
pub mod storage;
