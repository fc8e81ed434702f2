//! `scout-hal` – hardware contracts for the Scout platform.
//!
//! The fusion loop never talks to a vendor driver directly.  Every physical
//! peripheral is reached through one of the traits in this crate, so drivers
//! can be swapped (or simulated) without touching the control logic.
//!
//! # Modules
//!
//! - [`device`] – [`Peripheral`][device::Peripheral] and the owned,
//!   reconnectable [`DeviceHandle`][device::DeviceHandle] that wraps one.
//! - [`relay`] – [`Relay`][relay::Relay]: discrete on/off outputs such as the
//!   alert buzzer.
//! - [`camera`] – [`CameraFrame`][camera::CameraFrame] and the
//!   [`Camera`][camera::Camera] peripheral alias.
//! - [`thermal`] – [`ThermalSensor`][thermal::ThermalSensor].
//! - [`positioning`] – [`SatelliteReceiver`][positioning::SatelliteReceiver].
//! - [`sim`] – in-process simulated drivers for headless runs and tests.

pub mod camera;
pub mod device;
pub mod positioning;
pub mod relay;
pub mod sim;
pub mod thermal;

pub use camera::{Camera, CameraFrame, Rgb};
pub use device::{DeviceHandle, DeviceHealth, HealthStatus, Peripheral};
pub use positioning::{SatelliteReading, SatelliteReceiver};
pub use relay::Relay;
pub use thermal::ThermalSensor;
