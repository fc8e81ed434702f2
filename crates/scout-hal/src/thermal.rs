//! Contactless thermal sensor contract.

use scout_types::{ScoutError, TemperatureReading};

/// An infrared thermometer reporting ambient and object temperature.
pub trait ThermalSensor: Send {
    fn id(&self) -> &str;

    /// Read both temperatures in one bus transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::SensorUnavailable`] when the bus read fails.
    fn read(&mut self) -> Result<TemperatureReading, ScoutError>;
}
