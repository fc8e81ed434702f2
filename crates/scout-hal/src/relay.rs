//! [`Relay`] – on/off output driving the alert buzzer.

use scout_types::ScoutError;

/// A discrete on/off hardware output.
pub trait Relay: Send {
    /// Stable identifier, e.g. `"buzzer"`.
    fn id(&self) -> &str;

    /// Drive the output on (`true`) or off (`false`).
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::DeviceUnavailable`] if the output pin cannot be
    /// driven.
    fn set_state(&mut self, active: bool) -> Result<(), ScoutError>;

    /// Whether the output is currently driven on.
    fn state(&self) -> bool;
}
