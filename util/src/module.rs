//! Module interfaces
//!
//! The control modules of `boat_exec` (locomotion and trajectory control) share one shape: they
//! are configured once from their parameters, then called once per control tick with that
//! tick's inputs.

// ---------------------------------------------------------------------------
// MODULE STATE
// ---------------------------------------------------------------------------

/// A cyclic control module.
pub trait State {
    /// Parameters the module is configured from
    type InitData;
    type InitError;

    /// Inputs of one tick
    type InputData;
    /// Result of one tick
    type OutputData;
    /// Monitoring quantities computed during a tick
    type StatusReport;
    type ProcError;

    /// Configure the module. May be called again to reconfigure it.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError>;

    /// Run one tick.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}
