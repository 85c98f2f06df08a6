//! Token lifecycle: ports, state labels and the refresh state machine.

pub mod ports;
pub mod refresher;
pub mod state;
