//! Monochromator hardware: serial channel, firmware protocol, and devices.
//!
//! Layers, bottom up:
//! - [`serial`]: newline-framed channel with deadline-bounded reads
//! - [`protocol`]: command grammar and the zero/move transaction state machine
//! - [`kinematics`]: step ↔ wavelength models
//! - [`axis`] and [`slit`]: motorized axes built on the protocol
//! - [`monochromator`]: the controller composed from all of the above
//!
//! [`mock_serial`] replaces the physical port in tests.

pub mod axis;
pub mod kinematics;
pub mod mock_serial;
pub mod monochromator;
pub mod protocol;
pub mod serial;
pub mod slit;

pub use axis::{MotorAxis, StepBounds};
pub use kinematics::KinematicModel;
pub use monochromator::{MonochromatorController, Role, ShutterState};
pub use protocol::{Command, ProtocolTimings, Reply};
pub use serial::{CommandChannel, SharedChannel};
pub use slit::SlitBank;
