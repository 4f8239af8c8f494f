pub mod controller;
pub mod loop_worker;
pub mod sampler;
pub mod state;
pub mod watchdog;


pub use controller::CaptureController;
pub use loop_worker::{CaptureDeps, ControlCommand, LoopConfig};
pub use state::{AnalysisSnapshot, AnalysisState};
pub use watchdog::Watchdog;
