pub mod docker;
pub mod driver;
pub mod simulated;

pub use docker::DockerDriver;
pub use driver::{DriverError, EnvironmentHandle, ExecutionDriver, OutputLines};
pub use simulated::{DriverCall, SimulatedDriver};
