pub mod cancel;
pub mod policy;
pub mod qmdp;
pub mod sim;

pub use cancel::CancelFlag;
pub use policy::{AlphaVectorPolicy, Policy, PolicyError};
pub use qmdp::{QmdpSolver, SolveReport, SolveStatus, SolverConfig, SolverError, solve};
pub use sim::{RunEnd, Simulation, SimulationError, SimulationOutcome, Step, simulate};
