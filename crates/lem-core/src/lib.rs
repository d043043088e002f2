//! Landscape evolution on a periodic-in-columns elevation grid: depression
//! filling → flow routing → flux assembly → time integration, with periodic
//! checkpoints and flux-fraction snapshots.
pub mod config;
pub mod derivative;
pub mod error;
pub mod flow;
pub mod flux;
pub mod grid;
pub mod initial;
pub mod integrate;
pub mod observer;
pub mod params;
pub mod simulation;
pub mod store;

pub use config::{EvalSchedule, InitialCondition, IntegrationConfig, RunConfig};
pub use derivative::{rebuild, DerivativeFunction};
pub use error::{LemError, LemResult};
pub use flow::{fill_depressions, route, FillMode, FlowField, RoutingOptions, RoutingScheme};
pub use flux::{assemble, FluxParams};
pub use grid::{ElevationGrid, GridShape};
pub use integrate::{integrate, IntegrationOptions, IntegrationResult, Method, OdeSystem};
pub use observer::{flux_fraction, NoopObserver, ObserverSettings, ObserverState, StepObserver, SteppingObserver};
pub use params::{calc_k_u_d, ModelConfig, ModelParameters, PhysicalConstants, StreamPowerParams};
pub use simulation::{RunSummary, Simulation};
pub use store::{CheckpointRecord, OutputSnapshot, RunStore};
