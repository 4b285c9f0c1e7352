pub mod chain;
pub mod commands;
pub mod engine;
pub mod handle;
pub mod key_estimator;
pub mod model_store;
pub mod perturbation;
pub mod rng;
pub mod scheduler;
pub mod telemetry;
pub mod triple_buffer;

pub use chain::{ChainAdapter, MarkovChain};
pub use commands::{EngineCmd, EngineFeedback};
pub use engine::Engine;
pub use handle::{create_engine, CounterSnapshot, EngineHandle, EngineStatus};
pub use key_estimator::{KeyChange, KeyEstimator};
pub use model_store::{export_model, parse_model, ModelImport, ModelState};
pub use telemetry::{BlockTelemetry, TelemetrySummary};
