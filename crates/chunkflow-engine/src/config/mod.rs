//! Engine settings: YAML parsing, env substitution, validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use types::{
    EngineSettings, InputSettings, OutputSettings, StoreBackendKind, StoreSettings,
};
