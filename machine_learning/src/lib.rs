pub mod arch;
pub mod builder;
pub mod dataset;
pub mod error;
pub mod initialization;
pub mod metrics;
pub mod ops;
pub mod optimization;
pub mod specs;

pub use error::{MlErr, Result};
