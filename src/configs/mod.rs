mod builder;
mod trainer;

pub use builder::{Session, SessionBuilder};
pub use trainer::{DatasetConfig, TrainerConfig};
