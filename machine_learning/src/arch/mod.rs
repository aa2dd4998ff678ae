pub mod activations;
pub mod layers;
pub mod loss;
mod model;
mod sequential;

pub use model::{Mode, Model, StateDict};
pub use sequential::Sequential;
