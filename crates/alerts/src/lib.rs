pub mod evaluator;

pub use evaluator::{AlertConfig, Evaluator};
