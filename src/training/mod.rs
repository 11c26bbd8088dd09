// Training module - trainer command construction and process invocation

pub mod command;
pub mod subprocess;

pub use command::TrainerCommand;
pub use subprocess::{ProcessTrainer, Trainer};
