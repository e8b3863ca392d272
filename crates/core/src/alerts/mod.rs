pub mod evaluator;
pub mod messages;
