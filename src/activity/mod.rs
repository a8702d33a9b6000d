pub mod checker;
pub mod evaluator;

pub use checker::ActivityChecker;
