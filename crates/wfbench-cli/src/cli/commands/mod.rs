pub mod cases;
pub mod dispatch;
pub mod report;
pub mod run;
pub mod runner_builder;

pub use dispatch::dispatch;
