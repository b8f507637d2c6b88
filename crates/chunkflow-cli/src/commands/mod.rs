pub mod executions;
pub mod run;
pub mod show;
