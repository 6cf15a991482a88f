// Git side of the auto-commit loop: process runner, typed worker, commit
// planning, message synthesis, conflict guard and the scheduler.

pub mod auth;
pub mod conflict;
pub mod message;
pub mod plan;
pub mod rate_limit;
pub mod runner;
pub mod scheduler;
pub mod worker;
