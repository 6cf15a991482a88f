// autocommit-daemon library: watch a repository and commit changes in batches.

pub mod config;
pub mod error;
pub mod git;
pub mod runtime;
pub mod security;
pub mod startup;
pub mod watcher;
