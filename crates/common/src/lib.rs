// autocommit-common: shared types and utilities for the autocommit workspace

pub mod path;
pub mod types;
