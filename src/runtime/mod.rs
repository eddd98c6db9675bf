//! Runtime system
//!
//! This module contains the task graphs and the executor that runs them.

pub mod dag;
pub mod errors;
pub mod framework;
pub mod scheduler;
