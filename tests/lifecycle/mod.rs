//! Step definitions and fixtures for the run lifecycle feature.

mod bdd_steps;
mod scenarios;
mod test_helpers;
