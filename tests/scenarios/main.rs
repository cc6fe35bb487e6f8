//! Scenario-based tests for datapipe

mod helpers;

mod end_to_end;
mod failure_handling;
mod references;
mod scheduling;
