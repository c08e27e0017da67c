//! Integration test crate for Trimline.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It wires the session, timeline controller and export orchestrator
//! together against scripted transcode engines.

#[cfg(test)]
mod fakes;

#[cfg(test)]
mod export;

#[cfg(test)]
mod interaction;
