//! # Boolean MPC engine with Ferret correlated randomness
//!
//! A semi-honest N-party secure computation engine for Boolean circuits.
//! Parties hold XOR shares of every wire; XOR/NOT gates are free, AND gates
//! consume Beaver bit triples. Triples come from a layered oblivious-transfer
//! stack: Naor–Pinkas base OT, IKNP short extension, and a Ferret-style
//! (LPN with regular errors) RCOT extender.
//!
//! [engine] is the only surface an application touches; everything below it
//! is wired in through the factories in [engine::factory].
#![warn(missing_docs)]

pub mod channel_utils;
pub mod crypt_utils;
pub mod engine;
pub mod metrics;
pub mod oblivious_transfer;
pub mod tuple_generator;
