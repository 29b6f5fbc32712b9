//! Local persistence for alerts and the malicious-file registry.

mod encrypted;

pub use encrypted::AlertStore;
