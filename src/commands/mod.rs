//! CLI command implementations for herakles-libvirt-exporter.
//!
//! - `test`: run collection cycles and print the document
//! - `generate-fixture`: write a synthetic fixture file

pub mod generate;
pub mod test;

// Re-export command functions
pub use generate::{command_generate_fixture, FixtureShape};
pub use test::command_test;
