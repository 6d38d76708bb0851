//! Field-path parsing for hypervisor stats parameters.
//!
//! libvirt names every stats parameter with a dotted path such as
//! `vcpu.0.time` or `net.1.rx.bytes`. The number of tokens encodes the
//! schema of the parameter; classifying by token count is left to the
//! serializers.

/// Delimiter between hierarchy levels in a field path.
pub const DELIMITER: char = '.';

/// Splits a field path into its ordered tokens.
///
/// Empty tokens are preserved, so `"a..b"` yields three tokens and an
/// empty path yields a single empty token.
pub fn split(path: &str) -> Vec<&str> {
    path.split(DELIMITER).collect()
}
