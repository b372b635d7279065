use super::{Fingerprint, Identifier};

/// 256-bit-class identifier using BLAKE3. Used where collision resistance
/// matters more than raw speed (e.g. untrusted or adversarial URL input).
#[derive(Debug, Default, Clone, Copy)]
pub struct StrongIdentifier;

impl Identifier for StrongIdentifier {
    fn identifier(&self, url: &str) -> Fingerprint {
        blake3::hash(url.as_bytes()).to_hex().to_string()
    }
}
