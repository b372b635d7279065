use twox_hash::xxh3::hash128;

use super::{Fingerprint, Identifier};

/// 128-bit-class identifier using XXH3. Fast enough to run on every disk
/// touch; adequate avalanche behavior for corpora up to a few million URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct FastIdentifier;

impl Identifier for FastIdentifier {
    fn identifier(&self, url: &str) -> Fingerprint {
        let digest = hash128(url.as_bytes());
        hex::encode(digest.to_be_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let id = FastIdentifier;
        assert_eq!(
            id.identifier("https://x.test/a.png"),
            id.identifier("https://x.test/a.png")
        );
    }

    #[test]
    fn differs_for_different_urls() {
        let id = FastIdentifier;
        assert_ne!(
            id.identifier("https://x.test/a.png"),
            id.identifier("https://x.test/b.png")
        );
    }

    #[test]
    fn is_lowercase_hex() {
        let id = FastIdentifier;
        let fp = id.identifier("https://x.test/a.png");
        assert_eq!(fp.len(), 32);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
