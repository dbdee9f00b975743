use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Stable content fingerprint used for change detection.
///
/// Fingerprints are compared only for equality, never decoded; collision
/// resistance beyond ordinary change detection is not a goal.
#[must_use]
pub fn content_fingerprint(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn identical_content_hashes_identically() {
        assert_eq!(content_fingerprint("note body"), content_fingerprint("note body"));
    }

    #[test]
    fn any_edit_changes_the_fingerprint() {
        assert_ne!(content_fingerprint("note body"), content_fingerprint("note body "));
        assert_ne!(content_fingerprint(""), content_fingerprint(" "));
    }

    #[test]
    fn fingerprint_is_lowercase_hex() {
        let hash = content_fingerprint("x");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
