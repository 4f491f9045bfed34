//! Key layout for tree persistence.
//!
//! All keys are ASCII byte strings with textual decimal integers. The tree
//! owns exactly `meta:size`, `meta:version` and one `leaf:<i>` entry per
//! leaf; readers must ignore unknown meta keys. These builders are public so
//! that overlays composing with the tree's storage (e.g. a census) can purge
//! tree state when replacing content wholesale.

/// Canonical leaf count, textual decimal.
pub const META_SIZE_KEY: &[u8] = b"meta:size";

/// Schema version for future migrations.
pub const META_VERSION_KEY: &[u8] = b"meta:version";

/// Current schema version value.
pub const SCHEMA_VERSION: &[u8] = b"1";

/// Build the key holding the codec-encoded leaf at `index`.
pub fn leaf_key(index: usize) -> Vec<u8> {
    format!("leaf:{index}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_key_is_textual_decimal() {
        assert_eq!(leaf_key(0), b"leaf:0".to_vec());
        assert_eq!(leaf_key(1234), b"leaf:1234".to_vec());
    }
}
