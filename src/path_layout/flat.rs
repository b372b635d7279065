use super::{join_chain, PathLayout};

/// `<fingerprint>.<ext>`, no subdirectories.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatLayout;

impl PathLayout for FlatLayout {
    fn path(&self, _url: &str, fingerprint: &str, extension: &str) -> String {
        join_chain(&[], fingerprint, extension)
    }

    fn directory_chain(&self, _url: &str) -> Vec<String> {
        Vec::new()
    }
}
