use super::{join_chain, PathLayout};

/// `<host>/<fingerprint>.<ext>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DomainHierarchicalLayout;

impl DomainHierarchicalLayout {
    fn host_of(url: &str) -> String {
        url.parse::<reqwest::Url>()
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_else(|| "unknown-host".to_string())
    }
}

impl PathLayout for DomainHierarchicalLayout {
    fn path(&self, url: &str, fingerprint: &str, extension: &str) -> String {
        join_chain(&self.directory_chain(url), fingerprint, extension)
    }

    fn directory_chain(&self, url: &str) -> Vec<String> {
        vec![Self::host_of(url)]
    }
}
