//! Maps `(url, fingerprint)` to a relative file path and directory chain.

pub mod date;
pub mod domain;
pub mod flat;

pub use date::DateHierarchicalLayout;
pub use domain::DomainHierarchicalLayout;
pub use flat::FlatLayout;

/// Duck-typed provider contract for disk layout.
///
/// `path` must begin with `directory_chain` joined by the platform
/// separator, followed by a filename derived from the fingerprint.
pub trait PathLayout: Send + Sync {
    fn path(&self, url: &str, fingerprint: &str, extension: &str) -> String;
    fn directory_chain(&self, url: &str) -> Vec<String>;
}

pub(crate) fn join_chain(chain: &[String], fingerprint: &str, extension: &str) -> String {
    let filename = if extension.is_empty() {
        fingerprint.to_string()
    } else {
        format!("{fingerprint}.{extension}")
    };
    let mut parts: Vec<&str> = chain.iter().map(String::as_str).collect();
    parts.push(&filename);
    parts.join("/")
}
