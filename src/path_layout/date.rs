use chrono::{Datelike, Utc};

use super::{join_chain, PathLayout};

/// `YYYY/MM/DD/<fingerprint>.<ext>`, computed from current wall clock at
/// write time.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateHierarchicalLayout;

impl DateHierarchicalLayout {
    fn today_chain() -> Vec<String> {
        let now = Utc::now();
        vec![
            format!("{:04}", now.year()),
            format!("{:02}", now.month()),
            format!("{:02}", now.day()),
        ]
    }
}

impl PathLayout for DateHierarchicalLayout {
    fn path(&self, _url: &str, fingerprint: &str, extension: &str) -> String {
        join_chain(&Self::today_chain(), fingerprint, extension)
    }

    fn directory_chain(&self, _url: &str) -> Vec<String> {
        Self::today_chain()
    }
}
