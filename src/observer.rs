//! External observation hooks. Any subset of methods may be overridden;
//! defaults are no-ops so implementors only opt into the events they care
//! about.

use crate::error::DownloaderError;

pub trait Observer: Send + Sync {
    fn will_start(&self, _url: &str) {}
    fn progress(&self, _url: &str, _value: f32) {}
    fn did_load(&self, _url: &str, _from_cache: bool, _from_storage: bool) {}
    fn did_fail(&self, _url: &str, _error: &DownloaderError) {}
}
