/// A read that may have fallen back to the local cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched<T> {
    pub value: T,
    /// Set when the server could not be reached and `value` came from the cache.
    pub warning: Option<String>,
}
impl<T> Fetched<T> {
    pub fn fresh(value: T) -> Self {
        Self { value, warning: None }
    }

    pub fn cached(value: T, warning: impl Into<String>) -> Self {
        Self {
            value,
            warning: Some(warning.into()),
        }
    }

    pub fn is_stale(&self) -> bool {
        self.warning.is_some()
    }
}
