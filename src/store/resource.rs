//! Per-slice result type and request-generation fencing
//!
//! Each region of the billing store (plans, subscription, credits, usage,
//! history) loads and fails independently. A [`Slice`] pairs the current
//! [`Resource`] with a monotonic request generation: a fetch takes a token
//! when it starts and its settlement is dropped if a newer request (or a
//! local mutation) has bumped the generation since. A slow stale response
//! can therefore never overwrite fresher data.

use serde::{Deserialize, Serialize};

/// Loading state of one store slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Resource<T> {
    /// Never fetched
    #[default]
    Idle,
    /// Fetch in flight; any previously held value has been superseded
    Loading,
    Ready(T),
    /// Failure string is already user-readable
    Failed(String),
}

impl<T> Resource<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Resource::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Resource::Ready(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Resource::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Resource::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Opaque token tying a settlement to the request that started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchToken(u64);

/// A [`Resource`] guarded by a monotonic request generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice<T> {
    resource: Resource<T>,
    #[serde(skip)]
    generation: u64,
}

impl<T> Default for Slice<T> {
    fn default() -> Self {
        Self {
            resource: Resource::Idle,
            generation: 0,
        }
    }
}

impl<T> Slice<T> {
    pub fn resource(&self) -> &Resource<T> {
        &self.resource
    }

    pub fn value(&self) -> Option<&T> {
        self.resource.value()
    }

    /// Start a fetch: bump the generation, mark the slice loading, and hand
    /// back the token the settlement must present.
    pub fn begin(&mut self) -> FetchToken {
        self.generation += 1;
        self.resource = Resource::Loading;
        FetchToken(self.generation)
    }

    /// Settle a successful fetch. Returns `false` (and changes nothing) when
    /// the token is stale.
    pub fn settle_ok(&mut self, token: FetchToken, value: T) -> bool {
        if token.0 != self.generation {
            return false;
        }
        self.resource = Resource::Ready(value);
        true
    }

    /// Settle a failed fetch. Stale tokens are dropped the same way.
    pub fn settle_err(&mut self, token: FetchToken, message: String) -> bool {
        if token.0 != self.generation {
            return false;
        }
        self.resource = Resource::Failed(message);
        true
    }

    /// Install a value directly (push message, optimistic mutation). Bumps
    /// the generation so any in-flight fetch started earlier settles stale.
    pub fn set(&mut self, value: T) {
        self.generation += 1;
        self.resource = Resource::Ready(value);
    }

    /// Mutate the held value in place when present, fencing out in-flight
    /// fetches. Returns whether the closure ran.
    pub fn update(&mut self, f: impl FnOnce(&mut T)) -> bool {
        if let Resource::Ready(value) = &mut self.resource {
            f(value);
            self.generation += 1;
            true
        } else {
            false
        }
    }

    /// Drop back to `Idle` (sign-out reset).
    pub fn reset(&mut self) {
        self.generation += 1;
        self.resource = Resource::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_matching_token() {
        let mut slice: Slice<u32> = Slice::default();
        let token = slice.begin();
        assert!(slice.resource().is_loading());
        assert!(slice.settle_ok(token, 7));
        assert_eq!(slice.value(), Some(&7));
    }

    #[test]
    fn test_stale_token_is_dropped() {
        let mut slice: Slice<u32> = Slice::default();
        let stale = slice.begin();
        let fresh = slice.begin();

        // The newer request wins regardless of arrival order
        assert!(slice.settle_ok(fresh, 2));
        assert!(!slice.settle_ok(stale, 1));
        assert_eq!(slice.value(), Some(&2));

        // Stale failures are dropped too
        let stale = slice.begin();
        let fresh = slice.begin();
        assert!(slice.settle_ok(fresh, 3));
        assert!(!slice.settle_err(stale, "late timeout".to_string()));
        assert_eq!(slice.value(), Some(&3));
    }

    #[test]
    fn test_local_mutation_fences_in_flight_fetch() {
        let mut slice: Slice<u32> = Slice::default();
        let token = slice.begin();

        // An optimistic write lands while the fetch is still in flight
        slice.set(10);
        assert!(!slice.settle_ok(token, 99));
        assert_eq!(slice.value(), Some(&10));
    }

    #[test]
    fn test_update_only_runs_when_ready() {
        let mut slice: Slice<u32> = Slice::default();
        assert!(!slice.update(|v| *v += 1));

        slice.set(5);
        assert!(slice.update(|v| *v += 1));
        assert_eq!(slice.value(), Some(&6));
    }

    #[test]
    fn test_failed_slice_reports_error() {
        let mut slice: Slice<u32> = Slice::default();
        let token = slice.begin();
        slice.settle_err(token, "Network error: refused".to_string());
        assert_eq!(slice.resource().error(), Some("Network error: refused"));
        assert!(slice.value().is_none());

        slice.reset();
        assert_eq!(slice.resource(), &Resource::Idle);
    }
}
