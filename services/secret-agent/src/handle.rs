//! Shared view of the most recently published credential.

use arc_swap::ArcSwapOption;
use secret_store_client::Credential;
use std::sync::Arc;

/// Lock-free handle to the current credential.
///
/// The renewal loop is the only writer. Readers get the value that was last
/// published to disk, never one that failed to publish.
#[derive(Clone, Default)]
pub struct CredentialHandle {
    inner: Arc<ArcSwapOption<Credential>>,
}

impl CredentialHandle {
    /// Empty handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current credential, if one has been published.
    #[must_use]
    pub fn current(&self) -> Option<Arc<Credential>> {
        self.inner.load_full()
    }

    pub(crate) fn store(&self, credential: Credential) {
        self.inner.store(Some(Arc::new(credential)));
    }
}

impl std::fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("current", &self.current())
            .finish()
    }
}
