//! Raw content snapshots used to short-circuit redundant reloads.

/// The CA bundle bytes of the last successfully processed reload.
///
/// Snapshots compare by exact bytes. Comparing the parsed certificates instead
/// would be unreliable: re-parsing identical bytes yields distinct objects.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentSnapshot {
    ca_bundle: Vec<u8>,
}

impl ContentSnapshot {
    /// Wraps bundle bytes.
    pub fn new(ca_bundle: impl Into<Vec<u8>>) -> Self {
        Self {
            ca_bundle: ca_bundle.into(),
        }
    }

    /// Returns the wrapped bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.ca_bundle
    }

    /// Compares two possibly-absent snapshots.
    ///
    /// Two absent snapshots are equal; absent and present never are; two present
    /// snapshots are equal iff their bytes are identical.
    pub fn same(lhs: Option<&Self>, rhs: Option<&Self>) -> bool {
        match (lhs, rhs) {
            (None, None) => true,
            (Some(l), Some(r)) => l.ca_bundle == r.ca_bundle,
            _ => false,
        }
    }
}

impl std::fmt::Debug for ContentSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentSnapshot")
            .field("len", &self.ca_bundle.len())
            .finish()
    }
}
