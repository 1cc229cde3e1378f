//! User-supplied "allow" predicate evaluated during search (`spec.md`
//! §4.7). Invoked from worker threads during layer-0 admission, so it must
//! be re-entrant and side-effect-free: `Send + Sync`.

/// A label-level predicate. `true` means the label is allowed into the
/// result set; `false` filters it out (but the node may still be used as a
/// routing hop during traversal).
pub trait Filter: Send + Sync {
    fn allows(&self, label: u64) -> bool;
}

impl<F> Filter for F
where
    F: Fn(u64) -> bool + Send + Sync,
{
    fn allows(&self, label: u64) -> bool {
        self(label)
    }
}
