/// Hydration lifecycle of one leaf, as tracked by the hydrator.
///
/// Unresolved → Pending → Resolved | Failed. A failed leaf goes back to
/// Pending only when a later scan picks it up again.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HydrationState {
    Pending,
    Resolved,
    Failed,
}
