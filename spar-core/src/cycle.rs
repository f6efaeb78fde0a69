// Host update-cycle integration

use std::fmt;

/// The boundary a settlement runs inside.
///
/// Hosts that reconcile state after every change (a UI update loop, a
/// transaction) implement this to wrap settlement in their own commit.
/// The closure must be run synchronously before `apply` returns.
pub trait UpdateCycle: Send + Sync {
    fn apply(&self, settle: Box<dyn FnOnce() + Send + '_>);
}

/// Runs the settlement in place with no surrounding commit
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

impl UpdateCycle for Immediate {
    fn apply(&self, settle: Box<dyn FnOnce() + Send + '_>) {
        settle();
    }
}

impl fmt::Debug for dyn UpdateCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UpdateCycle")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_immediate_runs_synchronously() {
        let ran = AtomicUsize::new(0);
        Immediate.apply(Box::new(|| {
            ran.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
