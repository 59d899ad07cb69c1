//! Scripted failures for in-memory collaborators.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::classify::BackendError;

#[derive(Debug)]
struct Plan<Op> {
    queued: HashMap<Op, VecDeque<BackendError>>,
    always: HashMap<Op, BackendError>,
    calls: HashMap<Op, u32>,
}

/// Per-operation failure plan and call counter.
#[derive(Debug)]
pub struct Faults<Op> {
    plan: Mutex<Plan<Op>>,
}

impl<Op> Default for Faults<Op> {
    fn default() -> Self {
        Self {
            plan: Mutex::new(Plan {
                queued: HashMap::new(),
                always: HashMap::new(),
                calls: HashMap::new(),
            }),
        }
    }
}

impl<Op: Copy + Eq + Hash> Faults<Op> {
    fn lock(&self) -> MutexGuard<'_, Plan<Op>> {
        self.plan.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `times` calls of `op` with `error`.
    pub fn fail_times(&self, op: Op, times: u32, error: BackendError) {
        let mut plan = self.lock();
        let queue = plan.queued.entry(op).or_default();
        queue.extend((0..times).map(|_| error.clone()));
    }

    /// Fail every call of `op` with `error`, after queued failures.
    pub fn fail_always(&self, op: Op, error: BackendError) {
        self.lock().always.insert(op, error);
    }

    /// Drop every planned failure. Call counters are kept.
    pub fn clear(&self) {
        let mut plan = self.lock();
        plan.queued.clear();
        plan.always.clear();
    }

    /// Number of calls of `op` seen so far.
    pub fn calls(&self, op: Op) -> u32 {
        self.lock().calls.get(&op).copied().unwrap_or_default()
    }

    /// Record a call of `op` and return its planned failure, if any.
    pub(crate) fn check(&self, op: Op) -> Result<(), BackendError> {
        let mut plan = self.lock();
        *plan.calls.entry(op).or_default() += 1;

        if let Some(error) =
            plan.queued.get_mut(&op).and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        match plan.always.get(&op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Op {
        Read,
        Write,
    }

    #[test]
    fn test_queued_then_always() {
        let faults = Faults::default();
        faults.fail_times(Op::Write, 2, BackendError::Timeout);
        faults.fail_always(Op::Write, BackendError::Transport("down".into()));

        assert_eq!(faults.check(Op::Write), Err(BackendError::Timeout));
        assert_eq!(faults.check(Op::Write), Err(BackendError::Timeout));
        assert_eq!(
            faults.check(Op::Write),
            Err(BackendError::Transport("down".into()))
        );
        assert_eq!(faults.check(Op::Read), Ok(()));

        faults.clear();
        assert_eq!(faults.check(Op::Write), Ok(()));
        assert_eq!(faults.calls(Op::Write), 4);
        assert_eq!(faults.calls(Op::Read), 1);
    }
}
