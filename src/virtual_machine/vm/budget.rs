/// Instruction budget for one call to [`Machine::run`](super::Machine::run).
///
/// Built from the caller's limit: zero allows nothing, a negative limit is
/// unlimited and a positive limit allows that many steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Budget {
    remaining: Option<u64>,
}

impl Budget {
    pub fn new(limit: i64) -> Self {
        Self {
            remaining: u64::try_from(limit).ok(),
        }
    }

    pub const fn unlimited() -> Self {
        Self { remaining: None }
    }

    /// Takes one step from the budget. Returns false once it is exhausted.
    pub fn consume(&mut self) -> bool {
        match &mut self.remaining {
            None => true,
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
        }
    }

    /// Steps left, or `None` when unlimited.
    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }
}
