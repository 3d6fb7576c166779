use crate::reference::Ref;
use crate::utils::{triple, Fingerprint};

/// A decision node: `if x_variable then high else low`.
///
/// Stored nodes always have a regular (non-complemented) `high` edge, the
/// complement bit is pushed to the incoming edge instead.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Node {
    pub variable: u32,
    pub low: Ref,
    pub high: Ref,
}

impl Node {
    /// The single terminal node. Its variable `0` sorts it below every decision variable.
    pub const TERMINAL: Node = Node {
        variable: 0,
        low: Ref::positive(1),
        high: Ref::positive(1),
    };

    pub fn is_terminal(&self) -> bool {
        self.variable == 0
    }
}

impl Fingerprint for Node {
    fn fingerprint(&self) -> u64 {
        triple(
            self.variable as u64,
            self.low.fingerprint(),
            self.high.fingerprint(),
        )
    }
}
