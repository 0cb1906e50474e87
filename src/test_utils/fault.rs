//! Module that contains utility functions for fault injection in test code

#[derive(Debug, Clone)]
pub enum When {
    Always,
    Never,
    /// Fails the first `n` calls, then succeeds
    FirstCalls(usize),
}

/// A fault is an error that is returned based on the [`When`]
#[derive(Clone, Debug)]
pub struct Fault {
    pub when: When,
}

impl Default for Fault {
    fn default() -> Self {
        Self { when: When::Never }
    }
}

impl Fault {
    pub fn new(when: When) -> Self {
        Self { when }
    }

    /// Whether call number `n_call` (1 based) should fail
    pub fn fires(&self, n_call: usize) -> bool {
        match self.when {
            When::Always => true,
            When::Never => false,
            When::FirstCalls(n) => n_call <= n,
        }
    }
}
