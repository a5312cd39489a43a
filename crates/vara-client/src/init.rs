use std::sync::atomic::{AtomicBool, Ordering};

/// One-shot initialisation guard owned by the core.
///
/// `claim()` returns true exactly once; repeated start-up calls become no-ops.
#[derive(Debug, Default)]
pub struct InitToken {
    claimed: AtomicBool,
}

impl InitToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

/// The start-up stages that must run at most once per process.
#[derive(Debug, Default)]
pub struct InitTokens {
    pub auth: InitToken,
    pub data: InitToken,
    pub watcher: InitToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_succeeds_once() {
        let token = InitToken::new();
        assert!(!token.is_claimed());
        assert!(token.claim());
        assert!(!token.claim());
        assert!(token.is_claimed());
    }
}
