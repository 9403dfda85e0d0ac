use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Set of session ids currently being evaluated.
///
/// Poll workers and webhook handlers claim a session id before touching the
/// ledger; a second claim for the same id fails until the guard is dropped.
#[derive(Clone, Default)]
pub struct SessionClaims {
    active: Arc<Mutex<HashSet<String>>>,
}

pub struct ClaimGuard {
    active: Arc<Mutex<HashSet<String>>>,
    session_id: String,
}

impl SessionClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_claim(&self, session_id: &str) -> Option<ClaimGuard> {
        let mut active = self.active.lock().ok()?;
        if !active.insert(session_id.to_string()) {
            return None;
        }
        Some(ClaimGuard {
            active: Arc::clone(&self.active),
            session_id: session_id.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.active.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_fails_until_release() {
        let claims = SessionClaims::new();
        let first = claims.try_claim("s1");
        assert!(first.is_some());
        assert!(claims.try_claim("s1").is_none());
        assert!(claims.try_claim("s2").is_some());

        drop(first);
        assert!(claims.try_claim("s1").is_some());
        assert!(claims.is_empty());
    }
}
