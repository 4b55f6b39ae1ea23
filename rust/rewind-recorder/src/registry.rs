//! Identity registry: which live objects already have a definition record.
//!
//! Identity is decoupled from the host's heap addresses. The first time a
//! trackable object is seen at some address it is bound to a fresh logical
//! [`Token`]; tokens are handed out monotonically and never reused within a
//! session. When the host reports a deallocation the binding is dropped, so
//! an unrelated object that later lands on the same address is bound to a new
//! token and defined again instead of aliasing the dead one.

use crate::host::Address;
use std::collections::HashMap;
use std::fmt;

/// Logical identity of one object for the span of its lifetime in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u64);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub struct IdentityRegistry {
    live: HashMap<Address, Token>,
    next: u64,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        IdentityRegistry {
            live: HashMap::new(),
            next: 1,
        }
    }

    /// Token of the object currently defined at `addr`, if any.
    pub fn lookup(&self, addr: Address) -> Option<Token> {
        self.live.get(&addr).copied()
    }

    pub fn is_defined(&self, addr: Address) -> bool {
        self.live.contains_key(&addr)
    }

    /// Bind `addr` to a new token. A second call before [`forget`](Self::forget)
    /// returns the existing token unchanged.
    pub fn mark_defined(&mut self, addr: Address) -> Token {
        if let Some(token) = self.live.get(&addr) {
            return *token;
        }
        let token = self.allocate();
        self.live.insert(addr, token);
        token
    }

    /// Drop the binding for `addr`, returning the retired token.
    /// Forgetting an unknown address is a no-op.
    pub fn forget(&mut self, addr: Address) -> Option<Token> {
        self.live.remove(&addr)
    }

    /// A token bound to no address. Used for placeholders that must not
    /// shadow the real object's identity.
    pub fn issue_detached(&mut self) -> Token {
        self.allocate()
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Total tokens handed out so far, detached ones included.
    pub fn issued(&self) -> u64 {
        self.next - 1
    }

    fn allocate(&mut self) -> Token {
        let token = Token(self.next);
        self.next += 1;
        token
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
