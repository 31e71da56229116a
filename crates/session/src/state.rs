use tokio::sync::watch;
use tracing::{debug, warn};

use temposhare_protocol::TransferState;

/// Which side of a share a flow plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    /// Returns `true` if `from → to` is a legal step for this role.
    ///
    /// `FAILED` is reachable from anywhere and leads nowhere.
    pub fn allows(self, from: TransferState, to: TransferState) -> bool {
        use TransferState::*;
        if from == Failed {
            return false;
        }
        if to == Failed {
            return true;
        }
        match self {
            Role::Sender => matches!(
                (from, to),
                (Idle, Initializing)
                    | (Initializing, Waiting)
                    | (Waiting, Transferring)
                    | (Transferring, Waiting)
            ),
            Role::Receiver => matches!(
                (from, to),
                (Idle, Initializing) | (Initializing, Connecting) | (Connecting, Connected)
            ),
        }
    }
}

/// Current [`TransferState`] of one flow, observable through a watch
/// channel.
#[derive(Debug)]
pub struct StateMachine {
    role: Role,
    tx: watch::Sender<TransferState>,
}

impl StateMachine {
    pub fn new(role: Role) -> Self {
        let (tx, _) = watch::channel(TransferState::Idle);
        Self { role, tx }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn current(&self) -> TransferState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransferState> {
        self.tx.subscribe()
    }

    pub fn is_failed(&self) -> bool {
        self.current() == TransferState::Failed
    }

    /// Moves to `next`. Returns `false` when already there or when the step
    /// is not allowed.
    pub fn advance(&self, next: TransferState) -> bool {
        let current = self.current();
        if current == next {
            return false;
        }
        if !self.role.allows(current, next) {
            warn!(role = ?self.role, from = ?current, to = ?next, "ignoring illegal state change");
            return false;
        }
        debug!(role = ?self.role, from = ?current, to = ?next, "state change");
        self.tx.send_replace(next);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temposhare_protocol::TransferState::*;

    #[test]
    fn sender_loop() {
        let sm = StateMachine::new(Role::Sender);
        assert!(sm.advance(Initializing));
        assert!(sm.advance(Waiting));
        assert!(sm.advance(Transferring));
        assert!(!sm.advance(Transferring));
        assert!(sm.advance(Waiting));
        assert!(!sm.advance(Connected));
        assert_eq!(sm.current(), Waiting);
    }

    #[test]
    fn receiver_path() {
        let sm = StateMachine::new(Role::Receiver);
        let rx = sm.subscribe();
        assert!(sm.advance(Initializing));
        assert!(!sm.advance(Connected));
        assert!(sm.advance(Connecting));
        assert!(sm.advance(Connected));
        assert!(!sm.advance(Transferring));
        assert_eq!(*rx.borrow(), Connected);
    }

    #[test]
    fn failed_is_terminal() {
        for role in [Role::Sender, Role::Receiver] {
            let sm = StateMachine::new(role);
            sm.advance(Initializing);
            assert!(sm.advance(Failed));
            assert!(sm.is_failed());
            for next in [Idle, Initializing, Waiting, Connecting, Connected, Transferring] {
                assert!(!sm.advance(next));
            }
            assert_eq!(sm.current(), Failed);
        }
    }

    #[test]
    fn any_state_may_fail() {
        let sm = StateMachine::new(Role::Receiver);
        assert!(sm.advance(Failed));
    }
}
