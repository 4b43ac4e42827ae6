#![forbid(unsafe_code)]

use aegis_ast::Span;

/// Ownership state of one binding instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnershipState {
    Owned,
    /// Moved out; `at` is the span of the consuming use.
    Moved { at: Span },
    BorrowedShared(u32),
    BorrowedExclusive,
}

/// Why an ownership transition was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conflict {
    UseAfterMove { moved_at: Span },
    MoveWhileBorrowed,
    HeldExclusively,
}

impl OwnershipState {
    pub fn is_moved(self) -> bool {
        matches!(self, OwnershipState::Moved { .. })
    }

    pub fn check_read(self) -> Result<(), Conflict> {
        match self {
            OwnershipState::Moved { at } => Err(Conflict::UseAfterMove { moved_at: at }),
            OwnershipState::BorrowedExclusive => Err(Conflict::HeldExclusively),
            OwnershipState::Owned | OwnershipState::BorrowedShared(_) => Ok(()),
        }
    }

    pub fn move_out(self, at: Span) -> Result<OwnershipState, Conflict> {
        self.check_read()?;
        match self {
            OwnershipState::BorrowedShared(n) if n > 0 => Err(Conflict::MoveWhileBorrowed),
            _ => Ok(OwnershipState::Moved { at }),
        }
    }

    pub fn borrow_shared(self) -> Result<OwnershipState, Conflict> {
        self.check_read()?;
        Ok(match self {
            OwnershipState::BorrowedShared(n) => OwnershipState::BorrowedShared(n + 1),
            _ => OwnershipState::BorrowedShared(1),
        })
    }

    pub fn borrow_exclusive(self) -> Result<OwnershipState, Conflict> {
        self.check_read()?;
        match self {
            OwnershipState::BorrowedShared(n) if n > 0 => Err(Conflict::MoveWhileBorrowed),
            _ => Ok(OwnershipState::BorrowedExclusive),
        }
    }

    /// Ends one borrow. Moved stays moved.
    pub fn release(self) -> OwnershipState {
        match self {
            OwnershipState::BorrowedShared(n) if n > 1 => OwnershipState::BorrowedShared(n - 1),
            OwnershipState::BorrowedShared(_) | OwnershipState::BorrowedExclusive => {
                OwnershipState::Owned
            }
            other => other,
        }
    }

    /// State after two control-flow paths meet: moved on either means moved.
    pub fn join(self, other: OwnershipState) -> OwnershipState {
        match (self, other) {
            (m @ OwnershipState::Moved { .. }, _) | (_, m @ OwnershipState::Moved { .. }) => m,
            (a, _) => a,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_ast::span;

    #[test]
    fn move_then_read_conflicts() {
        let at = span(3, 1);
        let moved = OwnershipState::Owned.move_out(at).unwrap();
        assert_eq!(moved.check_read(), Err(Conflict::UseAfterMove { moved_at: at }));
    }

    #[test]
    fn shared_borrows_block_moves_until_released() {
        let s = OwnershipState::Owned.borrow_shared().unwrap().borrow_shared().unwrap();
        assert_eq!(s.move_out(span(0, 1)), Err(Conflict::MoveWhileBorrowed));
        let s = s.release();
        assert_eq!(s, OwnershipState::BorrowedShared(1));
        assert_eq!(s.release(), OwnershipState::Owned);
    }

    #[test]
    fn exclusive_blocks_reads() {
        let s = OwnershipState::Owned.borrow_exclusive().unwrap();
        assert_eq!(s.check_read(), Err(Conflict::HeldExclusively));
        assert_eq!(s.release(), OwnershipState::Owned);
    }

    #[test]
    fn join_prefers_moved() {
        let m = OwnershipState::Moved { at: span(1, 1) };
        assert!(OwnershipState::Owned.join(m).is_moved());
        assert!(m.join(OwnershipState::Owned).is_moved());
        assert_eq!(
            OwnershipState::Owned.join(OwnershipState::Owned),
            OwnershipState::Owned
        );
    }
}
