//! # Order Status State Machine
//!
//! ```text
//!  pending ──pay──► paid ──refund──► refunded
//!     │
//!     └──cancel──► cancelled
//! ```
//!
//! `cancelled` and `refunded` are terminal. Every other move is rejected
//! with [`CoreError::InvalidTransition`] and the status stays unchanged.

use crate::error::{CoreError, CoreResult};
use crate::types::OrderStatus;

impl OrderStatus {
    /// Returns true if `self → next` is a legal transition.
    pub const fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Paid)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Paid, OrderStatus::Refunded)
        )
    }

    /// Validates and returns the next status.
    pub fn transition(self, next: OrderStatus) -> CoreResult<OrderStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// No further transitions are possible.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    #[test]
    fn test_only_three_transitions_are_legal() {
        let legal: Vec<_> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(
            legal,
            vec![
                (OrderStatus::Pending, OrderStatus::Paid),
                (OrderStatus::Pending, OrderStatus::Cancelled),
                (OrderStatus::Paid, OrderStatus::Refunded),
            ]
        );
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for terminal in [OrderStatus::Cancelled, OrderStatus::Refunded] {
            assert!(terminal.is_terminal());
            for next in ALL {
                assert!(terminal.transition(next).is_err());
            }
        }
    }

    #[test]
    fn test_transition_error_carries_states() {
        let err = OrderStatus::Paid.transition(OrderStatus::Cancelled).unwrap_err();
        match err {
            CoreError::InvalidTransition { from, to } => {
                assert_eq!(from, OrderStatus::Paid);
                assert_eq!(to, OrderStatus::Cancelled);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_pay_then_refund() {
        let status = OrderStatus::Pending
            .transition(OrderStatus::Paid)
            .and_then(|s| s.transition(OrderStatus::Refunded))
            .unwrap();
        assert_eq!(status, OrderStatus::Refunded);
    }
}
