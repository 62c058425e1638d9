// Transition policy: who may advance a shipment, and to where.
//
// Pure decision table, no I/O. The three-stage chain applies to every
// route type; DIRECT shipments still pass through SHIPPED_FROM_FF.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{Role, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The requested action is not the single legal next action.
    WrongAction,
    /// The shipment is already delivered.
    TerminalState,
    /// The action is legal but the actor's role may not perform it.
    RoleNotPermitted,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::WrongAction => "wrong_action",
            RejectReason::TerminalState => "terminal_state",
            RejectReason::RoleNotPermitted => "role_not_permitted",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept(Stage),
    Reject(RejectReason),
}

/// Roles permitted to move a shipment into `target`.
pub fn permitted_roles(target: Stage) -> &'static [Role] {
    match target {
        Stage::SentFromFactory => &[Role::Supplier, Role::Admin],
        Stage::ShippedFromFf => &[Role::Ff, Role::Admin],
        Stage::Delivered => &[Role::Driver, Role::Warehouse, Role::Admin],
    }
}

/// Decide whether `role` may apply `requested` to a shipment at `current`.
///
/// Checks run in a fixed order: terminal state, then action legality, then
/// role. A delivered shipment is always `TerminalState`, whoever asks.
pub fn decide(current: Option<Stage>, requested: Stage, role: Role) -> Decision {
    let Some(next) = Stage::next(current) else {
        return Decision::Reject(RejectReason::TerminalState);
    };
    if requested != next {
        return Decision::Reject(RejectReason::WrongAction);
    }
    if !permitted_roles(next).contains(&role) {
        return Decision::Reject(RejectReason::RoleNotPermitted);
    }
    Decision::Accept(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATES: [Option<Stage>; 4] = [
        None,
        Some(Stage::SentFromFactory),
        Some(Stage::ShippedFromFf),
        Some(Stage::Delivered),
    ];

    #[test]
    fn test_transition_table() {
        assert_eq!(
            decide(None, Stage::SentFromFactory, Role::Supplier),
            Decision::Accept(Stage::SentFromFactory)
        );
        assert_eq!(
            decide(Some(Stage::SentFromFactory), Stage::ShippedFromFf, Role::Ff),
            Decision::Accept(Stage::ShippedFromFf)
        );
        assert_eq!(
            decide(Some(Stage::ShippedFromFf), Stage::Delivered, Role::Driver),
            Decision::Accept(Stage::Delivered)
        );
        assert_eq!(
            decide(Some(Stage::ShippedFromFf), Stage::Delivered, Role::Warehouse),
            Decision::Accept(Stage::Delivered)
        );
    }

    #[test]
    fn test_admin_can_perform_every_forward_step() {
        let mut current = None;
        while let Some(next) = Stage::next(current) {
            assert_eq!(decide(current, next, Role::Admin), Decision::Accept(next));
            current = Some(next);
        }
        assert_eq!(current, Some(Stage::Delivered));
    }

    #[test]
    fn test_delivered_is_terminal_for_everyone() {
        for role in Role::ALL {
            for requested in Stage::ALL {
                assert_eq!(
                    decide(Some(Stage::Delivered), requested, role),
                    Decision::Reject(RejectReason::TerminalState)
                );
            }
        }
    }

    #[test]
    fn test_backward_repeat_and_skip_are_wrong_action() {
        assert_eq!(
            decide(Some(Stage::SentFromFactory), Stage::SentFromFactory, Role::Admin),
            Decision::Reject(RejectReason::WrongAction)
        );
        assert_eq!(
            decide(None, Stage::Delivered, Role::Admin),
            Decision::Reject(RejectReason::WrongAction)
        );
        assert_eq!(
            decide(Some(Stage::ShippedFromFf), Stage::SentFromFactory, Role::Admin),
            Decision::Reject(RejectReason::WrongAction)
        );
    }

    #[test]
    fn test_wrong_action_reported_before_role() {
        // A driver asking to re-send from the factory gets WrongAction, not RoleNotPermitted.
        assert_eq!(
            decide(Some(Stage::SentFromFactory), Stage::SentFromFactory, Role::Driver),
            Decision::Reject(RejectReason::WrongAction)
        );
    }

    #[test]
    fn test_accept_iff_role_in_permitted_set() {
        for current in STATES {
            for role in Role::ALL {
                for requested in Stage::ALL {
                    let decision = decide(current, requested, role);
                    let legal = Stage::next(current) == Some(requested);
                    let expected_accept = legal && permitted_roles(requested).contains(&role);
                    assert_eq!(
                        matches!(decision, Decision::Accept(_)),
                        expected_accept,
                        "current={current:?} requested={requested:?} role={role:?}"
                    );
                    if let Decision::Accept(stage) = decision {
                        assert_eq!(stage, requested);
                        assert!(current.map_or(true, |c| stage > c));
                    }
                }
            }
        }
    }

    #[test]
    fn test_owner_cannot_advance_anything() {
        for current in STATES {
            if let Some(next) = Stage::next(current) {
                assert_eq!(
                    decide(current, next, Role::Owner),
                    Decision::Reject(RejectReason::RoleNotPermitted)
                );
            }
        }
    }
}
