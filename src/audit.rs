// History audit: replays a shipment's status events through the stage
// machine and checks the result against the stored current_status.

use serde::{Deserialize, Serialize};
use statig::prelude::*;
use thiserror::Error;

use crate::domain::{OrganizationId, ShipmentId, ShipmentSnapshot, Stage, StatusEvent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum AuditViolation {
    #[error("event {event_id} moves {from:?} to {to}, which is not the next stage")]
    IllegalStep {
        event_id: i64,
        from: Option<Stage>,
        to: Stage,
    },
    #[error("event {event_id} belongs to organization {organization_id}")]
    ForeignEvent {
        event_id: i64,
        organization_id: OrganizationId,
    },
    #[error("history reaches {replayed:?} but current status is {recorded:?}")]
    StatusMismatch {
        recorded: Option<Stage>,
        replayed: Option<Stage>,
    },
}

/// Replay context. The machine only moves forward one stage at a time; any
/// other event is recorded as the first illegal step and left unapplied.
#[derive(Debug, Default)]
pub struct HistoryReplay {
    reached: Option<Stage>,
    illegal: Option<(i64, Stage)>,
}

impl HistoryReplay {
    fn advance(&mut self, stage: Stage) {
        self.reached = Some(stage);
    }

    fn refuse(&mut self, event: &StatusEvent) {
        if self.illegal.is_none() {
            self.illegal = Some((event.id, event.status));
        }
    }

    pub fn reached(&self) -> Option<Stage> {
        self.reached
    }
}

#[state_machine(initial = "State::unshipped()")]
impl HistoryReplay {
    #[state]
    fn unshipped(&mut self, event: &StatusEvent) -> Outcome<State> {
        match event.status {
            Stage::SentFromFactory => {
                self.advance(Stage::SentFromFactory);
                Transition(State::sent_from_factory())
            }
            _ => {
                self.refuse(event);
                Handled
            }
        }
    }

    #[state]
    fn sent_from_factory(&mut self, event: &StatusEvent) -> Outcome<State> {
        match event.status {
            Stage::ShippedFromFf => {
                self.advance(Stage::ShippedFromFf);
                Transition(State::shipped_from_ff())
            }
            _ => {
                self.refuse(event);
                Handled
            }
        }
    }

    #[state]
    fn shipped_from_ff(&mut self, event: &StatusEvent) -> Outcome<State> {
        match event.status {
            Stage::Delivered => {
                self.advance(Stage::Delivered);
                Transition(State::delivered())
            }
            _ => {
                self.refuse(event);
                Handled
            }
        }
    }

    #[state]
    fn delivered(&mut self, event: &StatusEvent) -> Outcome<State> {
        self.refuse(event);
        Handled
    }
}

/// Replay `events` in commit order and return the stage they reach.
pub fn replay(events: &[StatusEvent]) -> Result<Option<Stage>, AuditViolation> {
    let mut ordered: Vec<&StatusEvent> = events.iter().collect();
    ordered.sort_by(|a, b| a.changed_at.cmp(&b.changed_at).then(a.id.cmp(&b.id)));

    let mut sm = HistoryReplay::default().state_machine();
    for event in ordered {
        let from = sm.inner().reached();
        sm.handle(event);
        if let Some((event_id, to)) = sm.inner().illegal {
            return Err(AuditViolation::IllegalStep { event_id, from, to });
        }
    }
    Ok(sm.inner().reached())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub shipment_id: ShipmentId,
    pub current_status: Option<Stage>,
    pub replayed_status: Option<Stage>,
    pub event_count: usize,
    pub violations: Vec<AuditViolation>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check a snapshot's history: every event belongs to `organization_id`,
/// the stages advance one at a time, and they end at `current_status`.
pub fn verify(snapshot: &ShipmentSnapshot, organization_id: OrganizationId) -> AuditReport {
    let mut violations: Vec<AuditViolation> = snapshot
        .events
        .iter()
        .filter(|e| e.organization_id != organization_id)
        .map(|e| AuditViolation::ForeignEvent {
            event_id: e.id,
            organization_id: e.organization_id,
        })
        .collect();

    let recorded = snapshot.current_status();
    let replayed = match replay(&snapshot.events) {
        Ok(reached) => {
            if reached != recorded {
                violations.push(AuditViolation::StatusMismatch { recorded, replayed: reached });
            }
            reached
        }
        Err(violation) => {
            violations.push(violation);
            None
        }
    };

    AuditReport {
        shipment_id: snapshot.shipment.id.clone(),
        current_status: recorded,
        replayed_status: replayed,
        event_count: snapshot.events.len(),
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;
    use chrono::{Duration, TimeZone, Utc};

    fn event(id: i64, status: Stage) -> StatusEvent {
        StatusEvent {
            id,
            shipment_id: ShipmentId::parse("S1").unwrap(),
            organization_id: OrganizationId(1),
            status,
            changed_by: UserId(1),
            changed_at: Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(id),
            notes: None,
        }
    }

    #[test]
    fn test_full_history_reaches_delivered() {
        let events = vec![
            event(3, Stage::Delivered),
            event(2, Stage::ShippedFromFf),
            event(1, Stage::SentFromFactory),
        ];
        assert_eq!(replay(&events), Ok(Some(Stage::Delivered)));
    }

    #[test]
    fn test_empty_history_is_unshipped() {
        assert_eq!(replay(&[]), Ok(None));
    }

    #[test]
    fn test_skipped_stage_is_reported() {
        let events = vec![event(1, Stage::SentFromFactory), event(2, Stage::Delivered)];
        assert_eq!(
            replay(&events),
            Err(AuditViolation::IllegalStep {
                event_id: 2,
                from: Some(Stage::SentFromFactory),
                to: Stage::Delivered,
            })
        );
    }

    #[test]
    fn test_repeated_stage_is_reported() {
        let events = vec![event(1, Stage::SentFromFactory), event(2, Stage::SentFromFactory)];
        assert!(matches!(
            replay(&events),
            Err(AuditViolation::IllegalStep { event_id: 2, .. })
        ));
    }

    #[test]
    fn test_event_after_delivery_is_reported() {
        let events = vec![
            event(1, Stage::SentFromFactory),
            event(2, Stage::ShippedFromFf),
            event(3, Stage::Delivered),
            event(4, Stage::Delivered),
        ];
        assert!(matches!(
            replay(&events),
            Err(AuditViolation::IllegalStep { event_id: 4, from: Some(Stage::Delivered), .. })
        ));
    }
}
