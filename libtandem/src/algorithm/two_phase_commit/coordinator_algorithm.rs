// Copyright 2021 Cargill Incorporated
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::marker::PhantomData;
use std::time::Duration;

use crate::algorithm::Algorithm;
use crate::booking::Decision;
use crate::error::{AlgorithmError, InvalidStateError};
use crate::process::Process;
use crate::time::TimeSource;

use super::CoordinatorAction;
use super::CoordinatorActionNotification;
use super::CoordinatorContext;
use super::CoordinatorEvent;
use super::CoordinatorMessage;
use super::CoordinatorState;
use super::ParticipantMessage;

/// How long the coordinator waits for a full set of votes or acks.
pub const DEFAULT_RESPONSE_TIMEOUT_SECONDS: u64 = 10;

pub struct CoordinatorAlgorithm<P, TS>
where
    P: Process,
    TS: TimeSource,
{
    _process_phantom: PhantomData<P>,
    time_source: TS,
    response_timeout: Duration,
}

impl<P, TS> CoordinatorAlgorithm<P, TS>
where
    P: Process,
    TS: TimeSource,
{
    pub fn new(time_source: TS) -> Self {
        CoordinatorAlgorithm {
            _process_phantom: PhantomData,
            time_source,
            response_timeout: Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT_SECONDS),
        }
    }

    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    fn timed_out(&self, start: TS::Time) -> bool {
        self.time_source.now() >= start + self.response_timeout
    }

    // Create actions for a decision. The decision is recorded and announced before any message
    // carrying it is sent; the caller must run the actions in order.
    fn push_decision_actions(
        &self,
        mut context: CoordinatorContext<P, TS::Time>,
        decision: Decision,
        actions: &mut Vec<CoordinatorAction<P, TS::Time>>,
    ) -> Result<(), AlgorithmError> {
        let id = context.txn_id().ok_or_else(|| {
            InvalidStateError::with_message("decision without a request in flight".into())
        })?;

        context.set_state(CoordinatorState::Deciding { decision });
        actions.push(CoordinatorAction::Update {
            context: context.clone(),
            alarm: None,
        });
        actions.push(CoordinatorAction::Notify(
            CoordinatorActionNotification::Decided(id, decision),
        ));

        for participant in context.participants() {
            actions.push(CoordinatorAction::SendMessage(
                participant.process.clone(),
                ParticipantMessage::Decision(id, decision).into(),
            ));
        }

        let ack_timeout_start = self.time_source.now();
        context.set_state(CoordinatorState::AwaitingAcks {
            decision,
            ack_timeout_start,
        });
        actions.push(CoordinatorAction::Update {
            context,
            alarm: Some(ack_timeout_start + self.response_timeout),
        });

        Ok(())
    }

    // Create actions for ending a transaction without a decision.
    fn push_abort_actions(
        &self,
        mut context: CoordinatorContext<P, TS::Time>,
        reason: String,
        actions: &mut Vec<CoordinatorAction<P, TS::Time>>,
    ) {
        context.set_state(CoordinatorState::Aborted);
        actions.push(CoordinatorAction::Update {
            context: context.clone(),
            alarm: None,
        });

        if let Some(id) = context.txn_id() {
            actions.push(CoordinatorAction::Notify(
                CoordinatorActionNotification::Aborted(id, reason),
            ));
        }

        self.push_advance_actions(context, actions);
    }

    // Create actions for returning to Idle, ready for the next request.
    fn push_advance_actions(
        &self,
        mut context: CoordinatorContext<P, TS::Time>,
        actions: &mut Vec<CoordinatorAction<P, TS::Time>>,
    ) {
        context.request = None;
        context.reset_participants();
        context.set_state(CoordinatorState::Idle);
        actions.push(CoordinatorAction::Update {
            context,
            alarm: None,
        });

        actions.push(CoordinatorAction::Notify(
            CoordinatorActionNotification::RequestForStart(),
        ));
    }

    // Create actions for the end of the acknowledgment phase, whether every ack arrived or not.
    fn push_completed_actions(
        &self,
        mut context: CoordinatorContext<P, TS::Time>,
        decision: Decision,
        acknowledged: bool,
        actions: &mut Vec<CoordinatorAction<P, TS::Time>>,
    ) {
        context.set_state(CoordinatorState::Done {
            outcome: decision.outcome(),
        });
        actions.push(CoordinatorAction::Update {
            context: context.clone(),
            alarm: None,
        });

        if let Some(id) = context.txn_id() {
            actions.push(CoordinatorAction::Notify(
                CoordinatorActionNotification::Completed { id, acknowledged },
            ));
        }

        self.push_advance_actions(context, actions);
    }

    fn dropped(reason: String) -> Vec<CoordinatorAction<P, TS::Time>> {
        vec![CoordinatorAction::Notify(
            CoordinatorActionNotification::MessageDropped(reason),
        )]
    }
}

impl<P, TS> Algorithm<P> for CoordinatorAlgorithm<P, TS>
where
    P: Process,
    TS: TimeSource,
{
    type Event = CoordinatorEvent<P>;
    type Action = CoordinatorAction<P, TS::Time>;
    type Context = CoordinatorContext<P, TS::Time>;

    fn event(
        &self,
        event: Self::Event,
        mut context: Self::Context,
    ) -> Result<Vec<Self::Action>, AlgorithmError> {
        match event {
            // In response to a RequestForStart notification, a Start event provides the next
            // request. It is sent identically to every participant.
            CoordinatorEvent::Start(request) => {
                if !context.is_idle() {
                    return Err(AlgorithmError::InvalidState(
                        InvalidStateError::with_message(format!(
                            "Start event for request {} while a transaction is in flight",
                            request.id()
                        )),
                    ));
                }

                let mut actions = Vec::new();

                for participant in context.participants() {
                    actions.push(CoordinatorAction::SendMessage(
                        participant.process.clone(),
                        ParticipantMessage::Request(request.clone()).into(),
                    ));
                }

                let vote_timeout_start = self.time_source.now();
                context.reset_participants();
                context.request = Some(request);
                context.set_state(CoordinatorState::AwaitingVotes { vote_timeout_start });
                actions.push(CoordinatorAction::Update {
                    context,
                    alarm: Some(vote_timeout_start + self.response_timeout),
                });

                Ok(actions)
            }

            CoordinatorEvent::Alarm() => match context.state().clone() {
                CoordinatorState::AwaitingVotes { vote_timeout_start } => {
                    let mut actions = Vec::new();

                    // An early alarm is ignored; the caller will raise it again later.
                    if !self.timed_out(vote_timeout_start) {
                        return Ok(actions);
                    }

                    // Some participant answered, so it may hold a pending reservation which
                    // must be released. With no answers at all there is nothing to release.
                    if context.votes().any(|vote| vote.is_some()) {
                        self.push_decision_actions(context, Decision::Rollback, &mut actions)?;
                    } else {
                        self.push_abort_actions(
                            context,
                            "vote response timeout".into(),
                            &mut actions,
                        );
                    }

                    Ok(actions)
                }

                CoordinatorState::AwaitingAcks {
                    decision,
                    ack_timeout_start,
                } => {
                    let mut actions = Vec::new();

                    if self.timed_out(ack_timeout_start) {
                        self.push_completed_actions(context, decision, false, &mut actions);
                    }

                    Ok(actions)
                }

                // Re-generate the RequestForStart notification.
                CoordinatorState::Idle => Ok(vec![CoordinatorAction::Notify(
                    CoordinatorActionNotification::RequestForStart(),
                )]),

                // Receiving alarms in the transient states is unexpected, but try and recover by
                // returning to Idle.
                CoordinatorState::Deciding { .. }
                | CoordinatorState::Done { .. }
                | CoordinatorState::Aborted => {
                    let mut actions = Vec::new();
                    self.push_advance_actions(context, &mut actions);
                    Ok(actions)
                }
            },

            CoordinatorEvent::Deliver(process, CoordinatorMessage::Vote(id, vote)) => {
                let vote_timeout_start = match context.state() {
                    CoordinatorState::AwaitingVotes { vote_timeout_start } => *vote_timeout_start,
                    _ => {
                        return Ok(Self::dropped(format!(
                            "vote for {} received outside the voting window",
                            id
                        )))
                    }
                };

                let expected = context.txn_id().ok_or_else(|| {
                    InvalidStateError::with_message("AwaitingVotes state without a request".into())
                })?;

                let already_voted = match context
                    .participants()
                    .iter()
                    .find(|participant| participant.process == process)
                {
                    Some(participant) => participant.vote.is_some(),
                    None => {
                        return Ok(Self::dropped(
                            "sender process is not a participant".into(),
                        ))
                    }
                };

                // Ignore if this participant already voted. This should not occur in normal
                // operation.
                if already_voted {
                    return Ok(Self::dropped(format!(
                        "{:?} has already voted on {}",
                        process, expected
                    )));
                }

                let mut actions = Vec::new();

                // A response for a different transaction means the exchange can no longer be
                // trusted; fail the transaction without sending a decision.
                if id != expected {
                    self.push_abort_actions(
                        context,
                        format!("expected id {}, received {}", expected, id),
                        &mut actions,
                    );
                    return Ok(actions);
                }

                if let Some(participant) = context.participant_mut(&process) {
                    participant.vote = Some(vote);
                }

                if context.votes().all(|vote| vote.is_some()) {
                    let decision = Decision::from_votes(context.votes());
                    self.push_decision_actions(context, decision, &mut actions)?;
                } else {
                    // Keep waiting; the vote deadline is unchanged.
                    actions.push(CoordinatorAction::Update {
                        context,
                        alarm: Some(vote_timeout_start + self.response_timeout),
                    });
                }

                Ok(actions)
            }

            CoordinatorEvent::Deliver(process, CoordinatorMessage::Ack(id)) => {
                let (decision, ack_timeout_start) = match context.state() {
                    CoordinatorState::AwaitingAcks {
                        decision,
                        ack_timeout_start,
                    } => (*decision, *ack_timeout_start),
                    _ => {
                        return Ok(Self::dropped(format!(
                            "ack for {} received outside the acknowledgment window",
                            id
                        )))
                    }
                };

                // A late ack from an earlier transaction is harmless and ignored.
                if context.txn_id() != Some(id) {
                    return Ok(Self::dropped(format!(
                        "ack for {} does not match the current transaction",
                        id
                    )));
                }

                let participant = match context.participant_mut(&process) {
                    Some(participant) => participant,
                    None => {
                        return Ok(Self::dropped(
                            "sender process is not a participant".into(),
                        ))
                    }
                };

                if participant.decision_ack {
                    return Ok(Self::dropped(format!(
                        "{:?} has already acknowledged {}",
                        process, id
                    )));
                }

                participant.decision_ack = true;

                let mut actions = Vec::new();
                if context.participants().iter().all(|p| p.decision_ack) {
                    self.push_completed_actions(context, decision, true, &mut actions);
                } else {
                    actions.push(CoordinatorAction::Update {
                        context,
                        alarm: Some(ack_timeout_start + self.response_timeout),
                    });
                }

                Ok(actions)
            }
        }
    }
}
