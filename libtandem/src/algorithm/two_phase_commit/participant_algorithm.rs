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

use crate::algorithm::Algorithm;
use crate::booking::Decision;
use crate::error::AlgorithmError;
use crate::process::Process;

use super::CoordinatorMessage;
use super::ParticipantAction;
use super::ParticipantActionNotification;
use super::ParticipantContext;
use super::ParticipantEvent;
use super::ParticipantMessage;
use super::ParticipantState;

/// The participant side of the protocol, voting on requests against its ledger.
///
/// States alternate strictly between `Idle` and `VotedPending`; at most one reservation is
/// ever pending.
pub struct ParticipantAlgorithm<P>
where
    P: Process,
{
    _process_phantom: PhantomData<P>,
}

impl<P> ParticipantAlgorithm<P>
where
    P: Process,
{
    pub fn new() -> Self {
        ParticipantAlgorithm {
            _process_phantom: PhantomData,
        }
    }

    fn dropped(reason: String) -> Vec<ParticipantAction<P>> {
        vec![ParticipantAction::Notify(
            ParticipantActionNotification::MessageDropped(reason),
        )]
    }
}

impl<P> Default for ParticipantAlgorithm<P>
where
    P: Process,
{
    fn default() -> Self {
        ParticipantAlgorithm::new()
    }
}

impl<P> Algorithm<P> for ParticipantAlgorithm<P>
where
    P: Process,
{
    type Event = ParticipantEvent<P>;
    type Action = ParticipantAction<P>;
    type Context = ParticipantContext<P>;

    fn event(
        &self,
        event: Self::Event,
        mut context: Self::Context,
    ) -> Result<Vec<Self::Action>, AlgorithmError> {
        match event {
            // Vote yes only if every requested date still has enough tickets. The request is
            // held as the pending reservation whichever way the vote goes.
            ParticipantEvent::Deliver(process, ParticipantMessage::Request(request)) => {
                if *context.coordinator() != process {
                    return Ok(Self::dropped(
                        "sender process is not the coordinator".into(),
                    ));
                }

                let mut actions = Vec::new();

                if let Some(previous) = context.pending.take() {
                    actions.push(ParticipantAction::Notify(
                        ParticipantActionNotification::PendingReplaced(previous.id()),
                    ));
                }

                let id = request.id();
                let vote = context.ledger.can_reserve(&request);

                context.pending = Some(request);
                context.set_state(ParticipantState::VotedPending { id, vote });
                let coordinator = context.coordinator().clone();
                actions.push(ParticipantAction::Update { context });

                actions.push(ParticipantAction::Notify(
                    ParticipantActionNotification::Voted(id, vote),
                ));
                actions.push(ParticipantAction::SendMessage(
                    coordinator,
                    CoordinatorMessage::Vote(id, vote).into(),
                ));

                Ok(actions)
            }

            ParticipantEvent::Deliver(process, ParticipantMessage::Decision(id, decision)) => {
                if *context.coordinator() != process {
                    return Ok(Self::dropped(
                        "sender process is not the coordinator".into(),
                    ));
                }

                // A decision must match the pending reservation. Anything else, for example a
                // decision for a reservation lost in a crash, is dropped unacknowledged.
                let pending = match context.pending.take() {
                    Some(pending) if pending.id() == id => pending,
                    other => {
                        let reason = match other {
                            Some(pending) => format!(
                                "{} for {} does not match pending reservation {}",
                                decision,
                                id,
                                pending.id()
                            ),
                            None => {
                                format!("{} for {} with no pending reservation", decision, id)
                            }
                        };
                        return Ok(Self::dropped(reason));
                    }
                };

                let mut actions = Vec::new();
                let coordinator = context.coordinator().clone();

                match decision {
                    Decision::Commit => {
                        if let Err(err) = context.ledger.reserve(&pending) {
                            return Ok(Self::dropped(format!(
                                "commit for {} cannot be applied: {}",
                                id, err
                            )));
                        }

                        context.set_state(ParticipantState::Idle);
                        actions.push(ParticipantAction::Update { context });
                        actions.push(ParticipantAction::Notify(
                            ParticipantActionNotification::Commit(id),
                        ));
                    }
                    Decision::Rollback => {
                        context.set_state(ParticipantState::Idle);
                        actions.push(ParticipantAction::Update { context });
                        actions.push(ParticipantAction::Notify(
                            ParticipantActionNotification::Rollback(id),
                        ));
                    }
                }

                actions.push(ParticipantAction::SendMessage(
                    coordinator,
                    CoordinatorMessage::Ack(id).into(),
                ));

                Ok(actions)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::booking::BookingRequest;
    use crate::ledger::Ledger;
    use crate::protocol::Message;

    fn context(entries: Vec<(u32, u32)>) -> ParticipantContext<String> {
        ParticipantContext::new("coordinator".into(), entries.into_iter().collect::<Ledger>())
    }

    fn updated(actions: &[ParticipantAction<String>]) -> ParticipantContext<String> {
        actions
            .iter()
            .rev()
            .find_map(|action| match action {
                ParticipantAction::Update { context } => Some(context.clone()),
                _ => None,
            })
            .expect("no update action")
    }

    fn sent(actions: &[ParticipantAction<String>]) -> Vec<Message> {
        actions
            .iter()
            .filter_map(|action| match action {
                ParticipantAction::SendMessage(to, message) => {
                    assert_eq!(to, "coordinator");
                    Some(message.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn request(
        context: ParticipantContext<String>,
        request: BookingRequest,
    ) -> Vec<ParticipantAction<String>> {
        ParticipantAlgorithm::new()
            .event(
                ParticipantEvent::Deliver(
                    "coordinator".into(),
                    ParticipantMessage::Request(request),
                ),
                context,
            )
            .unwrap()
    }

    fn decide(
        context: ParticipantContext<String>,
        id: u32,
        decision: Decision,
    ) -> Vec<ParticipantAction<String>> {
        ParticipantAlgorithm::new()
            .event(
                ParticipantEvent::Deliver(
                    "coordinator".into(),
                    ParticipantMessage::Decision(id, decision),
                ),
                context,
            )
            .unwrap()
    }

    /// A request that fits the ledger gets a yes vote; the commit deducts the tickets and is
    /// acknowledged.
    #[test]
    fn vote_yes_then_commit() {
        let actions = request(
            context(vec![(1, 5), (2, 5)]),
            BookingRequest::new(1, 2, vec![1, 2]),
        );
        assert_eq!(sent(&actions), vec![Message::Vote { id: 1, vote: true }]);

        let voted = updated(&actions);
        assert_eq!(
            voted.state(),
            &ParticipantState::VotedPending { id: 1, vote: true }
        );
        assert_eq!(voted.pending().map(BookingRequest::id), Some(1));
        assert_eq!(voted.ledger().remaining(1), Some(5));

        let actions = decide(voted, 1, Decision::Commit);
        assert!(actions.iter().any(|action| matches!(
            action,
            ParticipantAction::Notify(ParticipantActionNotification::Commit(1))
        )));
        assert_eq!(sent(&actions), vec![Message::Ack(1)]);

        let committed = updated(&actions);
        assert_eq!(committed.state(), &ParticipantState::Idle);
        assert!(committed.pending().is_none());
        assert_eq!(committed.ledger().remaining(1), Some(3));
        assert_eq!(committed.ledger().remaining(2), Some(3));
    }

    /// A request exceeding any date gets a no vote; the rollback leaves the ledger untouched.
    #[test]
    fn vote_no_then_rollback() {
        let actions = request(
            context(vec![(1, 1), (2, 5)]),
            BookingRequest::new(1, 2, vec![1, 2]),
        );
        assert_eq!(sent(&actions), vec![Message::Vote { id: 1, vote: false }]);

        let voted = updated(&actions);
        assert!(voted.pending().is_some());

        let actions = decide(voted, 1, Decision::Rollback);
        assert_eq!(sent(&actions), vec![Message::Ack(1)]);

        let rolled_back = updated(&actions);
        assert!(rolled_back.pending().is_none());
        assert_eq!(rolled_back.ledger().remaining(1), Some(1));
        assert_eq!(rolled_back.ledger().remaining(2), Some(5));
    }

    /// A second request replaces the first pending reservation; only one is ever held.
    #[test]
    fn single_pending_reservation() {
        let actions = request(context(vec![(1, 5)]), BookingRequest::new(1, 1, vec![1]));
        let actions = request(updated(&actions), BookingRequest::new(2, 1, vec![1]));

        assert!(actions.iter().any(|action| matches!(
            action,
            ParticipantAction::Notify(ParticipantActionNotification::PendingReplaced(1))
        )));
        assert_eq!(updated(&actions).pending().map(BookingRequest::id), Some(2));
    }

    /// Decisions that do not match the pending reservation are dropped without an ack.
    #[test]
    fn unmatched_decision_dropped() {
        let actions = decide(context(vec![(1, 5)]), 1, Decision::Commit);
        assert!(sent(&actions).is_empty());
        assert!(matches!(
            actions[..],
            [ParticipantAction::Notify(
                ParticipantActionNotification::MessageDropped(_)
            )]
        ));

        let voted = updated(&request(
            context(vec![(1, 5)]),
            BookingRequest::new(1, 1, vec![1]),
        ));
        let actions = decide(voted, 2, Decision::Commit);
        assert!(sent(&actions).is_empty());
    }

    #[test]
    fn request_from_unknown_sender_dropped() {
        let actions = ParticipantAlgorithm::new()
            .event(
                ParticipantEvent::Deliver(
                    "intruder".into(),
                    ParticipantMessage::Request(BookingRequest::new(1, 1, vec![1])),
                ),
                context(vec![(1, 5)]),
            )
            .unwrap();
        assert!(matches!(
            actions[..],
            [ParticipantAction::Notify(
                ParticipantActionNotification::MessageDropped(_)
            )]
        ));
    }
}
