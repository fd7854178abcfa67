//! Polls attached to live events.
//!
//! Voter sets never leave this module: every reply and broadcast carries a
//! [`PollView`].

use super::BroadcastCoordinator;
use crate::error::{CoordError, CoordResult};
use crate::state::locks::keys;
use crate::state::new_entity_id;
use huddle_proto::{Notification, Poll, PollOption, PollView, Topic};
use std::collections::BTreeSet;
use tracing::info;

const MAX_OPTIONS: usize = 10;

impl BroadcastCoordinator {
    pub async fn create_poll(
        &self,
        event_id: &str,
        actor: &str,
        question: &str,
        options: &[String],
    ) -> CoordResult<PollView> {
        let event = self.hosted_event(event_id, actor).await?;
        if !event.is_live {
            return Err(CoordError::InvalidState(
                "polls need a live broadcast".into(),
            ));
        }

        let question = question.trim();
        if question.is_empty() {
            return Err(CoordError::InvalidArgument("question is empty".into()));
        }
        let options: Vec<PollOption> = options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .map(|text| PollOption {
                text: text.to_string(),
                votes: 0,
            })
            .collect();
        if options.len() < 2 || options.len() > MAX_OPTIONS {
            return Err(CoordError::InvalidArgument(format!(
                "a poll needs between 2 and {MAX_OPTIONS} options"
            )));
        }

        let poll = Poll {
            id: new_entity_id(),
            event_id: event.id.clone(),
            question: question.to_string(),
            options,
            voters: BTreeSet::new(),
            active: true,
            created_at: self.ctx.now(),
        };
        self.ctx.store.insert_poll(&poll).await?;
        info!(event_id = %event.id, poll = %poll.id, "poll created");

        let view = poll.view();
        self.ctx.notifier.publish(
            &Topic::event_host(&event.id),
            Notification::PollCreated { poll: view.clone() },
        );
        Ok(view)
    }

    /// One vote per identity per poll.
    pub async fn vote(&self, poll_id: &str, actor: &str, option_index: usize) -> CoordResult<PollView> {
        let _guard = self.ctx.locks.lock(keys::poll(poll_id)).await;
        let mut poll = self.load_poll(poll_id).await?;
        if !poll.active {
            return Err(CoordError::InvalidState("poll is closed".into()));
        }
        let Some(option) = poll.options.get_mut(option_index) else {
            return Err(CoordError::InvalidArgument(format!(
                "option {option_index} does not exist"
            )));
        };
        if poll.voters.contains(actor) {
            return Err(CoordError::Conflict("already voted".into()));
        }

        option.votes += 1;
        poll.voters.insert(actor.to_string());
        self.ctx.store.update_poll(&poll).await?;

        let view = poll.view();
        self.ctx.notifier.publish(
            &Topic::event_host(&poll.event_id),
            Notification::PollUpdated { poll: view.clone() },
        );
        Ok(view)
    }

    /// Host removes the poll outright.
    pub async fn close_poll(&self, poll_id: &str, actor: &str) -> CoordResult<()> {
        let _guard = self.ctx.locks.lock(keys::poll(poll_id)).await;
        let poll = self.load_poll(poll_id).await?;
        let event = self.load_event(&poll.event_id).await?;
        if !event.is_host(actor) {
            return Err(CoordError::Forbidden("only the host may close polls".into()));
        }

        self.ctx.store.delete_poll(&poll.id).await?;
        info!(event_id = %event.id, poll = %poll.id, "poll closed");
        self.ctx.notifier.publish(
            &Topic::event_host(&event.id),
            Notification::PollDeleted {
                event_id: event.id.clone(),
                poll_id: poll.id,
            },
        );
        Ok(())
    }

    pub async fn list_polls(&self, event_id: &str) -> CoordResult<Vec<PollView>> {
        self.load_event(event_id).await?;
        Ok(self
            .ctx
            .store
            .list_polls(event_id)
            .await?
            .iter()
            .map(Poll::view)
            .collect())
    }

    async fn load_poll(&self, id: &str) -> CoordResult<Poll> {
        self.ctx
            .store
            .get_poll(id)
            .await?
            .ok_or_else(|| CoordError::not_found("poll", id))
    }
}
