//! Waiting for a remote entity to leave a known state.

use crate::Result;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use triton_core::error::ConsistencyFailure;
use triton_core::Error;

/// An entity with an id and an observable state.
pub trait Stateful {
    /// Identifier type.
    type Id: PartialEq + fmt::Display;

    /// Identifier of this entity.
    fn entity_id(&self) -> &Self::Id;

    /// Current state, e.g. `provisioning` or `running`.
    fn state(&self) -> &str;
}

/// Parameters of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    /// State the entity is expected to leave
    pub initial_state: String,
    /// Give up once this much time has been spent sleeping
    pub max_wait: Duration,
    /// Sleep between fetches; zero polls without pausing
    pub interval: Duration,
}

impl PollSettings {
    /// Create poll settings.
    pub fn new(initial_state: impl Into<String>, max_wait: Duration, interval: Duration) -> Self {
        Self {
            initial_state: initial_state.into(),
            max_wait,
            interval,
        }
    }
}

/// How a poll ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<E> {
    /// The entity did not exist when the poll started
    Absent,
    /// The entity left the initial state
    Changed(E),
    /// The wait budget ran out; holds the last fetched entity
    TimedOut(E),
    /// The wait was interrupted
    Interrupted,
}

impl<E> PollOutcome<E> {
    /// Last observed entity, if any.
    pub fn into_entity(self) -> Option<E> {
        match self {
            Self::Changed(entity) | Self::TimedOut(entity) => Some(entity),
            Self::Absent | Self::Interrupted => None,
        }
    }

    /// Returns true if the entity left the initial state.
    pub const fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }
}

/// Re-fetch an entity until its state differs from `settings.initial_state`.
///
/// The first fetch happens immediately. If the entity is absent the poll
/// returns [`PollOutcome::Absent`]; if it is already in another state it is
/// returned without sleeping. Afterwards the poll sleeps `interval`, adds it
/// to the time waited and fetches again. The time check happens after the
/// fetch, so the total wait can exceed `max_wait` by up to one interval. A
/// zero interval never accumulates waiting time and so never times out.
///
/// # Errors
///
/// Returns a `Consistency` error if the entity disappears after having been
/// found or if the backend returns an entity with a different id, and
/// propagates any fetch failure.
pub async fn poll_for_state_change<E, F, Fut>(
    id: &E::Id,
    settings: &PollSettings,
    interrupt: &CancellationToken,
    mut fetch: F,
) -> Result<PollOutcome<E>>
where
    E: Stateful,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<E>>>,
{
    let Some(mut entity) = fetch().await? else {
        debug!(%id, "Entity not found, nothing to wait for");
        return Ok(PollOutcome::Absent);
    };
    check_id(id, &entity)?;

    if entity.state() != settings.initial_state {
        debug!(%id, state = entity.state(), "Entity already changed state");
        return Ok(PollOutcome::Changed(entity));
    }

    let mut waited = Duration::ZERO;

    loop {
        if settings.interval.is_zero() {
            if interrupt.is_cancelled() {
                return Ok(PollOutcome::Interrupted);
            }
        } else {
            tokio::select! {
                () = interrupt.cancelled() => {
                    debug!(%id, ?waited, "State change wait interrupted");
                    return Ok(PollOutcome::Interrupted);
                }
                () = sleep(settings.interval) => {}
            }
            waited += settings.interval;
        }

        let Some(next) = fetch().await? else {
            return Err(Error::consistency(
                ConsistencyFailure::EntityGone,
                format!(
                    "Entity {id} disappeared while waiting for it to leave state `{}`",
                    settings.initial_state
                ),
            )
            .with_context("expectedId", id));
        };
        check_id(id, &next)?;
        entity = next;

        if entity.state() != settings.initial_state {
            debug!(%id, state = entity.state(), ?waited, "Entity changed state");
            return Ok(PollOutcome::Changed(entity));
        }

        if waited > settings.max_wait {
            debug!(%id, ?waited, "Gave up waiting for state change");
            return Ok(PollOutcome::TimedOut(entity));
        }

        debug!(%id, state = entity.state(), ?waited, "Entity still in initial state");
    }
}

fn check_id<E: Stateful>(expected: &E::Id, entity: &E) -> Result<()> {
    if entity.entity_id() == expected {
        return Ok(());
    }

    Err(Error::consistency(
        ConsistencyFailure::IdMismatch,
        format!(
            "Expected entity {expected} but the server returned {}",
            entity.entity_id()
        ),
    )
    .with_context("expectedId", expected)
    .with_context("actualId", entity.entity_id()))
}
