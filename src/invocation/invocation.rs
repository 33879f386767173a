//! Invocation State Machine
//!
//! Drives one logical operation through as many attempts as its policy allows
//! and reports exactly one outcome.
//!
//! ## Attempt
//! Each attempt resolves the target afresh, registers a new call id, hands the
//! operation to the dispatcher and then waits on the invocation's event
//! channel for the primary response, backup acks or the departure of the
//! target member.
//!
//! ## Failure handling
//! Every failure is classified with [`classify`]. Retries pause for the fixed
//! `try_pause` (never longer than what is left of the call deadline), except
//! for local retries which go again immediately. The deadline is measured from
//! the first attempt and is extended by the operation's wait budget, so a
//! `try_lock` with a ten second timeout is not cut short by a shorter call
//! timeout. Operations that may wait forever have no deadline at all.

use super::backup::BackupAckTracker;
use super::registry::{InvocationRegistry, Registration};
use super::types::{
    CallId, InvocationEvent, InvocationPolicy, InvocationTarget, Operation, OperationResult,
    WaitBudget, millis_of,
};
use crate::cluster::partition::PartitionTable;
use crate::cluster::types::PartitionReplica;
use crate::dispatch::dispatcher::OperationDispatcher;
use crate::error::{GridError, GridResult};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// What to do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionAction {
    ThrowException,
    /// Retry after the configured pause.
    RetryInvocation,
    /// Retry immediately; the operation never left this node.
    RetryLocal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Partition,
    Member,
}

impl InvocationTarget {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Partition { .. } => TargetKind::Partition,
            Self::Member(_) => TargetKind::Member,
        }
    }
}

/// Maps a failure to the action the invocation takes next.
///
/// Read-only operations never report an indeterminate state, so for them
/// `fail_on_indeterminate` is ignored.
pub fn classify(
    error: &GridError,
    target: TargetKind,
    read_only: bool,
    fail_on_indeterminate: bool,
) -> ExceptionAction {
    let fail_on_indeterminate = fail_on_indeterminate && !read_only;

    match (error, target) {
        // A member-targeted call has nowhere else to go.
        (GridError::MemberLeft { .. }, TargetKind::Member) => ExceptionAction::ThrowException,
        (GridError::TargetNotFound { .. }, TargetKind::Member) => ExceptionAction::ThrowException,

        (GridError::MemberLeft { .. }, TargetKind::Partition) if fail_on_indeterminate => {
            ExceptionAction::ThrowException
        }
        (GridError::MemberLeft { .. }, TargetKind::Partition) => ExceptionAction::RetryInvocation,
        (GridError::TargetNotFound { .. }, TargetKind::Partition) => {
            ExceptionAction::RetryInvocation
        }
        (GridError::WrongTarget { .. }, _) => ExceptionAction::RetryInvocation,
        (GridError::TargetDisconnected { .. }, _) => ExceptionAction::RetryLocal,
        _ => ExceptionAction::ThrowException,
    }
}

/// Latest instant at which the caller may still be waiting for an outcome.
pub fn call_deadline(start: Instant, call_timeout: Duration, wait: WaitBudget) -> Option<Instant> {
    let deadline = start.checked_add(call_timeout)?;
    match wait {
        WaitBudget::NoWait => Some(deadline),
        WaitBudget::Bounded { millis } => deadline.checked_add(Duration::from_millis(millis)),
        WaitBudget::Unbounded => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Created,
    Pending,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl InvocationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Collaborators an invocation needs, owned by the node and shared by all of
/// its invocations.
#[derive(Clone)]
pub struct InvocationContext {
    pub registry: Arc<InvocationRegistry>,
    pub dispatcher: Arc<OperationDispatcher>,
    pub partitions: Arc<dyn PartitionTable>,
}

pub struct Invocation {
    context: InvocationContext,
    op: Operation,
    target: InvocationTarget,
    policy: InvocationPolicy,
    /// The policy flag, already masked for read-only operations.
    fail_on_indeterminate: bool,
    state: watch::Sender<InvocationState>,
    attempts: u32,
    started: Instant,
    deadline: Option<Instant>,
    last_call_id: CallId,
}

impl Invocation {
    pub fn new(
        context: InvocationContext,
        op: Operation,
        target: InvocationTarget,
        policy: InvocationPolicy,
    ) -> Self {
        let started = Instant::now();
        let deadline = call_deadline(started, policy.call_timeout, op.body.wait_budget());
        let fail_on_indeterminate = policy.fail_on_indeterminate_operation_state && !op.read_only;
        let (state, _) = watch::channel(InvocationState::Created);

        Self {
            context,
            op,
            target,
            policy,
            fail_on_indeterminate,
            state,
            attempts: 0,
            started,
            deadline,
            last_call_id: 0,
        }
    }

    /// Starts the invocation on the runtime and returns its future right away.
    pub fn invoke(self) -> InvocationFuture {
        let state = self.state.subscribe();
        InvocationFuture {
            handle: tokio::spawn(self.run()),
            state,
        }
    }

    pub fn state(&self) -> InvocationState {
        *self.state.borrow()
    }

    /// Runs attempts until one completes or the invocation gives up.
    pub async fn run(mut self) -> GridResult<OperationResult> {
        loop {
            self.attempts += 1;
            self.set_state(InvocationState::Pending);

            let error = match self.attempt().await {
                Ok(result) => {
                    let result = self.finish(result);
                    let state = if result.is_ok() {
                        InvocationState::Completed
                    } else {
                        InvocationState::Failed
                    };
                    self.set_state(state);
                    return result;
                }
                Err(error) => error,
            };

            let mut action = classify(
                &error,
                self.target.kind(),
                self.op.read_only,
                self.fail_on_indeterminate,
            );
            if action != ExceptionAction::ThrowException && !self.op.retryable {
                action = ExceptionAction::ThrowException;
            }

            if action == ExceptionAction::ThrowException {
                self.set_state(InvocationState::Failed);
                return Err(self.terminal(error));
            }

            if self.attempts >= self.policy.try_count {
                tracing::warn!(
                    "Invocation {} gave up after {} attempts: {}",
                    self.op.name(),
                    self.attempts,
                    error
                );
                self.set_state(InvocationState::Failed);
                return Err(error);
            }

            let pause = match action {
                ExceptionAction::RetryLocal => Duration::ZERO,
                _ => self.policy.try_pause,
            };
            // No attempt may start at or past the call deadline.
            if let Some(remaining) = self.remaining()
                && pause >= remaining
            {
                tokio::time::sleep(remaining).await;
                self.set_state(InvocationState::Failed);
                return Err(self.timeout_error());
            }

            tracing::debug!(
                "Retrying {} (attempt {}) after {:?}: {}",
                self.op.name(),
                self.attempts,
                pause,
                error.kind()
            );
            self.set_state(InvocationState::Retrying);
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
    }

    async fn attempt(&mut self) -> GridResult<OperationResult> {
        let target = self.resolve()?;

        let mut registration = self.context.registry.register(target.member.clone());
        self.op.call_id = registration.call_id;
        self.last_call_id = registration.call_id;
        tracing::trace!(
            "Call {} ({}) sent to {} for partition {}",
            registration.call_id,
            self.op.name(),
            target.member,
            self.op.partition_id
        );

        self.context.dispatcher.send(&self.op, &target).await?;
        self.await_outcome(&mut registration).await
    }

    fn resolve(&self) -> GridResult<PartitionReplica> {
        match &self.target {
            InvocationTarget::Partition {
                partition_id,
                replica_index,
            } => self
                .context
                .partitions
                .replica(*partition_id, *replica_index)
                .ok_or(GridError::TargetNotFound {
                    partition_id: *partition_id,
                    replica_index: *replica_index,
                }),
            InvocationTarget::Member(member) => {
                self.context
                    .partitions
                    .member(member)
                    .ok_or_else(|| GridError::MemberLeft {
                        member: member.clone(),
                    })
            }
        }
    }

    /// Waits for the primary response and then for the acks it announced.
    ///
    /// Once the response is in, only the backup timeout applies; the call
    /// deadline governs the wait for the response alone.
    async fn await_outcome(&self, registration: &mut Registration) -> GridResult<OperationResult> {
        let mut tracker = BackupAckTracker::new();
        let mut pending: Option<OperationResult> = None;

        loop {
            let wake_at = if pending.is_some() {
                tracker.deadline()
            } else {
                self.deadline
            };

            let event = match wake_at {
                Some(at) => {
                    match tokio::time::timeout_at(at, registration.events.recv()).await {
                        Ok(event) => event,
                        Err(_) => {
                            return match pending.take() {
                                Some(result) => self.on_backup_timeout(result, &tracker),
                                None => Err(self.timeout_error()),
                            };
                        }
                    }
                }
                None => registration.events.recv().await,
            };

            match event {
                Some(InvocationEvent::Response(response)) => {
                    let result = response.outcome?;
                    tracker.on_response(
                        response.backup_acks,
                        self.policy.backup_timeout,
                        Instant::now(),
                    );
                    if tracker.is_satisfied() {
                        return Ok(result);
                    }
                    tracing::trace!(
                        "Call {} waiting for {} backup acks",
                        registration.call_id,
                        response.backup_acks - tracker.received()
                    );
                    pending = Some(result);
                }
                Some(InvocationEvent::BackupAck) => {
                    if tracker.on_backup_ack() {
                        if let Some(result) = pending.take() {
                            return Ok(result);
                        }
                    }
                }
                Some(InvocationEvent::MemberLeft(member)) => {
                    if pending.is_none() {
                        return Err(GridError::MemberLeft { member });
                    }
                }
                None => {
                    return Err(GridError::internal(format!(
                        "event channel of call {} closed",
                        registration.call_id
                    )));
                }
            }
        }
    }

    fn on_backup_timeout(
        &self,
        result: OperationResult,
        tracker: &BackupAckTracker,
    ) -> GridResult<OperationResult> {
        let expected = tracker.expected().unwrap_or_default();
        if self.fail_on_indeterminate {
            return Err(GridError::indeterminate(format!(
                "{} call {} got {} of {} backup acks within {:?}",
                self.op.name(),
                self.last_call_id,
                tracker.received(),
                expected,
                self.policy.backup_timeout
            )));
        }

        tracing::warn!(
            "Call {} ({}) completing with {} of {} backup acks after {:?}",
            self.last_call_id,
            self.op.name(),
            tracker.received(),
            expected,
            self.policy.backup_timeout
        );
        Ok(result)
    }

    fn finish(&self, result: OperationResult) -> GridResult<OperationResult> {
        if self.policy.deserialize_response {
            if let OperationResult::Data(Some(json)) = &result {
                serde_json::from_str::<serde::de::IgnoredAny>(json)?;
            }
        }
        Ok(result)
    }

    /// A departed target turns into an indeterminate outcome when the caller
    /// asked for it.
    fn terminal(&self, error: GridError) -> GridError {
        match error {
            GridError::MemberLeft { member }
                if self.fail_on_indeterminate && self.target.kind() == TargetKind::Partition =>
            {
                GridError::indeterminate(format!(
                    "{} call {} may or may not have run on {}, which left the cluster",
                    self.op.name(),
                    self.last_call_id,
                    member
                ))
            }
            other => other,
        }
    }

    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    fn timeout_error(&self) -> GridError {
        GridError::CallTimeout {
            call_id: self.last_call_id,
            elapsed_ms: millis_of(self.started.elapsed()),
            attempts: self.attempts,
        }
    }

    fn set_state(&mut self, state: InvocationState) {
        let previous = self.state.send_replace(state);
        tracing::trace!(
            "Invocation {} {:?} -> {:?}",
            self.op.name(),
            previous,
            state
        );
    }
}

/// Handle on a running invocation. Resolves exactly once.
pub struct InvocationFuture {
    handle: JoinHandle<GridResult<OperationResult>>,
    state: watch::Receiver<InvocationState>,
}

impl InvocationFuture {
    /// Stops the invocation. Its pending registration is dropped with it and
    /// the future resolves to `GridError::Cancelled`.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_done(&self) -> bool {
        self.handle.is_finished()
    }

    /// Where the invocation is right now. A task that went away without
    /// reaching a terminal state was cancelled.
    pub fn state(&self) -> InvocationState {
        let state = *self.state.borrow();
        if !state.is_terminal() && self.state.has_changed().is_err() {
            return InvocationState::Cancelled;
        }
        state
    }
}

impl Future for InvocationFuture {
    type Output = GridResult<OperationResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) if err.is_cancelled() => Poll::Ready(Err(GridError::Cancelled)),
            Poll::Ready(Err(err)) => Poll::Ready(Err(GridError::internal(format!(
                "invocation task failed: {}",
                err
            )))),
            Poll::Pending => Poll::Pending,
        }
    }
}
