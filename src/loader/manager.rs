//! Per-placement loading manager
//!
//! Drives one placement through `IDLE → LOADING → SUCCESS | ERROR | TIMEOUT →
//! FALLBACK`. Every attempt races the load pipeline against the session's
//! timeout and cancellation token; failures go through the recovery planner
//! and never escape to the caller.

use super::host::{AdMarker, ContainerId, PageHost};
use super::observer::{
    ErrorEvent, LoadObserver, NoopObserver, StateChangeEvent, SuccessEvent,
};
use super::script::ScriptLoader;
use super::session::{ContainerProblem, LoadError, LoadSession};
use crate::cancel;
use crate::config::{
    ConfigError, SessionConfig, RENDER_CHECK_ATTEMPTS, RENDER_CHECK_INTERVAL, RUNTIME_POLL_ATTEMPTS,
    RUNTIME_POLL_INTERVAL,
};
use crate::logging::AdLogger;
use crate::metrics;
use crate::monitor::PerformanceMonitor;
use crate::recovery::{
    ErrorContext, ErrorDecision, ErrorRecord, PlannerConfig, RecoveryAction, RecoveryPlan,
    RecoveryPlanner,
};
use crate::{LoadingState, RecoveryStrategy};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

#[derive(Debug)]
struct SessionState {
    state: LoadingState,
    retry_count: u32,
    container: Option<ContainerId>,
    first_start: Option<Instant>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    load_time: Option<Duration>,
    last_error: Option<String>,
    pending: Option<ErrorDecision>,
    destroyed: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            state: LoadingState::Idle,
            retry_count: 0,
            container: None,
            first_start: None,
            started_at: None,
            ended_at: None,
            load_time: None,
            last_error: None,
            pending: None,
            destroyed: false,
        }
    }
}

/// What the failure path decided
enum FailureOutcome {
    /// Run this decision's plan and try again
    Retry(ErrorDecision),
    /// Session is in FALLBACK (or was cancelled)
    Finished,
}

/// Owns one placement's load life cycle.
pub struct AdLoadingManager {
    config: SessionConfig,
    session_id: String,
    host: Arc<dyn PageHost>,
    scripts: Arc<ScriptLoader>,
    planner: Arc<RecoveryPlanner>,
    logger: Arc<AdLogger>,
    monitor: Arc<PerformanceMonitor>,
    observer: Arc<dyn LoadObserver>,
    token: CancellationToken,
    session: Mutex<SessionState>,
    drive: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for AdLoadingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdLoadingManager")
            .field("session_id", &self.session_id)
            .field("placement_id", &self.config.placement_id)
            .field("state", &self.state())
            .field("retry_count", &self.retry_count())
            .finish()
    }
}

impl AdLoadingManager {
    /// Manager with its own planner, logger and monitor.
    ///
    /// Fails if `config` was left invalid by its `with_*` builders.
    pub fn new(
        config: SessionConfig,
        host: Arc<dyn PageHost>,
        scripts: Arc<ScriptLoader>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let planner = RecoveryPlanner::new(
            PlannerConfig::default().with_max_retries(config.max_retries),
        );
        Ok(Self {
            session_id: metrics::next_session_id(),
            host,
            scripts,
            planner: Arc::new(planner),
            logger: Arc::new(AdLogger::default()),
            monitor: Arc::new(PerformanceMonitor::default()),
            observer: Arc::new(NoopObserver),
            token: CancellationToken::new(),
            session: Mutex::new(SessionState::new()),
            drive: tokio::sync::Mutex::new(()),
            config,
        })
    }

    /// Share a planner between managers
    pub fn with_planner(mut self, planner: Arc<RecoveryPlanner>) -> Self {
        self.planner = planner;
        self
    }

    /// Share a logger between managers
    pub fn with_logger(mut self, logger: Arc<AdLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Share a monitor between managers
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Receive state, error and success callbacks
    pub fn with_observer(mut self, observer: Arc<dyn LoadObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> LoadingState {
        self.session.lock().state
    }

    /// Retries used
    pub fn retry_count(&self) -> u32 {
        self.session.lock().retry_count
    }

    /// Text of the most recent failure
    pub fn last_error(&self) -> Option<String> {
        self.session.lock().last_error.clone()
    }

    /// Time from the first attempt's start to verified render
    pub fn load_time(&self) -> Option<Duration> {
        self.session.lock().load_time
    }

    /// Whether `cleanup` ran
    pub fn is_destroyed(&self) -> bool {
        self.session.lock().destroyed
    }

    /// Token cancelled by `cleanup`
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Planner consulted on failure
    pub fn planner(&self) -> &Arc<RecoveryPlanner> {
        &self.planner
    }

    /// Event logger
    pub fn logger(&self) -> &Arc<AdLogger> {
        &self.logger
    }

    /// Performance monitor
    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    /// Snapshot of the session
    pub fn session(&self) -> LoadSession {
        let session = self.session.lock();
        LoadSession {
            placement_id: self.config.placement_id.clone(),
            container: session.container.clone(),
            width: self.config.width,
            height: self.config.height,
            max_retries: self.config.max_retries,
            load_timeout: self.config.load_timeout,
            current_state: session.state,
            retry_count: session.retry_count,
            load_start_time: session.started_at,
            load_end_time: session.ended_at,
            last_error: session.last_error.clone(),
            destroyed: session.destroyed,
        }
    }

    fn placement_id(&self) -> &str {
        &self.config.placement_id
    }

    /// Load an ad into `container`. Returns whether it rendered.
    ///
    /// Never fails: errors resolve through the state machine and callbacks.
    /// With `auto_retry` off, a failure parks the session in ERROR/TIMEOUT
    /// until [`retry`](Self::retry) is called.
    pub async fn load_ad(&self, container: Option<ContainerId>) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let _drive = self.drive.lock().await;

        {
            let mut session = self.session.lock();
            match session.state {
                LoadingState::Idle => {}
                LoadingState::Success => return true,
                state => {
                    debug!(placement_id = %self.placement_id(), %state, "load_ad ignored, session already started");
                    return false;
                }
            }
            session.container = container.clone();
            session.started_at = Some(Utc::now());
        }

        let span = tracing::info_span!(
            "ad_session",
            session_id = %self.session_id,
            placement_id = %self.placement_id(),
        );
        self.drive_attempts(container, None).instrument(span).await
    }

    /// Run the parked recovery plan and try again.
    ///
    /// No-op unless the session is parked in ERROR/TIMEOUT with retries left.
    pub async fn retry(&self, container: Option<ContainerId>) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let _drive = self.drive.lock().await;

        let decision = {
            let mut session = self.session.lock();
            if !matches!(session.state, LoadingState::Error | LoadingState::Timeout) {
                return false;
            }
            let Some(decision) = session.pending.take() else {
                return false;
            };
            session.container = container.clone();
            decision
        };

        let span = tracing::info_span!(
            "ad_session",
            session_id = %self.session_id,
            placement_id = %self.placement_id(),
        );
        async {
            if !self.execute_recovery(container.as_ref(), &decision).await {
                return false;
            }
            self.drive_attempts(container, Some(decision.strategy)).await
        }
        .instrument(span)
        .await
    }

    /// Tear the session down. Idempotent.
    ///
    /// Pending waits are cancelled and any late continuation becomes a no-op.
    pub fn cleanup(&self) {
        self.token.cancel();
        let first = {
            let mut session = self.session.lock();
            let first = !session.destroyed;
            session.destroyed = true;
            session.pending = None;
            first
        };
        if first {
            self.monitor.discard_session(self.placement_id());
            debug!(session_id = %self.session_id, placement_id = %self.placement_id(), "Session cleaned up");
        }
    }

    async fn drive_attempts(
        &self,
        container: Option<ContainerId>,
        mut strategy: Option<RecoveryStrategy>,
    ) -> bool {
        loop {
            if !self.transition(LoadingState::Loading) {
                return false;
            }

            let result = self.attempt(container.as_ref()).await;
            if self.token.is_cancelled() {
                return false;
            }

            let error = match result {
                Ok(()) => return self.finish_success(strategy),
                Err(LoadError::Cancelled) => return false,
                Err(error) => error,
            };

            if let Some(strategy) = strategy {
                self.planner.update_recovery_stats(strategy, false);
            }

            match self.handle_failure(container.as_ref(), error) {
                FailureOutcome::Finished => return false,
                FailureOutcome::Retry(decision) if self.config.auto_retry => {
                    if !self.execute_recovery(container.as_ref(), &decision).await {
                        return false;
                    }
                    strategy = Some(decision.strategy);
                }
                FailureOutcome::Retry(decision) => {
                    info!(
                        retry_count = self.retry_count(),
                        strategy = %decision.strategy,
                        "Session parked, waiting for explicit retry"
                    );
                    self.session.lock().pending = Some(decision);
                    return false;
                }
            }
        }
    }

    async fn attempt(&self, container: Option<&ContainerId>) -> Result<(), LoadError> {
        let retry_count = self.retry_count();
        {
            let mut session = self.session.lock();
            session.first_start.get_or_insert_with(Instant::now);
        }
        self.monitor.record_load_start(self.placement_id());
        self.logger.log_load_start(self.placement_id(), retry_count);
        debug!(retry_count, "Load attempt started");

        let timeout = self.config.load_timeout;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(LoadError::Cancelled),
            result = tokio::time::timeout(timeout, self.pipeline(container)) => {
                result.unwrap_or(Err(LoadError::Timeout { after: timeout }))
            }
        }
    }

    async fn pipeline(&self, container: Option<&ContainerId>) -> Result<(), LoadError> {
        let container = self.validate_container(container)?;
        let (width, height) = (self.config.width, self.config.height);
        self.host.show_placeholder(container, width, height);

        match self.scripts.ensure_loaded().await {
            Ok(status) => {
                self.logger
                    .log_script_load(self.placement_id(), self.scripts.src(), true, &format!("{status:?}"));
            }
            Err(e) => {
                self.logger
                    .log_script_load(self.placement_id(), self.scripts.src(), false, &e.to_string());
                return Err(e.into());
            }
        }

        self.wait_for_runtime().await?;

        // At most one marker per container
        self.host.remove_marker(container);
        let marker = AdMarker::new(self.placement_id(), width, height);
        self.host
            .insert_marker(container, &marker)
            .map_err(LoadError::Marker)?;
        if self.config.debug {
            info!(html = %marker.to_html(), "Marker inserted");
        }

        self.verify_render(container).await
    }

    fn validate_container<'a>(
        &self,
        container: Option<&'a ContainerId>,
    ) -> Result<&'a ContainerId, LoadError> {
        let problem = match container {
            None => Some(ContainerProblem::Null),
            Some(id) => match self.host.container_status(id) {
                None => Some(ContainerProblem::NotFound),
                Some(status) if !status.attached => Some(ContainerProblem::Detached),
                Some(status) if status.width == 0 || status.height == 0 => {
                    Some(ContainerProblem::ZeroSize)
                }
                Some(_) => None,
            },
        };

        match (container, problem) {
            (Some(id), None) => {
                self.logger.log_validation(self.placement_id(), true, "ok");
                Ok(id)
            }
            (_, problem) => {
                let problem = problem.unwrap_or(ContainerProblem::Null);
                self.logger
                    .log_validation(self.placement_id(), false, &problem.to_string());
                Err(LoadError::InvalidContainer(problem))
            }
        }
    }

    async fn wait_for_runtime(&self) -> Result<(), LoadError> {
        for _ in 0..RUNTIME_POLL_ATTEMPTS {
            if self.host.runtime_ready() {
                return Ok(());
            }
            if !cancel::sleep(&self.token, RUNTIME_POLL_INTERVAL).await {
                return Err(LoadError::Cancelled);
            }
        }
        if self.host.runtime_ready() {
            return Ok(());
        }
        Err(LoadError::RuntimeUnavailable)
    }

    async fn verify_render(&self, container: &ContainerId) -> Result<(), LoadError> {
        for check in 1..=RENDER_CHECK_ATTEMPTS {
            let rendered = self
                .host
                .marker_evidence(container)
                .is_some_and(|evidence| evidence.is_rendered());
            if rendered {
                self.logger.log_render(self.placement_id(), true, check);
                return Ok(());
            }
            if check < RENDER_CHECK_ATTEMPTS && !cancel::sleep(&self.token, RENDER_CHECK_INTERVAL).await {
                return Err(LoadError::Cancelled);
            }
        }
        self.logger
            .log_render(self.placement_id(), false, RENDER_CHECK_ATTEMPTS);
        Err(LoadError::RenderVerification)
    }

    fn finish_success(&self, strategy: Option<RecoveryStrategy>) -> bool {
        if !self.transition(LoadingState::Success) {
            return false;
        }

        let (load_time, retry_count) = {
            let mut session = self.session.lock();
            let load_time = session
                .first_start
                .map(|start| start.elapsed())
                .unwrap_or_default();
            session.load_time = Some(load_time);
            session.ended_at = Some(Utc::now());
            (load_time, session.retry_count)
        };

        self.monitor
            .record_load_end(self.placement_id(), true, retry_count);
        self.logger
            .log_load_success(self.placement_id(), load_time, retry_count);
        if let Some(strategy) = strategy {
            self.planner.update_recovery_stats(strategy, true);
        }
        info!(
            retry_count,
            load_time_ms = load_time.as_millis() as u64,
            "Ad loaded"
        );

        let event = SuccessEvent {
            load_time: load_time.as_millis() as u64,
            retry_count,
            placement_id: self.placement_id().to_string(),
        };
        self.notify(|observer| observer.on_success(&event));
        true
    }

    fn handle_failure(&self, container: Option<&ContainerId>, error: LoadError) -> FailureOutcome {
        let failed_state = if error.is_timeout() {
            LoadingState::Timeout
        } else {
            LoadingState::Error
        };
        if !self.transition(failed_state) {
            return FailureOutcome::Finished;
        }

        let message = error.to_string();
        let retry_count = {
            let mut session = self.session.lock();
            session.last_error = Some(message.clone());
            session.retry_count
        };
        self.monitor
            .record_load_end(self.placement_id(), false, retry_count);

        let record = ErrorRecord::from_error(&error);
        let context = ErrorContext::for_placement(self.placement_id(), self.config.max_retries);
        let decision = self.planner.handle_error(Some(&record), retry_count, &context);

        if let LoadError::Timeout { after } = &error {
            self.logger
                .log_timeout(self.placement_id(), *after, retry_count);
        }
        self.logger
            .log_load_error(self.placement_id(), &message, decision.error_type, retry_count);
        warn!(
            retry_count,
            error = %message,
            error_type = %decision.error_type,
            severity = %decision.severity,
            strategy = %decision.strategy,
            "Ad load attempt failed"
        );

        let retryable = decision.should_retry
            && !decision.fallback_required
            && decision.recovery_plan.retries()
            && retry_count < self.config.max_retries;
        if retryable {
            // A failure that ends in FALLBACK is reported through onStateChange only
            let event = ErrorEvent {
                error: message.clone(),
                retry_count,
                placement_id: self.placement_id().to_string(),
                category: decision.error_type,
                strategy: decision.strategy,
            };
            self.notify(|observer| observer.on_error(&event));
            return FailureOutcome::Retry(decision);
        }

        self.enter_fallback(container, &decision, &message);
        FailureOutcome::Finished
    }

    fn enter_fallback(&self, container: Option<&ContainerId>, decision: &ErrorDecision, reason: &str) {
        if !self.transition(LoadingState::Fallback) {
            return;
        }
        let retry_count = {
            let mut session = self.session.lock();
            session.ended_at = Some(Utc::now());
            session.retry_count
        };

        let plan = if decision.strategy == RecoveryStrategy::FallbackDisplay {
            decision.recovery_plan.clone()
        } else {
            RecoveryPlan::emergency()
        };

        for action in &plan.actions {
            match action {
                RecoveryAction::RemoveMarker => {
                    if let Some(container) = container {
                        self.host.remove_marker(container);
                    }
                }
                RecoveryAction::ShowFallback => {
                    if let Some(container) = container {
                        self.host
                            .show_fallback(container, self.config.width, self.config.height);
                    }
                }
                RecoveryAction::LogFailure => {
                    self.logger
                        .log_fallback(self.placement_id(), reason, retry_count);
                }
                _ => {}
            }
        }
        info!(retry_count, "Showing fallback");
    }

    /// Run the plan's actions ahead of the next attempt. Returns `false` if
    /// the session was cancelled on the way.
    async fn execute_recovery(&self, container: Option<&ContainerId>, decision: &ErrorDecision) -> bool {
        let plan = &decision.recovery_plan;
        let retry_count = {
            let mut session = self.session.lock();
            session.retry_count += 1;
            session.retry_count
        };
        self.logger
            .log_retry(self.placement_id(), retry_count, plan.strategy, plan.delay);
        metrics::record_retry_backoff(plan.strategy, plan.delay, retry_count);

        for action in &plan.actions {
            if self.token.is_cancelled() {
                return false;
            }
            match action {
                RecoveryAction::RemoveMarker => {
                    if let Some(container) = container {
                        self.host.remove_marker(container);
                    }
                }
                RecoveryAction::ClearContainer => {
                    if let Some(container) = container {
                        self.host.clear_container(container);
                    }
                }
                RecoveryAction::ResetScript => self.scripts.reset().await,
                RecoveryAction::WaitBackoff => {
                    if !cancel::sleep(&self.token, plan.delay).await {
                        return false;
                    }
                }
                RecoveryAction::RetryLoad
                | RecoveryAction::ShowFallback
                | RecoveryAction::LogFailure => {}
            }
            self.logger
                .log_recovery(self.placement_id(), plan.strategy, &action.to_string());
        }
        !self.token.is_cancelled()
    }

    /// Move to `next` if the state machine allows it and the session is live.
    fn transition(&self, next: LoadingState) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let (old_state, retry_count) = {
            let mut session = self.session.lock();
            let old_state = session.state;
            if !old_state.can_transition_to(next) {
                warn!(%old_state, new_state = %next, "Rejected state transition");
                return false;
            }
            session.state = next;
            (old_state, session.retry_count)
        };

        self.logger
            .log_state_change(self.placement_id(), old_state, next, retry_count);
        let event = StateChangeEvent {
            old_state,
            new_state: next,
            retry_count,
            placement_id: self.placement_id().to_string(),
        };
        self.notify(|observer| observer.on_state_change(&event));
        true
    }

    /// Invoke an observer callback, containing any panic.
    fn notify(&self, callback: impl FnOnce(&dyn LoadObserver)) {
        if self.token.is_cancelled() {
            return;
        }
        let observer = self.observer.as_ref();
        if catch_unwind(AssertUnwindSafe(|| callback(observer))).is_err() {
            error!(
                placement_id = %self.placement_id(),
                "Load observer panicked; callback ignored"
            );
        }
    }
}

impl Drop for AdLoadingManager {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
