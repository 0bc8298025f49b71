
use crate::{
    config::QueueConfig,
    database::{ResultStore, StoreError},
    execution::{ExecutionIdentifier, Purpose, QueueElement},
    executors::{BenchmarkRunner, RunnerError},
    notifier::RegressionNotifier,
    sync::Shutdown,
};
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Span};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to start the execution pool: {0}")]
    Pool(#[from] ThreadPoolBuildError),
    #[error("Failed to spawn a thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Error, Debug)]
enum AttemptError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub concurrency: usize,
    pub tick: Duration,
    pub retry_backoff: Duration,
    pub comparison_poll: Duration,
    pub comparison_timeout: Duration,
}

impl From<&QueueConfig> for QueueSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            tick: Duration::from_millis(config.tick),
            retry_backoff: Duration::from_secs(config.retry_backoff),
            comparison_poll: Duration::from_millis(config.comparison_poll),
            comparison_timeout: Duration::from_secs(config.comparison_timeout),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Inserted,
    /// an element with the same identifier was already queued and absorbed the new one
    Merged,
}

/// Read only view of a waiting element, as shown on the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingElement {
    pub source: String,
    pub git_ref: String,
    pub workload: String,
    pub pull_number: u64,
}

#[derive(Debug, Default)]
struct State {
    elements: BTreeMap<ExecutionIdentifier, QueueElement>,
    executing: usize,
    /// executed primaries whose comparison is still owed: partner -> primary -> notify_always
    ///
    /// Whichever side gets to a pair first takes it out of here, so every pair is compared
    /// once even when the partner only finishes after the primary stopped waiting.
    unresolved: BTreeMap<ExecutionIdentifier, BTreeMap<ExecutionIdentifier, bool>>,
}

struct Inner {
    state: Mutex<State>,
    settings: QueueSettings,
    store: Arc<dyn ResultStore>,
    runner: Arc<dyn BenchmarkRunner>,
    notifier: Arc<RegressionNotifier>,
    shutdown: Shutdown,
    pool: ThreadPool,
    comparisons: Mutex<Vec<JoinHandle<()>>>,
    span: Span,
}

/// Pending and executing benchmarks, dispatched at bounded concurrency.
///
/// Both the element map and the number of executing elements live behind one lock. Cloning
/// the queue is cheap and every clone refers to the same state.
#[derive(Clone)]
pub struct ExecutionQueue(Arc<Inner>);

impl ExecutionQueue {
    pub fn new(
        settings: QueueSettings,
        store: Arc<dyn ResultStore>,
        runner: Arc<dyn BenchmarkRunner>,
        notifier: Arc<RegressionNotifier>,
        shutdown: Shutdown,
    ) -> Result<Self, QueueError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(settings.concurrency.max(1))
            .thread_name(|index| format!("execution-{index}"))
            .build()?;

        Ok(Self(Arc::new(Inner {
            state: Mutex::new(State::default()),
            settings,
            store,
            runner,
            notifier,
            shutdown,
            pool,
            comparisons: Mutex::new(Vec::new()),
            span: info_span!("queue", concurrency = settings.concurrency),
        })))
    }

    /// Insert an element, merging it into an already queued element with the same identifier.
    pub fn enqueue(&self, element: QueueElement) -> EnqueueOutcome {
        let _enter = self.0.span.enter();
        let mut state = self.0.state.lock();

        match state.elements.get_mut(&element.identifier) {
            Some(existing) => {
                existing.compare_with.extend(element.compare_with);
                existing.primary |= element.primary;
                existing.notify_always |= element.notify_always;

                if element.purpose == Purpose::Execute
                    && existing.purpose == Purpose::CompareOnly
                    && !existing.executing
                {
                    existing.purpose = Purpose::Execute;
                }

                debug!(identifier = %existing.identifier, "Merged into queued element");

                EnqueueOutcome::Merged
            }
            None => {
                debug!(identifier = %element.identifier, purpose = ?element.purpose, "Queued");
                state
                    .elements
                    .insert(element.identifier.clone(), element);

                EnqueueOutcome::Inserted
            }
        }
    }

    /// Remove a waiting element, executing elements are left alone.
    pub fn remove(&self, identifier: &ExecutionIdentifier) -> Option<QueueElement> {
        let mut state = self.0.state.lock();

        let waiting = state
            .elements
            .get(identifier)
            .map_or(false, |element| !element.executing);

        if waiting {
            state.elements.remove(identifier)
        } else {
            None
        }
    }

    /// Remove every waiting element of a pull request, head and base alike, and supersede the
    /// executing heads that are not at `head` anymore.
    ///
    /// A superseded head runs to its end but is neither compared nor reported, and the
    /// comparisons still owed to older heads are dropped.
    pub fn remove_pull_request(&self, number: u64, head: &str) -> Vec<QueueElement> {
        let mut state = self.0.state.lock();
        let stale = state
            .elements
            .values()
            .filter(|element| {
                element.identifier.pull_number == number
                    && (!element.executing
                        || (element.primary && element.identifier.git_ref != head))
            })
            .map(|element| element.identifier.clone())
            .collect::<Vec<_>>();

        state.unresolved.retain(|_, primaries| {
            primaries.retain(|primary, _| {
                primary.pull_number != number || primary.git_ref == head
            });
            !primaries.is_empty()
        });

        stale
            .iter()
            .filter_map(|identifier| state.elements.remove(identifier))
            .inspect(|element| {
                if element.executing {
                    info!(parent: &self.0.span, identifier = %element.identifier, "Superseded while executing");
                }
            })
            .collect()
    }

    pub fn pending(&self) -> Vec<PendingElement> {
        self.0
            .state
            .lock()
            .elements
            .values()
            .filter(|element| !element.executing)
            .map(|element| PendingElement {
                source: element.identifier.source.clone(),
                git_ref: element.identifier.git_ref.clone(),
                workload: element.identifier.workload.clone(),
                pull_number: element.identifier.pull_number,
            })
            .collect()
    }

    pub fn get(&self, identifier: &ExecutionIdentifier) -> Option<QueueElement> {
        self.0.state.lock().elements.get(identifier).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.state.lock().elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.state.lock().elements.is_empty()
    }

    /// number of elements currently holding an execution slot
    pub fn executing(&self) -> usize {
        self.0.state.lock().executing
    }

    /// Dispatch loop, hands at most one element to the execution pool per tick until shutdown.
    pub fn watch(&self) {
        info!(parent: &self.0.span, "Watching the queue");

        loop {
            self.dispatch_next();
            self.reap_comparisons();

            if self.0.shutdown.wait(self.0.settings.tick) {
                break;
            }
        }

        info!(parent: &self.0.span, "Stopped watching the queue");
    }

    /// Dispatch like `watch` until every element is gone, then wait for running comparisons.
    pub fn drain(&self) {
        // superseded elements left the map but may still hold a slot
        while !self.is_empty() || self.executing() > 0 {
            self.dispatch_next();

            if self.0.shutdown.wait(self.0.settings.tick) {
                break;
            }
        }

        self.join_comparisons();
    }

    /// number of comparison threads still running, finished ones are joined on the way
    pub fn comparison_threads(&self) -> usize {
        self.reap_comparisons();

        self.0.comparisons.lock().len()
    }

    fn reap_comparisons(&self) {
        let finished = {
            let mut comparisons = self.0.comparisons.lock();
            let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut *comparisons)
                .into_iter()
                .partition(|handle| handle.is_finished());
            *comparisons = running;

            finished
        };

        for handle in finished {
            if handle.join().is_err() {
                error!(parent: &self.0.span, "A comparison thread panicked");
            }
        }
    }

    pub fn join_comparisons(&self) {
        let handles = std::mem::take(&mut *self.0.comparisons.lock());

        for handle in handles {
            if handle.join().is_err() {
                error!(parent: &self.0.span, "A comparison thread panicked");
            }
        }
    }

    /// Claim a slot for the first waiting element and hand it to the execution pool.
    pub fn dispatch_next(&self) -> Option<ExecutionIdentifier> {
        let element = {
            let mut state = self.0.state.lock();

            if state.executing >= self.0.settings.concurrency {
                return None;
            }

            let element = state
                .elements
                .values_mut()
                .find(|element| !element.executing)?;
            element.executing = true;
            let element = element.clone();

            state.executing += 1;

            element
        };

        let identifier = element.identifier.clone();
        debug!(parent: &self.0.span, %identifier, "Dispatching");

        let queue = self.clone();
        self.0.pool.spawn(move || queue.execute(element));

        Some(identifier)
    }

    /// Give back one execution slot, called exactly once per dispatched element.
    fn release(&self) {
        let mut state = self.0.state.lock();

        match state.executing.checked_sub(1) {
            Some(executing) => state.executing = executing,
            None => error!(parent: &self.0.span, "Released an execution slot that was never taken"),
        }
    }

    fn forget(&self, identifier: &ExecutionIdentifier) {
        self.0.state.lock().elements.remove(identifier);
    }

    /// an executing element that left the map was replaced by a newer pull request head
    fn superseded(&self, identifier: &ExecutionIdentifier) -> bool {
        !self.0.state.lock().elements.contains_key(identifier)
    }

    /// record that `primary` owes a comparison to each of `partners`
    fn register_pairs(
        &self,
        primary: &ExecutionIdentifier,
        notify_always: bool,
        partners: &[ExecutionIdentifier],
    ) {
        let mut state = self.0.state.lock();

        for partner in partners {
            state
                .unresolved
                .entry(partner.clone())
                .or_default()
                .insert(primary.clone(), notify_always);
        }
    }

    /// take the pair out of the owed comparisons, returns its notify_always if it was owed
    fn claim_pair(
        &self,
        partner: &ExecutionIdentifier,
        primary: &ExecutionIdentifier,
    ) -> Option<bool> {
        let mut state = self.0.state.lock();
        let primaries = state.unresolved.get_mut(partner)?;
        let notify_always = primaries.remove(primary);

        if primaries.is_empty() {
            state.unresolved.remove(partner);
        }

        notify_always
    }

    fn notify_pair(
        &self,
        partner: &ExecutionIdentifier,
        primary: &ExecutionIdentifier,
        notify_always: bool,
    ) {
        if let Err(error) = self.0.notifier.notify(partner, primary, notify_always) {
            warn!(%partner, %primary, "Comparison failed: {error}");
        }
    }

    /// Compare `partner` with every executed primary that stopped waiting for it.
    fn compare_waiting_primaries(&self, partner: &ExecutionIdentifier) {
        let primaries = self
            .0
            .state
            .lock()
            .unresolved
            .remove(partner)
            .unwrap_or_default();

        for (primary, notify_always) in primaries {
            debug!(%primary, "Comparing with a primary that finished first");
            self.notify_pair(partner, &primary, notify_always);
        }
    }

    fn set_retry(&self, identifier: &ExecutionIdentifier, retry: i32) {
        if let Some(element) = self.0.state.lock().elements.get_mut(identifier) {
            element.retry = retry;
        }
    }

    fn partners(&self, element: &QueueElement) -> BTreeSet<ExecutionIdentifier> {
        // links merged in while waiting are picked up as well
        self.0
            .state
            .lock()
            .elements
            .get(&element.identifier)
            .map(|queued| queued.compare_with.clone())
            .unwrap_or_else(|| element.compare_with.clone())
    }

    fn already_finished(&self, element: &QueueElement) -> bool {
        if !element.needs_execution() {
            return true;
        }

        match self.0.store.finished_execution(&element.identifier) {
            Ok(found) => found.is_some(),
            Err(error) => {
                warn!("Failed to look for a finished execution, running anyway: {error}");
                false
            }
        }
    }

    fn attempt(&self, element: &QueueElement) -> Result<(), AttemptError> {
        let execution = self.0.store.start_execution(&element.identifier)?;

        match self.0.runner.run(&element.config, &element.identifier) {
            Ok(results) => {
                self.0.store.finish_execution(execution, &results)?;
                info!(%execution, "Execution finished");

                Ok(())
            }
            Err(error) => {
                if let Err(store_error) = self.0.store.fail_execution(execution) {
                    warn!(%execution, "Failed to record failed execution: {store_error}");
                }

                Err(error.into())
            }
        }
    }

    /// Run a dispatched element to its terminal outcome.
    fn execute(&self, mut element: QueueElement) {
        let span = info_span!(parent: &self.0.span, "execute", identifier = %element.identifier);
        let _enter = span.enter();

        if self.already_finished(&element) {
            info!("Results already exist, skipping execution");
            self.release();
            self.compare_waiting_primaries(&element.identifier);
            self.forget(&element.identifier);
            return;
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            match self.attempt(&element) {
                Ok(()) => break,
                Err(error) => {
                    element.retry -= 1;
                    self.set_retry(&element.identifier, element.retry);

                    if element.retry < 0 {
                        error!(attempts = attempt, "Execution failed, giving up: {error}");
                        self.release();
                        // nothing will ever finish on this side
                        self.0.state.lock().unresolved.remove(&element.identifier);
                        self.forget(&element.identifier);
                        return;
                    }

                    if self.superseded(&element.identifier) {
                        info!("Superseded, not retrying");
                        self.release();
                        return;
                    }

                    warn!(
                        attempt,
                        remaining = element.retry,
                        "Execution failed, retrying: {error}"
                    );

                    let backoff = self
                        .0
                        .settings
                        .retry_backoff
                        .saturating_mul(1 << (attempt - 1).min(16));
                    if !backoff.is_zero() && self.0.shutdown.wait(backoff) {
                        info!("Shutdown while waiting to retry");
                        self.release();
                        self.forget(&element.identifier);
                        return;
                    }
                }
            }
        }

        self.release();

        if self.superseded(&element.identifier) {
            info!("Superseded while executing, skipping comparisons");
            return;
        }

        self.compare_waiting_primaries(&element.identifier);

        if element.primary && !self.partners(&element).is_empty() {
            let queue = self.clone();
            let comparison_span = span.clone();
            let handle = thread::spawn(move || {
                let _enter = comparison_span.enter();

                queue.compare_element(&element);
                queue.forget(&element.identifier);
            });

            self.0.comparisons.lock().push(handle);
            self.reap_comparisons();
        } else {
            self.forget(&element.identifier);
        }
    }

    /// Wait for every comparison partner to finish and notify about each pair once.
    ///
    /// Pairs still open when this gives up stay owed, the partner compares them once it
    /// finishes executing.
    fn compare_element(&self, element: &QueueElement) {
        let deadline = Instant::now() + self.0.settings.comparison_timeout;
        let mut registered = BTreeSet::new();
        let mut resolved = BTreeSet::new();

        loop {
            if self.superseded(&element.identifier) {
                info!("Superseded, dropping comparisons");
                return;
            }

            let partners = self.partners(element);
            // links merged in while waiting are owed as well
            let fresh = partners
                .difference(&registered)
                .cloned()
                .collect::<Vec<_>>();
            self.register_pairs(&element.identifier, element.notify_always, &fresh);
            registered.extend(fresh);

            let mut waiting = 0;

            for partner in partners {
                if resolved.contains(&partner) {
                    continue;
                }

                match self.0.store.finished_execution(&partner) {
                    Ok(Some(_)) => {
                        // the partner may have compared the pair itself already
                        if let Some(notify_always) = self.claim_pair(&partner, &element.identifier)
                        {
                            self.notify_pair(&partner, &element.identifier, notify_always);
                        }
                        resolved.insert(partner);
                    }
                    Ok(None) => waiting += 1,
                    Err(error) => {
                        error!(%partner, "Failed to look up comparison partner, dropping remaining comparisons: {error}");
                        for partner in registered.difference(&resolved) {
                            self.claim_pair(partner, &element.identifier);
                        }
                        return;
                    }
                }
            }

            if waiting == 0 {
                debug!(compared = resolved.len(), "All comparisons done");
                return;
            }

            if Instant::now() >= deadline {
                warn!(waiting, "Stopped waiting for comparison partners, they compare once finished");
                return;
            }

            if self.0.shutdown.wait(self.0.settings.comparison_poll) {
                info!(waiting, "Shutdown while waiting for comparison partners");
                return;
            }
        }
    }
}
