use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::JoinError;

pub type SharedOutcome<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Awaitable outcome of an in-flight operation.
pub struct Pending<T, E> {
    pub outcome: SharedOutcome<T, E>,
    /// `true` when the caller attached to an attempt someone else started.
    pub joined: bool,
}

/// At most one running operation per key; later callers share its outcome.
///
/// The operation runs on its own task, so it completes even if every caller goes away.
/// The key is released when that task finishes, successfully or not.
pub struct InFlight<T, E> {
    pending: Mutex<HashMap<String, SharedOutcome<T, E>>>,
}

impl<T, E> Default for InFlight<T, E> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<T, E> InFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run<F, Fut>(self: &Arc<Self>, key: &str, start: F) -> Pending<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if let Some(outcome) = pending.get(key) {
            return Pending {
                outcome: outcome.clone(),
                joined: true,
            };
        }

        let release = Release {
            table: Arc::clone(self),
            key: key.to_string(),
        };
        let operation = start();
        let handle = tokio::spawn(async move {
            let _release = release;
            operation.await
        });
        let outcome = async move { handle.await.unwrap_or_else(|err| Err(E::from(err))) }
            .boxed()
            .shared();
        pending.insert(key.to_string(), outcome.clone());
        Pending {
            outcome,
            joined: false,
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Release<T, E> {
    table: Arc<InFlight<T, E>>,
    key: String,
}

impl<T, E> Drop for Release<T, E> {
    fn drop(&mut self) {
        self.table.pending.lock().remove(&self.key);
    }
}
