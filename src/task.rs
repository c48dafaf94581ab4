use crate::errors::Result;
use crate::group::Group;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A unit of work: an async function from the group executing it to a result.
///
/// A task receives a handle to the same [`Group`] it was added to, so it can
/// read and write that group's bag. It may also build and execute nested
/// groups of its own and block on them; a task that returns a child chain's
/// error as its own is an intended pattern.
#[derive(Clone)]
pub struct Task {
    run: Arc<dyn Fn(Group) -> BoxFuture<'static, Result<()>> + Send + Sync>,
}

impl Task {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Group) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            run: Arc::new(move |group| Box::pin(f(group))),
        }
    }

    pub(crate) fn call(&self, group: Group) -> BoxFuture<'static, Result<()>> {
        (self.run)(group)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}
