//! Chained concurrent task groups with a shared state bag.
//!
//! A [`Group`] fans out its [`Task`]s concurrently, joins on all of them,
//! and aggregates their failures into a single outcome. On success it hands
//! its [`Bag`] of shared state forward to an optional next group, forming a
//! linear chain of fan-out/fan-in stages with state flowing forward only on
//! success.
//!
//! ```
//! use taskchain::{Group, Task};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> taskchain::Result<()> {
//! let fetch = Group::new();
//! fetch.set("region", "us-east-1")?;
//! fetch.add(Task::new(|group| async move {
//!     let region: String = group.get("region", String::new());
//!     group.set("payload", format!("records from {region}"))?;
//!     Ok(())
//! }));
//!
//! let publish = Group::new();
//! publish.add(Task::new(|group| async move {
//!     let payload: String = group.get("payload", String::new());
//!     assert!(!payload.is_empty());
//!     Ok(())
//! }));
//!
//! fetch.set_next(publish);
//! fetch.exec().await?;
//! # Ok(())
//! # }
//! ```

pub mod bag;
pub mod errors;
pub mod group;
pub mod policy;
pub mod task;

pub use bag::Bag;
pub use errors::{Result, TaskError};
pub use group::{ErrorHandler, Group, PanicHandler};
pub use policy::Policy;
pub use task::Task;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn end_to_end_chain() {
        let counter = Arc::new(AtomicUsize::new(0));

        let first = Group::new();
        let second = Group::new();
        first.set_next(second.clone());
        first.set("stage", "first").unwrap();

        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            first.add(Task::new(move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }));
        }
        {
            let counter = Arc::clone(&counter);
            second.add(Task::new(move |group| {
                let counter = Arc::clone(&counter);
                async move {
                    // seeded upstream, visible after the handoff
                    assert_eq!(group.get::<String>("stage", String::new()), "first");
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }));
        }

        first.exec().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
