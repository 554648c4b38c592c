//! Capacity-bounded join barrier.
//!
//! A [`BoundedWaitGroup`] is a wait group whose `admit` step also gates
//! concurrency: no more than `capacity` units can be held at once, so an
//! unbounded number of tasks can be created while only a fixed number run.

use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};

/// Wait group that never lets more than `capacity` units be in flight.
///
/// Every unit acquired through a positive [`admit()`](Self::admit) must be
/// given back exactly once, either with [`release()`](Self::release) or by
/// dropping the [`Admission`] returned from [`enter()`](Self::enter).
/// Releasing more than was acquired is a caller bug: it is logged, not
/// corrected.
///
/// Clones share the same pool and counter.
///
/// # Examples
///
/// ```
/// use blockscope_scan::BoundedWaitGroup;
/// use std::num::NonZeroUsize;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let group = BoundedWaitGroup::new(NonZeroUsize::new(4).unwrap());
/// for n in 0..16 {
///     let admission = group.enter().await;
///     tokio::spawn(async move {
///         let _admission = admission;
///         println!("working on {n}");
///     });
/// }
/// group.join().await;
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct BoundedWaitGroup {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    capacity: usize,
    /// Free capacity units.
    permits: Semaphore,
    /// Outstanding task counter, watched by `join()`.
    outstanding: watch::Sender<i64>,
}

impl BoundedWaitGroup {
    pub fn new(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get().min(Semaphore::MAX_PERMITS);
        let (outstanding, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                capacity,
                permits: Semaphore::new(capacity),
                outstanding,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Units currently acquired and not yet released.
    pub fn in_flight(&self) -> usize {
        self.inner.capacity.saturating_sub(self.inner.permits.available_permits())
    }

    /// Current value of the outstanding task counter.
    pub fn outstanding(&self) -> i64 {
        *self.inner.outstanding.borrow()
    }

    /// Adjust the group by `delta` units.
    ///
    /// A positive `delta` waits until that many units are free and takes
    /// them all at once; a `delta` larger than the capacity never completes.
    /// A negative `delta` hands `|delta|` units back without waiting.
    pub async fn admit(&self, delta: isize) {
        match delta.cmp(&0) {
            Ordering::Greater => {
                let units = u32::try_from(delta).unwrap_or(u32::MAX);
                if delta.unsigned_abs() > self.inner.capacity {
                    tracing::error!(delta, capacity = self.inner.capacity, "Admitting more units than the capacity");
                }
                // unwrap is safe: semaphore is never closed
                self.inner.permits.acquire_many(units).await.unwrap().forget();
            },
            Ordering::Less => self.inner.permits.add_permits(delta.unsigned_abs()),
            Ordering::Equal => {},
        }
        self.adjust(delta);
    }

    /// Signal that one task finished, freeing its unit.
    pub fn release(&self) {
        self.inner.permits.add_permits(1);
        self.adjust(-1);
    }

    /// Take one unit and return a guard that releases it when dropped.
    pub async fn enter(&self) -> Admission {
        self.admit(1).await;
        Admission { group: self.clone() }
    }

    /// Wait until every admitted unit has been released.
    pub async fn join(&self) {
        let mut outstanding = self.inner.outstanding.subscribe();
        // Only errors once the sender is gone, and `self` keeps it alive.
        let _ = outstanding.wait_for(|count| *count <= 0).await;
    }

    fn adjust(&self, delta: isize) {
        let delta = i64::try_from(delta).unwrap_or(i64::MAX);
        self.inner.outstanding.send_modify(|count| {
            *count = count.saturating_add(delta);
            if *count < 0 {
                tracing::error!(outstanding = *count, "Wait group released more units than were admitted");
            }
        });
    }
}

/// One admitted unit of a [`BoundedWaitGroup`], released on drop.
///
/// Move it into the task doing the work so the unit is handed back however
/// the task ends: success, error, or panic.
#[must_use = "dropping an Admission releases its unit immediately"]
#[derive(Debug)]
pub struct Admission {
    group: BoundedWaitGroup,
}
impl Drop for Admission {
    fn drop(&mut self) {
        self.group.release();
    }
}
