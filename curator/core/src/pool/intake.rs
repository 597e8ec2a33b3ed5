//! Intake queue
//!
//! Bounded priority queue feeding the pool's background intake loop. Higher
//! priority is served first; equal priorities keep submission order. A
//! request leaves the queue only once the pool can run it, so requests that
//! arrive while workers are busy still overtake lower-priority ones.

use std::collections::VecDeque;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::PoolError;
use crate::agents::{AgentRequest, AgentResponse};

/// A request waiting for the intake loop
pub(crate) struct QueuedRequest {
    pub request: AgentRequest,
    pub reply: oneshot::Sender<AgentResponse>,
    pub queued_at: Instant,
}

impl QueuedRequest {
    pub fn new(request: AgentRequest, reply: oneshot::Sender<AgentResponse>) -> Self {
        Self {
            request,
            reply,
            queued_at: Instant::now(),
        }
    }
}

pub(crate) struct IntakeQueue {
    pending: VecDeque<QueuedRequest>,
    max_size: usize,
}

impl IntakeQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            max_size,
        }
    }

    pub fn push(&mut self, queued: QueuedRequest) -> Result<(), PoolError> {
        if self.pending.len() >= self.max_size {
            return Err(PoolError::QueueFull(self.max_size));
        }

        // Insert after every request of equal or higher priority
        let priority = queued.request.priority;
        let pos = self
            .pending
            .iter()
            .position(|q| q.request.priority < priority)
            .unwrap_or(self.pending.len());

        self.pending.insert(pos, queued);
        Ok(())
    }

    /// Remove the most urgent request that `admit` accepts
    ///
    /// `admit` is asked in priority order and its first `Some` wins.
    pub fn pop_admitted<T>(
        &mut self,
        mut admit: impl FnMut(&AgentRequest) -> Option<T>,
    ) -> Option<(QueuedRequest, T)> {
        let (pos, admission) = self
            .pending
            .iter()
            .enumerate()
            .find_map(|(pos, queued)| admit(&queued.request).map(|a| (pos, a)))?;
        let queued = self.pending.remove(pos)?;
        Some((queued, admission))
    }

    pub fn drain(&mut self) -> Vec<QueuedRequest> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentType, Payload};

    fn queued(priority: i32, tag: &str) -> QueuedRequest {
        let (tx, _rx) = oneshot::channel();
        let request = AgentRequest::new(AgentType::ContentModerator, Payload::new())
            .with_priority(priority)
            .with_metadata("tag", tag);
        QueuedRequest::new(request, tx)
    }

    fn pop(queue: &mut IntakeQueue) -> Option<QueuedRequest> {
        queue.pop_admitted(|_| Some(())).map(|(q, ())| q)
    }

    fn tag(q: &QueuedRequest) -> String {
        q.request.metadata["tag"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_priority_order_with_fifo_ties() {
        let mut queue = IntakeQueue::new(10);
        assert!(queue.push(queued(0, "low-1")).is_ok());
        assert!(queue.push(queued(5, "high-1")).is_ok());
        assert!(queue.push(queued(0, "low-2")).is_ok());
        assert!(queue.push(queued(5, "high-2")).is_ok());
        assert!(queue.push(queued(-1, "lowest")).is_ok());

        let order: Vec<String> = std::iter::from_fn(|| pop(&mut queue)).map(|q| tag(&q)).collect();
        assert_eq!(order, vec!["high-1", "high-2", "low-1", "low-2", "lowest"]);
    }

    #[test]
    fn test_full_queue_refuses() {
        let mut queue = IntakeQueue::new(1);
        assert!(queue.push(queued(0, "a")).is_ok());

        let err = queue.push(queued(0, "b")).unwrap_err();
        assert!(matches!(err, PoolError::QueueFull(1)));
        assert_eq!(queue.len(), 1);
        assert_eq!(tag(&pop(&mut queue).unwrap()), "a");
    }

    #[test]
    fn test_pop_admitted_skips_refused_requests() {
        let mut queue = IntakeQueue::new(10);
        queue.push(queued(9, "blocked")).unwrap();
        queue.push(queued(1, "runnable")).unwrap();

        let popped = queue.pop_admitted(|r| (r.metadata["tag"] != "blocked").then_some(()));
        assert_eq!(popped.map(|(q, ())| tag(&q)).as_deref(), Some("runnable"));
        assert_eq!(queue.len(), 1);

        assert!(queue.pop_admitted(|_| None::<()>).is_none());
        assert_eq!(queue.len(), 1);
    }
}
