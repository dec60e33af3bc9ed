//! Priority queue backing each engine.
//!
//! Ordering is total: higher priority first, then admission order within a
//! priority tier. Every admission stamps a fresh sequence number, so a job
//! re-admitted for retry lands behind everything already waiting at its
//! priority.

use crate::job::{Job, JobId, JobStatus};

/// FIFO-within-priority job queue.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Vec<Job>,
    next_seq: u64,
}

impl JobQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a job, stamping its admission sequence and restoring the
    /// queue order. Returns the job id.
    pub fn admit(&mut self, mut job: Job) -> JobId {
        job.seq = self.next_seq;
        self.next_seq += 1;
        let id = job.id;
        self.jobs.push(job);
        self.jobs
            .sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        id
    }

    /// Removes and returns the highest-priority job admitted earliest.
    pub fn pop(&mut self) -> Option<Job> {
        if self.jobs.is_empty() {
            None
        } else {
            Some(self.jobs.remove(0))
        }
    }

    /// Marks a waiting job cancelled without removing it; the engine skips
    /// cancelled jobs at dequeue time. Returns false when no queued job
    /// matches.
    pub fn cancel(&mut self, id: JobId) -> bool {
        match self
            .jobs
            .iter_mut()
            .find(|job| job.id == id && job.status == JobStatus::Queued)
        {
            Some(job) => {
                job.status = JobStatus::Cancelled;
                true
            }
            None => false,
        }
    }

    /// Jobs currently waiting, cancelled entries included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Read-only view of the waiting jobs in dequeue order.
    #[must_use]
    pub fn waiting(&self) -> &[Job] {
        &self.jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(priority: u8) -> Job {
        Job::new("noop", json!({}), priority, 3)
    }

    #[test]
    fn pops_highest_priority_first() {
        let mut queue = JobQueue::new();
        queue.admit(job(5));
        queue.admit(job(9));
        queue.admit(job(5));
        let order: Vec<u8> = std::iter::from_fn(|| queue.pop())
            .map(|j| j.priority)
            .collect();
        assert_eq!(order, vec![9, 5, 5]);
    }

    #[test]
    fn ties_break_by_admission_order() {
        let mut queue = JobQueue::new();
        let first = queue.admit(job(7));
        let second = queue.admit(job(7));
        assert_eq!(queue.pop().map(|j| j.id), Some(first));
        assert_eq!(queue.pop().map(|j| j.id), Some(second));
    }

    #[test]
    fn readmitted_job_sits_behind_its_tier() {
        let mut queue = JobQueue::new();
        let mut retried = job(7);
        retried.attempts = 1;
        queue.admit(retried.clone());
        let fresh = queue.admit(job(7));
        // Pull the retried job back out and re-admit it, as the engine does
        // after a failed attempt.
        let popped = queue.pop().unwrap();
        assert_eq!(popped.id, retried.id);
        queue.admit(popped);
        assert_eq!(queue.pop().map(|j| j.id), Some(fresh));
        assert_eq!(queue.pop().map(|j| j.id), Some(retried.id));
    }

    #[test]
    fn cancel_marks_queued_job_only() {
        let mut queue = JobQueue::new();
        let id = queue.admit(job(5));
        assert!(queue.cancel(id));
        assert!(!queue.cancel(id));
        let popped = queue.pop().unwrap();
        assert_eq!(popped.status, JobStatus::Cancelled);
    }
}
