use std::time::Duration;

/// Handle returned when a task is scheduled; used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct Task<T> {
    id: TimerId,
    due: Duration,
    period: Option<Duration>,
    payload: T,
}

/// Deterministic scheduler of one-shot and periodic tasks.
///
/// Time only moves when the owner calls [`Scheduler::pop_due`] or
/// [`Scheduler::advance`], so a dropped or cleared scheduler can never fire.
#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    now: Duration,
    next_id: u64,
    tasks: Vec<Task<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 0,
            tasks: Vec::new(),
        }
    }
}

impl<T: Clone> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.tasks.iter().any(|task| task.id == id)
    }

    /// Fires `payload` once after `delay`.
    pub fn after(&mut self, delay: Duration, payload: T) -> TimerId {
        self.push(delay, None, payload)
    }

    /// Fires `payload` every `period`, first after one period. Zero periods are clamped to 1ms.
    pub fn every(&mut self, period: Duration, payload: T) -> TimerId {
        let period = period.max(Duration::from_millis(1));
        self.push(period, Some(period), payload)
    }

    fn push(&mut self, delay: Duration, period: Option<Duration>, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.tasks.push(Task {
            id,
            due: self.now + delay,
            period,
            payload,
        });
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        before != self.tasks.len()
    }

    pub fn cancel_all(&mut self) {
        self.tasks.clear();
    }

    /// Pops the earliest task due at or before `deadline`, moving the clock to
    /// its due time. Periodic tasks are rescheduled before being returned.
    pub fn pop_due(&mut self, deadline: Duration) -> Option<T> {
        let index = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.due <= deadline)
            .min_by_key(|(_, task)| (task.due, task.id.0))
            .map(|(index, _)| index)?;

        let task = &mut self.tasks[index];
        self.now = self.now.max(task.due);
        match task.period {
            Some(period) => {
                task.due += period;
                Some(task.payload.clone())
            }
            None => Some(self.tasks.remove(index).payload),
        }
    }

    /// Moves the clock forward without firing anything still pending.
    pub fn settle(&mut self, deadline: Duration) {
        self.now = self.now.max(deadline);
    }

    /// Fires every task due within `dt`, in chronological order.
    pub fn advance(&mut self, dt: Duration) -> Vec<T> {
        let deadline = self.now + dt;
        let mut fired = Vec::new();
        while let Some(payload) = self.pop_due(deadline) {
            fired.push(payload);
        }
        self.settle(deadline);
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_chronological_order() {
        let mut scheduler = Scheduler::new();
        scheduler.after(Duration::from_millis(300), "late");
        scheduler.after(Duration::from_millis(100), "early");
        assert!(scheduler.advance(Duration::from_millis(50)).is_empty());
        assert_eq!(scheduler.advance(Duration::from_millis(500)), vec!["early", "late"]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn periodic_tasks_repeat_until_cancelled() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.every(Duration::from_secs(1), 1);
        assert_eq!(scheduler.advance(Duration::from_millis(3500)), vec![1, 1, 1]);
        assert!(scheduler.cancel(id));
        assert!(scheduler.advance(Duration::from_secs(10)).is_empty());
        assert!(!scheduler.cancel(id));
    }

    #[test]
    fn pop_due_leaves_later_tasks_pending() {
        let mut scheduler = Scheduler::new();
        scheduler.after(Duration::from_secs(1), 'a');
        scheduler.after(Duration::from_secs(2), 'b');
        let deadline = scheduler.now() + Duration::from_secs(5);
        assert_eq!(scheduler.pop_due(deadline), Some('a'));
        assert_eq!(scheduler.now(), Duration::from_secs(1));
        scheduler.cancel_all();
        assert_eq!(scheduler.pop_due(deadline), None);
    }
}
