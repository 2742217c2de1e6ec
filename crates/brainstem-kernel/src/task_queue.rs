//! K5 – task queue: structure goals, order the queue, elect the active task.
//!
//! Drains the inbox and any NEW_GOAL interrupt into `Task` records with
//! stable unique ids, sorts by (priority desc, deadline asc, arrival asc),
//! and adopts the head as the active task when the kernel is in EXEC.  A
//! raised preempt flag evicts a preemptible active task so the mode handler
//! or a fresh plan can take over.

use brainstem_types::{
    BrainState, GoalRequest, Resource, Task, TaskStatus, UserInterrupt,
};
use chrono::Utc;
use uuid::Uuid;

/// Priority for goals issued directly by the user.
pub const USER_GOAL_PRIORITY: i32 = 80;

/// Priority for goals arriving through the inbox with none specified.
pub const DEFAULT_PRIORITY: i32 = 50;

/// K5 node.  Writes `tasks.inbox`, `tasks.queue`, `tasks.active_task_id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskQueue;

impl TaskQueue {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, mut state: BrainState) -> BrainState {
        // A recognised NEW_GOAL becomes a high-priority navigation task.
        if let UserInterrupt::NewGoal { goal_text } = &state.hci.user_interrupt {
            let task = Self::navigation_task(goal_text, USER_GOAL_PRIORITY);
            state.tasks.queue.push(task);
        }

        // Drain the inbox.
        let inbox: Vec<GoalRequest> = std::mem::take(&mut state.tasks.inbox);
        for request in inbox {
            if let Some(task) = Self::task_from_request(request) {
                state.tasks.queue.push(task);
            }
        }

        // Priority desc, earliest deadline first (none last), oldest first.
        state.tasks.queue.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| match (&a.deadline, &b.deadline) {
                    (Some(da), Some(db)) => da.cmp(db),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.created_at.cmp(&b.created_at))
        });

        // Preemption evicts a preemptible active task.
        if state.tasks.preempt_flag {
            let evict = state
                .tasks
                .active_task()
                .map(|t| t.preemptible)
                .unwrap_or(false);
            if evict {
                if let Some(id) = state.tasks.active_task_id.take() {
                    if let Some(task) = state.tasks.queue.iter_mut().find(|t| t.id == id) {
                        task.status = TaskStatus::Pending;
                    }
                    state.trace(format!("[task_queue] preempted active task {id}"));
                }
            }
        }

        // Elect the head as active while executing.
        if state.tasks.active_task_id.is_none() && state.tasks.mode == brainstem_types::Mode::Exec
        {
            if let Some(task) = state
                .tasks
                .queue
                .iter_mut()
                .find(|t| t.status == TaskStatus::Pending)
            {
                task.status = TaskStatus::Running;
                state.tasks.active_task_id = Some(task.id.clone());
            }
        }

        state.trace(format!(
            "[task_queue] queue_len={} active={:?}",
            state.tasks.queue.len(),
            state.tasks.active_task_id
        ));
        state
    }

    /// Build a navigation task for a named target.
    pub fn navigation_task(target: &str, priority: i32) -> Task {
        Task {
            id: format!("task_{}", &Uuid::new_v4().simple().to_string()[..8]),
            goal: format!("navigate_to:{target}"),
            priority,
            deadline: None,
            resources_required: vec![Resource::Base],
            preemptible: true,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            metadata: serde_json::json!({ "target": target, "source": "user" }),
        }
    }

    fn task_from_request(request: GoalRequest) -> Option<Task> {
        if request.goal.trim().is_empty() {
            return None;
        }
        let priority = if request.priority == 0 {
            DEFAULT_PRIORITY
        } else {
            request.priority
        };
        Some(Task {
            id: format!("task_{}", &Uuid::new_v4().simple().to_string()[..8]),
            goal: request.goal,
            priority,
            deadline: request.deadline,
            resources_required: request.resources_required,
            preemptible: request.preemptible,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            metadata: request.metadata,
        })
    }
}
