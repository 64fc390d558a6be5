//! Drag-and-drop reordering.
//!
//! A move is a pure reducer `(tasks, MoveEvent) -> (tasks', write_set)`.
//! Every partition the move touches is renumbered `0..len`, so orders never
//! collide and no fractional or gapped indexing is needed. The write-set lists
//! every row of the renumbered partition(s); the moved task also carries its
//! new status when it crossed partitions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::{ReorderItem, Task, TaskStatus, display_cmp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPosition {
    pub status: TaskStatus,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveEvent {
    pub task_id: String,
    pub source: TaskPosition,
    pub destination: TaskPosition,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReorderError {
    #[error("task {task_id} is not in the {} partition", .status.as_str())]
    TaskNotInPartition { task_id: String, status: TaskStatus },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reordered {
    pub tasks: Vec<Task>,
    pub writes: Vec<ReorderItem>,
}

/// Ids of one status partition in display order.
pub fn partition_ids(tasks: &[Task], status: TaskStatus) -> Vec<&str> {
    let mut members: Vec<&Task> = tasks.iter().filter(|t| t.status == status).collect();
    members.sort_by(|a, b| display_cmp(a, b));
    members.into_iter().map(|t| t.id.as_str()).collect()
}

pub fn reorder(tasks: &[Task], event: &MoveEvent) -> Result<Reordered, ReorderError> {
    let source = event.source;
    let destination = event.destination;

    if source.status == destination.status && source.index == destination.index {
        return Ok(Reordered {
            tasks: tasks.to_vec(),
            writes: Vec::new(),
        });
    }

    let mut source_ids = partition_ids(tasks, source.status);
    let from = source_ids
        .iter()
        .position(|id| *id == event.task_id)
        .ok_or_else(|| ReorderError::TaskNotInPartition {
            task_id: event.task_id.clone(),
            status: source.status,
        })?;
    if from != source.index {
        debug!(
            "move of {} reported index {} but task sits at {}",
            event.task_id, source.index, from
        );
    }
    let moved = source_ids.remove(from);

    let affected = if source.status == destination.status {
        let at = destination.index.min(source_ids.len());
        source_ids.insert(at, moved);
        vec![(destination.status, source_ids)]
    } else {
        let mut destination_ids = partition_ids(tasks, destination.status);
        let at = destination.index.min(destination_ids.len());
        destination_ids.insert(at, moved);
        vec![(source.status, source_ids), (destination.status, destination_ids)]
    };

    let crossed = source.status != destination.status;
    let writes: Vec<ReorderItem> = affected
        .iter()
        .flat_map(|(status, ids)| {
            ids.iter().enumerate().map(move |(position, id)| ReorderItem {
                id: id.to_string(),
                order: position as i64,
                status: (crossed && *id == moved).then_some(*status),
            })
        })
        .collect();

    let by_id: HashMap<&str, &ReorderItem> = writes.iter().map(|w| (w.id.as_str(), w)).collect();
    let mut next = tasks.to_vec();
    for task in &mut next {
        if let Some(write) = by_id.get(task.id.as_str()) {
            task.order = write.order;
            if let Some(status) = write.status {
                task.status = status;
            }
        }
    }

    Ok(Reordered { tasks: next, writes })
}
