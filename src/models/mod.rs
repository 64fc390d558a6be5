pub mod task;

pub use task::{
    ActivityEntry, Attachment, NewTaskRequest, ReorderItem, Task, TaskCategory, TaskStatus,
    UpdateTaskRequest, display_cmp, parse_calendar_date,
};
