use crate::domain::{Cursor, Page, Tag, Task, TaskId};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("service responded with HTTP {0}")]
    Status(u16),

    #[error("service error: {0}")]
    Service(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("no task tagged {0}")]
    TagNotFound(String),
}

/// The remote time-tracking service.
pub trait TaskService: Send + Sync {
    fn fetch_running(&self) -> Result<Vec<Task>, ServiceError>;

    fn fetch_completed(&self, cursor: Cursor) -> Result<Page, ServiceError>;

    fn fetch_range(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
        cursor: Cursor,
    ) -> Result<Page, ServiceError>;

    fn create(&self, tags: &[Tag], note: &str) -> Result<Task, ServiceError>;

    fn update(&self, task: &Task) -> Result<Task, ServiceError>;

    fn delete(&self, id: TaskId) -> Result<(), ServiceError>;

    fn continue_task(&self, id: TaskId) -> Result<Task, ServiceError>;

    fn stop(&self, id: TaskId) -> Result<Task, ServiceError>;

    /// Name of the user the token belongs to.
    fn ping(&self) -> Result<String, ServiceError>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Mutation {
    Create { tags: Vec<Tag>, note: String },
    Update(Task),
    Delete(TaskId),
    Continue(TaskId),
    Stop(TaskId),
}

impl Mutation {
    pub fn label(&self) -> String {
        match self {
            Self::Create { .. } => "Created task".to_string(),
            Self::Update(task) => format!("Updated task {}", task.id()),
            Self::Delete(id) => format!("Deleted task {id}"),
            Self::Continue(id) => format!("Continued task {id}"),
            Self::Stop(id) => format!("Stopped task {id}"),
        }
    }
}

pub fn apply_mutation(service: &dyn TaskService, mutation: &Mutation) -> Result<(), ServiceError> {
    match mutation {
        Mutation::Create { tags, note } => service.create(tags, note).map(|_| ()),
        Mutation::Update(task) => service.update(task).map(|_| ()),
        Mutation::Delete(id) => service.delete(*id),
        Mutation::Continue(id) => service.continue_task(*id).map(|_| ()),
        Mutation::Stop(id) => service.stop(*id).map(|_| ()),
    }
}

/// Running tasks first, then every completed page in the order received.
/// Any failed page aborts the whole refresh.
pub fn refresh(service: &dyn TaskService, include_completed: bool) -> Result<Vec<Task>, ServiceError> {
    let mut tasks = service.fetch_running()?;
    if include_completed {
        tasks.extend(walk_pages(|cursor| service.fetch_completed(cursor))?);
    }
    Ok(tasks)
}

pub fn fetch_range_all(
    service: &dyn TaskService,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<Task>, ServiceError> {
    walk_pages(|cursor| service.fetch_range(start, end, cursor))
}

pub fn find_task(service: &dyn TaskService, id: TaskId) -> Result<Task, ServiceError> {
    search_tasks(service, |task| task.id() == id)?.ok_or(ServiceError::NotFound(id))
}

/// The first task carrying `tag`, running tasks first.
pub fn find_task_by_tag(service: &dyn TaskService, tag: &Tag) -> Result<Task, ServiceError> {
    search_tasks(service, |task| task.tags().contains(tag))?
        .ok_or_else(|| ServiceError::TagNotFound(tag.to_string()))
}

/// Looks through the running tasks, then walks completed pages until a
/// task matches or the pages run out.
fn search_tasks<F>(service: &dyn TaskService, matches: F) -> Result<Option<Task>, ServiceError>
where
    F: Fn(&Task) -> bool,
{
    if let Some(task) = service.fetch_running()?.into_iter().find(|task| matches(task)) {
        return Ok(Some(task));
    }

    let mut cursor = Cursor::first_page();
    loop {
        let page = service.fetch_completed(cursor)?;
        let exhausted = page.tasks.is_empty() || !page.next.has_more;
        if let Some(task) = page.tasks.into_iter().find(|task| matches(task)) {
            return Ok(Some(task));
        }
        if exhausted {
            return Ok(None);
        }
        cursor = cursor.advance(page.next);
    }
}

fn walk_pages<F>(mut fetch: F) -> Result<Vec<Task>, ServiceError>
where
    F: FnMut(Cursor) -> Result<Page, ServiceError>,
{
    let mut tasks = Vec::new();
    let mut cursor = Cursor::first_page();
    loop {
        let page = fetch(cursor)?;
        // An empty page that claims more would loop forever.
        let exhausted = page.tasks.is_empty() || !page.next.has_more;
        tasks.extend(page.tasks);
        if exhausted {
            return Ok(tasks);
        }
        cursor = cursor.advance(page.next);
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use crate::domain::TaskBase;
    use std::sync::Mutex;

    pub fn task(id: TaskId, running: bool) -> Task {
        let start = OffsetDateTime::UNIX_EPOCH + time::Duration::hours(id);
        let base = TaskBase {
            id,
            start,
            old_start: None,
            tags: vec![Tag::new("ticket", format!("T-{id}"))],
            note: format!("note {id}"),
        };
        if running {
            Task::Running(base)
        } else {
            Task::Completed {
                base,
                end: start + time::Duration::minutes(30),
            }
        }
    }

    /// Serves canned pages and records every call it receives.
    #[derive(Default)]
    pub struct FakeService {
        pub running: Vec<Task>,
        pub pages: Vec<Vec<Task>>,
        pub fail_page: Option<usize>,
        pub fail_mutations: bool,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeService {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
        }

        fn record(&self, call: String) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }

        /// Records a mutation call; fails it when `fail_mutations` is set.
        fn mutation(&self, call: String) -> Result<(), ServiceError> {
            self.record(call);
            if self.fail_mutations {
                return Err(ServiceError::Service("rejected".to_string()));
            }
            Ok(())
        }

        fn page(&self, cursor: Cursor) -> Result<Page, ServiceError> {
            let index = (cursor.offset / cursor.page_size) as usize;
            if self.fail_page == Some(index) {
                return Err(ServiceError::Status(502));
            }
            let tasks = self.pages.get(index).cloned().unwrap_or_default();
            Ok(Page {
                tasks,
                next: Cursor {
                    offset: cursor.offset + cursor.page_size,
                    page_size: cursor.page_size,
                    has_more: index + 1 < self.pages.len(),
                },
            })
        }
    }

    impl TaskService for FakeService {
        fn fetch_running(&self) -> Result<Vec<Task>, ServiceError> {
            self.record("running".to_string());
            Ok(self.running.clone())
        }

        fn fetch_completed(&self, cursor: Cursor) -> Result<Page, ServiceError> {
            self.record(format!("completed@{}", cursor.offset));
            self.page(cursor)
        }

        fn fetch_range(
            &self,
            _start: OffsetDateTime,
            _end: OffsetDateTime,
            cursor: Cursor,
        ) -> Result<Page, ServiceError> {
            self.record(format!("range@{}", cursor.offset));
            self.page(cursor)
        }

        fn create(&self, tags: &[Tag], note: &str) -> Result<Task, ServiceError> {
            let tags = tags.iter().map(Tag::to_string).collect::<Vec<_>>().join(",");
            self.mutation(format!("create {tags} {note}"))?;
            Ok(task(99, true))
        }

        fn update(&self, task: &Task) -> Result<Task, ServiceError> {
            self.mutation(format!("update {}", task.id()))?;
            Ok(task.clone())
        }

        fn delete(&self, id: TaskId) -> Result<(), ServiceError> {
            self.mutation(format!("delete {id}"))
        }

        fn continue_task(&self, id: TaskId) -> Result<Task, ServiceError> {
            self.mutation(format!("continue {id}"))?;
            Ok(task(id + 1000, true))
        }

        fn stop(&self, id: TaskId) -> Result<Task, ServiceError> {
            self.mutation(format!("stop {id}"))?;
            Ok(task(id, false))
        }

        fn ping(&self) -> Result<String, ServiceError> {
            self.record("ping".to_string());
            Ok("admin".to_string())
        }
    }
}
