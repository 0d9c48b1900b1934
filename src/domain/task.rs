use std::fmt;
use thiserror::Error;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

pub type TaskId = i64;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// `key:value`; the value may itself contain colons.
    pub fn parse(text: &str) -> Option<Self> {
        let (key, value) = text.split_once(':')?;
        Some(Self::new(key, value))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value)
    }
}

pub fn parse_tags<S: AsRef<str>>(texts: &[S]) -> Vec<Tag> {
    texts
        .iter()
        .filter_map(|text| Tag::parse(text.as_ref()))
        .collect()
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskBase {
    pub id: TaskId,
    pub start: OffsetDateTime,
    /// Only set on a value built by [`Task::update`].
    pub old_start: Option<OffsetDateTime>,
    pub tags: Vec<Tag>,
    pub note: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskKind {
    Running,
    Completed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Task {
    Running(TaskBase),
    Completed { base: TaskBase, end: OffsetDateTime },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TagUpdateMode {
    /// The given tags become the task's tags; none given clears them.
    Replace,
    /// The given tags are appended; none given leaves the tags alone.
    Append,
}

/// Raw text of an edit, as typed by the user.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TaskEdit {
    pub start: String,
    pub end: String,
    pub note: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid timestamp {input:?} (expected YYYY-MM-DD HH:MM:SS)")]
pub struct TimestampParseError {
    pub input: String,
}

impl Task {
    pub fn base(&self) -> &TaskBase {
        match self {
            Self::Running(base) => base,
            Self::Completed { base, .. } => base,
        }
    }

    pub fn id(&self) -> TaskId {
        self.base().id
    }

    pub fn start(&self) -> OffsetDateTime {
        self.base().start
    }

    pub fn end(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Running(_) => None,
            Self::Completed { end, .. } => Some(*end),
        }
    }

    pub fn tags(&self) -> &[Tag] {
        &self.base().tags
    }

    pub fn note(&self) -> &str {
        &self.base().note
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Running(_) => TaskKind::Running,
            Self::Completed { .. } => TaskKind::Completed,
        }
    }

    pub fn is_running(&self) -> bool {
        self.kind() == TaskKind::Running
    }

    pub fn tags_joined(&self, separator: &str) -> String {
        self.tags()
            .iter()
            .map(Tag::to_string)
            .collect::<Vec<_>>()
            .join(separator)
    }

    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags()
            .iter()
            .find(|tag| tag.key == key)
            .map(|tag| tag.value.as_str())
    }

    /// Time spent so far; running tasks are measured up to `now`.
    pub fn elapsed(&self, now: OffsetDateTime) -> Duration {
        self.end().unwrap_or(now) - self.start()
    }

    /// Builds the edited value. A non-empty end yields a completed task, an
    /// empty one a running task; an empty start keeps the current start.
    pub fn update(
        &self,
        edit: &TaskEdit,
        mode: TagUpdateMode,
        offset: UtcOffset,
    ) -> Result<Task, TimestampParseError> {
        let current = self.base();
        let start = match edit.start.trim() {
            "" => current.start,
            text => parse_timestamp(text, offset)?,
        };
        let end = match edit.end.trim() {
            "" => None,
            text => Some(parse_timestamp(text, offset)?),
        };

        let parsed = parse_tags(&edit.tags);
        let tags = match mode {
            TagUpdateMode::Replace => parsed,
            TagUpdateMode::Append => {
                let mut tags = current.tags.clone();
                tags.extend(parsed);
                tags
            }
        };

        let base = TaskBase {
            id: current.id,
            start,
            old_start: Some(current.start),
            tags,
            note: edit.note.clone(),
        };
        Ok(match end {
            Some(end) => Task::Completed { base, end },
            None => Task::Running(base),
        })
    }

    /// Equal ignoring `old_start`.
    pub fn same_content(&self, other: &Task) -> bool {
        let (a, b) = (self.base(), other.base());
        a.id == b.id
            && a.start == b.start
            && a.tags == b.tags
            && a.note == b.note
            && self.end() == other.end()
    }

    pub fn export(&self, offset: UtcOffset) -> Row {
        let (end, duration) = match self.end() {
            Some(end) => (
                format_timestamp(end, offset),
                format_duration(end - self.start()),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        Row {
            id: self.id(),
            tags: self.tags_joined(", "),
            start: format_timestamp(self.start(), offset),
            end,
            duration,
            note: self.note().to_string(),
        }
    }
}

/// Display projection of a [`Task`]; rebuilt whenever the task set changes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Row {
    pub id: TaskId,
    pub tags: String,
    pub start: String,
    pub end: String,
    pub duration: String,
    pub note: String,
}

impl Row {
    pub fn cells(&self) -> [String; 6] {
        [
            self.id.to_string(),
            self.tags.clone(),
            self.start.clone(),
            self.end.clone(),
            self.duration.clone(),
            self.note.clone(),
        ]
    }
}

pub fn export_rows(tasks: &[Task], offset: UtcOffset) -> Vec<Row> {
    tasks.iter().map(|task| task.export(offset)).collect()
}

pub fn parse_timestamp(text: &str, offset: UtcOffset) -> Result<OffsetDateTime, TimestampParseError> {
    let text = text.trim();
    PrimitiveDateTime::parse(
        text,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .map(|value| value.assume_offset(offset))
    .map_err(|_| TimestampParseError {
        input: text.to_string(),
    })
}

pub fn format_timestamp(value: OffsetDateTime, offset: UtcOffset) -> String {
    value
        .to_offset(offset)
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_else(|_| value.to_string())
}

/// Rounded to whole seconds, rendered like `1h2m3s`.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.whole_milliseconds();
    let seconds = if millis >= 0 {
        (millis + 500) / 1000
    } else {
        (millis - 500) / 1000
    };
    if seconds == 0 {
        return "0s".to_string();
    }

    let sign = if seconds < 0 { "-" } else { "" };
    let seconds = seconds.unsigned_abs();
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{sign}{hours}h{minutes}m{secs}s")
    } else if minutes > 0 {
        format!("{sign}{minutes}m{secs}s")
    } else {
        format!("{sign}{secs}s")
    }
}
