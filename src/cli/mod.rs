use crate::app::InitialView;
use crate::domain::{
    DateRange, PeriodError, Row, Tag, TagUpdateMode, Task, TaskEdit, TaskId, TimestampParseError,
    export_rows, format_timestamp, resolve_period,
};
use crate::infra::{
    AuthConfig, LoadConfigError, SaveConfigError, ServiceError, TaskService, TraggoClient,
    fetch_range_all, find_task, find_task_by_tag, read_config_or_default, refresh, save_config,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:3030/graphql";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliInvocation {
    PrintHelp,
    PrintVersion,
    Console {
        config: Option<PathBuf>,
        view: InitialView,
    },
    /// Needs no working config, so it is kept apart from [`CliCommand`].
    Auth {
        config: Option<PathBuf>,
        url: String,
        login: String,
    },
    Command {
        config: Option<PathBuf>,
        command: CliCommand,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliCommand {
    Check,
    List(ListArgs),
    Start { tags: Vec<Tag>, note: String },
    Stop { ids: Vec<TaskId> },
    Continue { target: TaskRef },
    Update(UpdateArgs),
}

/// A task named on the command line, by id or by one of its tags.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TaskRef {
    Id(TaskId),
    Tag(Tag),
}

/// Without a range flag only running tasks are listed (every task with
/// `all`). Dates are whole local days.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ListArgs {
    pub period: Option<String>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub today: bool,
    pub all: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UpdateArgs {
    pub id: TaskId,
    pub start: Option<String>,
    pub end: Option<String>,
    pub note: Option<String>,
    pub delete_note: bool,
    pub tags: Vec<String>,
    /// Appends the tags and the note instead of replacing them.
    pub append: bool,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum CliParseError {
    #[error("unknown subcommand: {0}")]
    UnknownSubcommand(String),

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("missing value for flag: {0}")]
    MissingFlagValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidFlagValue { flag: String, value: String },

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid tag {0:?} (expected key:value)")]
    InvalidTag(String),

    #[error("invalid task id: {0}")]
    InvalidId(String),

    #[error("{0} cannot be combined with {1}")]
    ConflictingFlags(&'static str, &'static str),
}

#[derive(Debug, Error)]
pub enum CliRunError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Period(#[from] PeriodError),

    #[error(transparent)]
    Timestamp(#[from] TimestampParseError),

    #[error(transparent)]
    LoadConfig(#[from] LoadConfigError),

    #[error(transparent)]
    SaveConfig(#[from] SaveConfigError),

    #[error(transparent)]
    WriteOutput(#[from] io::Error),
}

pub fn parse_invocation(args: &[String]) -> Result<CliInvocation, CliParseError> {
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        return Ok(CliInvocation::PrintHelp);
    }
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        return Ok(CliInvocation::PrintVersion);
    }

    let mut iter = args.iter().skip(1).peekable();
    let mut config: Option<PathBuf> = None;
    let mut view = InitialView::Table;
    while let Some(arg) = iter.peek() {
        match arg.as_str() {
            "--config" | "-c" => {
                let _ = iter.next();
                let value = iter
                    .next()
                    .ok_or_else(|| CliParseError::MissingFlagValue("--config".to_string()))?;
                config = Some(PathBuf::from(value));
            }
            "--view" => {
                let _ = iter.next();
                let value = iter
                    .next()
                    .ok_or_else(|| CliParseError::MissingFlagValue("--view".to_string()))?;
                view = parse_view_flag("--view", value)?;
            }
            "--" => {
                let _ = iter.next();
                break;
            }
            _ => break,
        }
    }

    let Some(subcommand) = iter.next() else {
        return Ok(CliInvocation::Console { config, view });
    };

    let rest: Vec<&String> = iter.collect();
    let command = match subcommand.as_str() {
        "auth" => {
            let mut url = DEFAULT_ENDPOINT.to_string();
            let mut login: Option<String> = None;

            let mut args = rest.into_iter();
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--url" => {
                        let value = args.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--url".to_string())
                        })?;
                        url = value.to_string();
                    }
                    "--login" | "-l" => {
                        let value = args.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--login".to_string())
                        })?;
                        login = Some(value.to_string());
                    }
                    _ => return Err(unexpected(arg)),
                }
            }
            let login = login.ok_or(CliParseError::MissingArgument("--login"))?;
            return Ok(CliInvocation::Auth { config, url, login });
        }
        "check" => {
            if let Some(arg) = rest.first() {
                return Err(unexpected(arg));
            }
            CliCommand::Check
        }
        "list" => {
            let mut list = ListArgs::default();

            let mut args = rest.into_iter();
            while let Some(arg) = args.next() {
                let mut value_for = |flag: &str| {
                    args.next()
                        .ok_or_else(|| CliParseError::MissingFlagValue(flag.to_string()))
                };
                match arg.as_str() {
                    "--period" | "-p" => list.period = Some(value_for("--period")?.to_string()),
                    "--start-date" | "-s" => {
                        let value = value_for("--start-date")?;
                        list.start_date = Some(parse_date_arg("--start-date", value)?);
                    }
                    "--end-date" | "-e" => {
                        let value = value_for("--end-date")?;
                        list.end_date = Some(parse_date_arg("--end-date", value)?);
                    }
                    "--today" | "-t" => list.today = true,
                    "--all" | "-a" => list.all = true,
                    _ => return Err(unexpected(arg)),
                }
            }
            check_list_flags(&list)?;
            CliCommand::List(list)
        }
        "start" => {
            let mut tags = Vec::new();
            let mut note = String::new();

            let mut args = rest.into_iter();
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--note" | "-n" => {
                        let value = args.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--note".to_string())
                        })?;
                        note = value.to_string();
                    }
                    _ if arg.starts_with('-') => {
                        return Err(CliParseError::UnknownFlag(arg.to_string()));
                    }
                    _ => tags.push(parse_tag_arg(arg)?),
                }
            }
            if tags.is_empty() && note.is_empty() {
                return Err(CliParseError::MissingArgument("TAG or --note"));
            }
            CliCommand::Start { tags, note }
        }
        "stop" => {
            let mut ids = Vec::new();
            for arg in rest {
                if arg.starts_with('-') {
                    return Err(CliParseError::UnknownFlag(arg.to_string()));
                }
                ids.push(parse_id(arg)?);
            }
            if ids.is_empty() {
                return Err(CliParseError::MissingArgument("ID"));
            }
            CliCommand::Stop { ids }
        }
        "continue" => {
            let mut args = rest.into_iter();
            let target = args
                .next()
                .ok_or(CliParseError::MissingArgument("ID or TAG"))
                .and_then(|arg| parse_task_ref(arg))?;
            if let Some(arg) = args.next() {
                return Err(unexpected(arg));
            }
            CliCommand::Continue { target }
        }
        "update" => {
            let mut id: Option<TaskId> = None;
            let mut update = UpdateArgs::default();

            let mut args = rest.into_iter();
            while let Some(arg) = args.next() {
                let mut value_for = |flag: &str| {
                    args.next()
                        .map(|value| value.to_string())
                        .ok_or_else(|| CliParseError::MissingFlagValue(flag.to_string()))
                };
                match arg.as_str() {
                    "--start" | "--start-date" | "-s" => update.start = Some(value_for("--start")?),
                    "--end" | "--end-date" | "-e" => update.end = Some(value_for("--end")?),
                    "--note" | "-n" => update.note = Some(value_for("--note")?),
                    "--delete-note" | "-d" => update.delete_note = true,
                    "--tag" | "--tags" | "-t" => {
                        let value = value_for("--tag")?;
                        parse_tag_arg(&value)?;
                        update.tags.push(value);
                    }
                    "--append" | "--add" | "-a" => update.append = true,
                    _ if arg.starts_with('-') => {
                        return Err(CliParseError::UnknownFlag(arg.to_string()));
                    }
                    _ => {
                        if id.is_some() {
                            return Err(CliParseError::UnexpectedArgument(arg.to_string()));
                        }
                        id = Some(parse_id(arg)?);
                    }
                }
            }
            update.id = id.ok_or(CliParseError::MissingArgument("ID"))?;
            if update.note.is_some() && update.delete_note {
                return Err(CliParseError::ConflictingFlags("--note", "--delete-note"));
            }
            CliCommand::Update(update)
        }
        other => return Err(CliParseError::UnknownSubcommand(other.to_string())),
    };

    Ok(CliInvocation::Command { config, command })
}

pub fn run(
    command: CliCommand,
    service: &dyn TaskService,
    offset: UtcOffset,
) -> Result<(), CliRunError> {
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let now = OffsetDateTime::now_utc().to_offset(offset);
    execute(command, service, offset, now, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Logs in, checks the new token and stores it, keeping the rest of the
/// config file. Returns the user name the token belongs to.
pub fn run_auth(
    path: &Path,
    url: &str,
    login: &str,
    password: &str,
    offset: UtcOffset,
) -> Result<String, CliRunError> {
    let mut config = read_config_or_default(path)?;
    let timeout = Duration::from_secs(config.request_timeout_secs.max(1));

    let token = TraggoClient::new(url, "", timeout, offset).login(login, password)?;
    let user = TraggoClient::new(url, &token, timeout, offset).ping()?;

    config.auth = AuthConfig {
        url: url.to_string(),
        token,
    };
    save_config(path, &config)?;
    log::info!("stored token for {user} in {}", path.display());
    Ok(user)
}

fn execute(
    command: CliCommand,
    service: &dyn TaskService,
    offset: UtcOffset,
    now: OffsetDateTime,
    out: &mut impl Write,
) -> Result<(), CliRunError> {
    match command {
        CliCommand::Check => {
            let user = service.ping()?;
            write_line(out, &format!("ok\t{user}"))?;
        }
        CliCommand::List(list) => {
            let tasks = match list_range(&list, now, offset)? {
                Some(range) => {
                    log::debug!(
                        "listing {} .. {}",
                        format_timestamp(range.start, offset),
                        format_timestamp(range.end, offset)
                    );
                    let mut tasks = fetch_range_all(service, range.start, range.end)?;
                    if list.today {
                        tasks.extend(service.fetch_running()?);
                    }
                    tasks
                }
                None => refresh(service, list.all)?,
            };
            for row in export_rows(&tasks, offset) {
                if !write_line(out, &row_line(&row))? {
                    return Ok(());
                }
            }
        }
        CliCommand::Start { tags, note } => {
            let task = service.create(&tags, &note)?;
            write_task(out, &task, offset)?;
        }
        CliCommand::Stop { ids } => {
            for id in ids {
                let task = service.stop(id)?;
                write_task(out, &task, offset)?;
            }
        }
        CliCommand::Continue { target } => {
            let id = match target {
                TaskRef::Id(id) => id,
                TaskRef::Tag(tag) => find_task_by_tag(service, &tag)?.id(),
            };
            let task = service.continue_task(id)?;
            write_task(out, &task, offset)?;
        }
        CliCommand::Update(update) => {
            let current = find_task(service, update.id)?;
            let (edit, mode) = build_edit(&current, update, offset);
            let updated = current.update(&edit, mode, offset)?;
            if updated.same_content(&current) {
                write_task(out, &current, offset)?;
                return Ok(());
            }
            let task = service.update(&updated)?;
            write_task(out, &task, offset)?;
        }
    }
    Ok(())
}

/// The range of completed tasks a `list` asks for; `None` for the plain
/// listing. A start date alone runs up to `now`, an end date alone covers
/// everything before it, and a period is anchored at whichever date is given.
fn list_range(
    list: &ListArgs,
    now: OffsetDateTime,
    offset: UtcOffset,
) -> Result<Option<DateRange>, PeriodError> {
    let day_start = |date: Date| date.midnight().assume_offset(offset);
    let day_end = |date: Date| day_start(date).saturating_add(time::Duration::days(1));
    let ordered = |a: OffsetDateTime, b: OffsetDateTime| DateRange {
        start: a.min(b),
        end: a.max(b),
    };

    if list.today {
        return Ok(Some(ordered(day_start(now.to_offset(offset).date()), now)));
    }
    let range = match (list.start_date, list.end_date, list.period.as_deref()) {
        (Some(start), Some(end), _) => ordered(day_start(start), day_end(end)),
        (Some(start), None, Some(period)) => resolve_period(period, day_start(start))?,
        (Some(start), None, None) => ordered(day_start(start), now),
        (None, Some(end), Some(period)) => resolve_period(period, day_end(end))?,
        (None, Some(end), None) => ordered(OffsetDateTime::UNIX_EPOCH, day_end(end)),
        (None, None, Some(period)) => resolve_period(period, now)?,
        (None, None, None) => return Ok(None),
    };
    Ok(Some(range))
}

fn check_list_flags(list: &ListArgs) -> Result<(), CliParseError> {
    let ranged = [
        ("--period", list.period.is_some()),
        ("--start-date", list.start_date.is_some()),
        ("--end-date", list.end_date.is_some()),
    ];
    let first_range_flag = ranged.iter().find(|(_, set)| *set).map(|(flag, _)| *flag);
    if let Some(flag) = first_range_flag {
        if list.today {
            return Err(CliParseError::ConflictingFlags("--today", flag));
        }
        if list.all {
            return Err(CliParseError::ConflictingFlags("--all", flag));
        }
    }
    if list.today && list.all {
        return Err(CliParseError::ConflictingFlags("--today", "--all"));
    }
    if list.period.is_some() && list.start_date.is_some() && list.end_date.is_some() {
        return Err(CliParseError::ConflictingFlags("--period", "--end-date"));
    }
    Ok(())
}

/// Fills the parts not given on the command line from the current task.
/// Without `--tag` the tags stay as they are. An appended note is joined to
/// the current one with `. `.
fn build_edit(current: &Task, update: UpdateArgs, offset: UtcOffset) -> (TaskEdit, TagUpdateMode) {
    let end = update.end.unwrap_or_else(|| {
        current
            .end()
            .map(|end| format_timestamp(end, offset))
            .unwrap_or_default()
    });
    let (tags, mode) = if update.append {
        (update.tags, TagUpdateMode::Append)
    } else if update.tags.is_empty() {
        (
            current.tags().iter().map(Tag::to_string).collect(),
            TagUpdateMode::Replace,
        )
    } else {
        (update.tags, TagUpdateMode::Replace)
    };
    let note = match update.note {
        _ if update.delete_note => String::new(),
        Some(note) if update.append && !current.note().is_empty() => {
            format!("{}. {note}", current.note())
        }
        Some(note) => note,
        None => current.note().to_string(),
    };
    let edit = TaskEdit {
        start: update.start.unwrap_or_default(),
        end,
        note,
        tags,
    };
    (edit, mode)
}

fn row_line(row: &Row) -> String {
    row.cells().join("\t")
}

fn write_task(out: &mut impl Write, task: &Task, offset: UtcOffset) -> io::Result<bool> {
    write_line(out, &row_line(&task.export(offset)))
}

fn write_line(out: &mut impl Write, line: &str) -> io::Result<bool> {
    match writeln!(out, "{line}") {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(false),
        Err(error) => Err(error),
    }
}

fn unexpected(arg: &str) -> CliParseError {
    if arg.starts_with('-') {
        CliParseError::UnknownFlag(arg.to_string())
    } else {
        CliParseError::UnexpectedArgument(arg.to_string())
    }
}

fn parse_tag_arg(value: &str) -> Result<Tag, CliParseError> {
    Tag::parse(value).ok_or_else(|| CliParseError::InvalidTag(value.to_string()))
}

fn parse_id(value: &str) -> Result<TaskId, CliParseError> {
    value
        .parse::<TaskId>()
        .map_err(|_| CliParseError::InvalidId(value.to_string()))
}

fn parse_task_ref(value: &str) -> Result<TaskRef, CliParseError> {
    if value.contains(':') {
        return parse_tag_arg(value).map(TaskRef::Tag);
    }
    parse_id(value).map(TaskRef::Id)
}

fn parse_date_arg(flag: &str, value: &str) -> Result<Date, CliParseError> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]")).map_err(|_| {
        CliParseError::InvalidFlagValue {
            flag: flag.to_string(),
            value: value.to_string(),
        }
    })
}

fn parse_view_flag(flag: &str, value: &str) -> Result<InitialView, CliParseError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "table" => Ok(InitialView::Table),
        "search" => Ok(InitialView::Search),
        "period" => Ok(InitialView::Period),
        _ => Err(CliParseError::InvalidFlagValue {
            flag: flag.to_string(),
            value: value.to_string(),
        }),
    }
}
