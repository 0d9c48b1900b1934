mod form;
mod text_input;
mod worker;

use crate::domain::{
    CaseMode, DateRange, Period, Row, Task, TaskId, apply_filter, export_rows, resolve_period,
    split_live_text,
};
use crate::infra::{Mutation, ServiceError, TagField};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use thiserror::Error;
use time::{OffsetDateTime, UtcOffset};

pub use form::{FieldRole, FormError, FormField, TaskForm};
pub use text_input::TextInput;
pub use worker::{run_fetch, run_mutation};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("terminal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    ResolveConfigPath(#[from] crate::infra::ResolveConfigPathError),

    #[error(transparent)]
    LoadConfig(#[from] crate::infra::LoadConfigError),

    #[error(transparent)]
    Logging(#[from] crate::infra::InitLoggingError),
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum InitialView {
    #[default]
    Table,
    Search,
    Period,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Table,
    Search,
    Period,
    Edit,
    Add,
    DeleteConfirm,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DeleteConfirmSelection {
    Yes,
    #[default]
    No,
}

impl DeleteConfirmSelection {
    fn toggle(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeleteConfirmDialog {
    pub task_id: TaskId,
    pub summary: String,
    pub selection: DeleteConfirmSelection,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum View {
    Table,
    Search,
    Period,
    Add(TaskForm),
    Edit(TaskForm),
    DeleteConfirm(DeleteConfirmDialog),
}

impl View {
    pub fn mode(&self) -> Mode {
        match self {
            Self::Table => Mode::Table,
            Self::Search => Mode::Search,
            Self::Period => Mode::Period,
            Self::Add(_) => Mode::Add,
            Self::Edit(_) => Mode::Edit,
            Self::DeleteConfirm(_) => Mode::DeleteConfirm,
        }
    }
}

/// Where a fetch result goes: the origin rows or the period rows.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchSource {
    Refresh,
    Period,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FetchRequest {
    Refresh { include_completed: bool },
    Range(DateRange),
}

impl FetchRequest {
    pub fn source(&self) -> FetchSource {
        match self {
            Self::Refresh { .. } => FetchSource::Refresh,
            Self::Range(_) => FetchSource::Period,
        }
    }
}

#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize(u16, u16),
    Loaded {
        seq: u64,
        source: FetchSource,
        result: Result<Vec<Task>, ServiceError>,
    },
    Mutated {
        label: String,
        result: Result<(), ServiceError>,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AppCommand {
    None,
    Quit,
    Fetch { seq: u64, request: FetchRequest },
    /// Runs the mutation, then a full refresh tagged with `seq`.
    Mutate { seq: u64, mutation: Mutation },
}

#[derive(Clone, Debug)]
pub struct AppModel {
    pub tasks: Vec<Task>,
    pub period_tasks: Vec<Task>,
    pub origin_rows: Vec<Row>,
    pub visible_rows: Vec<Row>,
    pub view: View,
    pub search_input: TextInput,
    pub search_terms: Vec<String>,
    pub case_mode: CaseMode,
    pub period_input: TextInput,
    pub period_expression: String,
    pub selected: usize,
    pub expanded_task_id: Option<TaskId>,
    pub last_refreshed_at: Option<OffsetDateTime>,
    pub notice: Option<String>,
    pub help_open: bool,
    pub latest_seq: u64,
    pub loading: bool,
    pub tag_fields: Vec<TagField>,
    pub utc_offset: UtcOffset,
    pub terminal_size: (u16, u16),
    pub clock: fn() -> OffsetDateTime,
}

impl AppModel {
    pub fn new(tag_fields: Vec<TagField>, utc_offset: UtcOffset, initial: InitialView) -> Self {
        let view = match initial {
            InitialView::Table => View::Table,
            InitialView::Search => View::Search,
            InitialView::Period => View::Period,
        };
        Self {
            tasks: Vec::new(),
            period_tasks: Vec::new(),
            origin_rows: Vec::new(),
            visible_rows: Vec::new(),
            view,
            search_input: TextInput::new("Search term", 0),
            search_terms: Vec::new(),
            case_mode: CaseMode::Insensitive,
            period_input: TextInput::new("-1m, 2w, -10d", 12),
            period_expression: String::new(),
            selected: 0,
            expanded_task_id: None,
            last_refreshed_at: None,
            notice: None,
            help_open: false,
            latest_seq: 0,
            loading: false,
            tag_fields,
            utc_offset,
            terminal_size: (0, 0),
            clock: OffsetDateTime::now_utc,
        }
    }

    pub fn mode(&self) -> Mode {
        self.view.mode()
    }

    pub fn now(&self) -> OffsetDateTime {
        (self.clock)().to_offset(self.utc_offset)
    }

    pub fn selected_row(&self) -> Option<&Row> {
        self.visible_rows.get(self.selected)
    }

    /// Looks in the origin set first, then in the period results.
    pub fn find_task(&self, id: TaskId) -> Option<&Task> {
        self.tasks
            .iter()
            .chain(self.period_tasks.iter())
            .find(|task| task.id() == id)
    }

    pub fn selected_task(&self) -> Option<&Task> {
        let id = self.selected_row()?.id;
        self.find_task(id)
    }

    pub fn expanded_task(&self) -> Option<&Task> {
        self.find_task(self.expanded_task_id?)
    }

    fn next_seq(&mut self) -> u64 {
        self.latest_seq += 1;
        self.loading = true;
        self.latest_seq
    }

    fn refresh_command(&mut self) -> AppCommand {
        let seq = self.next_seq();
        AppCommand::Fetch {
            seq,
            request: FetchRequest::Refresh {
                include_completed: true,
            },
        }
    }

    fn mutate(&mut self, mutation: Mutation) -> AppCommand {
        let seq = self.next_seq();
        AppCommand::Mutate { seq, mutation }
    }

    fn clamp_selection(&mut self) {
        self.selected = self.selected.min(self.visible_rows.len().saturating_sub(1));
        if self.expanded_task_id.is_some() {
            self.expanded_task_id = self.selected_row().map(|row| row.id);
        }
    }

    /// Re-derives the visible rows from origin using the committed terms and
    /// the live search text.
    fn apply_search(&mut self) {
        self.visible_rows = apply_filter(
            &self.origin_rows,
            &self.search_terms,
            self.search_input.value(),
            self.case_mode,
        );
        self.clamp_selection();
    }

    fn restore_origin(&mut self) {
        self.visible_rows = self.origin_rows.clone();
        self.clamp_selection();
    }
}

/// Issues the first refresh of a console session.
pub fn start(mut model: AppModel) -> (AppModel, AppCommand) {
    let command = model.refresh_command();
    (model, command)
}

pub fn update(model: AppModel, event: AppEvent) -> (AppModel, AppCommand) {
    match event {
        AppEvent::Key(key) => update_on_key(model, key),
        AppEvent::Resize(width, height) => {
            let mut model = model;
            model.terminal_size = (width, height);
            (model, AppCommand::None)
        }
        AppEvent::Loaded {
            seq,
            source,
            result,
        } => (update_on_loaded(model, seq, source, result), AppCommand::None),
        AppEvent::Mutated { label, result } => {
            let mut model = model;
            model.notice = Some(match result {
                Ok(()) => format!("{label}."),
                Err(error) => format!("Failed: {error}"),
            });
            (model, AppCommand::None)
        }
    }
}

fn update_on_loaded(
    mut model: AppModel,
    seq: u64,
    source: FetchSource,
    result: Result<Vec<Task>, ServiceError>,
) -> AppModel {
    if seq != model.latest_seq {
        return model;
    }
    model.loading = false;

    let tasks = match result {
        Ok(tasks) => tasks,
        Err(error) => {
            model.notice = Some(format!("Refresh failed: {error}"));
            return model;
        }
    };

    match source {
        FetchSource::Refresh => {
            model.origin_rows = export_rows(&tasks, model.utc_offset);
            model.tasks = tasks;
            model.period_tasks.clear();
            model.last_refreshed_at = Some(model.now());
            model.restore_origin();
        }
        FetchSource::Period => {
            model.visible_rows = export_rows(&tasks, model.utc_offset);
            model.period_tasks = tasks;
            model.selected = 0;
            model.clamp_selection();
        }
    }
    model
}

fn update_on_key(mut model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    model.notice = None;

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && key.code == KeyCode::Char('c') {
        return (model, AppCommand::Quit);
    }

    if model.help_open {
        if matches!(
            key.code,
            KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q') | KeyCode::Enter
        ) {
            model.help_open = false;
        }
        return (model, AppCommand::None);
    }

    let view = std::mem::replace(&mut model.view, View::Table);
    match view {
        View::Table => update_table(model, key),
        View::Search => update_search(model, key),
        View::Period => update_period(model, key),
        View::Add(form) => update_form(model, form, key, View::Add),
        View::Edit(form) => update_form(model, form, key, View::Edit),
        View::DeleteConfirm(dialog) => update_delete_confirm(model, dialog, key),
    }
}

fn update_table(mut model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl {
        match key.code {
            KeyCode::Char('w') => {
                model.search_terms.pop();
                model.apply_search();
            }
            KeyCode::Char('l') => {
                model.search_terms.clear();
                model.search_input.clear();
                model.period_expression.clear();
                model.last_refreshed_at = None;
                model.restore_origin();
            }
            _ => {}
        }
        return (model, AppCommand::None);
    }

    match key.code {
        // An open detail panel is closed before the console quits.
        KeyCode::Char('q') | KeyCode::Esc if model.expanded_task_id.is_some() => {
            model.expanded_task_id = None;
        }
        KeyCode::Char('q') | KeyCode::Esc => return (model, AppCommand::Quit),
        KeyCode::Char('?') => model.help_open = true,
        KeyCode::Up | KeyCode::Char('k') => move_selection(&mut model, -1),
        KeyCode::Down | KeyCode::Char('j') => move_selection(&mut model, 1),
        KeyCode::PageUp => {
            let step = page_step(model.terminal_size) as isize;
            move_selection(&mut model, -step);
        }
        KeyCode::PageDown => {
            let step = page_step(model.terminal_size) as isize;
            move_selection(&mut model, step);
        }
        KeyCode::Home => move_selection(&mut model, isize::MIN),
        KeyCode::End => move_selection(&mut model, isize::MAX),
        KeyCode::Char('/') => {
            model.search_input.clear();
            model.view = View::Search;
        }
        KeyCode::Char('p') => {
            model.period_input.clear();
            model.period_input.invalid = false;
            model.view = View::Period;
        }
        KeyCode::Char('n') => {
            model.view = View::Add(TaskForm::add(&model.tag_fields));
        }
        KeyCode::Char('e') | KeyCode::Char('u') => {
            let Some(task) = model.selected_task() else {
                model.notice = Some("No task selected.".to_string());
                return (model, AppCommand::None);
            };
            let form = TaskForm::edit(task, &model.tag_fields, model.utc_offset);
            model.view = View::Edit(form);
        }
        KeyCode::Char('d') => {
            let Some(row) = model.selected_row() else {
                model.notice = Some("No task selected.".to_string());
                return (model, AppCommand::None);
            };
            let summary = if row.tags.is_empty() {
                row.note.clone()
            } else {
                row.tags.clone()
            };
            model.view = View::DeleteConfirm(DeleteConfirmDialog {
                task_id: row.id,
                summary,
                selection: DeleteConfirmSelection::No,
            });
        }
        KeyCode::Char('c') => {
            let Some(row) = model.selected_row() else {
                model.notice = Some("No task selected.".to_string());
                return (model, AppCommand::None);
            };
            let id = row.id;
            let command = model.mutate(Mutation::Continue(id));
            return (model, command);
        }
        KeyCode::Char('s') => {
            let Some(task) = model.selected_task() else {
                model.notice = Some("No task selected.".to_string());
                return (model, AppCommand::None);
            };
            if !task.is_running() {
                model.notice = Some(format!("Task {} is already stopped.", task.id()));
                return (model, AppCommand::None);
            }
            let id = task.id();
            let command = model.mutate(Mutation::Stop(id));
            return (model, command);
        }
        KeyCode::Char('r') => {
            let command = model.refresh_command();
            return (model, command);
        }
        KeyCode::Enter => {
            let selected = model.selected_row().map(|row| row.id);
            model.expanded_task_id = match (model.expanded_task_id, selected) {
                (Some(open), Some(id)) if open == id => None,
                (_, id) => id,
            };
        }
        _ => {}
    }
    (model, AppCommand::None)
}

fn move_selection(model: &mut AppModel, delta: isize) {
    if model.visible_rows.is_empty() {
        return;
    }
    let last = model.visible_rows.len() - 1;
    model.selected = model.selected.saturating_add_signed(delta).min(last);
    if model.expanded_task_id.is_some() {
        model.expanded_task_id = model.selected_row().map(|row| row.id);
    }
}

fn update_search(mut model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => {
            model.search_input.clear();
            return (model, AppCommand::None);
        }
        KeyCode::Enter => {
            let live = model.search_input.value().trim().to_string();
            if live.is_empty() {
                return (model, AppCommand::None);
            }
            model.search_terms.push(live);
            model.search_input.clear();
            model.apply_search();
        }
        KeyCode::Char('l') if ctrl => {
            model.search_terms.clear();
            model.search_input.clear();
            model.restore_origin();
        }
        KeyCode::Char('w') if ctrl => {
            model.search_terms.pop();
            model.apply_search();
        }
        KeyCode::Char('s') if ctrl => {
            model.case_mode = model.case_mode.toggled();
            model.apply_search();
        }
        _ => {
            if model.search_input.handle_key(key) {
                let (committed, live) = split_live_text(model.search_input.value());
                if !committed.is_empty() {
                    model.search_terms.extend(committed);
                    model.search_input.set_value(&live);
                }
                model.apply_search();
            }
        }
    }
    model.view = View::Search;
    (model, AppCommand::None)
}

fn update_period(mut model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => {
            model.period_input.clear();
            return (model, AppCommand::None);
        }
        KeyCode::Enter => {
            let expression = model.period_input.value().trim().to_string();
            if expression.is_empty() {
                return (model, AppCommand::None);
            }
            match resolve_period(&expression, model.now()) {
                Ok(range) => {
                    model.period_expression = expression;
                    model.period_input.clear();
                    model.period_input.invalid = false;
                    let seq = model.next_seq();
                    model.view = View::Period;
                    return (
                        model,
                        AppCommand::Fetch {
                            seq,
                            request: FetchRequest::Range(range),
                        },
                    );
                }
                Err(error) => {
                    model.period_input.invalid = true;
                    model.notice = Some(error.to_string());
                }
            }
        }
        KeyCode::Char('l') if ctrl => {
            model.period_expression.clear();
            model.period_input.clear();
            model.period_input.invalid = false;
            model.period_tasks.clear();
            // Drops any period fetch still in flight.
            model.latest_seq += 1;
            model.loading = false;
            model.restore_origin();
        }
        _ => {
            if model.period_input.handle_key(key) {
                let value = model.period_input.value().trim();
                model.period_input.invalid = !value.is_empty() && Period::parse(value).is_err();
            }
        }
    }
    model.view = View::Period;
    (model, AppCommand::None)
}

fn update_form(
    mut model: AppModel,
    mut form: TaskForm,
    key: KeyEvent,
    wrap: fn(TaskForm) -> View,
) -> (AppModel, AppCommand) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => return (model, AppCommand::None),
        KeyCode::Tab | KeyCode::Down => form.focus_next(),
        KeyCode::BackTab | KeyCode::Up => form.focus_prev(),
        KeyCode::Char('l') if ctrl => form.clear(),
        KeyCode::Enter if !form.is_last_focused() => form.focus_next(),
        KeyCode::Enter => match form.submit(model.utc_offset) {
            Ok(Some(mutation)) => {
                let command = model.mutate(mutation);
                return (model, command);
            }
            Ok(None) => {
                if form.original.is_some() {
                    model.notice = Some("Nothing changed.".to_string());
                }
            }
            Err(error) => model.notice = Some(error.to_string()),
        },
        _ => {
            form.handle_key(key, model.utc_offset);
        }
    }
    model.view = wrap(form);
    (model, AppCommand::None)
}

fn update_delete_confirm(
    mut model: AppModel,
    mut dialog: DeleteConfirmDialog,
    key: KeyEvent,
) -> (AppModel, AppCommand) {
    match key.code {
        KeyCode::Esc => return (model, AppCommand::None),
        KeyCode::Char('y') | KeyCode::Char('Y') => dialog.selection = DeleteConfirmSelection::Yes,
        KeyCode::Char('n') | KeyCode::Char('N') => dialog.selection = DeleteConfirmSelection::No,
        KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::BackTab => {
            dialog.selection = dialog.selection.toggle();
        }
        KeyCode::Enter => {
            if dialog.selection == DeleteConfirmSelection::Yes {
                let command = model.mutate(Mutation::Delete(dialog.task_id));
                return (model, command);
            }
            return (model, AppCommand::None);
        }
        _ => {}
    }
    model.view = View::DeleteConfirm(dialog);
    (model, AppCommand::None)
}

fn inner_terminal_size(terminal_size: (u16, u16)) -> (u16, u16) {
    let (width, height) = terminal_size;
    if width < 40 || height < 12 {
        return (width, height);
    }
    (width.saturating_sub(4), height.saturating_sub(2))
}

fn page_step(terminal_size: (u16, u16)) -> usize {
    if terminal_size == (0, 0) {
        return 10;
    }
    let (_width, height) = inner_terminal_size(terminal_size);
    // header 3 + footer 2
    height.saturating_sub(6).max(1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Tag, TaskBase};
    use time::macros::datetime;

    fn fixed_now() -> OffsetDateTime {
        datetime!(2025-08-22 12:00:00 UTC)
    }

    fn task(id: TaskId, running: bool, ticket: &str, note: &str) -> Task {
        let start = datetime!(2025-08-20 09:00:00 UTC) + time::Duration::hours(id);
        let base = TaskBase {
            id,
            start,
            old_start: None,
            tags: vec![Tag::new("ticket", ticket)],
            note: note.to_string(),
        };
        if running {
            Task::Running(base)
        } else {
            Task::Completed {
                base,
                end: start + time::Duration::minutes(45),
            }
        }
    }

    fn tag_fields() -> Vec<TagField> {
        vec![TagField {
            name: "ticket".to_string(),
            example: "AA-1234".to_string(),
            char_limit: 20,
            width: 20,
            position: 0,
        }]
    }

    fn loaded_model() -> AppModel {
        let mut model = AppModel::new(tag_fields(), UtcOffset::UTC, InitialView::Table);
        model.clock = fixed_now;
        let (model, command) = start(model);
        let AppCommand::Fetch { seq, .. } = command else {
            panic!("expected initial fetch");
        };
        let (model, _) = update(
            model,
            AppEvent::Loaded {
                seq,
                source: FetchSource::Refresh,
                result: Ok(vec![
                    task(1, true, "AA-1", "Refactor parser"),
                    task(2, false, "BB-2", "Standup meeting"),
                    task(3, false, "AA-3", "Planning meeting"),
                ]),
            },
        );
        model
    }

    fn press(model: AppModel, code: KeyCode) -> (AppModel, AppCommand) {
        update(model, AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE)))
    }

    fn ctrl(model: AppModel, ch: char) -> (AppModel, AppCommand) {
        update(
            model,
            AppEvent::Key(KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)),
        )
    }

    fn type_text(mut model: AppModel, text: &str) -> AppModel {
        for ch in text.chars() {
            model = press(model, KeyCode::Char(ch)).0;
        }
        model
    }

    fn visible_ids(model: &AppModel) -> Vec<TaskId> {
        model.visible_rows.iter().map(|row| row.id).collect()
    }

    #[test]
    fn initial_load_fills_origin_and_visible_rows() {
        let model = loaded_model();
        assert_eq!(model.mode(), Mode::Table);
        assert_eq!(visible_ids(&model), vec![1, 2, 3]);
        assert_eq!(model.origin_rows, model.visible_rows);
        assert_eq!(model.last_refreshed_at, Some(fixed_now()));
        assert!(!model.loading);
    }

    #[test]
    fn delete_requires_yes_before_enter() {
        let (model, _) = press(loaded_model(), KeyCode::Down);
        let (model, _) = press(model, KeyCode::Char('d'));
        assert_eq!(model.mode(), Mode::DeleteConfirm);
        let (model, _) = press(model, KeyCode::Char('n'));
        let (model, command) = press(model, KeyCode::Enter);
        assert_eq!(command, AppCommand::None);
        assert_eq!(model.mode(), Mode::Table);

        let (model, _) = press(model, KeyCode::Char('d'));
        let (model, _) = press(model, KeyCode::Char('y'));
        let (model, command) = press(model, KeyCode::Enter);
        let AppCommand::Mutate { seq, mutation } = command else {
            panic!("expected delete");
        };
        assert_eq!(mutation, Mutation::Delete(2));
        assert_eq!(seq, model.latest_seq);
        assert_eq!(model.mode(), Mode::Table);
    }

    #[test]
    fn delete_defaults_to_no_and_esc_cancels() {
        let (model, _) = press(loaded_model(), KeyCode::Char('d'));
        let (model, command) = press(model, KeyCode::Enter);
        assert_eq!(command, AppCommand::None);

        let (model, _) = press(model, KeyCode::Char('d'));
        let (model, _) = press(model, KeyCode::Tab);
        let (model, command) = press(model, KeyCode::Esc);
        assert_eq!(command, AppCommand::None);
        assert_eq!(model.mode(), Mode::Table);
    }

    #[test]
    fn failed_refresh_keeps_rows() {
        let model = loaded_model();
        let before_origin = model.origin_rows.clone();
        let before_visible = model.visible_rows.clone();

        let (model, command) = press(model, KeyCode::Char('r'));
        let AppCommand::Fetch { seq, .. } = command else {
            panic!("expected fetch");
        };
        assert!(model.loading);
        let (model, _) = update(
            model,
            AppEvent::Loaded {
                seq,
                source: FetchSource::Refresh,
                result: Err(ServiceError::Status(500)),
            },
        );
        assert_eq!(model.origin_rows, before_origin);
        assert_eq!(model.visible_rows, before_visible);
        assert!(model.notice.as_deref().is_some_and(|notice| notice.contains("500")));
    }

    #[test]
    fn stale_results_are_discarded() {
        let model = loaded_model();
        let (model, first) = press(model, KeyCode::Char('r'));
        let (model, second) = press(model, KeyCode::Char('r'));
        let (AppCommand::Fetch { seq: old, .. }, AppCommand::Fetch { seq: new, .. }) =
            (first, second)
        else {
            panic!("expected fetches");
        };
        assert!(new > old);

        let (model, _) = update(
            model,
            AppEvent::Loaded {
                seq: old,
                source: FetchSource::Refresh,
                result: Ok(vec![task(9, true, "ZZ-9", "stale")]),
            },
        );
        assert_eq!(visible_ids(&model), vec![1, 2, 3]);
        assert!(model.loading);

        let (model, _) = update(
            model,
            AppEvent::Loaded {
                seq: new,
                source: FetchSource::Refresh,
                result: Ok(vec![task(8, true, "YY-8", "fresh")]),
            },
        );
        assert_eq!(visible_ids(&model), vec![8]);
    }

    #[test]
    fn live_search_filters_and_commits_terms() {
        let (model, _) = press(loaded_model(), KeyCode::Char('/'));
        assert_eq!(model.mode(), Mode::Search);

        let model = type_text(model, "meet");
        assert_eq!(visible_ids(&model), vec![2, 3]);

        let model = type_text(model, "ing aa-");
        assert_eq!(model.search_terms, vec!["meeting".to_string()]);
        assert_eq!(model.search_input.value(), "aa-");
        assert_eq!(visible_ids(&model), vec![3]);

        let (model, _) = press(model, KeyCode::Enter);
        assert_eq!(model.search_terms, vec!["meeting", "aa-"]);
        assert!(model.search_input.is_empty());

        let (model, _) = ctrl(model, 'w');
        assert_eq!(model.search_terms, vec!["meeting"]);
        assert_eq!(visible_ids(&model), vec![2, 3]);

        let (model, _) = ctrl(model, 'l');
        assert!(model.search_terms.is_empty());
        assert_eq!(model.visible_rows, model.origin_rows);

        let (model, _) = press(model, KeyCode::Enter);
        assert_eq!(model.mode(), Mode::Table);
    }

    #[test]
    fn case_toggle_reapplies_terms() {
        let (model, _) = press(loaded_model(), KeyCode::Char('/'));
        let model = type_text(model, "standup");
        assert_eq!(visible_ids(&model), vec![2]);
        let (model, _) = ctrl(model, 's');
        assert_eq!(model.case_mode, CaseMode::Sensitive);
        assert!(model.visible_rows.is_empty());
    }

    #[test]
    fn esc_from_search_keeps_filtered_rows() {
        let (model, _) = press(loaded_model(), KeyCode::Char('/'));
        let model = type_text(model, "planning");
        let (model, _) = press(model, KeyCode::Enter);
        let (model, _) = press(model, KeyCode::Esc);
        assert_eq!(model.mode(), Mode::Table);
        assert_eq!(visible_ids(&model), vec![3]);
    }

    #[test]
    fn manual_refresh_keeps_terms_but_resets_rows() {
        let (model, _) = press(loaded_model(), KeyCode::Char('/'));
        let model = type_text(model, "planning");
        let (model, _) = press(model, KeyCode::Enter);
        let (model, _) = press(model, KeyCode::Esc);
        let (model, command) = press(model, KeyCode::Char('r'));
        let AppCommand::Fetch { seq, .. } = command else {
            panic!("expected fetch");
        };
        let tasks = model.tasks.clone();
        let (model, _) = update(
            model,
            AppEvent::Loaded {
                seq,
                source: FetchSource::Refresh,
                result: Ok(tasks),
            },
        );
        assert_eq!(model.search_terms, vec!["planning"]);
        assert_eq!(visible_ids(&model), vec![1, 2, 3]);
    }

    #[test]
    fn invalid_period_is_flagged_without_fetching() {
        let (model, _) = press(loaded_model(), KeyCode::Char('p'));
        let model = type_text(model, "3y");
        assert!(model.period_input.invalid);
        let (model, command) = press(model, KeyCode::Enter);
        assert_eq!(command, AppCommand::None);
        assert_eq!(model.mode(), Mode::Period);
        assert!(model.notice.is_some());
    }

    #[test]
    fn period_results_replace_visible_rows_until_cleared() {
        let (model, _) = press(loaded_model(), KeyCode::Char('p'));
        let model = type_text(model, "-1m");
        let (model, command) = press(model, KeyCode::Enter);
        let AppCommand::Fetch {
            seq,
            request: FetchRequest::Range(range),
        } = command
        else {
            panic!("expected range fetch");
        };
        assert_eq!(range.start, datetime!(2025-07-22 12:00:00 UTC));
        assert_eq!(range.end, fixed_now());
        assert_eq!(model.period_expression, "-1m");

        let origin = model.origin_rows.clone();
        let (model, _) = update(
            model,
            AppEvent::Loaded {
                seq,
                source: FetchSource::Period,
                result: Ok(vec![task(40, false, "OLD-1", "archived")]),
            },
        );
        assert_eq!(visible_ids(&model), vec![40]);
        assert_eq!(model.origin_rows, origin);
        assert!(model.find_task(40).is_some());

        let (model, _) = ctrl(model, 'l');
        assert!(model.period_expression.is_empty());
        assert_eq!(model.visible_rows, origin);

        let (model, _) = press(model, KeyCode::Enter);
        assert_eq!(model.mode(), Mode::Table);
    }

    #[test]
    fn continue_and_stop_issue_mutations() {
        let (model, command) = press(loaded_model(), KeyCode::Char('c'));
        assert!(matches!(
            command,
            AppCommand::Mutate {
                mutation: Mutation::Continue(1),
                ..
            }
        ));

        let (model, command) = press(model, KeyCode::Char('s'));
        assert!(matches!(
            command,
            AppCommand::Mutate {
                mutation: Mutation::Stop(1),
                ..
            }
        ));

        let (model, _) = press(model, KeyCode::Down);
        let (model, command) = press(model, KeyCode::Char('s'));
        assert_eq!(command, AppCommand::None);
        assert!(model.notice.is_some());
    }

    #[test]
    fn mutation_outcome_becomes_a_notice() {
        let (model, _) = update(
            loaded_model(),
            AppEvent::Mutated {
                label: "stopped task 1".to_string(),
                result: Err(ServiceError::Transport("timeout".to_string())),
            },
        );
        assert!(
            model
                .notice
                .as_deref()
                .is_some_and(|notice| notice.contains("timeout"))
        );
        assert_eq!(visible_ids(&model), vec![1, 2, 3]);
    }

    #[test]
    fn add_form_submits_create_and_ignores_empty() {
        let (model, _) = press(loaded_model(), KeyCode::Char('n'));
        assert_eq!(model.mode(), Mode::Add);
        let (model, _) = press(model, KeyCode::Tab);
        let (model, command) = press(model, KeyCode::Enter);
        assert_eq!(command, AppCommand::None);
        assert_eq!(model.mode(), Mode::Add);

        let (model, _) = press(model, KeyCode::Tab);
        let model = type_text(model, "CC-7");
        let (model, _) = press(model, KeyCode::Tab);
        let model = type_text(model, "write docs");
        let (model, command) = press(model, KeyCode::Enter);
        let AppCommand::Mutate { mutation, .. } = command else {
            panic!("expected create");
        };
        assert_eq!(
            mutation,
            Mutation::Create {
                tags: vec![Tag::new("ticket", "CC-7")],
                note: "write docs".to_string(),
            }
        );
        assert_eq!(model.mode(), Mode::Table);
    }

    #[test]
    fn edit_form_submits_update_for_running_task() {
        let (model, _) = press(loaded_model(), KeyCode::Char('e'));
        let View::Edit(form) = &model.view else {
            panic!("expected edit view");
        };
        assert_eq!(form.fields[0].input.value(), "AA-1");

        let (model, _) = press(model, KeyCode::Tab);
        let model = type_text(model, " today");
        let (model, _) = press(model, KeyCode::Tab);
        let (model, _) = press(model, KeyCode::Tab);
        let (model, command) = press(model, KeyCode::Enter);
        let AppCommand::Mutate {
            mutation: Mutation::Update(updated),
            ..
        } = command
        else {
            panic!("expected update");
        };
        assert!(updated.is_running());
        assert_eq!(updated.note(), "Refactor parser today");
        assert_eq!(updated.base().old_start, Some(updated.start()));
        assert_eq!(model.mode(), Mode::Table);
    }

    #[test]
    fn edit_without_changes_stays_open() {
        let (model, _) = press(loaded_model(), KeyCode::Char('u'));
        let (model, _) = press(model, KeyCode::BackTab);
        let (model, command) = press(model, KeyCode::Enter);
        assert_eq!(command, AppCommand::None);
        assert_eq!(model.mode(), Mode::Edit);
        assert_eq!(model.notice.as_deref(), Some("Nothing changed."));
    }

    #[test]
    fn detail_panel_follows_selection() {
        let (model, _) = press(loaded_model(), KeyCode::Enter);
        assert_eq!(model.expanded_task_id, Some(1));
        let (model, _) = press(model, KeyCode::Down);
        assert_eq!(model.expanded_task_id, Some(2));
        let (model, _) = press(model, KeyCode::Enter);
        assert_eq!(model.expanded_task_id, None);
        let (model, _) = press(model, KeyCode::Down);
        assert_eq!(model.expanded_task_id, None);
    }

    #[test]
    fn quit_keys_and_help_overlay() {
        let (model, command) = press(loaded_model(), KeyCode::Char('?'));
        assert_eq!(command, AppCommand::None);
        assert!(model.help_open);
        let (model, command) = press(model, KeyCode::Char('q'));
        assert_eq!(command, AppCommand::None);
        assert!(!model.help_open);

        let (model, _) = press(model, KeyCode::Char('/'));
        let (_, command) = ctrl(model, 'c');
        assert_eq!(command, AppCommand::Quit);

        let (_, command) = press(loaded_model(), KeyCode::Char('q'));
        assert_eq!(command, AppCommand::Quit);
    }

    #[test]
    fn quit_keys_close_the_detail_panel_first() {
        let (model, _) = press(loaded_model(), KeyCode::Enter);
        assert!(model.expanded_task_id.is_some());

        let (model, command) = press(model, KeyCode::Esc);
        assert_eq!(command, AppCommand::None);
        assert_eq!(model.expanded_task_id, None);
        let (_, command) = press(model, KeyCode::Char('q'));
        assert_eq!(command, AppCommand::Quit);

        let (model, _) = press(loaded_model(), KeyCode::Enter);
        let (_, command) = ctrl(model, 'c');
        assert_eq!(command, AppCommand::Quit);
    }

    #[test]
    fn page_keys_clamp_to_bounds() {
        let (model, _) = press(loaded_model(), KeyCode::PageDown);
        assert_eq!(model.selected, 2);
        let (model, _) = press(model, KeyCode::PageUp);
        assert_eq!(model.selected, 0);
    }
}
