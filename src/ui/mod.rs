pub mod theme;

use crate::app::{AppModel, DeleteConfirmDialog, DeleteConfirmSelection, Mode, TaskForm, TextInput, View};
use crate::domain::{Row as TaskRow, Task, format_duration, format_timestamp};
use ratatui::prelude::*;
use ratatui::widgets::*;
use time::{OffsetDateTime, UtcOffset};
use unicode_width::UnicodeWidthChar;
use unicode_width::UnicodeWidthStr;

pub use theme::Theme;

const DETAIL_HEIGHT: u16 = 8;

pub fn render(frame: &mut Frame, model: &AppModel, theme: &Theme) {
    let full_area = frame.area();
    if full_area.width == 0 || full_area.height == 0 {
        return;
    }

    let area = inner_area(full_area);
    let prompt_height = match model.mode() {
        Mode::Search | Mode::Period => 1,
        _ => 0,
    };
    let detail_height = if model.expanded_task().is_some() {
        DETAIL_HEIGHT
    } else {
        0
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(detail_height),
            Constraint::Length(prompt_height),
            Constraint::Length(2),
        ])
        .split(area);

    render_table(frame, chunks[0], model, theme);
    if let Some(task) = model.expanded_task() {
        render_detail(frame, chunks[1], task, model);
    }
    match model.mode() {
        Mode::Search => render_prompt(frame, chunks[2], model.case_mode.label(), &model.search_input),
        Mode::Period => render_prompt(frame, chunks[2], "[Period]", &model.period_input),
        _ => {}
    }
    render_footer(frame, chunks[3], model);

    match &model.view {
        View::Add(form) => render_form_overlay(frame, area, "New Task", form),
        View::Edit(form) => {
            let title = match &form.original {
                Some(task) => format!("Edit Task {}", task.id()),
                None => "Edit Task".to_string(),
            };
            render_form_overlay(frame, area, &title, form);
        }
        View::DeleteConfirm(dialog) => render_delete_confirm_overlay(frame, area, dialog),
        View::Table | View::Search | View::Period => {}
    }

    if model.help_open {
        render_help_overlay(frame, area);
    }
}

fn render_table(frame: &mut Frame, area: Rect, model: &AppModel, theme: &Theme) {
    let mut title = format!("Tasks ({})", model.visible_rows.len());
    if !model.period_expression.is_empty() {
        title.push_str(&format!(" · period {}", model.period_expression));
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme::BORDER))
        .title(title);

    if model.visible_rows.is_empty() {
        let message = if model.loading {
            "Loading tasks…"
        } else if model.search_terms.is_empty() && model.search_input.is_empty() {
            "No tasks."
        } else {
            "No tasks match the current search."
        };
        let paragraph = Paragraph::new(message)
            .style(Style::default().fg(theme::MUTED))
            .block(block.padding(Padding::horizontal(1)));
        frame.render_widget(paragraph, area);
        return;
    }

    let header = Row::new(["ID", "Tags", "Start", "End", "Duration", "Note"]).style(
        Style::default()
            .fg(theme.header)
            .add_modifier(Modifier::BOLD),
    );
    let rows = model
        .visible_rows
        .iter()
        .enumerate()
        .map(|(index, row)| table_row(row, index, model, theme));
    let widths = [
        Constraint::Length(id_column_width(&model.visible_rows)),
        Constraint::Fill(2),
        Constraint::Length(19),
        Constraint::Length(19),
        Constraint::Length(9),
        Constraint::Fill(3),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .column_spacing(2)
        .row_highlight_style(
            Style::default()
                .fg(theme::SELECTED_FG)
                .bg(theme::SELECTED_BG)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");

    let mut state = TableState::default().with_selected(Some(model.selected));
    frame.render_stateful_widget(table, area, &mut state);
}

fn table_row(row: &TaskRow, index: usize, model: &AppModel, theme: &Theme) -> Row<'static> {
    let running = model
        .find_task(row.id)
        .is_some_and(|task| task.is_running());
    let id = if running {
        Cell::from(Span::styled(
            format!("● {}", row.id),
            Style::default().fg(theme::SUCCESS),
        ))
    } else {
        Cell::from(format!("  {}", row.id))
    };
    let [_, tags, start, end, duration, note] = row.cells();
    Row::new(vec![
        id,
        Cell::from(tags),
        Cell::from(start),
        Cell::from(end),
        Cell::from(duration),
        Cell::from(note),
    ])
    .style(Style::default().fg(theme.row_color(row, index)))
}

fn id_column_width(rows: &[TaskRow]) -> u16 {
    let widest = rows
        .iter()
        .map(|row| row.id.to_string().len())
        .max()
        .unwrap_or(2);
    (widest + 2).max(4) as u16
}

fn render_detail(frame: &mut Frame, area: Rect, task: &Task, model: &AppModel) {
    if area.height == 0 {
        return;
    }
    let max_width = (area.width as usize).saturating_sub(4);
    let lines: Vec<Line> = detail_lines(task, model.now(), model.utc_offset)
        .into_iter()
        .map(|(label, value)| {
            Line::from(vec![
                Span::styled(
                    pad_right(&format!("{label}:"), 9),
                    Style::default().fg(theme::MUTED),
                ),
                Span::raw(truncate_end(&value, max_width.saturating_sub(9))),
            ])
        })
        .collect();
    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme::BORDER))
            .padding(Padding::horizontal(1))
            .title(format!("Task {}", task.id())),
    );
    frame.render_widget(paragraph, area);
}

/// Label/value pairs shown in the detail panel of the selected task.
fn detail_lines(task: &Task, now: OffsetDateTime, offset: UtcOffset) -> Vec<(&'static str, String)> {
    let end = match task.end() {
        Some(end) => format_timestamp(end, offset),
        None => "running".to_string(),
    };
    let tags = if task.tags().is_empty() {
        "-".to_string()
    } else {
        task.tags_joined(", ")
    };
    let note = if task.note().is_empty() {
        "-".to_string()
    } else {
        task.note().to_string()
    };
    vec![
        ("ID", task.id().to_string()),
        ("Tags", tags),
        ("Start", format_timestamp(task.start(), offset)),
        ("End", end),
        ("Elapsed", format_duration(task.elapsed(now))),
        ("Note", note),
    ]
}

fn render_prompt(frame: &mut Frame, area: Rect, label: &str, input: &TextInput) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    let prefix = format!("{label}> ");
    let prefix_style = if input.invalid {
        Style::default().fg(theme::ERROR).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(theme::ACCENT).add_modifier(Modifier::BOLD)
    };
    let value = if input.is_empty() {
        Span::styled(input.placeholder.clone(), Style::default().fg(theme::MUTED))
    } else if input.invalid {
        Span::styled(input.value().to_string(), Style::default().fg(theme::ERROR))
    } else {
        Span::raw(input.value().to_string())
    };
    let line = Line::from(vec![Span::styled(prefix.clone(), prefix_style), value]);
    frame.render_widget(Paragraph::new(line), area);

    let x = area.x.saturating_add(UnicodeWidthStr::width(prefix.as_str()) as u16);
    set_input_cursor(frame, area, x, input);
}

fn set_input_cursor(frame: &mut Frame, area: Rect, x: u16, input: &TextInput) {
    let offset: u16 = input
        .value()
        .chars()
        .take(input.cursor())
        .map(|ch| UnicodeWidthChar::width(ch).unwrap_or(0) as u16)
        .fold(0, u16::saturating_add);
    let right_edge = area.x.saturating_add(area.width.saturating_sub(1));
    let x = x.saturating_add(offset).min(right_edge);
    frame.set_cursor_position(Position { x, y: area.y });
}

fn render_footer(frame: &mut Frame, area: Rect, model: &AppModel) {
    if area.height == 0 {
        return;
    }
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    let mut spans = vec![Span::raw(status_line(model))];
    if model.loading {
        spans.push(Span::raw("  ·  "));
        spans.push(Span::styled(
            "Loading…",
            Style::default().fg(theme::ACCENT).add_modifier(Modifier::BOLD),
        ));
    }
    let status = Paragraph::new(Line::from(spans)).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status, chunks[0]);

    let keys = footer_with_notice(keys_line(model.mode()).to_string(), model.notice.as_deref());
    let keys = Paragraph::new(truncate_end(&keys, area.width as usize))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(keys, chunks[1]);
}

/// Search terms, period, case mode and refresh time.
fn status_line(model: &AppModel) -> String {
    let mut parts = Vec::new();
    if !model.search_terms.is_empty() {
        parts.push(format!("Search: {}", model.search_terms.join(" / ")));
    }
    if !model.period_expression.is_empty() {
        parts.push(format!("Period: {}", model.period_expression));
    }
    parts.push(format!("Case: {}", model.case_mode.label()));
    if let Some(at) = model.last_refreshed_at {
        parts.push(format!("Refreshed {}", format_timestamp(at, model.utc_offset)));
    }
    parts.join("  ·  ")
}

fn keys_line(mode: Mode) -> &'static str {
    match mode {
        Mode::Table => {
            "Keys: ↑/↓ move  Enter details  /=search  p=period  n=new  e=edit  d=delete  c=continue  s=stop  r=refresh  ?=help  q=quit"
        }
        Mode::Search => "Keys: type to filter  Enter commit  Ctrl+W drop term  Ctrl+S case  Ctrl+L clear  Esc back",
        Mode::Period => "Keys: -1m, 2w, -10d  Enter load  Ctrl+L clear  Esc back",
        Mode::Add | Mode::Edit => "Keys: Tab/Shift+Tab move  Enter next/submit  Ctrl+L clear  Esc cancel",
        Mode::DeleteConfirm => "Keys: ←/→ choose  Enter confirm  Esc cancel  y/n",
    }
}

fn footer_with_notice(mut base: String, notice: Option<&str>) -> String {
    if let Some(message) = notice {
        if !message.trim().is_empty() {
            base.push_str("  ·  ");
            base.push_str(message);
        }
    }
    base
}

fn render_form_overlay(frame: &mut Frame, area: Rect, title: &str, form: &TaskForm) {
    let popup = centered_rect(72, 70, area);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme::BORDER))
        .padding(Padding::horizontal(1))
        .title(title.to_string());
    let inner = block.inner(popup);
    frame.render_widget(block, popup);
    if inner.width == 0 || inner.height == 0 {
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(inner);

    let label_width = form
        .fields
        .iter()
        .map(|field| UnicodeWidthStr::width(field.label.as_str()))
        .max()
        .unwrap_or(0)
        + 2;
    let prefix_width = 2 + label_width;
    let value_width = (chunks[0].width as usize).saturating_sub(prefix_width);

    let mut lines = Vec::new();
    for (index, field) in form.fields.iter().enumerate() {
        let focused = index == form.focused;
        let marker = if focused { "▸ " } else { "  " };
        let label_style = if field.input.invalid {
            Style::default().fg(theme::ERROR).add_modifier(Modifier::BOLD)
        } else if focused {
            Style::default().fg(theme::ACCENT).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme::MUTED)
        };
        let value = if field.input.is_empty() {
            Span::styled(
                truncate_end(&field.input.placeholder, value_width),
                Style::default().fg(Color::DarkGray),
            )
        } else if field.input.invalid {
            Span::styled(
                truncate_end(field.input.value(), value_width),
                Style::default().fg(theme::ERROR),
            )
        } else {
            Span::raw(truncate_end(field.input.value(), value_width))
        };
        lines.push(Line::from(vec![
            Span::styled(marker, label_style),
            Span::styled(pad_right(&format!("{}:", field.label), label_width), label_style),
            value,
        ]));
    }
    if form.has_invalid_input() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Timestamps use YYYY-MM-DD HH:MM:SS.",
            Style::default().fg(theme::ERROR),
        )));
    }
    frame.render_widget(Paragraph::new(lines), chunks[0]);

    if let Some(field) = form.fields.get(form.focused) {
        let row = form.focused as u16;
        if row < chunks[0].height {
            let line_area = Rect {
                y: chunks[0].y.saturating_add(row),
                height: 1,
                ..chunks[0]
            };
            let x = line_area.x.saturating_add(prefix_width as u16);
            set_input_cursor(frame, line_area, x, &field.input);
        }
    }

    let hint = Paragraph::new(keys_line(Mode::Add))
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(hint, chunks[1]);
}

fn render_delete_confirm_overlay(frame: &mut Frame, area: Rect, dialog: &DeleteConfirmDialog) {
    let popup = centered_rect(60, 36, area);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .padding(Padding::horizontal(1))
        .title("Delete Task");
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(inner);

    let max_line_width = (chunks[0].width as usize).saturating_sub(1);
    let message = vec![
        Line::from(vec![
            Span::raw("Delete task "),
            Span::styled(
                dialog.task_id.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw("?"),
        ]),
        Line::from(""),
        Line::from(truncate_end(&dialog.summary, max_line_width)),
        Line::from(""),
        Line::from(vec![Span::styled(
            "The time span is removed from the server.",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )]),
    ];
    frame.render_widget(Paragraph::new(message).wrap(Wrap { trim: false }), chunks[0]);

    let no_style = if dialog.selection == DeleteConfirmSelection::No {
        Style::default()
            .add_modifier(Modifier::REVERSED)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    let yes_base = Style::default().fg(Color::Red);
    let yes_style = if dialog.selection == DeleteConfirmSelection::Yes {
        yes_base
            .add_modifier(Modifier::REVERSED)
            .add_modifier(Modifier::BOLD)
    } else {
        yes_base.add_modifier(Modifier::BOLD)
    };

    let buttons = Paragraph::new(Line::from(vec![
        Span::styled("[ No ]", no_style),
        Span::raw("   "),
        Span::styled("[ Yes ]", yes_style),
    ]))
    .alignment(Alignment::Center);
    frame.render_widget(buttons, chunks[1]);

    let hint = Paragraph::new(keys_line(Mode::DeleteConfirm))
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(hint, chunks[2]);
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup = centered_rect(74, 80, area);
    frame.render_widget(Clear, popup);

    let text = vec![
        Line::from("Table"),
        Line::from("  - Arrows or j/k: move selection, PgUp/PgDn: page"),
        Line::from("  - Enter: toggle the detail panel"),
        Line::from("  - n: new task, e/u: edit, d: delete"),
        Line::from("  - c: continue selected task, s: stop running task"),
        Line::from("  - r: refresh from the server"),
        Line::from("  - Ctrl+W: drop last search term, Ctrl+L: reset search and period"),
        Line::from(""),
        Line::from("Search (/)"),
        Line::from("  - Type to filter; a space or Enter commits the term"),
        Line::from("  - Every term must match tags, note or start"),
        Line::from("  - Ctrl+S: toggle case sensitivity, Ctrl+L: clear"),
        Line::from(""),
        Line::from("Period (p)"),
        Line::from("  - -1m, 2w, -10d: load tasks between now and the shifted date"),
        Line::from("  - Ctrl+L: back to the refreshed task list"),
        Line::from(""),
        Line::from("Global"),
        Line::from("  - Esc: back, q: close details or quit from the table, Ctrl+C: quit"),
        Line::from("  - ?: toggle this help"),
    ];

    let paragraph = Paragraph::new(text).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .padding(Padding::horizontal(1))
            .title("Help (? or Esc to close)"),
    );
    frame.render_widget(paragraph, popup);
}

fn pad_right(text: &str, width: usize) -> String {
    let current = UnicodeWidthStr::width(text);
    if current >= width {
        return text.to_string();
    }
    format!("{}{}", text, " ".repeat(width.saturating_sub(current)))
}

fn truncate_end(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(text) <= max_width {
        return text.to_string();
    }
    let ellipsis = "…";
    let available = max_width.saturating_sub(UnicodeWidthStr::width(ellipsis));
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + width > available {
            break;
        }
        used += width;
        out.push(ch);
    }
    out.push_str(ellipsis);
    out
}

fn inner_area(area: Rect) -> Rect {
    if area.width < 40 || area.height < 12 {
        return area;
    }
    area.inner(Margin {
        vertical: 1,
        horizontal: 2,
    })
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
