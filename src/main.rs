mod app;
mod cli;
mod domain;
mod infra;
mod ui;

use crate::app::{AppCommand, AppEvent, AppModel, FetchRequest, InitialView};
use crate::cli::CliInvocation;
use crate::infra::{
    Config, Mutation, TaskService, TraggoClient, init_logging, load_config, resolve_config_path,
};
use crate::ui::Theme;
use crossterm::event::{
    self, Event, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::terminal::size as terminal_size;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use crossterm::{ExecutableCommand, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::{self, Stdout, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{Sender, channel};
use std::time::Duration;
use thiserror::Error;
use time::UtcOffset;

#[derive(Debug, Error)]
enum MainError {
    #[error(transparent)]
    App(#[from] crate::app::AppError),

    #[error(transparent)]
    Cli(#[from] crate::cli::CliRunError),
}

fn main() {
    if let Err(error) = run_main() {
        log::error!("{error}");
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{error}");
        std::process::exit(1);
    }
}

fn run_main() -> Result<(), MainError> {
    // Must be read while the process is still single-threaded.
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    let args = std::env::args().collect::<Vec<_>>();
    let invocation = match crate::cli::parse_invocation(&args) {
        Ok(invocation) => invocation,
        Err(error) => {
            let mut err = io::stderr().lock();
            let _ = writeln!(err, "{error}");
            let _ = writeln!(err);
            print_help();
            std::process::exit(2);
        }
    };

    match invocation {
        CliInvocation::PrintHelp => {
            print_help();
            Ok(())
        }
        CliInvocation::PrintVersion => {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliInvocation::Console { config, view } => {
            let config = prepare(config)?;
            Ok(run_tui(&config, offset, view)?)
        }
        CliInvocation::Auth { config, url, login } => {
            let path = match config {
                Some(path) => path,
                None => resolve_config_path().map_err(app::AppError::from)?,
            };
            let password = read_password().map_err(app::AppError::from)?;
            let user = crate::cli::run_auth(&path, &url, &login, &password, offset)?;
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "Logged in as {user}; token saved to {}", path.display());
            let _ = writeln!(out, "Edit the file to add tag fields and colors.");
            Ok(())
        }
        CliInvocation::Command { config, command } => {
            let config = prepare(config)?;
            let client = TraggoClient::from_config(&config, offset);
            crate::cli::run(command, &client, offset)?;
            Ok(())
        }
    }
}

/// Loads the config file and starts file logging if it asks for it.
fn prepare(path: Option<PathBuf>) -> Result<Config, crate::app::AppError> {
    let path = match path {
        Some(path) => path,
        None => resolve_config_path()?,
    };
    let config = load_config(&path)?;
    if let Some(log_path) = init_logging(config.log_file.as_deref())? {
        log::info!(
            "{} {} logging to {}, config {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            log_path.display(),
            path.display()
        );
    }
    Ok(config)
}

/// Reads one line from stdin after prompting on stderr.
fn read_password() -> io::Result<String> {
    let mut err = io::stderr().lock();
    write!(err, "Password: ")?;
    err.flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_help() {
    let text = format!(
        "{name} - browse and edit Traggo time spans from the terminal\n\nUSAGE:\n  {name} [--config PATH] [--view table|search|period]  Start the console\n  {name} auth --login NAME [--url URL]  Log in and store a token (password read from stdin)\n  {name} check                        Check the stored token against the server\n  {name} list [--all | --today | [--start-date DATE] [--end-date DATE] [--period EXPR]]\n                                      Print tasks (running only by default)\n  {name} start TAG... [--note TEXT]   Start a task; TAG is key:value\n  {name} stop ID...                   Stop running tasks\n  {name} continue ID|TAG              Start a new task copied from ID or the first task tagged TAG\n  {name} update ID [--start TS] [--end TS] [--note TEXT | --delete-note] [--tag TAG]... [--append]\n                                      --append adds the tags and joins the note to the current one\n  {name} --help | --version\n\nPERIOD:\n  EXPR is a signed amount and a unit: d (days), w (weeks), m (months), e.g. -1m, 2w\n\nTIMESTAMPS:\n  TS is local time as YYYY-MM-DD HH:MM:SS, DATE is a local day as YYYY-MM-DD\n\nOUTPUT:\n  id<TAB>tags<TAB>start<TAB>end<TAB>duration<TAB>note\n\nENV:\n  TRAGGO_CONSOLE_CONFIG  Override the config file (default: ~/.config/traggo_cli/config.json)\n  DEBUG                  Write debug logs to ./{name}.log\n  RUST_LOG               Log filter\n",
        name = env!("CARGO_PKG_NAME")
    );
    let mut out = io::stdout().lock();
    let _ = write!(out, "{text}");
}

fn run_tui(config: &Config, offset: UtcOffset, view: InitialView) -> Result<(), app::AppError> {
    let service: Arc<dyn TaskService> = Arc::new(TraggoClient::from_config(config, offset));
    let theme = Theme::from_config(&config.colors);
    let mut model = AppModel::new(config.tag_fields(), offset, view);

    let mut terminal = setup_terminal()?;
    if let Ok((width, height)) = terminal_size() {
        model.terminal_size = (width, height);
    }
    let result = run(&mut terminal, model, &theme, service);
    restore_terminal(&mut terminal)?;
    result
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, app::AppError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let _ = stdout.execute(PushKeyboardEnhancementFlags(
        KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES,
    ));
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
) -> Result<(), app::AppError> {
    disable_raw_mode()?;
    let _ = execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags);
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    model: AppModel,
    theme: &Theme,
    service: Arc<dyn TaskService>,
) -> Result<(), app::AppError> {
    let (tx, rx) = channel::<AppEvent>();

    let (mut model, command) = app::start(model);
    dispatch(command, &service, &tx);

    loop {
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::Loaded { seq, .. } = &event {
                if *seq != model.latest_seq {
                    log::debug!("discarding stale fetch {seq} (latest {})", model.latest_seq);
                }
            }
            let (next, command) = app::update(model, event);
            model = next;
            if dispatch(command, &service, &tx) {
                return Ok(());
            }
        }

        terminal.draw(|frame| ui::render(frame, &model, theme))?;

        if event::poll(Duration::from_millis(100))? {
            let event = match event::read()? {
                Event::Key(key) if key.kind != KeyEventKind::Release => AppEvent::Key(key),
                Event::Resize(width, height) => AppEvent::Resize(width, height),
                _ => continue,
            };
            let (next, command) = app::update(model, event);
            model = next;
            if dispatch(command, &service, &tx) {
                return Ok(());
            }
        }
    }
}

/// Starts the work a command asks for. Returns true when the console should quit.
fn dispatch(command: AppCommand, service: &Arc<dyn TaskService>, tx: &Sender<AppEvent>) -> bool {
    match command {
        AppCommand::None => false,
        AppCommand::Quit => true,
        AppCommand::Fetch { seq, request } => {
            log::debug!("fetch {seq}: {request:?}");
            spawn_fetch(Arc::clone(service), tx.clone(), seq, request);
            false
        }
        AppCommand::Mutate { seq, mutation } => {
            log::debug!("mutate then fetch {seq}: {mutation:?}");
            spawn_mutation(Arc::clone(service), tx.clone(), seq, mutation);
            false
        }
    }
}

fn spawn_fetch(service: Arc<dyn TaskService>, tx: Sender<AppEvent>, seq: u64, request: FetchRequest) {
    std::thread::spawn(move || {
        let _ = tx.send(app::run_fetch(service.as_ref(), seq, request));
    });
}

fn spawn_mutation(service: Arc<dyn TaskService>, tx: Sender<AppEvent>, seq: u64, mutation: Mutation) {
    std::thread::spawn(move || app::run_mutation(service.as_ref(), seq, mutation, &tx));
}
