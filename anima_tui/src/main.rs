use anima_core::{
    Color as ActorColor, Direction as MoveDirection,
    puzzle::Cell,
    serialize,
    session::{
        PuzzleSession, SessionConfig, SessionEvent, SessionObserver, SolveOutcome, SolveRequest,
    },
    solver::{CommandSolver, SolverError},
};
use anyhow::{Context, Result};
use clap::Parser;
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, Stdout},
    path::{Path, PathBuf},
    rc::Rc,
    sync::mpsc::{self, Receiver, TryRecvError},
    thread,
    time::{Duration, Instant},
};
use tracing::{info, warn};

mod config;
mod logging;

use config::{SolverConfig, load_config};

const EVENT_LOG_LEN: usize = 8;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Puzzle JSON file to load
    #[arg(short, long, value_name = "PUZZLE_FILE")]
    puzzle: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Solver command line, overriding the config file (e.g. "anima-solve --fast")
    #[arg(short, long, value_name = "COMMAND")]
    solver: Option<String>,

    /// Write logs to this file (filtered by RUST_LOG)
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

/// What the side panel shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Panel {
    Status,
    Json,
    SolverText,
}

impl Panel {
    fn next(self) -> Panel {
        match self {
            Panel::Status => Panel::Json,
            Panel::Json => Panel::SolverText,
            Panel::SolverText => Panel::Status,
        }
    }
}

/// Keeps the most recent session events as display lines.
#[derive(Clone, Default)]
struct EventLog(Rc<RefCell<VecDeque<String>>>);

impl EventLog {
    fn push(&self, line: String) {
        let mut lines = self.0.borrow_mut();
        if lines.len() == EVENT_LOG_LEN {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    fn lines(&self) -> Vec<String> {
        self.0.borrow().iter().cloned().collect()
    }
}

impl SessionObserver for EventLog {
    fn notify(&mut self, event: &SessionEvent) {
        let line = match event {
            SessionEvent::Moved { move_count, .. } => format!("move {move_count}"),
            SessionEvent::Undone { move_count, .. } => format!("undo to {move_count}"),
            SessionEvent::ResetStarted { steps } => format!("resetting {steps} moves"),
            SessionEvent::ResetCancelled => "reset cancelled".to_string(),
            SessionEvent::ResetFinished => "reset".to_string(),
            SessionEvent::Imported { name } => format!("loaded '{name}'"),
            SessionEvent::Solved { optimal: true } => "solved optimally!".to_string(),
            SessionEvent::Solved { optimal: false } => "solved".to_string(),
            SessionEvent::SolutionApplied { moves } => format!("solver played {moves} moves"),
            SessionEvent::SolutionDiscarded => "stale solution discarded".to_string(),
        };
        self.push(line);
    }
}

type SolveResult = (SolveRequest, Result<Vec<MoveDirection>, SolverError>);

struct App {
    /// The puzzle state machine.
    session: PuzzleSession,
    /// File re-read by the import key.
    puzzle_path: PathBuf,
    solver: Option<CommandSolver>,
    /// Answer channel of the solve currently running on a worker thread.
    pending_solve: Option<Receiver<SolveResult>>,
    panel: Panel,
    log: EventLog,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(mut session: PuzzleSession, puzzle_path: PathBuf, solver: Option<CommandSolver>) -> Self {
        let log = EventLog::default();
        session.subscribe(Box::new(log.clone()));
        log.push(format!("loaded '{}'", session.definition().name()));
        App {
            session,
            puzzle_path,
            solver,
            pending_solve: None,
            panel: Panel::Status,
            log,
            should_quit: false,
        }
    }

    fn on_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Right | KeyCode::Char('d') => self.make_move(MoveDirection::Right),
            KeyCode::Up | KeyCode::Char('w') => self.make_move(MoveDirection::Up),
            KeyCode::Left | KeyCode::Char('a') => self.make_move(MoveDirection::Left),
            KeyCode::Down | KeyCode::Char('s') => self.make_move(MoveDirection::Down),
            KeyCode::Char(' ') | KeyCode::Char('z') => {
                self.session.undo();
            }
            KeyCode::Char('r') => {
                self.session.reset();
            }
            KeyCode::Char('i') => self.reimport(),
            KeyCode::Char('p') => self.request_solve(),
            KeyCode::Char('e') => self.panel = self.panel.next(),
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            _ => {}
        }
    }

    fn make_move(&mut self, direction: MoveDirection) {
        self.session.make_move(direction);
    }

    fn reimport(&mut self) {
        let result = std::fs::read_to_string(&self.puzzle_path)
            .with_context(|| format!("read {}", self.puzzle_path.display()))
            .and_then(|text| self.session.import(&text).map_err(Into::into));
        if let Err(err) = result {
            warn!(%err, "reimport failed");
            self.log.push(format!("import failed: {err:#}"));
        }
    }

    fn request_solve(&mut self) {
        let Some(solver) = self.solver.clone() else {
            self.log.push("no solver configured".to_string());
            return;
        };
        if self.pending_solve.is_some() {
            self.log.push("solver already running".to_string());
            return;
        }
        let request = self.session.request_solve();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = request.run(&solver);
            // The receiver is gone if the app quit meanwhile.
            let _ = tx.send((request, result));
        });
        info!(program = solver_name(&self.solver), "solve requested");
        self.log.push("solving...".to_string());
        self.pending_solve = Some(rx);
    }

    /// Handles one step of the event loop that is not driven by input.
    fn tick(&mut self, now: Instant) {
        self.session.tick(now);

        let Some(rx) = &self.pending_solve else {
            return;
        };
        match rx.try_recv() {
            Ok((request, Ok(moves))) => {
                self.pending_solve = None;
                match self.session.apply_solution(&request, &moves) {
                    SolveOutcome::Applied { moves: 0, solved: false } => {
                        self.log.push("solver returned no usable moves".to_string());
                    }
                    // Observers already saw the applied moves or the discard.
                    SolveOutcome::Applied { .. } | SolveOutcome::Stale => {}
                }
            }
            Ok((_, Err(err))) => {
                self.pending_solve = None;
                warn!(%err, "solver failed");
                self.log.push(format!("solver failed: {err}"));
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.pending_solve = None;
                self.log.push("solver thread died".to_string());
            }
        }
    }
}

fn solver_name(solver: &Option<CommandSolver>) -> &str {
    solver.as_ref().map_or("none", CommandSolver::program)
}

fn load_session(path: &Path, config: SessionConfig) -> Result<PuzzleSession> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let definition =
        serialize::import_json(&text).with_context(|| format!("load {}", path.display()))?;
    Ok(PuzzleSession::with_config(definition, config))
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    logging::init(args.log_file.as_deref())?;

    let mut config = load_config(args.config.as_deref())?;
    if let Some(line) = &args.solver {
        config.solver = Some(SolverConfig {
            timeout_secs: config.solver.as_ref().map_or(10, |s| s.timeout_secs),
            ..SolverConfig::from_command_line(line)
        });
        config.validate()?;
    }
    let solver = config.solver.as_ref().map(SolverConfig::to_solver).transpose()?;

    // If no puzzle file is provided, use the bundled one
    let puzzle_path = args
        .puzzle
        .unwrap_or_else(|| PathBuf::from("puzzles/crossing.json"));
    let session = load_session(&puzzle_path, config.session.clone())?;
    info!(puzzle = %puzzle_path.display(), solver = solver_name(&solver), "starting");

    let mut app = App::new(session, puzzle_path, solver);

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Run the main application loop, restoring the terminal even if it fails
    let result = run_app(&mut terminal, &mut app);
    restore_terminal(&mut terminal)?;
    result
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    // Short enough that animated resets and solver answers show up promptly.
    let poll_rate = Duration::from_millis(20);

    loop {
        terminal.draw(|f| ui(f, app))?;

        if crossterm::event::poll(poll_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.on_key(key.code);
                }
            }
        }

        app.tick(Instant::now());

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(2)])
        .split(frame.area());
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(main_layout[0]);

    render_board(frame, body[0], &app.session);

    match app.panel {
        Panel::Status => render_status(frame, body[1], app),
        Panel::Json => {
            let text = app
                .session
                .export_snapshot_json()
                .unwrap_or_else(|err| format!("export failed: {err}"));
            render_text(frame, body[1], "Snapshot JSON", text);
        }
        Panel::SolverText => render_text(frame, body[1], "Solver input", app.session.solver_text()),
    }

    let help_text = Paragraph::new(
        "arrows/WASD move · space/z undo · r reset · i reimport · p solve · e panel · q quit",
    )
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[1]);
}

fn actor_style(color: ActorColor) -> Style {
    match color {
        ActorColor::Red => Style::default().fg(Color::Red).bold(),
        ActorColor::Blue => Style::default().fg(Color::Blue).bold(),
    }
}

/// Renders the puzzle grid onto the frame. Game row 0 is drawn at the bottom.
fn render_board(frame: &mut Frame, area: Rect, session: &PuzzleSession) {
    let definition = session.definition();
    let configuration = session.configuration();
    let mut lines: Vec<Line> = Vec::with_capacity(definition.height());

    for y in (0..definition.height()).rev() {
        let mut spans: Vec<Span> = Vec::with_capacity(definition.width() * 2);
        for x in 0..definition.width() {
            let occupant = definition
                .actors()
                .iter()
                .zip(configuration)
                .find(|(_, position)| position.x == x && position.y == y)
                .map(|(actor, _)| actor.color);

            let span = match (occupant, definition.tile_at(x, y)) {
                (Some(ActorColor::Red), _) => Span::styled("R ", actor_style(ActorColor::Red)),
                (Some(ActorColor::Blue), _) => Span::styled("B ", actor_style(ActorColor::Blue)),
                (None, Some(Cell::RedGoal)) => Span::styled("r ", Style::default().fg(Color::Red)),
                (None, Some(Cell::BlueGoal)) => {
                    Span::styled("b ", Style::default().fg(Color::Blue))
                }
                (None, Some(Cell::Floor)) => Span::styled("· ", Style::default().fg(Color::DarkGray)),
                (None, Some(Cell::Empty) | None) => Span::raw("  "),
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let border_style = if session.is_solved() {
        Style::default().fg(Color::Green)
    } else {
        Style::default()
    };
    let board = Paragraph::new(lines)
        .block(
            Block::default()
                .title(definition.name().to_string())
                .borders(Borders::ALL)
                .border_style(border_style),
        )
        .alignment(Alignment::Center);

    frame.render_widget(board, area);
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let session = &app.session;
    let flag = |on: bool| if on { "yes" } else { "no" };
    let mut items: Vec<ListItem> = vec![
        ListItem::new(format!(
            "Moves: {} (optimal {})",
            session.move_count(),
            session.definition().optimal_moves()
        )),
        ListItem::new(format!("Solved: {}", flag(session.is_solved()))),
        ListItem::new(format!(
            "Ever solved: {}  optimal: {}",
            flag(session.was_solved()),
            flag(session.was_optimal())
        )),
        ListItem::new(format!(
            "Solver: {}{}",
            solver_name(&app.solver),
            if app.pending_solve.is_some() { " (running)" } else { "" }
        )),
        ListItem::new(""),
    ];
    items.extend(app.log.lines().into_iter().rev().map(ListItem::new));

    let status =
        List::new(items).block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(status, area);
}

fn render_text(frame: &mut Frame, area: Rect, title: &str, text: String) {
    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}
