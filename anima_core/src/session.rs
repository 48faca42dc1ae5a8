use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    Configuration, Direction, Position,
    history::HistoryStack,
    puzzle::PuzzleDefinition,
    resolver::{is_solved, resolve},
    schedule::RepeatingTask,
    serialize::{self, ImportError},
    solver::{SolverClient, SolverError},
};

/// Tunables for a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Resets of at least this many moves jump straight to the start instead of
    /// animating one undo at a time.
    pub reset_animation_limit: usize,
    /// Delay between undo steps of an animated reset, in milliseconds.
    pub reset_step_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reset_animation_limit: 20,
            reset_step_ms: 100,
        }
    }
}

impl SessionConfig {
    pub fn reset_step(&self) -> Duration {
        Duration::from_millis(self.reset_step_ms)
    }
}

/// Something that happened to a session, delivered to every observer after the
/// state change is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Moved {
        configuration: Configuration,
        move_count: usize,
    },
    Undone {
        configuration: Configuration,
        move_count: usize,
    },
    ResetStarted {
        steps: usize,
    },
    ResetCancelled,
    ResetFinished,
    Imported {
        name: String,
    },
    Solved {
        optimal: bool,
    },
    SolutionApplied {
        moves: usize,
    },
    SolutionDiscarded,
}

/// Receives [`SessionEvent`]s, e.g. to repaint a view.
pub trait SessionObserver {
    fn notify(&mut self, event: &SessionEvent);
}

/// Result of a single move command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved { solved: bool },
    /// Nothing could move; history is untouched.
    Blocked,
}

/// How a reset is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Already at the start.
    AtStart,
    /// One undo per tick until the history is empty.
    Animated { steps: usize },
    /// History cleared in one go.
    Immediate,
}

/// A solve query bound to the puzzle and placement it was made for.
///
/// It owns everything the solver needs, so it can be handed to another thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveRequest {
    generation: u64,
    configuration: Configuration,
    puzzle_text: String,
}

impl SolveRequest {
    pub fn run(&self, solver: &impl SolverClient) -> Result<Vec<Direction>, SolverError> {
        solver.solve(&self.puzzle_text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveOutcome {
    Applied { moves: usize, solved: bool },
    /// The puzzle was replaced, or the actors moved, after the request was made.
    Stale,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// One playthrough of a puzzle: the current placement, its history and the
/// sticky solved flags.
///
/// Every command runs to completion before returning and notifies observers
/// afterwards. The only time-extended operation is the animated reset, which
/// the owner drives with [`PuzzleSession::tick`]; any other command cancels it.
pub struct PuzzleSession {
    definition: PuzzleDefinition,
    configuration: Configuration,
    history: HistoryStack,
    was_solved: bool,
    was_optimal: bool,
    generation: u64,
    config: SessionConfig,
    pending_reset: Option<RepeatingTask>,
    observers: Vec<Box<dyn SessionObserver>>,
}

impl PuzzleSession {
    pub fn new(definition: PuzzleDefinition) -> Self {
        Self::with_config(definition, SessionConfig::default())
    }

    pub fn with_config(definition: PuzzleDefinition, config: SessionConfig) -> Self {
        PuzzleSession {
            configuration: definition.initial_configuration(),
            definition,
            history: HistoryStack::new(),
            was_solved: false,
            was_optimal: false,
            generation: 0,
            config,
            pending_reset: None,
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    fn emit(&mut self, event: SessionEvent) {
        for observer in &mut self.observers {
            observer.notify(&event);
        }
    }

    pub fn definition(&self) -> &PuzzleDefinition {
        &self.definition
    }

    pub fn configuration(&self) -> &[Position] {
        &self.configuration
    }

    pub fn move_count(&self) -> usize {
        self.history.len()
    }

    pub fn is_solved(&self) -> bool {
        is_solved(&self.definition, &self.configuration)
    }

    pub fn was_solved(&self) -> bool {
        self.was_solved
    }

    pub fn was_optimal(&self) -> bool {
        self.was_optimal
    }

    pub fn is_resetting(&self) -> bool {
        self.pending_reset.is_some()
    }

    /// Bumped on every import; used to spot stale solver answers.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn export_json(&self) -> serde_json::Result<String> {
        serialize::export_json(&self.definition)
    }

    /// JSON for a puzzle starting from the current placement.
    pub fn export_snapshot_json(&self) -> serde_json::Result<String> {
        serialize::export_snapshot_json(&self.definition, &self.configuration)
    }

    pub fn solver_text(&self) -> String {
        serialize::solver_text(&self.definition, &self.configuration)
    }

    fn cancel_reset(&mut self) {
        if self.pending_reset.take().is_some() {
            debug!("animated reset cancelled");
            self.emit(SessionEvent::ResetCancelled);
        }
    }

    /// Requests a move. Red actors follow `direction`, blue actors mirror it.
    pub fn make_move(&mut self, direction: Direction) -> MoveOutcome {
        self.cancel_reset();
        self.step(direction)
    }

    fn step(&mut self, direction: Direction) -> MoveOutcome {
        let resolution = resolve(&self.definition, &self.configuration, direction);
        if !resolution.changed {
            debug!(?direction, "move blocked");
            return MoveOutcome::Blocked;
        }

        self.history.push(resolution.configuration.clone());
        self.configuration = resolution.configuration;
        let move_count = self.history.len();
        debug!(?direction, move_count, "moved");
        self.emit(SessionEvent::Moved {
            configuration: self.configuration.clone(),
            move_count,
        });

        let solved = self.is_solved();
        if solved {
            let optimal = move_count == self.definition.optimal_moves();
            self.was_solved = true;
            self.was_optimal |= optimal;
            info!(move_count, optimal, "puzzle solved");
            self.emit(SessionEvent::Solved { optimal });
        }
        MoveOutcome::Moved { solved }
    }

    /// Takes back the latest move. Returns `false` if there was none.
    pub fn undo(&mut self) -> bool {
        self.cancel_reset();
        self.undo_step()
    }

    fn undo_step(&mut self) -> bool {
        if self.history.pop().is_none() {
            return false;
        }
        self.configuration = match self.history.top() {
            Some(configuration) => configuration.clone(),
            None => self.definition.initial_configuration(),
        };
        let move_count = self.history.len();
        debug!(move_count, "undone");
        self.emit(SessionEvent::Undone {
            configuration: self.configuration.clone(),
            move_count,
        });
        true
    }

    /// Returns to the initial placement. See [`PuzzleSession::reset_at`].
    pub fn reset(&mut self) -> ResetMode {
        self.reset_at(Instant::now())
    }

    /// Returns to the initial placement, either by scheduling one undo per
    /// `reset_step` starting from `now`, or immediately when the history is at
    /// least `reset_animation_limit` moves long.
    pub fn reset_at(&mut self, now: Instant) -> ResetMode {
        self.cancel_reset();

        let steps = self.history.len();
        if steps == 0 {
            return ResetMode::AtStart;
        }
        if steps < self.config.reset_animation_limit {
            info!(steps, "animated reset started");
            self.pending_reset = Some(RepeatingTask::start(self.config.reset_step(), now));
            self.emit(SessionEvent::ResetStarted { steps });
            ResetMode::Animated { steps }
        } else {
            info!(steps, "reset");
            self.history.clear();
            self.configuration = self.definition.initial_configuration();
            self.emit(SessionEvent::ResetFinished);
            ResetMode::Immediate
        }
    }

    /// Drives a pending animated reset, performing every step due at `now`.
    /// Returns the number of undo steps taken.
    pub fn tick(&mut self, now: Instant) -> usize {
        let due = match self.pending_reset.as_mut() {
            Some(task) => task.take_due(now),
            None => return 0,
        };
        let mut taken = 0;
        while taken < due && self.step_reset() {
            taken += 1;
        }
        taken
    }

    /// Performs one step of a pending animated reset regardless of timing.
    /// Returns `false` if no reset was pending.
    pub fn step_reset(&mut self) -> bool {
        if self.pending_reset.is_none() {
            return false;
        }
        self.undo_step();
        if self.history.is_empty() {
            self.pending_reset = None;
            debug!("animated reset finished");
            self.emit(SessionEvent::ResetFinished);
        }
        true
    }

    /// Replaces the puzzle with one parsed from JSON. On failure the session
    /// is left exactly as it was.
    pub fn import(&mut self, json: &str) -> Result<(), SessionError> {
        let definition = serialize::import_json(json).inspect_err(|err| {
            warn!(%err, "import rejected");
        })?;
        self.replace_definition(definition);
        Ok(())
    }

    /// Swaps in a new puzzle, starting over with empty history and cleared flags.
    pub fn replace_definition(&mut self, definition: PuzzleDefinition) {
        self.cancel_reset();
        self.configuration = definition.initial_configuration();
        self.definition = definition;
        self.history.clear();
        self.was_solved = false;
        self.was_optimal = false;
        self.generation += 1;
        info!(name = self.definition.name(), generation = self.generation, "puzzle imported");
        self.emit(SessionEvent::Imported {
            name: self.definition.name().to_string(),
        });
    }

    /// Captures the current puzzle and placement for the solver.
    pub fn request_solve(&self) -> SolveRequest {
        SolveRequest {
            generation: self.generation,
            configuration: self.configuration.clone(),
            puzzle_text: self.solver_text(),
        }
    }

    /// Plays a solver answer, unless the puzzle was replaced or the actors
    /// moved since `request`.
    pub fn apply_solution(&mut self, request: &SolveRequest, moves: &[Direction]) -> SolveOutcome {
        self.cancel_reset();
        if request.generation != self.generation || request.configuration != self.configuration {
            warn!(
                requested = request.generation,
                current = self.generation,
                moved = request.configuration != self.configuration,
                "discarding stale solution"
            );
            self.emit(SessionEvent::SolutionDiscarded);
            return SolveOutcome::Stale;
        }

        let mut applied = 0;
        for &direction in moves {
            if let MoveOutcome::Moved { .. } = self.step(direction) {
                applied += 1;
            }
        }
        info!(requested = moves.len(), applied, "solution applied");
        self.emit(SessionEvent::SolutionApplied { moves: applied });
        SolveOutcome::Applied {
            moves: applied,
            solved: self.is_solved(),
        }
    }

    /// Asks `solver` for a solution from the current placement and plays it.
    pub fn solve_with(&mut self, solver: &impl SolverClient) -> Result<SolveOutcome, SessionError> {
        let request = self.request_solve();
        let moves = request.run(solver).inspect_err(|err| {
            warn!(%err, "solver failed");
        })?;
        Ok(self.apply_solution(&request, &moves))
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{Actor, Color};

    fn corridor() -> PuzzleDefinition {
        // Red walks right towards its goal, blue walks left towards its goal.
        PuzzleDefinition::from_rows(
            "corridor",
            &["b######r"],
            vec![
                Actor {
                    x: 3,
                    y: 0,
                    color: Color::Red,
                },
                Actor {
                    x: 4,
                    y: 0,
                    color: Color::Blue,
                },
            ],
            4,
        )
        .expect("valid puzzle")
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<SessionEvent>>>);

    impl SessionObserver for Recorder {
        fn notify(&mut self, event: &SessionEvent) {
            self.0.borrow_mut().push(event.clone());
        }
    }

    #[test]
    fn moves_grow_history_and_undo_shrinks_it() {
        let mut session = PuzzleSession::new(corridor());
        assert_eq!(
            session.make_move(Direction::Right),
            MoveOutcome::Moved { solved: false }
        );
        assert_eq!(session.move_count(), 1);
        assert_eq!(
            session.configuration(),
            &[Position::new(4, 0), Position::new(3, 0)]
        );

        assert!(session.undo());
        assert_eq!(session.move_count(), 0);
        assert_eq!(session.configuration(), &session.definition().initial_configuration()[..]);
        assert!(!session.undo());
    }

    #[test]
    fn blocked_moves_are_not_recorded() {
        let definition = PuzzleDefinition::from_rows(
            "stuck",
            &["#"],
            vec![Actor {
                x: 0,
                y: 0,
                color: Color::Blue,
            }],
            0,
        )
        .expect("valid");
        let mut session = PuzzleSession::new(definition);
        for direction in Direction::ALL {
            assert_eq!(session.make_move(direction), MoveOutcome::Blocked);
        }
        assert_eq!(session.move_count(), 0);
    }

    #[test]
    fn solving_in_optimal_moves_sets_both_flags() {
        let mut session = PuzzleSession::new(corridor());
        for _ in 0..3 {
            session.make_move(Direction::Right);
        }
        assert!(!session.was_solved());
        assert_eq!(
            session.make_move(Direction::Right),
            MoveOutcome::Moved { solved: true }
        );
        assert!(session.was_solved());
        assert!(session.was_optimal());

        // Flags are sticky.
        session.undo();
        assert!(!session.is_solved());
        assert!(session.was_solved());
        assert!(session.was_optimal());
    }

    #[test]
    fn solving_late_is_not_optimal() {
        let mut session = PuzzleSession::new(corridor());
        session.make_move(Direction::Left);
        for _ in 0..5 {
            session.make_move(Direction::Right);
        }
        assert!(session.is_solved());
        assert_eq!(session.move_count(), 6);
        assert!(session.was_solved());
        assert!(!session.was_optimal());
    }

    #[test]
    fn short_reset_is_animated() {
        let mut session = PuzzleSession::new(corridor());
        for _ in 0..3 {
            session.make_move(Direction::Right);
        }
        let start = Instant::now();
        assert_eq!(session.reset_at(start), ResetMode::Animated { steps: 3 });
        assert!(session.is_resetting());
        assert_eq!(session.move_count(), 3);

        assert_eq!(session.tick(start + Duration::from_millis(100)), 1);
        assert_eq!(session.move_count(), 2);
        assert_eq!(session.tick(start + Duration::from_millis(250)), 1);
        assert_eq!(session.tick(start + Duration::from_secs(10)), 1);
        assert_eq!(session.move_count(), 0);
        assert!(!session.is_resetting());
        assert_eq!(session.configuration(), &session.definition().initial_configuration()[..]);
        assert_eq!(session.tick(start + Duration::from_secs(20)), 0);
    }

    #[test]
    fn long_reset_is_immediate() {
        let mut session = PuzzleSession::new(corridor());
        for i in 0..25 {
            let direction = if i % 2 == 0 { Direction::Right } else { Direction::Left };
            session.make_move(direction);
        }
        assert_eq!(session.move_count(), 25);
        assert_eq!(session.reset(), ResetMode::Immediate);
        assert_eq!(session.move_count(), 0);
        assert!(!session.is_resetting());
        assert_eq!(session.configuration(), &session.definition().initial_configuration()[..]);
    }

    #[test]
    fn reset_at_start_does_nothing() {
        let mut session = PuzzleSession::new(corridor());
        assert_eq!(session.reset(), ResetMode::AtStart);
        assert!(!session.is_resetting());
    }

    #[test]
    fn commands_cancel_a_pending_reset() {
        let mut session = PuzzleSession::new(corridor());
        session.make_move(Direction::Right);
        session.make_move(Direction::Right);
        session.reset();
        assert!(session.step_reset());
        assert_eq!(session.move_count(), 1);

        session.make_move(Direction::Right);
        assert!(!session.is_resetting());
        assert!(!session.step_reset());
        assert_eq!(session.move_count(), 2);

        session.reset();
        session.undo();
        assert!(!session.is_resetting());
        assert_eq!(session.move_count(), 1);
    }

    #[test]
    fn import_cancels_a_pending_reset() {
        let recorder = Recorder::default();
        let events = recorder.0.clone();
        let mut session = PuzzleSession::new(corridor());
        session.make_move(Direction::Right);
        session.subscribe(Box::new(recorder));

        assert_eq!(session.reset(), ResetMode::Animated { steps: 1 });
        let json = session.export_json().expect("export");
        session.import(&json).expect("import");

        assert!(!session.is_resetting());
        assert!(!session.step_reset());
        assert_eq!(
            *events.borrow(),
            vec![
                SessionEvent::ResetStarted { steps: 1 },
                SessionEvent::ResetCancelled,
                SessionEvent::Imported {
                    name: "corridor".to_string()
                },
            ]
        );
    }

    #[test]
    fn applying_a_solution_cancels_a_pending_reset() {
        let recorder = Recorder::default();
        let events = recorder.0.clone();
        let mut session = PuzzleSession::new(corridor());
        session.make_move(Direction::Right);
        let request = session.request_solve();
        session.subscribe(Box::new(recorder));

        assert_eq!(session.reset(), ResetMode::Animated { steps: 1 });
        assert_eq!(
            session.apply_solution(&request, &[Direction::Right; 3]),
            SolveOutcome::Applied {
                moves: 3,
                solved: true
            }
        );

        assert!(!session.is_resetting());
        assert_eq!(session.move_count(), 4);
        let events = events.borrow();
        assert_eq!(events[..2], [SessionEvent::ResetStarted { steps: 1 }, SessionEvent::ResetCancelled]);
        assert_eq!(events.last(), Some(&SessionEvent::SolutionApplied { moves: 3 }));
    }

    #[test]
    fn failed_import_leaves_session_untouched() {
        let mut session = PuzzleSession::new(corridor());
        session.make_move(Direction::Right);
        let err = session.import("{ not json").unwrap_err();
        assert!(matches!(err, SessionError::Import(ImportError::Malformed(_))));
        assert!(err.to_string().starts_with("Invalid puzzle data"));
        assert_eq!(session.move_count(), 1);
        assert_eq!(session.definition().name(), "corridor");
        assert_eq!(session.generation(), 0);
    }

    #[test]
    fn import_starts_over() {
        let mut session = PuzzleSession::new(corridor());
        for _ in 0..4 {
            session.make_move(Direction::Right);
        }
        assert!(session.was_optimal());
        let exported = session.export_snapshot_json().expect("export");

        session.import(&exported).expect("import");
        assert_eq!(session.generation(), 1);
        assert_eq!(session.move_count(), 0);
        assert!(!session.was_solved());
        assert!(!session.was_optimal());
        assert_eq!(
            session.configuration(),
            &[Position::new(7, 0), Position::new(0, 0)]
        );
    }

    #[test]
    fn stale_solutions_are_discarded() {
        let mut session = PuzzleSession::new(corridor());
        let request = session.request_solve();
        let json = session.export_json().expect("export");
        session.import(&json).expect("import");

        assert_eq!(
            session.apply_solution(&request, &[Direction::Right]),
            SolveOutcome::Stale
        );
        assert_eq!(session.move_count(), 0);
    }

    #[test]
    fn solutions_for_an_old_placement_are_discarded() {
        let mut session = PuzzleSession::new(corridor());
        let request = session.request_solve();
        session.make_move(Direction::Left);
        session.make_move(Direction::Left);

        assert_eq!(
            session.apply_solution(&request, &[Direction::Right; 4]),
            SolveOutcome::Stale
        );
        assert_eq!(session.move_count(), 2);
        assert_eq!(
            session.configuration(),
            &[Position::new(1, 0), Position::new(6, 0)]
        );
        assert!(!session.was_solved());
    }

    #[test]
    fn solve_with_plays_the_answer() {
        let mut session = PuzzleSession::new(corridor());
        let expected_text = session.solver_text();
        let solver = move |text: &str| -> Result<Vec<Direction>, SolverError> {
            assert_eq!(text, expected_text);
            Ok(vec![Direction::Right; 4])
        };
        assert_eq!(
            session.solve_with(&solver).expect("solve"),
            SolveOutcome::Applied {
                moves: 4,
                solved: true
            }
        );
        assert!(session.was_optimal());
        assert_eq!(session.move_count(), 4);
    }

    #[test]
    fn solver_failure_changes_nothing() {
        let mut session = PuzzleSession::new(corridor());
        session.make_move(Direction::Right);
        let solver = |_: &str| -> Result<Vec<Direction>, SolverError> {
            Err(SolverError::InvalidResponse("x".to_string()))
        };
        assert!(matches!(
            session.solve_with(&solver),
            Err(SessionError::Solver(_))
        ));
        assert_eq!(session.move_count(), 1);
    }

    #[test]
    fn observers_see_every_transition() {
        let recorder = Recorder::default();
        let events = recorder.0.clone();
        let mut session = PuzzleSession::new(corridor());
        session.subscribe(Box::new(recorder));

        session.make_move(Direction::Right);
        session.make_move(Direction::Up);
        session.reset();
        session.undo();

        assert_eq!(
            *events.borrow(),
            vec![
                SessionEvent::Moved {
                    configuration: vec![Position::new(4, 0), Position::new(3, 0)],
                    move_count: 1,
                },
                SessionEvent::ResetStarted { steps: 1 },
                SessionEvent::ResetCancelled,
                SessionEvent::Undone {
                    configuration: vec![Position::new(3, 0), Position::new(4, 0)],
                    move_count: 0,
                },
            ]
        );
    }
}
