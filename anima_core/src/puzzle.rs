use serde::{Deserialize, Serialize};

use crate::{
    Actor, Color, Configuration, Position,
    map::{Grid, GridError},
    serialize::PuzzleData,
};

/// Glyph written for floor cells. Any unrecognised glyph also reads as floor.
pub const FLOOR_GLYPH: char = '#';

/// Represents the static type of a cell in the puzzle grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    Empty,
    Floor,
    RedGoal,
    BlueGoal,
}

impl Cell {
    pub fn from_glyph(glyph: char) -> Cell {
        match glyph {
            ' ' => Cell::Empty,
            'r' => Cell::RedGoal,
            'b' => Cell::BlueGoal,
            _ => Cell::Floor,
        }
    }

    pub fn glyph(self) -> char {
        match self {
            Cell::Empty => ' ',
            Cell::Floor => FLOOR_GLYPH,
            Cell::RedGoal => 'r',
            Cell::BlueGoal => 'b',
        }
    }

    pub fn is_passable(self) -> bool {
        self != Cell::Empty
    }

    /// The color of actor this cell asks for, if it is a goal.
    pub fn goal_color(self) -> Option<Color> {
        match self {
            Cell::RedGoal => Some(Color::Red),
            Cell::BlueGoal => Some(Color::Blue),
            Cell::Empty | Cell::Floor => None,
        }
    }
}

/// Represents a violated puzzle definition invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PuzzleError {
    #[error("Puzzle has no cells")]
    Empty,
    #[error("Row {row} has {found} cells, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error(
        "Declared size ({declared_width}, {declared_height}) does not match tiles ({width}, {height})"
    )]
    SizeMismatch {
        declared_width: usize,
        declared_height: usize,
        width: usize,
        height: usize,
    },
    #[error("Actor {index} at ({x}, {y}) is outside the grid")]
    ActorOutOfBounds { index: usize, x: usize, y: usize },
    #[error("Actor {index} at ({x}, {y}) starts on an empty cell")]
    ActorOnEmpty { index: usize, x: usize, y: usize },
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// An immutable, validated puzzle: the tile grid plus the initial actor placement.
///
/// Only constructed through [`PuzzleDefinition::from_rows`] (or deserialization,
/// which goes through it), so every actor is known to start on a passable cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PuzzleData", into = "PuzzleData")]
pub struct PuzzleDefinition {
    name: String,
    tiles: Grid<Cell>,
    actors: Vec<Actor>,
    optimal_moves: usize,
}

impl PuzzleDefinition {
    /// Builds a puzzle from tile rows given top row first.
    ///
    /// Input row `height - 1 - y` becomes game row `y`.
    pub fn from_rows<S: AsRef<str>>(
        name: impl Into<String>,
        rows: &[S],
        actors: Vec<Actor>,
        optimal_moves: usize,
    ) -> Result<Self, PuzzleError> {
        let height = rows.len();
        let width = rows.first().map_or(0, |row| row.as_ref().chars().count());
        if width == 0 || height == 0 {
            return Err(PuzzleError::Empty);
        }

        let mut tiles = Grid::from_generator(width, height, |_, _| Cell::Empty);
        for (row, line) in rows.iter().enumerate() {
            let line = line.as_ref();
            let found = line.chars().count();
            if found != width {
                return Err(PuzzleError::RowWidth {
                    row,
                    expected: width,
                    found,
                });
            }
            let y = height - 1 - row;
            for (x, glyph) in line.chars().enumerate() {
                tiles.set(x, y, Cell::from_glyph(glyph))?;
            }
        }

        for (index, actor) in actors.iter().enumerate() {
            match tiles.get(actor.x, actor.y) {
                None => {
                    return Err(PuzzleError::ActorOutOfBounds {
                        index,
                        x: actor.x,
                        y: actor.y,
                    });
                }
                Some(Cell::Empty) => {
                    return Err(PuzzleError::ActorOnEmpty {
                        index,
                        x: actor.x,
                        y: actor.y,
                    });
                }
                Some(_) => {}
            }
        }

        Ok(PuzzleDefinition {
            name: name.into(),
            tiles,
            actors,
            optimal_moves,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> usize {
        self.tiles.width()
    }

    pub fn height(&self) -> usize {
        self.tiles.height()
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    /// Length of the reference solution.
    pub fn optimal_moves(&self) -> usize {
        self.optimal_moves
    }

    pub fn tiles(&self) -> &Grid<Cell> {
        &self.tiles
    }

    /// Looks up a cell. `None` means the coordinates are off the map, which
    /// blocks movement just like [`Cell::Empty`].
    pub fn tile_at(&self, x: usize, y: usize) -> Option<Cell> {
        self.tiles.get(x, y).copied()
    }

    pub fn is_passable(&self, position: Position) -> bool {
        self.tile_at(position.x, position.y)
            .is_some_and(Cell::is_passable)
    }

    /// Start positions of every actor, in actor order.
    pub fn initial_configuration(&self) -> Configuration {
        self.actors.iter().map(Actor::position).collect()
    }

    /// Every goal cell asking for an actor of `color`.
    pub fn goal_cells(&self, color: Color) -> Vec<Position> {
        self.tiles
            .enumerate()
            .filter(|(_, cell)| cell.goal_color() == Some(color))
            .map(|(position, _)| position)
            .collect()
    }

    /// Tile rows as glyph strings, top row first.
    pub fn rows(&self) -> Vec<String> {
        (0..self.height())
            .rev()
            .filter_map(|y| self.tiles.row(y))
            .map(|row| row.iter().map(|cell| cell.glyph()).collect())
            .collect()
    }

    /// A copy of this puzzle whose actors start at `configuration`.
    ///
    /// Positions are zipped with the actor list; extra entries on either side
    /// are ignored.
    pub fn with_start(&self, configuration: &[Position]) -> PuzzleDefinition {
        let actors = self
            .actors
            .iter()
            .zip(configuration)
            .map(|(actor, position)| Actor {
                x: position.x,
                y: position.y,
                color: actor.color,
            })
            .collect();
        PuzzleDefinition {
            name: self.name.clone(),
            tiles: self.tiles.clone(),
            actors,
            optimal_moves: self.optimal_moves,
        }
    }
}
