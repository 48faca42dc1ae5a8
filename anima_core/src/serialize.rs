//! Conversions between [`PuzzleDefinition`] and its external forms: the JSON
//! document used for persistence and import, and the plain-text description
//! consumed by the solver.

use serde::{Deserialize, Serialize};

use crate::{
    Actor, Position,
    puzzle::{PuzzleDefinition, PuzzleError},
};

/// The persisted JSON shape of a puzzle, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleData {
    pub name: String,
    pub width: usize,
    pub height: usize,
    /// One string per row, top row first.
    pub tiles: Vec<String>,
    pub actors: Vec<Actor>,
    #[serde(alias = "minMoves")]
    pub optimal_moves: usize,
}

impl TryFrom<PuzzleData> for PuzzleDefinition {
    type Error = PuzzleError;

    fn try_from(data: PuzzleData) -> Result<Self, Self::Error> {
        let definition = PuzzleDefinition::from_rows(
            data.name,
            data.tiles.as_slice(),
            data.actors,
            data.optimal_moves,
        )?;
        if definition.width() != data.width || definition.height() != data.height {
            return Err(PuzzleError::SizeMismatch {
                declared_width: data.width,
                declared_height: data.height,
                width: definition.width(),
                height: definition.height(),
            });
        }
        Ok(definition)
    }
}

impl From<PuzzleDefinition> for PuzzleData {
    fn from(definition: PuzzleDefinition) -> Self {
        PuzzleData::from(&definition)
    }
}

impl From<&PuzzleDefinition> for PuzzleData {
    fn from(definition: &PuzzleDefinition) -> Self {
        PuzzleData {
            name: definition.name().to_string(),
            width: definition.width(),
            height: definition.height(),
            tiles: definition.rows(),
            actors: definition.actors().to_vec(),
            optimal_moves: definition.optimal_moves(),
        }
    }
}

/// Why a JSON document could not become a puzzle.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Invalid puzzle data: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Invalid puzzle data: {0}")]
    Invalid(#[from] PuzzleError),
}

/// Parses and validates a puzzle JSON document.
pub fn import_json(text: &str) -> Result<PuzzleDefinition, ImportError> {
    let data: PuzzleData = serde_json::from_str(text)?;
    Ok(PuzzleDefinition::try_from(data)?)
}

/// Pretty-printed JSON describing `definition` exactly.
pub fn export_json(definition: &PuzzleDefinition) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&PuzzleData::from(definition))
}

/// Pretty-printed JSON for a puzzle that starts where the actors currently are.
pub fn export_snapshot_json(
    definition: &PuzzleDefinition,
    configuration: &[Position],
) -> serde_json::Result<String> {
    export_json(&definition.with_start(configuration))
}

/// The solver's input: every tile row on its own line, a blank line, then one
/// `<R|B> x y` line per actor at its current position.
pub fn solver_text(definition: &PuzzleDefinition, configuration: &[Position]) -> String {
    let mut text = String::new();
    for row in definition.rows() {
        text.push_str(&row);
        text.push('\n');
    }
    text.push('\n');
    for (actor, position) in definition.actors().iter().zip(configuration) {
        text.push_str(&format!(
            "{} {} {}\n",
            actor.color.letter(),
            position.x,
            position.y
        ));
    }
    text
}
