use crate::{Color, Configuration, Direction, Position, puzzle::PuzzleDefinition};

/// The outcome of resolving one move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub configuration: Configuration,
    /// True iff at least one actor ended up somewhere new.
    pub changed: bool,
}

/// Computes where every actor ends up when `direction` is requested.
///
/// Red actors step along `direction` and blue actors step the opposite way.
/// An actor whose step would leave the map or land on an empty cell stays put.
/// Whenever two actors would end on the same cell, both stay put; this is
/// repeated until no further collisions appear, so a blocked actor can in turn
/// block the one behind it.
pub fn resolve(
    definition: &PuzzleDefinition,
    configuration: &[Position],
    direction: Direction,
) -> Resolution {
    debug_assert_eq!(configuration.len(), definition.actors().len());

    let mut candidates: Configuration = definition
        .actors()
        .iter()
        .zip(configuration)
        .map(|(actor, &current)| {
            let (dx, dy) = match actor.color {
                Color::Red => direction.delta(),
                Color::Blue => direction.opposite().delta(),
            };
            let target = current.offset(dx, dy);
            target
                .filter(|&position| definition.is_passable(position))
                .unwrap_or(current)
        })
        .collect();

    let mut settled = false;
    while !settled {
        settled = true;
        for i in 0..candidates.len() {
            for j in i + 1..candidates.len() {
                if candidates[i] == candidates[j] {
                    // Only a revert that moves something counts; two actors
                    // stacked on one start cell would otherwise never settle.
                    if candidates[i] != configuration[i] || candidates[j] != configuration[j] {
                        settled = false;
                    }
                    candidates[i] = configuration[i];
                    candidates[j] = configuration[j];
                }
            }
        }
    }

    let changed = candidates
        .iter()
        .zip(configuration)
        .any(|(next, current)| next != current);

    Resolution {
        configuration: candidates,
        changed,
    }
}

/// Checks whether every goal cell holds an actor of its color.
///
/// A puzzle without goals of some color is trivially satisfied for that color.
pub fn is_solved(definition: &PuzzleDefinition, configuration: &[Position]) -> bool {
    definition.tiles().enumerate().all(|(position, cell)| {
        cell.goal_color().is_none_or(|wanted| {
            definition
                .actors()
                .iter()
                .zip(configuration)
                .any(|(actor, &occupied)| occupied == position && actor.color == wanted)
        })
    })
}
