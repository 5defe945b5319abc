use std::collections::VecDeque;

use cascade_protocol::{Board, Cell, Coord, ExplosionEvent, Player, PlayerId};

/// Result of resolving one placement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub board: Board,
    /// Orb transfers in the order they mutated the board.
    pub events: Vec<ExplosionEvent>,
    /// Cells that exploded, summed over every pass.
    pub operations: usize,
    /// Passes run: the initial one plus each rescan.
    pub passes: usize,
    /// A pass ran out of budget or the rescan limit was hit. The board is returned as-is.
    pub truncated: bool,
}

/// Exploding cells allowed in a single pass.
pub fn operation_budget(board: &Board) -> usize {
    board.area() * 2
}

/// Rescans allowed after the initial pass.
pub fn rescan_limit(board: &Board) -> usize {
    board.area() * 2
}

/// Resolve the chain reaction started by the orb just placed at `origin`.
///
/// `board` must already contain the placed orb. The input is never modified; resolution runs
/// on a private copy. Neighbours are visited left, right, up, down and the work queue is FIFO,
/// so identical inputs always produce identical output.
///
/// Within a pass each cell explodes at most once. After the pass the whole board is rescanned
/// and any cell still at or over capacity starts a fresh pass with a fresh budget. Rescanning
/// stops once at most one owner is left on the board, since a lone owner's chain can only
/// recolour its own orbs.
pub fn resolve(board: &Board, origin: Coord, players: &[Player]) -> Resolution {
    let mut work = Resolver {
        board: board.clone(),
        players,
        events: Vec::new(),
        operations: 0,
        budget: operation_budget(board),
        truncated: false,
    };
    let rescans = rescan_limit(board);

    let mut passes = 0;
    let mut start = Some(origin);
    while let Some(at) = start {
        work.run_pass(at);
        passes += 1;
        if work.truncated || work.board.owners().len() <= 1 {
            break;
        }
        start = work.next_unstable();
        if start.is_some() && passes > rescans {
            work.truncated = true;
            break;
        }
    }

    Resolution {
        board: work.board,
        events: work.events,
        operations: work.operations,
        passes,
        truncated: work.truncated,
    }
}

struct Resolver<'a> {
    board: Board,
    players: &'a [Player],
    events: Vec<ExplosionEvent>,
    operations: usize,
    budget: usize,
    truncated: bool,
}

impl Resolver<'_> {
    fn run_pass(&mut self, origin: Coord) {
        let mut exploded = vec![false; self.board.area()];
        let mut spent = 0;
        let mut queue = VecDeque::from([origin]);

        while let Some(at) = queue.pop_front() {
            let Some(index) = self.board.index_of(at) else {
                continue;
            };
            if exploded[index] {
                continue;
            }

            let capacity = self.board.capacity(at);
            let cell = &self.board.cells()[index];
            let Some(owner) = cell.owner.clone() else {
                continue;
            };
            if cell.orbs < capacity {
                continue;
            }
            if spent >= self.budget {
                self.truncated = true;
                return;
            }
            exploded[index] = true;
            spent += 1;
            self.operations += 1;

            let remainder = cell.orbs - capacity;
            if let Some(source) = self.board.get_mut(at) {
                *source = if remainder == 0 {
                    Cell::default()
                } else {
                    Cell {
                        orbs: remainder,
                        owner: Some(owner.clone()),
                    }
                };
            }

            let color = color_of(self.players, &owner);
            let neighbors: Vec<Coord> = self.board.neighbors(at).collect();
            for to in neighbors {
                self.events.push(ExplosionEvent {
                    from_x: at.x,
                    from_y: at.y,
                    to_x: to.x,
                    to_y: to.y,
                    color: color.clone(),
                    owner: owner.clone(),
                });

                let capacity = self.board.capacity(to);
                let Some(target) = self.board.get_mut(to) else {
                    continue;
                };
                target.orbs += 1;
                target.owner = Some(owner.clone());

                let over = target.orbs >= capacity;
                if over && self.board.index_of(to).is_some_and(|i| !exploded[i]) {
                    queue.push_back(to);
                }
            }
        }
    }

    /// First cell in row-major order that is at or over capacity and owned.
    fn next_unstable(&self) -> Option<Coord> {
        self.board
            .iter()
            .find(|(at, cell)| cell.owner.is_some() && cell.orbs >= self.board.capacity(*at))
            .map(|(at, _)| at)
    }
}

fn color_of(players: &[Player], owner: &PlayerId) -> String {
    players
        .iter()
        .find(|p| &p.id == owner)
        .map(|p| p.color_or_default().to_string())
        .unwrap_or_default()
}

/// Apply `events` in order to `board`, one orb per event.
///
/// Starting from the pre-move board plus the placed orb, this reproduces the resolver's final
/// board exactly.
pub fn replay_events(board: &mut Board, events: &[ExplosionEvent]) {
    for event in events {
        if let Some(source) = board.get_mut(event.from()) {
            source.orbs = source.orbs.saturating_sub(1);
            if source.orbs == 0 {
                source.owner = None;
            }
        }
        if let Some(target) = board.get_mut(event.to()) {
            target.orbs += 1;
            target.owner = Some(event.owner.clone());
        }
    }
}
