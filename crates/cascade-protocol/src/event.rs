use serde::{Deserialize, Serialize};

use crate::{Coord, PlayerId};

/// One orb moving from an exploding cell to one neighbour.
///
/// Events sharing a source belong to the same explosion and may be presented together, but
/// the state-mutating order is the order in which they were produced.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplosionEvent {
    pub from_x: u32,
    pub from_y: u32,
    pub to_x: u32,
    pub to_y: u32,
    pub color: String,
    pub owner: PlayerId,
}

impl ExplosionEvent {
    pub fn from(&self) -> Coord {
        Coord::new(self.from_x, self.from_y)
    }

    pub fn to(&self) -> Coord {
        Coord::new(self.to_x, self.to_y)
    }
}

/// Split an ordered event list into runs that share a source cell.
pub fn group_by_source(events: &[ExplosionEvent]) -> Vec<&[ExplosionEvent]> {
    events
        .chunk_by(|a, b| a.from() == b.from())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(from: (u32, u32), to: (u32, u32)) -> ExplosionEvent {
        ExplosionEvent {
            from_x: from.0,
            from_y: from.1,
            to_x: to.0,
            to_y: to.1,
            color: "red".into(),
            owner: PlayerId::from("a"),
        }
    }

    #[test]
    fn groups_consecutive_sources() {
        let events = vec![
            event((0, 0), (1, 0)),
            event((0, 0), (0, 1)),
            event((1, 0), (0, 0)),
            event((1, 0), (2, 0)),
            event((1, 0), (1, 1)),
        ];
        let groups = group_by_source(&events);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].len(), 3);
        assert_eq!(groups[1][0].from(), Coord::new(1, 0));
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let json = serde_json::to_value(event((0, 0), (1, 0))).unwrap();
        assert_eq!(json["fromX"], 0);
        assert_eq!(json["toX"], 1);
        assert_eq!(json["color"], "red");
    }
}
