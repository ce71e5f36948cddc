//! Deferred edit commands.

use std::collections::VecDeque;

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// One terrain edit, in world units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditCommand {
    Carve { center: Vec3, radius: f32, strength: f32 },
    Fill { center: Vec3, radius: f32, strength: f32 },
    /// Raycast the segment and carve a sphere at the hit, if any
    CarveAlongRay { origin: Vec3, direction: Vec3, radius: f32, strength: f32 },
}

impl EditCommand {
    pub fn radius(&self) -> f32 {
        match *self {
            Self::Carve { radius, .. } | Self::Fill { radius, .. } | Self::CarveAlongRay { radius, .. } => radius,
        }
    }
}

/// FIFO of edits waiting to be applied.
#[derive(Clone, Debug, Default)]
pub struct EditQueue {
    commands: VecDeque<EditCommand>,
}

impl EditQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: EditCommand) {
        self.commands.push_back(command);
    }

    pub fn pop(&mut self) -> Option<EditCommand> {
        self.commands.pop_front()
    }

    pub fn peek(&self) -> Option<&EditCommand> {
        self.commands.front()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Remove every queued command in submission order.
    pub fn drain(&mut self) -> impl Iterator<Item = EditCommand> + '_ {
        self.commands.drain(..)
    }
}

impl Extend<EditCommand> for EditQueue {
    fn extend<I: IntoIterator<Item = EditCommand>>(&mut self, iter: I) {
        self.commands.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carve(x: f32) -> EditCommand {
        EditCommand::Carve { center: Vec3::new(x, 0.0, 0.0), radius: 1.0, strength: 1.0 }
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = EditQueue::new();
        queue.push(carve(1.0));
        queue.push(carve(2.0));
        queue.extend([carve(3.0)]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.peek(), Some(&carve(1.0)));
        assert_eq!(queue.pop(), Some(carve(1.0)));

        let rest: Vec<_> = queue.drain().collect();
        assert_eq!(rest, vec![carve(2.0), carve(3.0)]);
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_command_json() {
        let json = r#"{"op":"fill","center":[1.0,2.0,3.0],"radius":2.5,"strength":0.5}"#;
        let command: EditCommand = serde_json::from_str(json).unwrap();
        assert_eq!(
            command,
            EditCommand::Fill { center: Vec3::new(1.0, 2.0, 3.0), radius: 2.5, strength: 0.5 }
        );
        assert_eq!(command.radius(), 2.5);

        let ray: EditCommand = serde_json::from_str(
            r#"{"op":"carve_along_ray","origin":[0,0,0],"direction":[0,-5,0],"radius":1,"strength":1}"#,
        )
        .unwrap();
        assert!(matches!(ray, EditCommand::CarveAlongRay { .. }));
    }
}
