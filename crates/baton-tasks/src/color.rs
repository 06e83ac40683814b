//! Stable per-workspace colour assignment

use std::collections::HashMap;
use std::sync::Mutex;

/// Hands out palette slots to workspaces in first-seen order.
///
/// The same workspace always gets the same slot for the life of a run.
#[derive(Debug)]
pub struct ColorSelector {
    palette_size: usize,
    assigned: Mutex<HashMap<String, usize>>,
}

impl ColorSelector {
    pub fn new(palette_size: usize) -> Self {
        Self {
            palette_size: palette_size.max(1),
            assigned: Mutex::new(HashMap::new()),
        }
    }

    /// Palette index for `workspace`
    pub fn color_for(&self, workspace: &str) -> usize {
        let mut assigned = match self.assigned.lock() {
            Ok(assigned) => assigned,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(slot) = assigned.get(workspace) {
            return *slot;
        }
        let slot = assigned.len() % self.palette_size;
        assigned.insert(workspace.to_string(), slot);
        slot
    }
}

impl Default for ColorSelector {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_assignment() {
        let colors = ColorSelector::new(3);
        assert_eq!(colors.color_for("util"), 0);
        assert_eq!(colors.color_for("my-app"), 1);
        assert_eq!(colors.color_for("util"), 0);
        assert_eq!(colors.color_for("docs"), 2);
        assert_eq!(colors.color_for("web"), 0);
        assert_eq!(colors.color_for("my-app"), 1);
    }

    #[test]
    fn test_shared_between_threads() {
        let colors = std::sync::Arc::new(ColorSelector::default());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let colors = colors.clone();
                std::thread::spawn(move || colors.color_for(&format!("pkg-{}", i)))
            })
            .collect();
        let mut slots: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        slots.sort();
        assert_eq!(slots, vec![0, 1, 2, 3]);
    }
}
