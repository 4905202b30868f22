// ============================================================
// Layer 3 — Input Layout
// ============================================================
// The ordered, named input slots a model variant consumes.
//
// Every variant takes the signal first (slot "x"). What follows
// depends on the conditioning scheme, e.g.
//   Guided           → x, cond_1, cond_2, ...
//   LEAP             → x, cond
//   LEAP conditional → x, tau, cond
//   LEAP embedding   → x, tau, [cond_pre], emb_0, emb_1, ...
//
// A dataset must present exactly these slots, with these widths,
// plus the reconstruction target "y".

use serde::{Deserialize, Serialize};

pub const SIGNAL_KEY: &str = "x";
pub const TARGET_KEY: &str = "y";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSlot {
    pub name:  String,
    pub width: usize,
}

impl InputSlot {
    pub fn new(name: impl Into<String>, width: usize) -> Self {
        Self { name: name.into(), width }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputLayout {
    slots: Vec<InputSlot>,
}

impl InputLayout {
    /// Start a layout with the signal slot.
    pub fn with_signal(width: usize) -> Self {
        Self { slots: vec![InputSlot::new(SIGNAL_KEY, width)] }
    }

    pub fn push(mut self, name: impl Into<String>, width: usize) -> Self {
        self.slots.push(InputSlot::new(name, width));
        self
    }

    pub fn signal_width(&self) -> usize {
        self.slots[0].width
    }

    /// Condition slots, in order, excluding the signal.
    pub fn conditions(&self) -> &[InputSlot] {
        &self.slots[1..]
    }

    pub fn slots(&self) -> &[InputSlot] {
        &self.slots
    }

    /// Compact description, e.g. `x:4, tau:2, cond:3`.
    pub fn describe(&self) -> String {
        self.slots
            .iter()
            .map(|s| format!("{}:{}", s.name, s.width))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditions_exclude_signal() {
        let layout = InputLayout::with_signal(4).push("tau", 2).push("cond", 3);
        assert_eq!(layout.signal_width(), 4);
        assert_eq!(layout.conditions().len(), 2);
        assert_eq!(layout.conditions()[1], InputSlot::new("cond", 3));
        assert_eq!(layout.describe(), "x:4, tau:2, cond:3");
    }
}
