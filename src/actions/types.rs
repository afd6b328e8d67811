use serde::{Deserialize, Serialize};

/// A fractional screen position, both components in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
    /// Set when the backend sent an out-of-range value that was clamped.
    #[serde(default)]
    pub clamped: bool,
}

impl NormalizedPoint {
    /// Clamp each component into [0, 1], flagging whether anything changed.
    pub fn clamped_from(x: f64, y: f64) -> Self {
        let cx = x.clamp(0.0, 1.0);
        let cy = y.clamp(0.0, 1.0);
        Self {
            x: cx,
            y: cy,
            clamped: cx != x || cy != y,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Target {
    Point(NormalizedPoint),
    /// Resolved against the cycle's `ElementIndex` at execution time.
    Label { label: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click { target: Target },
    Write { text: String },
    /// Pressed together as one chord, in order.
    Press { keys: Vec<String> },
    Search { text: String },
    Done { summary: Option<String> },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::Write { .. } => "write",
            Action::Press { .. } => "press",
            Action::Search { .. } => "search",
            Action::Done { .. } => "done",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Action::Done { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_range_points_are_not_flagged() {
        let p = NormalizedPoint::clamped_from(0.0, 1.0);
        assert_eq!((p.x, p.y, p.clamped), (0.0, 1.0, false));
    }

    #[test]
    fn out_of_range_points_are_clamped_and_flagged() {
        let p = NormalizedPoint::clamped_from(1.02, -0.1);
        assert_eq!((p.x, p.y, p.clamped), (1.0, 0.0, true));
    }

    #[test]
    fn actions_serialize_with_type_tag() {
        let action = Action::Click {
            target: Target::Label { label: "Settings".into() },
        };
        let v = serde_json::to_value(&action).unwrap();
        assert_eq!(v["type"], "click");
        assert_eq!(v["target"]["by"], "label");
        assert_eq!(v["target"]["label"], "Settings");
    }
}
