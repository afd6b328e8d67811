// Action Executor: validated actions → input events.
use std::time::Duration;

use enigo::Key;
use serde::{Deserialize, Serialize};

use crate::actions::{Action, Target};
use crate::errors::{PilotError, PilotResult};
use crate::executor::input::{launcher_chord, parse_key, InputDriver};
use crate::perception::types::{fraction_to_pixels, ElementIndex, ScreenDimensions};

/// Pause between opening the launcher and typing into it.
const LAUNCHER_SETTLE: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: Action,
    pub success: bool,
    pub error: Option<String>,
    /// Absolute pixel position of a click.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<(i32, i32)>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ActionResult {
    fn from_outcome(action: &Action, outcome: &PilotResult<Option<(i32, i32)>>) -> Self {
        let (success, error, position) = match outcome {
            Ok(position) => (true, None, *position),
            Err(e) => (false, Some(e.to_string()), None),
        };
        Self {
            action: action.clone(),
            success,
            error,
            position,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutionOptions {
    pub inter_action_delay: Duration,
    pub abort_on_error: bool,
}

/// Outcome of one cycle's action list.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// One entry per executed non-terminal action, in order.
    pub results: Vec<ActionResult>,
    pub done: bool,
    pub summary: Option<String>,
    /// Set when abort-on-error stopped the cycle early.
    pub aborted: Option<PilotError>,
}

impl CycleReport {
    pub fn executed(&self) -> usize {
        self.results.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ActionResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// One line per failed action, fed back into the next cycle's prompt.
    pub fn feedback(&self) -> Vec<String> {
        self.failures()
            .map(|r| format!("{}: {}", describe(&r.action), r.error.as_deref().unwrap_or("failed")))
            .collect()
    }
}

fn describe(action: &Action) -> String {
    match action {
        Action::Click { target: Target::Label { label } } => format!("click '{label}'"),
        Action::Click { target: Target::Point(p) } => format!("click ({:.3}, {:.3})", p.x, p.y),
        Action::Write { text } => format!("write '{text}'"),
        Action::Press { keys } => format!("press {}", keys.join("+")),
        Action::Search { text } => format!("search '{text}'"),
        Action::Done { .. } => "done".into(),
    }
}

/// Execute a single action. `done` emits nothing.
pub async fn execute(
    action: &Action,
    elements: Option<&ElementIndex>,
    dims: ScreenDimensions,
    driver: &mut dyn InputDriver,
) -> ActionResult {
    let outcome = perform(action, elements, dims, driver).await;
    ActionResult::from_outcome(action, &outcome)
}

/// Execute actions in list order. Stops at the first `done`; nothing after it
/// runs. A failed action is recorded and the rest still run unless
/// `abort_on_error` is set.
pub async fn execute_cycle(
    actions: &[Action],
    elements: Option<&ElementIndex>,
    dims: ScreenDimensions,
    driver: &mut dyn InputDriver,
    options: ExecutionOptions,
) -> CycleReport {
    let mut report = CycleReport::default();

    for (idx, action) in actions.iter().enumerate() {
        if let Action::Done { summary } = action {
            let skipped = actions.len() - idx - 1;
            if skipped > 0 {
                tracing::warn!(skipped, "actions after done are not executed");
            }
            tracing::info!(summary = summary.as_deref().unwrap_or(""), "done action reached");
            report.done = true;
            report.summary = summary.clone();
            break;
        }

        if idx > 0 && !options.inter_action_delay.is_zero() {
            tokio::time::sleep(options.inter_action_delay).await;
        }

        let outcome = perform(action, elements, dims, driver).await;
        let result = ActionResult::from_outcome(action, &outcome);
        tracing::info!(
            index = idx,
            kind = action.kind(),
            success = result.success,
            error = result.error.as_deref().unwrap_or(""),
            "action executed"
        );
        report.results.push(result);

        if let Err(err) = outcome {
            if options.abort_on_error {
                tracing::warn!(index = idx, error = %err, "aborting cycle on failed action");
                report.aborted = Some(err);
                break;
            }
        }
    }

    report
}

async fn perform(
    action: &Action,
    elements: Option<&ElementIndex>,
    dims: ScreenDimensions,
    driver: &mut dyn InputDriver,
) -> PilotResult<Option<(i32, i32)>> {
    match action {
        Action::Click { target } => {
            let (x, y) = resolve_target(target, elements, dims)?;
            tracing::debug!(x, y, "click");
            driver.move_pointer(x, y)?;
            driver.left_click()?;
            Ok(Some((x, y)))
        }
        Action::Write { text } => {
            driver.type_text(text)?;
            Ok(None)
        }
        Action::Press { keys } => {
            let chord = parse_chord(keys)?;
            driver.key_chord(&chord)?;
            Ok(None)
        }
        Action::Search { text } => {
            driver.key_chord(&launcher_chord())?;
            tokio::time::sleep(LAUNCHER_SETTLE).await;
            driver.type_text(text)?;
            tokio::time::sleep(LAUNCHER_SETTLE).await;
            driver.key_chord(&[Key::Return])?;
            Ok(None)
        }
        Action::Done { .. } => Ok(None),
    }
}

/// Absolute pixel coordinates for a click target.
pub fn resolve_target(
    target: &Target,
    elements: Option<&ElementIndex>,
    dims: ScreenDimensions,
) -> PilotResult<(i32, i32)> {
    match target {
        Target::Point(p) => Ok(fraction_to_pixels(p.x, p.y, dims)),
        Target::Label { label } => {
            let element = elements
                .and_then(|index| index.resolve(label))
                .ok_or_else(|| PilotError::UnresolvedTarget(format!("no on-screen element matches '{label}'")))?;
            Ok(fraction_to_pixels(element.center.0, element.center.1, dims))
        }
    }
}

fn parse_chord(keys: &[String]) -> PilotResult<Vec<Key>> {
    if keys.is_empty() {
        return Err(PilotError::Execution("empty key chord".into()));
    }
    keys.iter()
        .map(|name| parse_key(name).ok_or_else(|| PilotError::Execution(format!("unknown key '{name}'"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::NormalizedPoint;
    use crate::perception::types::{ActionableElement, BoundingBox};

    #[derive(Debug, PartialEq)]
    enum Event {
        Move(i32, i32),
        Click,
        Text(String),
        Chord(Vec<Key>),
    }

    #[derive(Default)]
    struct RecordingDriver {
        events: Vec<Event>,
        fail_text: bool,
    }

    impl InputDriver for RecordingDriver {
        fn move_pointer(&mut self, x: i32, y: i32) -> PilotResult<()> {
            self.events.push(Event::Move(x, y));
            Ok(())
        }
        fn left_click(&mut self) -> PilotResult<()> {
            self.events.push(Event::Click);
            Ok(())
        }
        fn type_text(&mut self, text: &str) -> PilotResult<()> {
            if self.fail_text {
                return Err(PilotError::Execution("keyboard unavailable".into()));
            }
            self.events.push(Event::Text(text.into()));
            Ok(())
        }
        fn key_chord(&mut self, keys: &[Key]) -> PilotResult<()> {
            self.events.push(Event::Chord(keys.to_vec()));
            Ok(())
        }
    }

    const DIMS: ScreenDimensions = ScreenDimensions { width: 1920, height: 1080 };

    fn opts(abort_on_error: bool) -> ExecutionOptions {
        ExecutionOptions {
            inter_action_delay: Duration::ZERO,
            abort_on_error,
        }
    }

    fn click(x: f64, y: f64) -> Action {
        Action::Click {
            target: Target::Point(NormalizedPoint::clamped_from(x, y)),
        }
    }

    fn write(text: &str) -> Action {
        Action::Write { text: text.into() }
    }

    #[tokio::test]
    async fn click_maps_fractions_to_pixels() {
        let mut driver = RecordingDriver::default();
        let result = execute(&click(0.5, 0.1), None, DIMS, &mut driver).await;
        assert!(result.success);
        assert_eq!(result.position, Some((960, 108)));
        assert_eq!(driver.events, vec![Event::Move(960, 108), Event::Click]);
    }

    #[tokio::test]
    async fn label_clicks_use_element_centers() {
        let element =
            ActionableElement::from_region("Settings", BoundingBox::new(100.0, 40.0, 200.0, 60.0), 1920, 1080).unwrap();
        let index = ElementIndex::new(vec![element]);
        let action = Action::Click {
            target: Target::Label { label: "settings".into() },
        };
        let mut driver = RecordingDriver::default();
        let result = execute(&action, Some(&index), DIMS, &mut driver).await;
        assert_eq!(result.position, Some((150, 50)));

        let missing = Action::Click {
            target: Target::Label { label: "Logout".into() },
        };
        let result = execute(&missing, Some(&index), DIMS, &mut driver).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Unresolved target"));
    }

    #[tokio::test]
    async fn nothing_after_done_runs() {
        let actions = vec![
            write("a"),
            write("b"),
            Action::Done { summary: Some("ok".into()) },
            write("c"),
        ];
        let mut driver = RecordingDriver::default();
        let report = execute_cycle(&actions, None, DIMS, &mut driver, opts(false)).await;
        assert!(report.done);
        assert_eq!(report.executed(), 2);
        assert_eq!(report.summary.as_deref(), Some("ok"));
        assert_eq!(driver.events, vec![Event::Text("a".into()), Event::Text("b".into())]);
    }

    #[tokio::test]
    async fn failures_are_recorded_and_the_cycle_continues() {
        let actions = vec![write("a"), click(0.0, 0.0)];
        let mut driver = RecordingDriver {
            fail_text: true,
            ..Default::default()
        };
        let report = execute_cycle(&actions, None, DIMS, &mut driver, opts(false)).await;
        assert_eq!(report.executed(), 2);
        assert!(report.aborted.is_none());
        assert_eq!(report.feedback(), vec!["write 'a': Execution failure: keyboard unavailable".to_string()]);
        assert_eq!(driver.events, vec![Event::Move(0, 0), Event::Click]);
    }

    #[tokio::test]
    async fn abort_on_error_stops_the_cycle() {
        let actions = vec![write("a"), click(0.0, 0.0)];
        let mut driver = RecordingDriver {
            fail_text: true,
            ..Default::default()
        };
        let report = execute_cycle(&actions, None, DIMS, &mut driver, opts(true)).await;
        assert_eq!(report.executed(), 1);
        assert!(matches!(report.aborted, Some(PilotError::Execution(_))));
        assert!(driver.events.is_empty());
    }

    #[tokio::test]
    async fn press_sends_one_chord() {
        let action = Action::Press {
            keys: vec!["ctrl".into(), "c".into()],
        };
        let mut driver = RecordingDriver::default();
        assert!(execute(&action, None, DIMS, &mut driver).await.success);
        assert_eq!(driver.events, vec![Event::Chord(vec![Key::Control, Key::Unicode('c')])]);

        let bad = Action::Press {
            keys: vec!["ctrl".into(), "hyper".into()],
        };
        let result = execute(&bad, None, DIMS, &mut driver).await;
        assert!(!result.success);
        assert_eq!(driver.events.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn search_opens_launcher_types_and_confirms() {
        let mut driver = RecordingDriver::default();
        let action = Action::Search { text: "Terminal".into() };
        assert!(execute(&action, None, DIMS, &mut driver).await.success);
        assert_eq!(
            driver.events,
            vec![
                Event::Chord(launcher_chord()),
                Event::Text("Terminal".into()),
                Event::Chord(vec![Key::Return]),
            ]
        );
    }
}
