use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::actions::{self, Action};
use crate::agent_engine::history::{ConversationHistory, SessionJournal};
use crate::agent_engine::loop_control::{LoopController, StopHandle};
use crate::agent_engine::state::{LoopPhase, LoopState, RunStatus, RunSummary};
use crate::config::OperatorConfig;
use crate::errors::{PilotError, PilotResult};
use crate::executor::dispatcher::{execute_cycle, ExecutionOptions};
use crate::executor::input::InputDriver;
use crate::llm::client::DecisionClient;
use crate::llm::prompts;
use crate::llm::types::ConversationTurn;
use crate::perception::locator::ElementLocator;
use crate::perception::screenshot::ScreenCapturer;
use crate::perception::types::{ElementIndex, Snapshot};

const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// The loop controller: capture → (locate) → decide → validate → execute.
pub struct AgentEngine {
    capturer: Arc<dyn ScreenCapturer>,
    locator: Option<ElementLocator>,
    client: DecisionClient,
    driver: Box<dyn InputDriver>,
    operator: OperatorConfig,
    stop: StopHandle,
}

/// Per-run bookkeeping.
struct RunContext {
    phase: LoopPhase,
    /// Phase that was running when the machine entered `Error`.
    failed_in: Option<LoopPhase>,
    state: LoopState,
    last_response: Option<String>,
    summary: Option<String>,
    journal: Option<SessionJournal>,
}

/// Working state carried between phases; cycle-scoped fields are replaced each iteration.
struct Cycle {
    ctrl: LoopController,
    history: ConversationHistory,
    feedback: Vec<String>,
    snapshot: Option<Snapshot>,
    elements: Option<ElementIndex>,
    prompt: Option<String>,
    actions: Vec<Action>,
}

impl RunContext {
    fn enter(&mut self, phase: LoopPhase) {
        tracing::debug!(iteration = self.state.iteration, from = ?self.phase, to = ?phase, "phase transition");
        self.phase = phase;
    }

    fn journal(&self, kind: &str, payload: serde_json::Value) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.record(self.state.iteration, kind, payload) {
                tracing::warn!(error = %e, kind, "journal write failed");
            }
        }
    }
}

impl AgentEngine {
    pub fn new(
        capturer: Arc<dyn ScreenCapturer>,
        locator: Option<ElementLocator>,
        client: DecisionClient,
        driver: Box<dyn InputDriver>,
        operator: OperatorConfig,
    ) -> Self {
        Self {
            capturer,
            locator,
            client,
            driver,
            operator,
            stop: StopHandle::new(),
        }
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Drive one objective to a terminal state. Never fails: every outcome,
    /// including errors, is reported through the summary.
    pub async fn run(&mut self, objective: &str, max_iterations: u32) -> RunSummary {
        let journal = if self.operator.journal {
            SessionJournal::create(self.operator.journal_dir.as_deref())
                .map_err(|e| tracing::warn!(error = %e, "session journal unavailable"))
                .ok()
        } else {
            None
        };

        let mut ctx = RunContext {
            phase: LoopPhase::Init,
            failed_in: None,
            state: LoopState::new(),
            last_response: None,
            summary: None,
            journal,
        };

        tracing::info!(
            objective = %objective,
            backend = %self.client.backend_name(),
            max_iterations,
            "run started"
        );
        ctx.journal("objective", json!({ "objective": objective, "backend": self.client.backend_name() }));

        let outcome = self.drive(objective, max_iterations, &mut ctx).await;

        let last_error = match outcome {
            Ok(()) => {
                ctx.state.status = RunStatus::Done;
                tracing::info!(iterations = ctx.state.iteration, "objective done");
                None
            }
            Err(e) => {
                ctx.state.status = RunStatus::Error;
                tracing::error!(iterations = ctx.state.iteration, phase = ?ctx.failed_in, error = %e, "run ended with error");
                Some(e.to_string())
            }
        };
        ctx.state.last_error = last_error.clone();

        let summary = RunSummary {
            status: ctx.state.status,
            iterations: ctx.state.iteration,
            last_phase: ctx.failed_in.unwrap_or(ctx.phase),
            last_error,
            last_response: ctx.last_response.clone(),
            summary: ctx.summary.clone(),
        };
        ctx.journal("summary", json!(summary));
        summary
    }

    /// Steps the phase machine until it reaches `Done` or `Error`. A failing
    /// phase is remembered in `failed_in` before the machine enters `Error`.
    async fn drive(&mut self, objective: &str, max_iterations: u32, ctx: &mut RunContext) -> PilotResult<()> {
        let mut cycle = Cycle {
            ctrl: LoopController::new(&self.operator, max_iterations, self.stop.clone()),
            history: ConversationHistory::new(self.client.system_prompt(), self.operator.max_history_turns),
            feedback: Vec::new(),
            snapshot: None,
            elements: None,
            prompt: None,
            actions: Vec::new(),
        };
        let mut failure: Option<PilotError> = None;

        loop {
            let phase = ctx.phase;
            let step = match phase {
                LoopPhase::Init => Ok(LoopPhase::Capturing),
                LoopPhase::Capturing => self.begin_cycle(objective, &mut cycle, ctx).await,
                LoopPhase::Deciding => self.decide(objective, &mut cycle, ctx).await,
                LoopPhase::Validating => self.validate(objective, &mut cycle, ctx),
                LoopPhase::Executing => self.execute(&mut cycle, ctx).await,
                LoopPhase::Done => return Ok(()),
                LoopPhase::Error => {
                    return Err(failure.unwrap_or_else(|| PilotError::Execution("run failed".into())))
                }
            };
            match step {
                Ok(next) => ctx.enter(next),
                Err(e) => {
                    ctx.failed_in = Some(phase);
                    failure = Some(e);
                    ctx.enter(LoopPhase::Error);
                }
            }
        }
    }

    async fn begin_cycle(&mut self, objective: &str, cycle: &mut Cycle, ctx: &mut RunContext) -> PilotResult<LoopPhase> {
        if cycle.ctrl.stop_requested() {
            tracing::info!(iteration = ctx.state.iteration, "stop requested between cycles");
            return Err(PilotError::Cancelled);
        }
        if cycle.ctrl.iterations_exhausted(ctx.state.iteration + 1) {
            return Err(PilotError::IterationLimit(cycle.ctrl.max_iterations()));
        }
        ctx.state.iteration += 1;
        tracing::info!(iteration = ctx.state.iteration, "cycle started");

        let snap = self.capture(&cycle.ctrl).await?;
        cycle.elements = match &self.locator {
            Some(locator) if self.client.wants_elements() => Some(locator.locate(&snap).await),
            _ => None,
        };
        cycle.prompt = Some(self.client.cycle_prompt(objective, cycle.elements.as_ref(), &cycle.feedback));
        cycle.feedback.clear();
        cycle.snapshot = Some(snap);
        Ok(LoopPhase::Deciding)
    }

    async fn decide(&mut self, objective: &str, cycle: &mut Cycle, ctx: &mut RunContext) -> PilotResult<LoopPhase> {
        let snap = cycle
            .snapshot
            .as_ref()
            .ok_or_else(|| PilotError::Capture("no snapshot for decision".into()))?;
        let text = cycle.prompt.take().unwrap_or_else(|| objective.to_string());

        let raw = self.client.decide(cycle.history.snapshot(), text.clone(), snap).await?;
        tracing::debug!(iteration = ctx.state.iteration, raw = %raw, "raw decision");

        cycle.history.push(ConversationTurn::user_with_image(text, snap.id.clone()));
        cycle.history.push(ConversationTurn::assistant(raw.clone()));
        ctx.journal("response", json!({ "raw": raw }));
        ctx.last_response = Some(raw);
        Ok(LoopPhase::Validating)
    }

    /// Parse failures within the retry budget send the machine back to
    /// `Deciding` with a corrective prompt; past it they end the run.
    fn validate(&self, objective: &str, cycle: &mut Cycle, ctx: &mut RunContext) -> PilotResult<LoopPhase> {
        let raw = ctx.last_response.as_deref().unwrap_or("");
        match actions::normalize(raw) {
            Ok(parsed) => {
                cycle.ctrl.reset_parse_failures();
                tracing::info!(
                    iteration = ctx.state.iteration,
                    actions = parsed.len(),
                    kinds = ?parsed.iter().map(Action::kind).collect::<Vec<_>>(),
                    "actions validated"
                );
                cycle.actions = parsed;
                Ok(LoopPhase::Executing)
            }
            Err(err) => {
                if !cycle.ctrl.record_parse_failure() {
                    return Err(err);
                }
                tracing::warn!(
                    iteration = ctx.state.iteration,
                    failures = cycle.ctrl.parse_failures(),
                    error = %err,
                    "unusable response, re-prompting"
                );
                cycle.prompt = Some(prompts::reprompt_after_parse_failure(objective, &err.to_string()));
                Ok(LoopPhase::Deciding)
            }
        }
    }

    async fn execute(&mut self, cycle: &mut Cycle, ctx: &mut RunContext) -> PilotResult<LoopPhase> {
        // The snapshot's pixels are not needed past this point.
        let dims = cycle
            .snapshot
            .take()
            .map(|s| s.input_dimensions())
            .ok_or_else(|| PilotError::Capture("no snapshot for execution".into()))?;

        let options = ExecutionOptions {
            inter_action_delay: Duration::from_millis(self.operator.inter_action_delay_ms),
            abort_on_error: self.operator.abort_on_error,
        };
        let elements = cycle.elements.take();
        let mut report = execute_cycle(
            &cycle.actions,
            elements.as_ref(),
            dims,
            self.driver.as_mut(),
            options,
        )
        .await;
        ctx.journal("actions", json!({ "results": report.results, "done": report.done }));

        if let Some(err) = report.aborted.take() {
            return Err(err);
        }
        if report.done {
            ctx.summary = report.summary.take();
            return Ok(LoopPhase::Done);
        }
        cycle.feedback = report.feedback();
        Ok(LoopPhase::Capturing)
    }

    async fn capture(&self, ctrl: &LoopController) -> PilotResult<Snapshot> {
        let attempts = ctrl.capture_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.capturer.capture(self.operator.include_pointer).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if attempt < attempts => {
                    tracing::warn!(attempt, attempts, error = %e, "capture failed, retrying");
                    tokio::time::sleep(CAPTURE_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
