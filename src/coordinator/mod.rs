//! Run coordinator: the boundary between transports and runs
//!
//! `start` and `continue_run` validate synchronously, so request errors come
//! back before any stream exists. The run itself is driven on a spawned task
//! that feeds the returned event stream until the run suspends or ends.

mod context;
mod requests;

pub use context::FlowContext;
pub use requests::{ContinueRequest, StartRequest};

use crate::approval::{ApprovalHandle, ApprovalRegistry, looks_like_token};
use crate::events::{ChannelEmitter, EventSink, FlowEvent};
use crate::executor::RouteRequest;
use crate::run::{Decision, FlowError, Outcome, Run, RunDriver, RunState, StaleReason};
use crate::step::WorkflowDefinition;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Events of one start or continue exchange
#[derive(Debug)]
pub struct RunStream {
    pub run_id: String,
    pub events: mpsc::Receiver<FlowEvent>,
}

/// Accepts start/continue requests and drives runs
#[derive(Debug, Clone)]
pub struct RunCoordinator {
    context: Arc<FlowContext>,
    registry: ApprovalRegistry<Run>,
}

impl RunCoordinator {
    pub fn new(context: FlowContext) -> Self {
        Self {
            context: Arc::new(context),
            registry: ApprovalRegistry::new(),
        }
    }

    pub fn context(&self) -> &FlowContext {
        &self.context
    }

    pub fn registry(&self) -> &ApprovalRegistry<Run> {
        &self.registry
    }

    /// Start a run and stream it to its first suspension or terminal state
    pub async fn start(&self, request: StartRequest) -> Result<RunStream, FlowError> {
        let request = request.validate()?;
        let definition = self.context.catalog.get_definition(&request.workflow_type)?;

        let route = self.route(&definition, &request).await?;
        let specs = definition.materialize(route.as_deref())?;

        let run_id = Uuid::new_v4().to_string();
        let run = Run::new(
            run_id.clone(),
            definition,
            specs,
            request.input,
            request.prior_turns,
            route,
        );

        Ok(self.spawn_drive(run, None))
    }

    /// Apply a decision to a suspended run and stream what follows
    ///
    /// The token is consumed only when its run is still waiting at the
    /// checkpoint it was minted for; a second call with the same token fails
    /// as stale. A stale call leaves the registry untouched.
    pub async fn continue_run(&self, request: ContinueRequest) -> Result<RunStream, FlowError> {
        let request = request.validate()?;
        if !looks_like_token(&request.token) {
            return Err(FlowError::stale(&request.token, StaleReason::UnknownToken));
        }
        let (handle, run) = self.registry.redeem(&request.token, check_fresh).await?;

        tracing::info!(
            run_id = %run.run_id,
            token = %handle.token,
            decision = ?request.decision,
            "Continuing run"
        );
        Ok(self.spawn_drive(run, Some(request.decision)))
    }

    /// Evict approvals idle longer than the configured timeout, if one is set
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        let settings = &self.context.config.registry;
        let idle = Duration::from_secs(settings.idle_timeout_secs?);
        let every = Duration::from_secs(settings.sweep_interval_secs.max(1));
        let registry = self.registry.clone();

        tracing::info!(idle_secs = idle.as_secs(), "Approval idle eviction enabled");
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                registry.evict_idle(idle).await;
            }
        }))
    }

    async fn route(
        &self,
        definition: &WorkflowDefinition,
        request: &StartRequest,
    ) -> Result<Option<String>, FlowError> {
        if !definition.is_supervisor() {
            return Ok(None);
        }

        let router = self.context.router_for(&definition.name).ok_or_else(|| {
            FlowError::routing(format!("workflow '{}' has no router", definition.name))
        })?;

        let route_request = RouteRequest {
            workflow: definition.name.clone(),
            input: request.input.clone(),
            prior_turns: request.prior_turns.clone(),
        };
        let specialist = router
            .route(&route_request)
            .await
            .map_err(|e| FlowError::routing(e.to_string()))?;

        tracing::info!(
            workflow = %definition.name,
            router = router.name(),
            specialist = %specialist,
            "Routed request"
        );
        Ok(Some(specialist))
    }

    fn spawn_drive(&self, run: Run, decision: Option<Decision>) -> RunStream {
        let (emitter, events) = ChannelEmitter::channel(self.context.config.server.event_buffer);
        let run_id = run.run_id.clone();
        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.drive(run, decision, emitter).await });
        RunStream { run_id, events }
    }

    async fn drive(&self, mut run: Run, decision: Option<Decision>, sink: ChannelEmitter) {
        let driver = RunDriver::new(&self.context.agents, &self.context.templates, &sink);
        let outcome = match decision {
            None => driver.start(&mut run).await,
            Some(decision) => driver.resume(&mut run, decision).await,
        };

        let Outcome::Suspended(prompt) = outcome else {
            return;
        };

        let run_id = run.run_id.clone();
        let cursor = run.cursor();
        let all_steps = run.snapshot();

        // Registered before the event goes out so a fast client can continue at once
        let handle = self.registry.register(&run_id, cursor, run).await;
        sink.emit(FlowEvent::ApprovalRequired {
            run_id,
            token: handle.token,
            title: prompt.title,
            message: prompt.message,
            details: prompt.details,
            all_steps,
        })
        .await;
    }
}

/// The run must still be waiting at the checkpoint the token was minted for
fn check_fresh(handle: &ApprovalHandle, run: &Run) -> Result<(), FlowError> {
    if run.state() != RunState::Suspended {
        return Err(FlowError::stale(&handle.token, StaleReason::NotSuspended));
    }
    if run.cursor() != handle.cursor {
        return Err(FlowError::stale(&handle.token, StaleReason::CursorMoved));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FlowgateConfig, StepConfig, WorkflowConfig};
    use crate::events::collect_flattened;
    use crate::executor::AgentPool;
    use crate::run::{StepInstance, StepStatus};
    use crate::step::DefinitionCatalog;
    use serde_json::json;
    use std::collections::HashMap;

    fn five_step(checkpoints: &[usize]) -> WorkflowConfig {
        WorkflowConfig {
            name: "five".into(),
            steps: (1..=5)
                .map(|i| StepConfig {
                    id: format!("s{}", i),
                    label: format!("Step {}", i),
                    checkpoint: checkpoints.contains(&i),
                    output: (!checkpoints.contains(&i))
                        .then(|| json!({ "summary": format!("step {} done", i) })),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn coordinator(workflows: &[WorkflowConfig]) -> RunCoordinator {
        let mut catalog = DefinitionCatalog::default();
        for workflow in workflows {
            catalog.insert(workflow).unwrap();
        }
        for name in ["order_fulfillment", "expense_claim", "automotive_sales"] {
            let source = crate::config::builtin::get(name).unwrap();
            catalog.insert(&toml::from_str(source).unwrap()).unwrap();
        }
        let context =
            FlowContext::new(catalog, AgentPool::default(), FlowgateConfig::default()).unwrap();
        RunCoordinator::new(context)
    }

    async fn drain(mut stream: RunStream) -> Vec<FlowEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.events.recv().await {
            events.push(event);
        }
        events
    }

    fn step_events(events: &[FlowEvent]) -> Vec<&StepInstance> {
        events
            .iter()
            .filter_map(|e| match e {
                FlowEvent::Step { step, .. } => Some(step),
                _ => None,
            })
            .collect()
    }

    fn completed(events: &[FlowEvent]) -> Vec<&str> {
        step_events(events)
            .into_iter()
            .filter(|s| s.status == StepStatus::Complete)
            .map(|s| s.id.as_str())
            .collect()
    }

    fn approval_token(events: &[FlowEvent]) -> String {
        match events.last() {
            Some(FlowEvent::ApprovalRequired { token, .. }) => token.clone(),
            other => panic!("expected approval_required, got {:?}", other),
        }
    }

    fn rank(status: StepStatus) -> u8 {
        match status {
            StepStatus::Pending => 0,
            StepStatus::Active => 1,
            StepStatus::Complete | StepStatus::Rejected => 2,
        }
    }

    /// Every step's observed statuses move forward one stage at a time
    fn assert_monotonic(events: &[FlowEvent]) {
        let mut last: HashMap<&str, u8> = HashMap::new();
        for step in step_events(events) {
            let previous = last.get(step.id.as_str()).copied().unwrap_or(0);
            let current = rank(step.status);
            assert_eq!(current, previous + 1, "step {} jumped to {:?}", step.id, step.status);
            last.insert(&step.id, current);
        }
    }

    #[tokio::test]
    async fn test_no_checkpoints_runs_to_done() {
        let coordinator = coordinator(&[five_step(&[])]);
        let events = drain(
            coordinator
                .start(StartRequest::new("five", json!("go")))
                .await
                .unwrap(),
        )
        .await;

        // Two events per step, then exactly one terminal event
        assert_eq!(events.len(), 11);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(
            events.last(),
            Some(&FlowEvent::Response {
                run_id: events[0].run_id().unwrap().to_string(),
                content: "step 5 done".into(),
            })
        );
        assert_monotonic(&events);
    }

    #[tokio::test]
    async fn test_scenario_a_approve() {
        let coordinator = coordinator(&[five_step(&[3])]);
        let stream = coordinator
            .start(StartRequest::new("five", json!("go")))
            .await
            .unwrap();
        let run_id = stream.run_id.clone();
        let first = drain(stream).await;

        assert_eq!(completed(&first), ["s1", "s2"]);
        assert!(!first.iter().any(|e| matches!(e, FlowEvent::Response { .. })));
        let token = approval_token(&first);

        let second = drain(
            coordinator
                .continue_run(ContinueRequest::new(&token, Decision::Approve))
                .await
                .unwrap(),
        )
        .await;

        assert_eq!(completed(&second), ["s3", "s4", "s5"]);
        assert!(matches!(
            second.last(),
            Some(FlowEvent::Response { run_id: r, .. }) if *r == run_id
        ));

        let mut all = first;
        all.extend(second);
        assert_monotonic(&all);
        assert!(coordinator.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_scenario_b_reject() {
        let coordinator = coordinator(&[five_step(&[3])]);
        let first = drain(
            coordinator
                .start(StartRequest::new("five", json!("go")))
                .await
                .unwrap(),
        )
        .await;
        let token = approval_token(&first);

        let second = drain(
            coordinator
                .continue_run(ContinueRequest::new(&token, Decision::Reject))
                .await
                .unwrap(),
        )
        .await;

        assert_eq!(second.len(), 2);
        let steps = step_events(&second);
        assert_eq!(steps.len(), 1);
        assert_eq!((steps[0].id.as_str(), steps[0].status), ("s3", StepStatus::Rejected));
        assert!(matches!(
            second.last(),
            Some(FlowEvent::Response { content, .. }) if content.contains("Step 3")
        ));

        // Steps 4 and 5 never left pending
        if let FlowEvent::Step { all_steps, .. } = &second[0] {
            assert!(all_steps[3..].iter().all(|s| s.status == StepStatus::Pending));
        }
    }

    #[tokio::test]
    async fn test_scenario_c_supervisor_routes_to_finance() {
        let coordinator = coordinator(&[]);
        let stream = coordinator
            .start(StartRequest::new(
                "automotive_sales",
                json!("What are my monthly payment options?"),
            ))
            .await
            .unwrap();
        let events = drain(stream).await;

        let FlowEvent::Step { all_steps, .. } = &events[0] else {
            panic!("expected a step event first");
        };
        assert_eq!(all_steps.len(), 3);
        assert_eq!(all_steps[1].id, "finance");
        assert_eq!(all_steps[1].agent.as_deref(), Some("Finance Specialist"));

        match events.last() {
            Some(FlowEvent::Response { content, .. }) => assert!(content.contains("5.9% APR")),
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scenario_d_unknown_token() {
        let coordinator = coordinator(&[]);
        let err = coordinator
            .continue_run(ContinueRequest::new("apr_nope", Decision::Approve))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::StaleApproval {
                reason: StaleReason::UnknownToken,
                ..
            }
        ));
        assert!(err.to_string().contains("please retry"));
    }

    #[tokio::test]
    async fn test_token_is_single_use() {
        let coordinator = coordinator(&[five_step(&[3])]);
        let first = drain(
            coordinator
                .start(StartRequest::new("five", json!("go")))
                .await
                .unwrap(),
        )
        .await;
        let token = approval_token(&first);

        drain(
            coordinator
                .continue_run(ContinueRequest::new(&token, Decision::Approve))
                .await
                .unwrap(),
        )
        .await;

        let err = coordinator
            .continue_run(ContinueRequest::new(&token, Decision::Approve))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::StaleApproval { .. }));
    }

    #[tokio::test]
    async fn test_stale_run_keeps_its_approval() {
        let coordinator = coordinator(&[five_step(&[3])]);
        let first = drain(
            coordinator
                .start(StartRequest::new("five", json!("go")))
                .await
                .unwrap(),
        )
        .await;
        let token = approval_token(&first);
        let registry = coordinator.registry();
        let (handle, run) = registry.redeem(&token, |_, _| Ok(())).await.unwrap();

        // Handle minted for a later checkpoint than the run is waiting at
        let moved = registry.register(&handle.run_id, handle.cursor + 1, run).await;
        let err = coordinator
            .continue_run(ContinueRequest::new(&moved.token, Decision::Approve))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::StaleApproval {
                reason: StaleReason::CursorMoved,
                ..
            }
        ));
        assert_eq!(registry.resolve(&moved.token).await, Some(moved.clone()));

        // Run no longer suspended
        let (_, mut run) = registry.redeem(&moved.token, |_, _| Ok(())).await.unwrap();
        run.resume().unwrap();
        let running = registry.register(&handle.run_id, handle.cursor, run).await;
        let err = coordinator
            .continue_run(ContinueRequest::new(&running.token, Decision::Approve))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::StaleApproval {
                reason: StaleReason::NotSuspended,
                ..
            }
        ));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_continue_single_winner() {
        let coordinator = coordinator(&[five_step(&[3])]);
        let first = drain(
            coordinator
                .start(StartRequest::new("five", json!("go")))
                .await
                .unwrap(),
        )
        .await;
        let token = approval_token(&first);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let coordinator = coordinator.clone();
                let decision = if i % 2 == 0 { Decision::Approve } else { Decision::Reject };
                let request = ContinueRequest::new(&token, decision);
                tokio::spawn(async move { coordinator.continue_run(request).await })
            })
            .collect();

        let mut winners = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(stream) => winners.push(drain(stream).await),
                Err(e) => assert!(matches!(e, FlowError::StaleApproval { .. })),
            }
        }
        assert_eq!(winners.len(), 1);
        assert!(winners[0].last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_expense_small_claim_skips_manager() {
        let coordinator = coordinator(&[]);
        let first = drain(
            coordinator
                .start(StartRequest::new(
                    "expense_claim",
                    json!({ "message": "Team lunch", "amount": 80 }),
                ))
                .await
                .unwrap(),
        )
        .await;

        assert_eq!(completed(&first), ["ocr", "validation", "manager_approval"]);
        match first.last() {
            Some(FlowEvent::ApprovalRequired { title, details, .. }) => {
                assert_eq!(title, "Finance Approval Required");
                assert_eq!(details["amount"], "$80.00");
            }
            other => panic!("expected finance approval, got {:?}", other),
        }

        let second = collect_flattened(
            coordinator
                .continue_run(ContinueRequest::new(approval_token(&first), Decision::Approve))
                .await
                .unwrap()
                .events,
        )
        .await;
        let response = second.response.unwrap();
        assert!(response.contains("Manager: skipped"));
        assert!(response.contains("Finance: approved"));
    }

    #[tokio::test]
    async fn test_expense_large_claim_needs_two_approvals() {
        let coordinator = coordinator(&[]);
        let first = drain(
            coordinator
                .start(StartRequest::new("expense_claim", json!({ "amount": 640 })))
                .await
                .unwrap(),
        )
        .await;
        let manager_token = approval_token(&first);

        let second = drain(
            coordinator
                .continue_run(ContinueRequest::new(&manager_token, Decision::Approve))
                .await
                .unwrap(),
        )
        .await;
        let finance_token = approval_token(&second);
        assert_ne!(manager_token, finance_token);
        assert_eq!(completed(&second), ["manager_approval"]);
    }

    #[tokio::test]
    async fn test_request_errors_create_no_run() {
        let coordinator = coordinator(&[]);

        let err = coordinator
            .start(StartRequest::new("missing", json!("hi")))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::WorkflowNotFound { .. }));

        let err = coordinator
            .start(StartRequest::new("", json!("hi")))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Validation { .. }));
        assert!(coordinator.registry().is_empty().await);
    }

    struct FixedRouter(&'static str);

    #[async_trait::async_trait]
    impl crate::executor::Router for FixedRouter {
        async fn route(
            &self,
            _request: &RouteRequest,
        ) -> Result<String, crate::executor::RouterError> {
            Ok(self.0.to_string())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_router_outside_allow_list() {
        let mut catalog = DefinitionCatalog::default();
        let source = crate::config::builtin::get("automotive_sales").unwrap();
        catalog.insert(&toml::from_str(source).unwrap()).unwrap();
        let context = FlowContext::new(catalog, AgentPool::default(), FlowgateConfig::default())
            .unwrap()
            .with_router("automotive_sales", Arc::new(FixedRouter("lottery")));
        let coordinator = RunCoordinator::new(context);

        let err = coordinator
            .start(StartRequest::new("automotive_sales", json!("anything")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::UnknownSpecialist { ref specialist, .. } if specialist == "lottery"
        ));
        assert!(coordinator.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_dropped_observer_still_suspends() {
        let coordinator = coordinator(&[five_step(&[3])]);
        let stream = coordinator
            .start(StartRequest::new("five", json!("go")))
            .await
            .unwrap();
        let run_id = stream.run_id.clone();
        drop(stream);

        // The run keeps going server-side and still registers its approval
        for _ in 0..50 {
            if coordinator.registry().handle_for_run(&run_id).await.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run did not reach its checkpoint");
    }
}
