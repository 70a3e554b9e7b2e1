//! 编排状态机集成测试：用脚本化模型驱动各阶段

use std::sync::Arc;

use async_trait::async_trait;
use hive::config::AppConfig;
use hive::core::{Orchestrator, Phase, CEILING_WARNING, INVOCATION_FAILURE_TEXT};
use hive::llm::{MockModelClient, ScriptedModelClient};
use hive::react::{OrchestratorEvent, NO_RESPONSE_WARNING};
use hive::tools::{Tool, ToolRequest};

const ACTOR: &str = "Tinker Agent";
const CRITIC: &str = "Critic";
const RESPONDER: &str = "Summarizing Agent";
const PLANNER: &str = "Planning Agent";

fn orchestrator(model: &Arc<ScriptedModelClient>) -> Orchestrator {
    Orchestrator::builder()
        .with_model(model.clone())
        .build()
        .unwrap()
}

fn prompts_for(model: &ScriptedModelClient, marker: &str) -> Vec<String> {
    model
        .calls()
        .into_iter()
        .filter(|c| c.marker.as_deref() == Some(marker))
        .map(|c| c.prompt)
        .collect()
}

/// 返回大段输出的代码执行工具
struct BulkyRunner;

#[async_trait]
impl Tool for BulkyRunner {
    fn name(&self) -> &str {
        "code"
    }

    fn description(&self) -> &str {
        "prints a large table"
    }

    async fn execute(&self, _request: ToolRequest) -> Result<String, String> {
        Ok("row | region | sales | margin\n".repeat(200))
    }
}

fn count_in(messages: &[hive::memory::ChatMessage], text: &str) -> usize {
    messages.iter().filter(|m| m.text == text).count()
}

#[tokio::test]
async fn test_simple_request_gets_response() {
    let model = Arc::new(
        ScriptedModelClient::new()
            .script(ACTOR, ["The answer is a greeting, nothing else to run."])
            .script(CRITIC, ["Complete. <Yes>"])
            .script(RESPONDER, ["<response><![CDATA[Hello]]></response>"]),
    );
    let orch = orchestrator(&model);
    let mut session = orch.new_session();

    let reply = orch.handle_message(&mut session, "Say hello").await;

    assert_eq!(reply, "Hello");
    let last = session.logs().user.last().unwrap();
    assert_eq!(last.sender, RESPONDER);
    assert_eq!(last.text, "Hello");
    assert_eq!(model.calls_for(ACTOR), 1);
    assert_eq!(model.calls_for(CRITIC), 1);
    assert_eq!(session.phase(), Phase::Idle);
    assert!(session.is_terminated());
}

#[tokio::test]
async fn test_response_mixed_with_code_is_rejected() {
    let model = Arc::new(
        ScriptedModelClient::new()
            .script(ACTOR, ["Nothing to do."])
            .script(CRITIC, ["<Yes>"])
            .script(RESPONDER, ["<code>print(1)</code><response>Done</response>"]),
    );
    let orch = orchestrator(&model);
    let mut session = orch.new_session();

    let reply = orch.handle_message(&mut session, "Run something").await;

    assert_eq!(reply, NO_RESPONSE_WARNING);
    let user = session.logs().user.messages();
    assert!(user.iter().all(|m| m.sender != RESPONDER));
    assert_eq!(count_in(user, NO_RESPONSE_WARNING), 1);
    assert_eq!(model.calls_for(RESPONDER), orch.settings().max_responding_iterations);
    assert!(session.ledger().records().is_empty());
}

#[tokio::test]
async fn test_three_step_plan_advances_with_next_step() {
    let model = Arc::new(
        ScriptedModelClient::new()
            .script(
                PLANNER,
                ["<plan><step>Load data</step><step>Analyze</step><step>Summarize</step></plan>"],
            )
            .script(CRITIC, ["The plan is sound. <Yes>"])
            .script(ACTOR, ["<next_step/>"])
            .script(
                RESPONDER,
                [
                    "<response>I will load, analyze and summarize.</response>",
                    "<response>All three steps are done.</response>",
                ],
            ),
    );
    let orch = Orchestrator::builder()
        .with_model(model.clone())
        .with_planning(true)
        .build()
        .unwrap();
    let mut session = orch.new_session();

    let reply = orch.handle_message(&mut session, "Analyze the data").await;

    assert_eq!(reply, "All three steps are done.");
    assert_eq!(model.calls_for(PLANNER), 1);
    assert_eq!(model.calls_for(CRITIC), 1);
    assert_eq!(model.calls_for(ACTOR), 3);
    assert_eq!(session.iterations(), 3);

    let user = session.logs().user.messages();
    assert!(user
        .iter()
        .any(|m| m.sender == RESPONDER && m.text == "I will load, analyze and summarize."));
    assert!(user.iter().any(|m| m.text == "Working on step: Analyze (2/3)"));
    // 请求结束后计划被清空
    assert!(!session.plan().is_set());
    assert!(!session.registry().contains("Plan"));

    let step_prompts: Vec<String> = model
        .calls()
        .into_iter()
        .filter(|c| c.marker.as_deref() == Some(ACTOR))
        .map(|c| c.prompt)
        .collect();
    assert!(step_prompts[0].contains("Load data"));
    assert!(step_prompts[2].contains("(3/3)"));
}

#[tokio::test]
async fn test_ceiling_warns_exactly_once() {
    let model = Arc::new(
        ScriptedModelClient::new()
            .script(ACTOR, ["Still thinking about it."])
            .script(CRITIC, ["Not there yet. <No>"])
            .script(RESPONDER, ["<response>Partial results only.</response>"]),
    );
    let orch = orchestrator(&model);
    let mut session = orch.new_session();

    let reply = orch.handle_message(&mut session, "Solve everything").await;

    assert_eq!(reply, "Partial results only.");
    assert_eq!(model.calls_for(ACTOR), 10);
    assert_eq!(model.calls_for(CRITIC), 10);
    assert_eq!(count_in(session.logs().user.messages(), CEILING_WARNING), 1);
    assert_eq!(count_in(session.logs().history.messages(), CEILING_WARNING), 1);
}

#[tokio::test]
async fn test_invocation_failure_counts_toward_ceiling() {
    let model = Arc::new(
        ScriptedModelClient::new()
            .script_results(ACTOR, [Err("connection reset".to_string())])
            .script(CRITIC, ["<No>"])
            .script(RESPONDER, ["<response>Sorry, the model was unavailable.</response>"]),
    );
    let orch = Orchestrator::builder()
        .with_model(model.clone())
        .with_max_iterations(3)
        .build()
        .unwrap();
    let mut session = orch.new_session();

    let reply = orch.handle_message(&mut session, "Anything").await;

    assert_eq!(reply, "Sorry, the model was unavailable.");
    assert_eq!(model.calls_for(ACTOR), 3);
    let history = session.logs().history.messages();
    assert_eq!(
        history
            .iter()
            .filter(|m| m.sender == ACTOR && m.text == INVOCATION_FAILURE_TEXT)
            .count(),
        3
    );
    assert_eq!(count_in(session.logs().user.messages(), CEILING_WARNING), 1);
}

#[tokio::test]
async fn test_stuck_step_is_forced_forward() {
    let model = Arc::new(
        ScriptedModelClient::new()
            .script(PLANNER, ["<plan><step>Find the answer</step></plan>"])
            .script(CRITIC, ["<Yes>"])
            .script(ACTOR, ["I am still considering the options."])
            .script(RESPONDER, ["<response>ok</response>"]),
    );
    let orch = Orchestrator::builder()
        .with_model(model.clone())
        .with_planning(true)
        .with_max_iterations(20)
        .build()
        .unwrap();
    let mut session = orch.new_session();

    orch.handle_message(&mut session, "Think hard").await;

    assert_eq!(model.calls_for(ACTOR), 5);
    let warning = "Step 1 did not complete after 5 attempts. Moving on to the next step.";
    assert_eq!(count_in(session.logs().user.messages(), warning), 1);
    assert_eq!(count_in(session.logs().user.messages(), CEILING_WARNING), 0);
}

#[tokio::test]
async fn test_planning_failure_falls_back_to_unplanned() {
    let model = Arc::new(
        ScriptedModelClient::new()
            .script(PLANNER, ["I would rather not plan."])
            .script(ACTOR, ["Done without a plan."])
            .script(CRITIC, ["<Yes>"])
            .script(RESPONDER, ["<response>Finished.</response>"]),
    );
    let orch = Orchestrator::builder()
        .with_model(model.clone())
        .with_planning(true)
        .build()
        .unwrap();
    let mut session = orch.new_session();

    let reply = orch.handle_message(&mut session, "Do it").await;

    assert_eq!(reply, "Finished.");
    assert_eq!(model.calls_for(PLANNER), 5);
    assert_eq!(model.calls_for(ACTOR), 1);
    assert_eq!(
        count_in(
            session.logs().user.messages(),
            "No plan could be created. Continuing without a plan."
        ),
        1
    );
}

#[tokio::test]
async fn test_oversized_message_is_refused_without_model_calls() {
    let model = Arc::new(ScriptedModelClient::new());
    let mut config = AppConfig::default();
    config.context.max_prompt_tokens = 5;
    let orch = Orchestrator::builder()
        .with_config(config)
        .with_model(model.clone())
        .build()
        .unwrap();
    let mut session = orch.new_session();

    let long = "please read this very long message ".repeat(20);
    let reply = orch.handle_message(&mut session, &long).await;

    assert!(reply.contains("too long"));
    assert!(model.calls().is_empty());
    assert!(session.logs().user.messages().iter().all(|m| m.text != long));
}

#[tokio::test]
async fn test_document_command_reads_workspace_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("uploads")).unwrap();
    std::fs::write(dir.path().join("uploads/notes.txt"), "Revenue was 42 in March.").unwrap();

    let model = Arc::new(
        ScriptedModelClient::new()
            .script(ACTOR, ["<document filepath=\"uploads/notes.txt\"/>"])
            .script(CRITIC, ["<Yes>"])
            .script(RESPONDER, ["<response>Revenue was 42.</response>"]),
    );
    let orch = Orchestrator::builder()
        .with_model(model.clone())
        .with_workspace(dir.path())
        .build()
        .unwrap();
    let mut session = orch.new_session();

    let reply = orch.handle_message(&mut session, "What was revenue?").await;

    assert_eq!(reply, "Revenue was 42.");
    assert!(session.registry().contains("Document Analysis Results of notes.txt"));
    let actor_prompt = &model.calls()[0].prompt;
    assert!(actor_prompt.contains("uploads/notes.txt"));
    let critic_prompt = &model
        .calls()
        .into_iter()
        .find(|c| c.marker.as_deref() == Some(CRITIC))
        .unwrap()
        .prompt;
    assert!(critic_prompt.contains("Revenue was 42 in March."));
}

#[tokio::test]
async fn test_events_are_streamed() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let model = Arc::new(
        ScriptedModelClient::new()
            .script(ACTOR, ["Nothing to run."])
            .script(CRITIC, ["<Yes>"])
            .script(RESPONDER, ["<response>Hi</response>"]),
    );
    let orch = Orchestrator::builder()
        .with_model(model.clone())
        .with_events(tx)
        .build()
        .unwrap();
    let mut session = orch.new_session();

    orch.handle_message(&mut session, "hi").await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(events
        .iter()
        .any(|e| matches!(e, OrchestratorEvent::Verdict { positive: true, .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, OrchestratorEvent::Response { text, .. } if text == "Hi")));
    assert!(matches!(
        events.last(),
        Some(OrchestratorEvent::PhaseChange { phase: Phase::Idle, .. })
    ));
}

#[tokio::test]
async fn test_sessions_share_long_term_memory() {
    let model = Arc::new(
        ScriptedModelClient::new()
            .script(ACTOR, ["<long_memory>The user prefers bar charts</long_memory>"])
            .script(CRITIC, ["<Yes>"])
            .script(RESPONDER, ["<response>Noted.</response>"]),
    );
    let orch = orchestrator(&model);
    let mut first = orch.new_session();
    orch.handle_message(&mut first, "Remember that I like bar charts").await;

    let second = orch.new_session();
    let hits = second.long_term().search("bar charts", 3);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].role, ACTOR);
}

#[tokio::test]
async fn test_request_reaches_every_role_after_large_tool_output() {
    let request = "What is the total of sales?";
    let model = Arc::new(
        ScriptedModelClient::new()
            .script(
                ACTOR,
                [
                    format!(
                        "I will sum the column and inspect the rows. {}<code>total = df.sales.sum()</code>",
                        "The table is wide, so every region needs to be checked. ".repeat(10)
                    ),
                    "The total is known from the printed table.".to_string(),
                ],
            )
            .script(CRITIC, ["The sum was not printed. <No>", "<Yes>"])
            .script(RESPONDER, ["<response>The total is 42.</response>"]),
    );
    let mut config = AppConfig::default();
    config.context.max_chat_tokens = 150;
    let orch = Orchestrator::builder()
        .with_config(config)
        .with_model(model.clone())
        .with_tool(BulkyRunner)
        .build()
        .unwrap();
    let mut session = orch.new_session();

    let reply = orch.handle_message(&mut session, request).await;

    assert_eq!(reply, "The total is 42.");
    let section = format!("# **User Prompt**:\n{request}");
    let critic_prompts = prompts_for(&model, CRITIC);
    assert_eq!(critic_prompts.len(), 2);
    for prompt in critic_prompts
        .iter()
        .chain(prompts_for(&model, ACTOR).iter())
        .chain(prompts_for(&model, RESPONDER).iter())
    {
        assert!(prompt.starts_with(&section), "{prompt}");
    }
}

#[tokio::test]
async fn test_concurrent_sessions_keep_separate_logs() {
    let orch = Arc::new(
        Orchestrator::builder()
            .with_model(Arc::new(MockModelClient))
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = ["alpha request", "beta request"]
        .into_iter()
        .map(|text| {
            let orch = orch.clone();
            let mut session = orch.new_session();
            tokio::spawn(async move {
                let reply = orch.handle_message(&mut session, text).await;
                (text, reply, session)
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        let (text, reply, session) = handle.await.unwrap();
        assert_eq!(reply, format!("Echo from Mock: {text}"));
        let other = if text == "alpha request" { "beta request" } else { "alpha request" };
        for log in [&session.logs().user, &session.logs().history, &session.logs().transcript] {
            assert!(log.messages().iter().any(|m| m.text == text));
            assert!(log.messages().iter().all(|m| !m.text.contains(other)));
        }
        assert!(session.is_terminated());
        ids.push(session.id().to_string());
    }
    assert_ne!(ids[0], ids[1]);
}

#[tokio::test]
async fn test_step_completes_on_positive_step_review() {
    let model = Arc::new(
        ScriptedModelClient::new()
            .script(PLANNER, ["<plan><step>Load sales</step><step>Chart sales</step></plan>"])
            .script(CRITIC, ["The plan is fine. <Yes>", "The data is loaded. <Yes>"])
            .script(ACTOR, ["<query>sales march</query>", "<next_step/>"])
            .script(
                RESPONDER,
                [
                    "<response>First loading, then charting.</response>",
                    "<response>The chart is ready.</response>",
                ],
            ),
    );
    let orch = Orchestrator::builder()
        .with_model(model.clone())
        .with_planning(true)
        .build()
        .unwrap();
    let mut session = orch.new_session();

    let reply = orch.handle_message(&mut session, "Chart March sales").await;

    assert_eq!(reply, "The chart is ready.");
    assert_eq!(model.calls_for(ACTOR), 2);
    assert_eq!(model.calls_for(CRITIC), 2);
    let step_review = &prompts_for(&model, CRITIC)[1];
    assert!(step_review.contains("Assess whether the current plan step has been completed"));
    assert!(step_review.contains("Load sales"));
    let user = session.logs().user.messages();
    assert_eq!(count_in(user, "Working on step: Chart sales (2/2)"), 1);
    assert!(prompts_for(&model, ACTOR)[1].contains("Chart sales"));
}

#[tokio::test]
async fn test_rejected_plan_is_replaced() {
    let model = Arc::new(
        ScriptedModelClient::new()
            .script(
                PLANNER,
                [
                    "<plan><step>Guess the answer</step></plan>",
                    "<plan><step>Load sales</step><step>Chart sales</step></plan>",
                ],
            )
            .script(CRITIC, ["Guessing is not a plan. <No>", "<Yes>"])
            .script(ACTOR, ["<next_step/>"])
            .script(
                RESPONDER,
                [
                    "<response>Loading, then charting.</response>",
                    "<response>Charted.</response>",
                ],
            ),
    );
    let orch = Orchestrator::builder()
        .with_model(model.clone())
        .with_planning(true)
        .build()
        .unwrap();
    let mut session = orch.new_session();

    let reply = orch.handle_message(&mut session, "Chart March sales").await;

    assert_eq!(reply, "Charted.");
    assert_eq!(model.calls_for(PLANNER), 2);
    assert_eq!(model.calls_for(CRITIC), 2);
    assert_eq!(model.calls_for(ACTOR), 2);
    let user = session.logs().user.messages();
    assert_eq!(count_in(user, "Working on step: Load sales (1/2)"), 1);
    assert!(user.iter().all(|m| !m.text.contains("Guess the answer")));
}

#[tokio::test]
async fn test_silent_plan_announcement_does_not_stop_the_request() {
    let model = Arc::new(
        ScriptedModelClient::new()
            .script(PLANNER, ["<plan><step>Answer</step></plan>"])
            .script(CRITIC, ["<Yes>"])
            .script(ACTOR, ["<next_step/>"])
            .script(RESPONDER, ["I have nothing to announce.", "<response>Done.</response>"]),
    );
    let orch = Orchestrator::builder()
        .with_model(model.clone())
        .with_planning(true)
        .build()
        .unwrap();
    let mut session = orch.new_session();

    let reply = orch.handle_message(&mut session, "Answer me").await;

    assert_eq!(reply, "Done.");
    assert_eq!(model.calls_for(RESPONDER), 2);
    assert_eq!(model.calls_for(ACTOR), 1);
    let user = session.logs().user.messages();
    assert!(user.iter().all(|m| m.text != "I have nothing to announce."));
}
