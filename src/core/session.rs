//! 会话状态
//!
//! 一个会话持有：计划、上下文条目注册表、三份聊天记录、短期记忆、长期记忆句柄、代码账本、
//! 当前阶段与迭代计数。所有计划变更都经由会话完成，以便同步刷新固定的 `Plan` 上下文条目。

use std::sync::Arc;

use uuid::Uuid;

use crate::core::Phase;
use crate::memory::context::PLAN;
use crate::memory::{
    ChatLogKind, ChatLogs, CodeLedger, ContextItem, ContextRegistry, LongTermMemory, NoopLongTerm,
    Plan, SessionView, USER_SENDER,
};

pub struct Session {
    id: String,
    plan: Plan,
    registry: ContextRegistry,
    logs: ChatLogs,
    scratch: String,
    request: String,
    long_term: Arc<dyn LongTermMemory>,
    ledger: CodeLedger,
    phase: Phase,
    iterations: usize,
    terminated: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            plan: Plan::new(),
            registry: ContextRegistry::with_defaults(),
            logs: ChatLogs::new(),
            scratch: String::new(),
            request: String::new(),
            long_term: Arc::new(NoopLongTerm),
            ledger: CodeLedger::new(),
            phase: Phase::Idle,
            iterations: 0,
            terminated: false,
        }
    }

    pub fn with_logs(mut self, logs: ChatLogs) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_long_term(mut self, long_term: Arc<dyn LongTermMemory>) -> Self {
        self.long_term = long_term;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// 整体替换计划，并刷新固定的 Plan 条目
    pub fn set_plan(&mut self, steps: Vec<String>) {
        self.plan.set_plan(steps);
        self.registry.upsert(
            ContextItem::producer(PLAN, |view| view.plan.to_markup())
                .with_description("The current plan and the status of each step")
                .with_importance(1.0)
                .pinned(),
        );
    }

    pub fn next_step(&mut self) -> bool {
        let advanced = self.plan.next_step();
        if advanced {
            self.registry.touch(PLAN);
        }
        advanced
    }

    pub fn reset_plan(&mut self) {
        self.plan.reset();
        self.registry.remove(PLAN);
    }

    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ContextRegistry {
        &mut self.registry
    }

    pub fn logs(&self) -> &ChatLogs {
        &self.logs
    }

    pub fn logs_mut(&mut self) -> &mut ChatLogs {
        &mut self.logs
    }

    pub fn scratch(&self) -> &str {
        &self.scratch
    }

    pub fn set_scratch(&mut self, text: impl Into<String>) {
        self.scratch = text.into();
        self.registry.touch(crate::memory::context::SHORT_TERM_MEMORY);
    }

    pub fn long_term(&self) -> &Arc<dyn LongTermMemory> {
        &self.long_term
    }

    pub fn ledger(&self) -> &CodeLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut CodeLedger {
        &mut self.ledger
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::info!(session = %self.id, from = self.phase.as_str(), to = phase.as_str(), "phase");
            self.phase = phase;
        }
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn bump_iterations(&mut self) -> usize {
        self.iterations += 1;
        self.iterations
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// 新一轮用户请求开始：清零计数
    pub(crate) fn begin_request(&mut self) {
        self.iterations = 0;
        self.terminated = false;
    }

    pub(crate) fn terminate(&mut self) {
        self.terminated = true;
    }

    /// 用户消息写入所有聊天记录，并刷新当前请求
    pub fn add_user_message(&mut self, text: &str) {
        self.logs.append_all(USER_SENDER, text);
        self.request = self
            .logs
            .get(ChatLogKind::User)
            .last_messages_of_sender(USER_SENDER);
    }

    /// 当前请求：写入时用户记录末尾连续的用户消息；后续角色回复不改变它
    pub fn current_request(&self) -> String {
        self.request.clone()
    }

    /// 同时借出可变注册表与只读视图（字段互不重叠）
    pub fn split_for_assembly<'a>(
        &'a mut self,
        request: &'a str,
    ) -> (&'a mut ContextRegistry, SessionView<'a>) {
        let view = SessionView {
            plan: &self.plan,
            logs: &self.logs,
            scratch: &self.scratch,
            long_term: self.long_term.as_ref(),
            request,
        };
        (&mut self.registry, view)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_plan_pins_plan_item() {
        let mut session = Session::new();
        assert!(!session.registry().contains(PLAN));
        session.set_plan(vec!["a".into(), "b".into()]);
        let item = session.registry().get(PLAN).unwrap();
        assert!(item.pinned);
        assert_eq!(item.age, 0);
        assert_eq!(session.plan().current_step(), Some("a"));
    }

    #[test]
    fn test_next_step_refreshes_plan_item() {
        let mut session = Session::new();
        session.set_plan(vec!["a".into(), "b".into()]);
        if let Some(item) = session
            .registry_mut()
            .items_mut()
            .iter_mut()
            .find(|i| i.name == PLAN)
        {
            item.age = 4;
        }
        assert!(session.next_step());
        assert_eq!(session.registry().get(PLAN).unwrap().age, 0);
        assert_eq!(session.plan().current_step(), Some("b"));
    }

    #[test]
    fn test_reset_plan_removes_item() {
        let mut session = Session::new();
        session.set_plan(vec!["a".into()]);
        session.reset_plan();
        assert!(!session.plan().is_set());
        assert!(!session.registry().contains(PLAN));
    }

    #[test]
    fn test_current_request_collects_trailing_user_messages() {
        let mut session = Session::new();
        session.add_user_message("first");
        session.add_user_message("second");
        let request = session.current_request();
        assert!(request.contains("first"));
        assert!(request.contains("second"));
    }

    #[test]
    fn test_current_request_survives_role_reply() {
        let mut session = Session::new();
        session.add_user_message("chart the sales");
        session.logs_mut().append_all("Summarizing Agent", "Here is the plan.");
        assert_eq!(session.current_request(), "chart the sales");
        session.add_user_message("only March");
        assert_eq!(session.current_request(), "only March");
    }
}
