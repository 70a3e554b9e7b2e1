//! 计划追踪：有序步骤 + 游标
//!
//! 每个会话恰好一个 Plan。`set_plan` 整体替换并把游标归零，`next_step` 每次前进一格，
//! 越过末尾时不做任何事。`is_done() ⇔ cursor == len`。

use serde::Serialize;

use crate::command::markup::escape_text;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    steps: Vec<String>,
    cursor: usize,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_plan(&mut self, steps: Vec<String>) {
        self.steps = steps;
        self.cursor = 0;
    }

    /// 前进一步；已完成时返回 false 且不改变状态
    pub fn next_step(&mut self) -> bool {
        if self.cursor < self.steps.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    pub fn current_step(&self) -> Option<&str> {
        self.steps.get(self.cursor).map(String::as_str)
    }

    pub fn current_index(&self) -> usize {
        self.cursor
    }

    pub fn is_done(&self) -> bool {
        self.cursor == self.steps.len()
    }

    pub fn on_last_step(&self) -> bool {
        !self.steps.is_empty() && self.cursor + 1 == self.steps.len()
    }

    pub fn is_set(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn reset(&mut self) {
        self.steps.clear();
        self.cursor = 0;
    }

    /// `<plan>` 标记，每个 `<step>` 带 done / current / pending 状态
    pub fn to_markup(&self) -> String {
        let mut out = String::from("<plan>\n");
        for (i, step) in self.steps.iter().enumerate() {
            let status = match i.cmp(&self.cursor) {
                std::cmp::Ordering::Less => "done",
                std::cmp::Ordering::Equal => "current",
                std::cmp::Ordering::Greater => "pending",
            };
            out.push_str(&format!(
                "  <step status=\"{status}\">{}</step>\n",
                escape_text(step)
            ));
        }
        out.push_str("</plan>");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::extract;

    fn three_steps() -> Plan {
        let mut plan = Plan::new();
        plan.set_plan(vec!["load".into(), "clean".into(), "plot".into()]);
        plan
    }

    #[test]
    fn test_advance_to_done_and_beyond() {
        let mut plan = three_steps();
        assert_eq!(plan.current_step(), Some("load"));
        for _ in 0..3 {
            assert!(plan.next_step());
        }
        assert!(plan.is_done());
        assert!(!plan.next_step());
        assert_eq!(plan.current_step(), None);
        assert_eq!(plan.current_index(), 3);
    }

    #[test]
    fn test_on_last_step() {
        let mut plan = three_steps();
        assert!(!plan.on_last_step());
        plan.next_step();
        plan.next_step();
        assert!(plan.on_last_step());
        plan.next_step();
        assert!(!plan.on_last_step());
    }

    #[test]
    fn test_set_plan_resets_cursor() {
        let mut plan = three_steps();
        plan.next_step();
        plan.set_plan(vec!["a".into()]);
        assert_eq!(plan.current_index(), 0);
        assert_eq!(plan.current_step(), Some("a"));
    }

    #[test]
    fn test_markup_reextracts_steps() {
        let mut plan = Plan::new();
        let steps = vec![
            "Load <data> & inspect".to_string(),
            "Fit model".to_string(),
            "Explain \"results\"".to_string(),
        ];
        plan.set_plan(steps.clone());
        plan.next_step();
        let ex = extract(&plan.to_markup());
        assert!(ex.errors.is_empty(), "{:?}", ex.errors);
        let parsed: Vec<String> = ex.commands[0]
            .children_named("step")
            .map(|s| s.body.clone())
            .collect();
        assert_eq!(parsed, steps);
    }

    #[test]
    fn test_empty_plan_is_done() {
        let plan = Plan::new();
        assert!(plan.is_done());
        assert!(!plan.is_set());
    }
}
