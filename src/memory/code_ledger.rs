//! 代码账本：记录每次 `code` 命令（tag、version、代码、结果）
//!
//! `import` 属性可以是单个对象或对象列表；列表按顺序逐个解析，
//! 每个元素在按 tag / version 过滤后取最新的一条。

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeRecord {
    /// 写入顺序
    pub seq: usize,
    pub tag: Option<String>,
    pub version: Option<String>,
    pub code: String,
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CodeLedger {
    records: Vec<CodeRecord>,
}

impl CodeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tag: Option<String>, version: Option<String>, code: String) -> usize {
        let seq = self.records.len();
        self.records.push(CodeRecord {
            seq,
            tag,
            version,
            code,
            result: None,
        });
        seq
    }

    pub fn set_result(&mut self, seq: usize, result: String) {
        if let Some(r) = self.records.get_mut(seq) {
            r.result = Some(result);
        }
    }

    pub fn records(&self) -> &[CodeRecord] {
        &self.records
    }

    /// 解析 import 规格；找不到匹配的元素被跳过
    pub fn resolve_imports(&self, spec: &Value) -> Vec<CodeRecord> {
        let wanted: Vec<&Value> = match spec {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        wanted
            .into_iter()
            .filter_map(|filter| self.latest_matching(filter))
            .cloned()
            .collect()
    }

    fn latest_matching(&self, filter: &Value) -> Option<&CodeRecord> {
        let (tag, version) = match filter {
            Value::Object(map) => (
                map.get("tag").map(value_text),
                map.get("version").map(value_text),
            ),
            Value::String(tag) => (Some(tag.clone()), None),
            _ => (None, None),
        };
        self.records
            .iter()
            .filter(|r| tag.is_none() || r.tag == tag)
            .filter(|r| version.is_none() || r.version == version)
            .max_by(|a, b| compare_versions(a.version.as_deref(), b.version.as_deref()).then(a.seq.cmp(&b.seq)))
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 按点分段比较版本号，数字段按数值比较；缺失版本最小
fn compare_versions(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            let mut left = a.split('.');
            let mut right = b.split('.');
            loop {
                match (left.next(), right.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some(x), Some(y)) => {
                        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                            (Ok(x), Ok(y)) => x.cmp(&y),
                            _ => x.cmp(y),
                        };
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ledger() -> CodeLedger {
        let mut l = CodeLedger::new();
        l.record(Some("add".into()), Some("1.0".into()), "v1".into());
        l.record(Some("add".into()), Some("1.10".into()), "v110".into());
        l.record(Some("add".into()), Some("1.2".into()), "v12".into());
        l.record(Some("sub".into()), Some("1.0".into()), "sub".into());
        l
    }

    #[test]
    fn test_latest_version_wins() {
        let found = ledger().resolve_imports(&json!({"tag": "add"}));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, "v110");
    }

    #[test]
    fn test_pinned_version() {
        let found = ledger().resolve_imports(&json!({"tag": "add", "version": "1.0"}));
        assert_eq!(found[0].code, "v1");
    }

    #[test]
    fn test_list_keeps_order_and_skips_missing() {
        let found = ledger().resolve_imports(&json!([{"tag": "sub"}, {"tag": "mul"}, {"tag": "add", "version": 1.2}]));
        let codes: Vec<_> = found.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["sub", "v12"]);
    }

    #[test]
    fn test_results_attach_to_record() {
        let mut l = ledger();
        l.set_result(3, "ok".into());
        assert_eq!(l.records()[3].result.as_deref(), Some("ok"));
    }
}
