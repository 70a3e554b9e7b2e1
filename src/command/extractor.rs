//! 命令提取器
//!
//! 从模型的自由文本中扫描 `<tag attrs>body</tag>` 与 `<tag attrs/>` 片段，
//! 规范化属性（JSON 值转为转义后的带引号字符串、裸标志补 `="true"`）后做严格解析。
//! 单个片段解析失败只记录错误，不影响同一批次的其余命令。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::command::markup::{self, escape_attribute, escape_text, Element};
use crate::core::AgentError;

/// 一条解析出的命令：标签、属性、正文（CDATA 原样保留）、子元素
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub tag: String,
    pub attributes: BTreeMap<String, Value>,
    pub body: String,
    pub children: Vec<Command>,
}

impl Command {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            body: String::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_child(mut self, child: Command) -> Self {
        self.children.push(child);
        self
    }

    /// 字符串属性；JSON 值按其文本形式返回
    pub fn attr_str(&self, key: &str) -> Option<String> {
        self.attributes.get(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Command> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// 渲染为可被 extract 重新解析的标记
    pub fn to_markup(&self) -> String {
        let mut out = format!("<{}", self.tag);
        for (key, value) in &self.attributes {
            let raw = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push_str(&format!(" {key}=\"{}\"", escape_attribute(&raw)));
        }
        if self.body.is_empty() && self.children.is_empty() {
            out.push_str("/>");
            return out;
        }
        out.push('>');
        out.push_str(&escape_text(&self.body));
        for child in &self.children {
            out.push_str(&child.to_markup());
        }
        out.push_str(&format!("</{}>", self.tag));
        out
    }

    fn from_element(element: Element) -> Self {
        let attributes = element
            .attributes
            .into_iter()
            .map(|(k, v)| {
                let value = parse_attribute_value(&v);
                (k, value)
            })
            .collect();
        Self {
            tag: element.name,
            attributes,
            body: element.text,
            children: element.children.into_iter().map(Self::from_element).collect(),
        }
    }
}

/// 单个片段的解析失败：原始片段与可读原因
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Error parsing <{tag}>: {reason}")]
pub struct ExtractionError {
    pub tag: String,
    pub fragment: String,
    pub reason: String,
}

impl From<ExtractionError> for AgentError {
    fn from(err: ExtractionError) -> Self {
        AgentError::Extraction {
            fragment: err.fragment,
            reason: err.reason,
        }
    }
}

/// 一次提取的结果，命令与错误均保持出现顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub commands: Vec<Command>,
    pub errors: Vec<ExtractionError>,
}

impl Extraction {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|c| c.tag.as_str())
    }
}

fn open_tag_regex() -> &'static Regex {
    static OPEN_TAG: OnceLock<Regex> = OnceLock::new();
    OPEN_TAG.get_or_init(|| {
        // 引号内的 `/>` 与 `>` 属于属性值，不结束开始标签
        Regex::new(r#"<(\w+)((?:\s+(?:"[^"<]*"|'[^'<]*'|[^<>/]|/[^<>])*)?)\s*(/?)>"#)
            .expect("open tag pattern is valid")
    })
}

/// 从任意文本中提取命令；从不失败，无法解析的片段进入 errors
pub fn extract(text: &str) -> Extraction {
    let re = open_tag_regex();
    let mut out = Extraction::default();
    let mut pos = 0;

    while pos < text.len() {
        let Some(caps) = re.captures_at(text, pos) else {
            break;
        };
        let (Some(whole), Some(tag)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let tag = tag.as_str();
        let attrs = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let self_closing = caps.get(3).is_some_and(|m| !m.as_str().is_empty());

        let (fragment, body, end) = if self_closing {
            (&text[whole.start()..whole.end()], None, whole.end())
        } else {
            let closing = format!("</{tag}>");
            match text[whole.end()..].find(&closing) {
                Some(offset) => {
                    let body_end = whole.end() + offset;
                    let end = body_end + closing.len();
                    (
                        &text[whole.start()..end],
                        Some(&text[whole.end()..body_end]),
                        end,
                    )
                }
                None => {
                    // 没有闭合标签：跳过一个字符继续扫描
                    pos = next_char_boundary(text, whole.start());
                    continue;
                }
            }
        };

        match parse_fragment(tag, attrs, body) {
            Ok(command) => out.commands.push(command),
            Err(reason) => {
                tracing::debug!(tag = %tag, reason = %reason, "command fragment rejected");
                out.errors.push(ExtractionError {
                    tag: tag.to_string(),
                    fragment: fragment.to_string(),
                    reason,
                });
            }
        }
        pos = end;
    }

    out
}

fn next_char_boundary(text: &str, from: usize) -> usize {
    text[from..]
        .chars()
        .next()
        .map(|c| from + c.len_utf8())
        .unwrap_or(text.len())
}

fn parse_fragment(tag: &str, attrs: &str, body: Option<&str>) -> Result<Command, String> {
    let attrs = normalize_attributes(attrs);
    let normalized = match body {
        Some(body) => format!("<{tag}{attrs}>{body}</{tag}>"),
        None => format!("<{tag}{attrs}/>"),
    };
    let element = markup::parse_element(&normalized).map_err(|e| e.to_string())?;
    Ok(Command::from_element(element))
}

/// 属性值：以 `{` / `[` 开头且为合法 JSON 时返回 JSON，否则为字符串
fn parse_attribute_value(raw: &str) -> Value {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Value>(raw) {
            return v;
        }
    }
    Value::String(raw.to_string())
}

/// 规范化属性串：`key={...}` / `key=[...]` 转为转义的带引号字符串，裸标志补 `="true"`。
/// 无法识别的部分原样保留，交给严格解析报错。
pub(crate) fn normalize_attributes(attrs: &str) -> String {
    let mut out = String::new();
    let mut rest = attrs;

    loop {
        let trimmed = rest.trim_start();
        let ws = &rest[..rest.len() - trimmed.len()];
        rest = trimmed;
        if rest.is_empty() {
            break;
        }

        let name_len = rest
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if name_len == 0 {
            out.push_str(ws);
            out.push_str(rest);
            break;
        }
        let name = &rest[..name_len];
        let after_name = &rest[name_len..];
        let after_ws = after_name.trim_start();

        let Some(value_part) = after_ws.strip_prefix('=') else {
            // 裸标志
            out.push_str(&format!(" {name}=\"true\""));
            rest = after_name;
            continue;
        };
        let value_part_trimmed = value_part.trim_start();

        match value_part_trimmed.chars().next() {
            Some(open @ ('{' | '[')) => {
                let len = balanced_len(value_part_trimmed, open);
                let candidate = &value_part_trimmed[..len];
                match serde_json::from_str::<Value>(candidate) {
                    Ok(json) => {
                        let serialized = json.to_string();
                        out.push_str(&format!(" {name}=\"{}\"", escape_attribute(&serialized)));
                    }
                    Err(_) => {
                        out.push_str(ws);
                        out.push_str(name);
                        out.push('=');
                        out.push_str(candidate);
                    }
                }
                rest = &value_part_trimmed[len..];
            }
            Some(quote @ ('"' | '\'')) => {
                let inner = &value_part_trimmed[1..];
                let len = inner.find(quote).map(|i| i + 2).unwrap_or(value_part_trimmed.len());
                out.push_str(&format!(" {name}={}", &value_part_trimmed[..len]));
                rest = &value_part_trimmed[len..];
            }
            _ => {
                // 未加引号的值：原样保留
                let len = value_part_trimmed
                    .find(char::is_whitespace)
                    .unwrap_or(value_part_trimmed.len());
                out.push_str(&format!(" {name}={}", &value_part_trimmed[..len]));
                rest = &value_part_trimmed[len..];
            }
        }
    }

    out
}

/// 从开括号起按括号配对（跳过字符串内部）求 JSON 值的长度；不配对时返回全部长度
fn balanced_len(s: &str, open: char) -> usize {
    let close = if open == '{' { '}' } else { ']' };
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && c == close {
                    return i + c.len_utf8();
                }
            }
            _ => {}
        }
    }
    s.len()
}
