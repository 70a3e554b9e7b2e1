//! 能力（可用命令）与不可变能力集合

use std::fmt;

use serde::Serialize;

/// 角色可使用的命令种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ShortMemory,
    LongMemory,
    Query,
    Document,
    Code,
    Plan,
    Response,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::ShortMemory,
        Capability::LongMemory,
        Capability::Query,
        Capability::Document,
        Capability::Code,
        Capability::Plan,
        Capability::Response,
    ];

    /// 命令标签到能力的映射；`next_step` 归属 Plan 能力
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "short_memory" => Some(Capability::ShortMemory),
            "long_memory" => Some(Capability::LongMemory),
            "query" => Some(Capability::Query),
            "document" => Some(Capability::Document),
            "code" => Some(Capability::Code),
            "plan" | "next_step" => Some(Capability::Plan),
            "response" => Some(Capability::Response),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Capability::ShortMemory => "short_memory",
            Capability::LongMemory => "long_memory",
            Capability::Query => "query",
            Capability::Document => "document",
            Capability::Code => "code",
            Capability::Plan => "plan",
            Capability::Response => "response",
        }
    }

    /// 调用外部执行器、需等待结果的命令
    pub fn is_blocking_tool(&self) -> bool {
        matches!(self, Capability::Query | Capability::Document | Capability::Code)
    }

    fn bit(&self) -> u8 {
        1 << (*self as u8)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// 不可变能力集合：每次变更都返回新值，按值在各轮之间传递
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Self::from_iter(Capability::ALL)
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub fn with(self, cap: Capability) -> Self {
        Self(self.0 | cap.bit())
    }

    pub fn without(self, cap: Capability) -> Self {
        Self(self.0 & !cap.bit())
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), |set, c| set.with(c))
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
