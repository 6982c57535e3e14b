// MQTT topic layout: `/open/{certificateAccount}/{sn}/{kind}`.

use strum::{Display, EnumIter, EnumString};

const ROOT: &str = "/open/";

/// Per-device topic suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum TopicKind {
    Quota,
    Set,
    SetReply,
    Status,
}

impl TopicKind {
    /// Topics a device subscribes to.
    pub const INBOUND: [TopicKind; 3] = [TopicKind::Quota, TopicKind::SetReply, TopicKind::Status];
}

pub fn topic(account: &str, sn: &str, kind: TopicKind) -> String {
    format!("{ROOT}{account}/{sn}/{kind}")
}

/// Components of a device topic. `kind` is `None` for unknown suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedTopic<'a> {
    pub account: &'a str,
    pub sn: &'a str,
    pub suffix: &'a str,
    pub kind: Option<TopicKind>,
}

pub fn parse(topic: &str) -> Option<ParsedTopic<'_>> {
    let rest = topic.strip_prefix(ROOT)?;
    let mut parts = rest.split('/');
    let account = parts.next().filter(|s| !s.is_empty())?;
    let sn = parts.next().filter(|s| !s.is_empty())?;
    let suffix = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(ParsedTopic {
        account,
        sn,
        suffix,
        kind: suffix.parse().ok(),
    })
}
