//! 每种能力对应的命令说明，按角色当前阶段的能力集合拼接进提示词

use crate::roles::{Capability, CapabilitySet};

const INTRODUCTION: &str = "# **Tool Instructions**\n\
To act beyond conversation you issue commands written as XML-like tags. Commands you issue and \
the results you receive are recorded in the history and may be referenced later.\n\n\
- Only write a tag when you intend to invoke that command. To mention a tag in prose, describe it \
(for example 'the code tag') instead of writing literal angle brackets.\n\
- Wrap code and any text containing `<`, `>` or `&` in `<![CDATA[...]]>`. Everything inside is \
passed through verbatim.\n\
- Do not nest command tags inside each other.\n\n";

const SHORT_MEMORY: &str = "## **Short-Term Memory (`<short_memory>`)**\n\
Overwrites your scratch notes for the current task. The history is truncated over time; the \
scratch notes always stay in context.\n\
```xml\n<short_memory><![CDATA[\nYour notes here\n]]></short_memory>\n```\n\n";

const LONG_MEMORY: &str = "## **Long-Term Memory (`<long_memory>`)**\n\
Stores knowledge that could be useful beyond this conversation. Relevant entries are recalled \
automatically when working on related tasks.\n\
```xml\n<long_memory><![CDATA[\nYour text here\n]]></long_memory>\n```\n\n";

const QUERY: &str = "## **Retrieving Information (`<query>`)**\n\
Searches stored documents by default, or long-term memory with `type=\"memory\"`.\n\
```xml\n<query>How can one reverse a linked list?</query>\n\
<query type=\"memory\">Previous discussions about model selection</query>\n```\n\
*Important:* you have to wait for the results, so you cannot reply to the user in the same turn.\n\n";

const DOCUMENT_HEAD: &str = "## **Project Documents (`<document>`)**\n\
Reads a project document. Pass the full path in the `filepath` attribute. Available documents:\n";

const DOCUMENT_TAIL: &str = "\n```xml\n<document filepath=\"uploads/success_criteria.txt\"/>\n```\n\
*Important:* you have to wait for the results, so you cannot reply to the user in the same turn.\n\n";

const CODE: &str = "## **Code (`<code>`)**\n\
Runs code in a sandboxed executor. Always wrap the code in CDATA and give it a `tag` and a `version`.\n\
```xml\n<code tag=\"add\" version=\"1.0\"><![CDATA[\ndef add(a, b):\n    return a + b\n]]></code>\n```\n\
Reuse earlier code by tag, optionally pinned to a version; without a version the latest one is used. \
Several snippets can be imported with a list:\n\
```xml\n<code import=[{\"tag\": \"add\"}, {\"tag\": \"sub\", \"version\": \"1.0\"}]><![CDATA[\nprint(add(3, 4))\n]]></code>\n```\n\
*Important:* you have to wait for the results, so you cannot reply to the user in the same turn.\n\n";

const PLAN: &str = "## **Planning (`<plan>` and `<next_step/>`)**\n\
Break complex tasks into logical steps. Setting a plan replaces the previous one and starts again \
at its first step.\n\
```xml\n<plan>\n  <step>Define the problem</step>\n  <step>Gather relevant information</step>\n  \
<step>Review and finalize your answer</step>\n</plan>\n```\n\
Work on one step at a time. When a step is complete and you did not issue a command that waits for \
results (`<code>`, `<query>`, `<document>`), signal it with `<next_step/>`. You cannot set a plan and \
advance it in the same turn.\n\n";

const RESPONSE: &str = "## **Responding to the User (`<response>`)**\n\
The user only sees their own messages and the content of `<response>` tags. Put everything they \
need to understand the answer inside it: reference their question, give the direct answer, and \
briefly explain how you got there.\n\
```xml\n<response><![CDATA[\nRegarding your question about X, the answer is Y. To find it I ...\n]]></response>\n```\n\
*Exclusivity:* `<response>` closes your turn. It cannot be combined with `<code>`, `<query>`, \
`<document>` or `<plan>` in the same output; such a turn is rejected. `<long_memory>` and \
`<short_memory>` are allowed alongside it.\n\n";

/// 根据能力集合生成命令说明；空集合返回空串
pub fn instructions_for(caps: CapabilitySet, documents: &[String]) -> String {
    if caps.is_empty() {
        return String::new();
    }
    let mut out = String::from(INTRODUCTION);
    for cap in caps.iter() {
        match cap {
            Capability::ShortMemory => out.push_str(SHORT_MEMORY),
            Capability::LongMemory => out.push_str(LONG_MEMORY),
            Capability::Query => out.push_str(QUERY),
            Capability::Document => {
                out.push_str(DOCUMENT_HEAD);
                if documents.is_empty() {
                    out.push_str("(no documents available yet)\n");
                } else {
                    for path in documents {
                        out.push_str(&format!("- {path}\n"));
                    }
                }
                out.push_str(DOCUMENT_TAIL);
            }
            Capability::Code => out.push_str(CODE),
            Capability::Plan => out.push_str(PLAN),
            Capability::Response => out.push_str(RESPONSE),
        }
    }
    out
}
