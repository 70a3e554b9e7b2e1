//! 严格的标记子集解析器
//!
//! 只接受结构良好的元素：带引号的属性、实体引用、CDATA、正确嵌套的子元素。
//! 游离的 `<` / `&`、未闭合或不匹配的标签都会报错；CDATA 内容原样保留，不做任何转义处理。

use thiserror::Error;

/// 解析后的元素：名称、属性（按出现顺序）、直接文本、子元素
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (at byte {position})")]
pub struct MarkupError {
    pub message: String,
    pub position: usize,
}

/// 解析一个完整元素；元素之后只允许出现空白
pub fn parse_element(input: &str) -> Result<Element, MarkupError> {
    let mut parser = Parser { src: input, pos: 0 };
    parser.skip_whitespace();
    let element = parser.element()?;
    parser.skip_whitespace();
    if parser.pos < parser.src.len() {
        return Err(parser.error("junk after document element"));
    }
    Ok(element)
}

/// 转义文本节点中的特殊字符
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// 转义属性值（单引号或双引号包裹均可）
pub fn escape_attribute(value: &str) -> String {
    escape_text(value)
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> MarkupError {
        MarkupError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
        self.pos > start
    }

    fn expect(&mut self, c: char) -> Result<(), MarkupError> {
        match self.peek() {
            Some(found) if found == c => {
                self.bump();
                Ok(())
            }
            Some(found) => Err(self.error(format!("expected '{c}', found '{found}'"))),
            None => Err(self.error(format!("expected '{c}', found end of input"))),
        }
    }

    fn name(&mut self) -> Result<String, MarkupError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => {
                self.bump();
            }
            _ => return Err(self.error("expected a name")),
        }
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
        {
            self.bump();
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn element(&mut self) -> Result<Element, MarkupError> {
        self.expect('<')?;
        let name = self.name()?;
        let mut element = Element {
            name,
            attributes: Vec::new(),
            text: String::new(),
            children: Vec::new(),
        };

        loop {
            let had_space = self.skip_whitespace();
            if self.rest().starts_with("/>") {
                self.pos += 2;
                return Ok(element);
            }
            if self.peek() == Some('>') {
                self.bump();
                break;
            }
            if self.peek().is_none() {
                return Err(self.error(format!("unclosed start tag <{}>", element.name)));
            }
            if !had_space {
                return Err(self.error("attributes must be separated by whitespace"));
            }
            let (key, value) = self.attribute()?;
            if element.attributes.iter().any(|(k, _)| *k == key) {
                return Err(self.error(format!("duplicate attribute '{key}'")));
            }
            element.attributes.push((key, value));
        }

        self.content(&mut element)?;
        Ok(element)
    }

    fn attribute(&mut self) -> Result<(String, String), MarkupError> {
        let key = self.name()?;
        self.skip_whitespace();
        self.expect('=')?;
        self.skip_whitespace();
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error(format!("unquoted value for attribute '{key}'"))),
        };
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error(format!("unterminated value for attribute '{key}'"))),
                Some(c) if c == quote => {
                    self.bump();
                    break;
                }
                Some('<') => return Err(self.error("'<' is not allowed in attribute values")),
                Some('&') => value.push(self.entity()?),
                Some(_) => {
                    if let Some(c) = self.bump() {
                        value.push(c);
                    }
                }
            }
        }
        Ok((key, value))
    }

    fn content(&mut self, element: &mut Element) -> Result<(), MarkupError> {
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(self.error(format!("unclosed element <{}>", element.name)));
            }
            if let Some(after) = rest.strip_prefix("<![CDATA[") {
                let end = after
                    .find("]]>")
                    .ok_or_else(|| self.error("unterminated CDATA section"))?;
                element.text.push_str(&after[..end]);
                self.pos += "<![CDATA[".len() + end + "]]>".len();
            } else if let Some(after) = rest.strip_prefix("<!--") {
                let end = after
                    .find("-->")
                    .ok_or_else(|| self.error("unterminated comment"))?;
                self.pos += "<!--".len() + end + "-->".len();
            } else if rest.starts_with("</") {
                self.pos += 2;
                let closing = self.name()?;
                self.skip_whitespace();
                self.expect('>')?;
                if closing != element.name {
                    return Err(self.error(format!(
                        "mismatched tag: expected </{}>, found </{closing}>",
                        element.name
                    )));
                }
                return Ok(());
            } else if rest.starts_with('<') {
                let child = self.element()?;
                element.children.push(child);
            } else if rest.starts_with('&') {
                let c = self.entity()?;
                element.text.push(c);
            } else if let Some(c) = self.bump() {
                element.text.push(c);
            }
        }
    }

    fn entity(&mut self) -> Result<char, MarkupError> {
        self.expect('&')?;
        let rest = self.rest();
        let end = rest
            .char_indices()
            .take(12)
            .find(|(_, c)| *c == ';')
            .map(|(i, _)| i)
            .ok_or_else(|| self.error("unterminated entity reference"))?;
        let name = &rest[..end];
        let decoded = match name {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => {
                if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                } else if let Some(dec) = name.strip_prefix('#') {
                    dec.parse::<u32>().ok().and_then(char::from_u32)
                } else {
                    None
                }
            }
        };
        let c = decoded.ok_or_else(|| self.error(format!("undefined entity '&{name};'")))?;
        self.pos += end + 1;
        Ok(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_children() {
        let el = parse_element("<plan><step>a</step><step>b &amp; c</step></plan>").unwrap();
        assert_eq!(el.name, "plan");
        assert_eq!(el.children.len(), 2);
        assert_eq!(el.children[1].text, "b & c");
    }

    #[test]
    fn test_cdata_is_verbatim() {
        let el = parse_element("<code><![CDATA[if a < b && c > d:\n    x = '&lt;']]></code>").unwrap();
        assert_eq!(el.text, "if a < b && c > d:\n    x = '&lt;'");
    }

    #[test]
    fn test_attributes_decoded() {
        let el = parse_element(r#"<query type="memory" filter="{&quot;a&quot;: 1}"/>"#).unwrap();
        assert_eq!(
            el.attributes,
            vec![
                ("type".to_string(), "memory".to_string()),
                ("filter".to_string(), r#"{"a": 1}"#.to_string()),
            ]
        );
    }

    #[test]
    fn test_stray_angle_bracket_fails() {
        assert!(parse_element("<code>if a < b: pass</code>").is_err());
    }

    #[test]
    fn test_same_tag_nesting_fails() {
        let err = parse_element("<code>a<code>b</code>").unwrap_err();
        assert!(err.message.contains("unclosed element"));
    }

    #[test]
    fn test_mismatched_close_fails() {
        assert!(parse_element("<a><b></a></b>").is_err());
    }

    #[test]
    fn test_unquoted_attribute_fails() {
        let err = parse_element("<code tag=x>y</code>").unwrap_err();
        assert!(err.message.contains("unquoted"));
    }

    #[test]
    fn test_escape_roundtrip() {
        let text = "x < y & \"z\"";
        let markup = format!("<s a=\"{}\">{}</s>", escape_attribute(text), escape_text(text));
        let el = parse_element(&markup).unwrap();
        assert_eq!(el.text, text);
        assert_eq!(el.attributes[0].1, text);
    }
}
