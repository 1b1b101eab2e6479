//! 模型输出的严格解码
//!
//! 模型返回的文本中应当只有一个JSON对象。字符串里的LaTeX命令经常没有按JSON
//! 规则转义反斜杠，例如 `\cite` 是非法转义，而 `\textbf` 会被当作制表符。
//! 解码前先把这类看起来像LaTeX命令的转义还原，严格解析失败时再把其余非法转义
//! 加倍后本地重试一次。

use serde::de::DeserializeOwned;

use crate::types::paper::RequiredFields;

/// 解码结果
#[derive(Debug, Clone, PartialEq)]
pub enum ModelDecode<T> {
    Parsed(T),
    ParseError(String),
}

/// 以 \n 开头、需要保留为LaTeX命令的常见控制序列
const NEWLINE_LOOKALIKES: [&str; 14] = [
    "newline", "noindent", "nabla", "neq", "nonumber", "newpage", "nobreak", "normalsize",
    "notin", "neg", "nu", "ne", "ni", "not",
];

pub fn decode<T>(raw: &str) -> ModelDecode<T>
where
    T: DeserializeOwned + RequiredFields,
{
    let Some(object) = isolate_object(raw) else {
        return ModelDecode::ParseError("no JSON object found in the response".to_string());
    };

    let protected = repair_escapes(object, false);
    let parsed = match serde_json::from_str::<T>(&protected) {
        Ok(value) => value,
        Err(strict_error) => {
            let repaired = repair_escapes(object, true);
            match serde_json::from_str::<T>(&repaired) {
                Ok(value) => value,
                Err(_) => {
                    return ModelDecode::ParseError(format!("invalid JSON: {}", strict_error));
                }
            }
        }
    };

    let missing = parsed.missing_fields();
    if missing.is_empty() {
        ModelDecode::Parsed(parsed)
    } else {
        ModelDecode::ParseError(format!(
            "missing or empty required fields: {}",
            missing.join(", ")
        ))
    }
}

/// 截取第一个完整的 {...}，字符串内的花括号不计入层级。
/// 对象没有闭合时退回到最后一个 `}`，交给解析器报告具体错误
fn isolate_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in raw[start..].char_indices() {
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
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// 修复JSON字符串中的反斜杠转义。
///
/// 始终把 `\b` `\f` 后接字母、`\t` `\r` 后接小写字母、`\n` 后接常见LaTeX命令名的
/// 转义加倍；`double_invalid` 为真时，JSON不允许的转义（例如 `\c`、`\(`，以及后面
/// 不是四位十六进制数的 `\u`）也一并加倍。
fn repair_escapes(json: &str, double_invalid: bool) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len() + 16);
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = false;
                out.push(c);
                i += 1;
            }
            '\\' => {
                let Some(&next) = chars.get(i + 1) else {
                    out.push_str(r"\\");
                    i += 1;
                    continue;
                };
                let after = chars.get(i + 2).copied();
                let latex_like = match next {
                    'b' | 'f' => after.is_some_and(|a| a.is_ascii_alphabetic()),
                    't' | 'r' => after.is_some_and(|a| a.is_ascii_lowercase()),
                    'n' => starts_with_newline_lookalike(&chars[i + 1..]),
                    _ => false,
                };
                let valid = match next {
                    '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' => true,
                    'u' => chars
                        .get(i + 2..i + 6)
                        .is_some_and(|hex| hex.iter().all(|h| h.is_ascii_hexdigit())),
                    _ => false,
                };

                if latex_like || (!valid && double_invalid) {
                    out.push_str(r"\\");
                    i += 1;
                } else {
                    out.push(c);
                    out.push(next);
                    i += 2;
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn starts_with_newline_lookalike(chars: &[char]) -> bool {
    let word: String = chars.iter().take_while(|c| c.is_ascii_alphabetic()).collect();
    NEWLINE_LOOKALIKES.contains(&word.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::paper::{BackgroundSection, DiscoverySection, PaperMetadata};

    fn content(raw: &str) -> String {
        match decode::<BackgroundSection>(raw) {
            ModelDecode::Parsed(section) => section.content,
            ModelDecode::ParseError(reason) => panic!("unexpected parse error: {}", reason),
        }
    }

    #[test]
    fn test_fenced_json() {
        let raw = "Here you go:\n```json\n{\"content\": \"Plain text.\", \"citations_used\": []}\n```";
        assert_eq!(content(raw), "Plain text.");
    }

    #[test]
    fn test_trailing_prose_with_braces_is_ignored() {
        let raw = "{\"content\": \"Set {a} and \\\"b}\\\" hold.\"}\nNote: keys look like {smith2020}.";
        assert_eq!(content(raw), "Set {a} and \"b}\" hold.");
    }

    #[test]
    fn test_properly_escaped_latex() {
        let raw = r#"{"content": "As shown \\cite{smith2020}, \\textbf{x}."}"#;
        assert_eq!(content(raw), r"As shown \cite{smith2020}, \textbf{x}.");
    }

    #[test]
    fn test_invalid_escapes_are_repaired() {
        let raw = r#"{"content": "Prior work \cite{smith2020} shows $\alpha \leq \beta$ and \(x\)."}"#;
        assert_eq!(
            content(raw),
            r"Prior work \cite{smith2020} shows $\alpha \leq \beta$ and \(x\)."
        );
    }

    #[test]
    fn test_valid_escape_lookalikes_stay_latex() {
        let raw = r#"{"content": "\textbf{Bold} \frac{1}{2} \rho \noindent line\nNext \underline{u}"}"#;
        assert_eq!(
            content(raw),
            "\\textbf{Bold} \\frac{1}{2} \\rho \\noindent line\nNext \\underline{u}"
        );
    }

    #[test]
    fn test_genuine_escapes_survive() {
        let raw = r#"{"content": "Line one\nLine two\t\"quoted\" é"}"#;
        assert_eq!(content(raw), "Line one\nLine two\t\"quoted\" é");
    }

    #[test]
    fn test_missing_required_fields() {
        let result = decode::<PaperMetadata>(r#"{"title": "T", "abstract": ""}"#);
        assert_eq!(
            result.map_reason(),
            Some("missing or empty required fields: abstract".to_string())
        );
    }

    #[test]
    fn test_no_object_and_garbage() {
        assert!(matches!(decode::<BackgroundSection>("no json"), ModelDecode::ParseError(_)));
        assert!(matches!(decode::<BackgroundSection>("} {"), ModelDecode::ParseError(_)));
        assert!(matches!(
            decode::<DiscoverySection>(r#"{"title": "x", "content": }"#),
            ModelDecode::ParseError(_)
        ));
    }

    impl<T> ModelDecode<T> {
        fn map_reason(self) -> Option<String> {
            match self {
                ModelDecode::Parsed(_) => None,
                ModelDecode::ParseError(reason) => Some(reason),
            }
        }
    }
}
