//! LaTeX文本处理工具

use regex::Regex;
use std::sync::LazyLock;

static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*").unwrap());
static ITALIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[\s(])\*([^*\s][^*\n]*?)\*").unwrap());
static MD_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]\n]+)\]\((https?://[^)\s]+)\)").unwrap());
static ALIGN_BEGIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\begin\{(tabular\*?|tabularx|array|align\*?|aligned|eqnarray\*?|[pbvBV]?matrix|cases)\}")
        .unwrap()
});
static ALIGN_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\end\{(tabular\*?|tabularx|array|align\*?|aligned|eqnarray\*?|[pbvBV]?matrix|cases)\}")
        .unwrap()
});

/// 转义纯文本中的LaTeX特殊字符
pub fn escape_latex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str(r"\textbackslash{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '~' => escaped.push_str(r"\textasciitilde{}"),
            '^' => escaped.push_str(r"\textasciicircum{}"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// 清理模型生成的LaTeX片段：Markdown强调与链接转为LaTeX命令，转义裸露的 % # &
pub fn sanitize_fragment(fragment: &str) -> String {
    let converted = MD_LINK_RE.replace_all(fragment, r"\href{$2}{$1}");
    let converted = BOLD_RE.replace_all(&converted, r"\textbf{$1}");
    let converted = ITALIC_RE.replace_all(&converted, r"$1\emph{$2}");

    let mut output = String::with_capacity(converted.len());
    let mut align_depth: usize = 0;
    for (i, line) in converted.split('\n').enumerate() {
        if i > 0 {
            output.push('\n');
        }
        align_depth += ALIGN_BEGIN_RE.find_iter(line).count();
        output.push_str(&escape_bare(line, align_depth > 0));
        align_depth = align_depth.saturating_sub(ALIGN_END_RE.find_iter(line).count());
    }
    output
}

/// 转义文本中尚未转义的 % # &，用于外部服务返回的BibTeX字段
pub fn escape_specials(text: &str) -> String {
    escape_bare(&text.replace("&amp;", "&"), false)
}

/// 转义未被反斜杠转义的 % #，以及对齐环境之外的 &
fn escape_bare(line: &str, in_alignment: bool) -> String {
    let mut result = String::with_capacity(line.len());
    let mut backslashes = 0usize;
    for c in line.chars() {
        let escaped = backslashes % 2 == 1;
        let needs_escape = match c {
            '%' | '#' => !escaped,
            '&' => !escaped && !in_alignment,
            _ => false,
        };
        if needs_escape {
            result.push('\\');
        }
        result.push(c);
        backslashes = if c == '\\' { backslashes + 1 } else { 0 };
    }
    result
}
