pub mod latex;
pub mod threads;

/// 按字符数截断文本，超出部分以省略标记替代
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}\n…[truncated]", &text[..byte_index]),
        None => text.to_string(),
    }
}
