//! 轻量的BibTeX记录解析与重写

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}").unwrap());

/// 一条BibTeX记录
#[derive(Debug, Clone, PartialEq)]
pub struct BibRecord {
    pub entry_type: String,
    pub key: String,
    /// 字段按原始顺序保存，值不含外层的花括号或引号
    pub fields: Vec<(String, String)>,
}

impl BibRecord {
    /// 解析文本中的第一条记录
    pub fn parse(text: &str) -> Option<Self> {
        let mut parser = Parser::new(text);
        parser.next_record().map(|(record, _)| record)
    }

    /// 按名称（不区分大小写）读取字段
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.trim().is_empty())
    }

    pub fn set_field(&mut self, name: &str, value: &str) {
        match self
            .fields
            .iter_mut()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.fields.push((name.to_string(), value.to_string())),
        }
    }

    pub fn to_bibtex(&self) -> String {
        let mut out = format!("@{}{{{},\n", self.entry_type, self.key);
        let lines: Vec<String> = self
            .fields
            .iter()
            .map(|(name, value)| format!("  {} = {{{}}}", name, value))
            .collect();
        out.push_str(&lines.join(",\n"));
        out.push_str("\n}");
        out
    }
}

/// 重写记录的键，解析失败时返回None
pub fn replace_key(bibtex: &str, new_key: &str) -> Option<String> {
    let mut record = BibRecord::parse(bibtex)?;
    record.key = new_key.to_string();
    Some(record.to_bibtex())
}

/// 从 references.bib 内容中删除指定键的记录，其余记录保持原样
pub fn remove_entries(bib: &str, keys: &HashSet<&str>) -> String {
    let mut parser = Parser::new(bib);
    let mut kept = Vec::new();
    while let Some((record, span)) = parser.next_record() {
        if !keys.contains(record.key.as_str()) {
            kept.push(bib[span].trim().to_string());
        }
    }
    if kept.is_empty() {
        return String::new();
    }
    let mut content = kept.join("\n\n");
    content.push('\n');
    content
}

/// 以第一作者姓氏与年份生成citekey，例如 smith2020。
/// 无法得到姓氏时退化为 doi 加DOI中的字母数字。
pub fn derive_citekey(record: &BibRecord, doi: &str) -> String {
    let surname = record
        .field("author")
        .or_else(|| record.field("editor"))
        .and_then(|authors| authors.split(" and ").next())
        .map(|first| match first.split_once(',') {
            Some((last, _)) => last.to_string(),
            None => first.split_whitespace().last().unwrap_or_default().to_string(),
        })
        .map(|name| ascii_fold(&name))
        .unwrap_or_default();

    if surname.is_empty() {
        let compact: String = doi
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        return if compact.is_empty() {
            format!("ref{}", ascii_fold(&record.key))
        } else {
            format!("doi{}", compact)
        };
    }

    let year = record
        .field("year")
        .and_then(|y| YEAR_RE.find(y))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "nd".to_string());

    format!("{}{}", surname, year)
}

/// 去掉LaTeX重音命令并把常见的带音标字母转为ASCII，只保留小写字母数字
fn ascii_fold(text: &str) -> String {
    let mut folded = String::new();
    for c in text.chars() {
        let mapped: &str = match c {
            'ä' | 'á' | 'à' | 'â' | 'ã' | 'å' | 'Ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Å' => "a",
            'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => "e",
            'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => "i",
            'ö' | 'ó' | 'ò' | 'ô' | 'õ' | 'ø' | 'Ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ø' => "o",
            'ü' | 'ú' | 'ù' | 'û' | 'Ü' | 'Ú' | 'Ù' | 'Û' => "u",
            'ñ' | 'Ñ' => "n",
            'ç' | 'Ç' | 'č' | 'Č' | 'ć' => "c",
            'ß' => "ss",
            'ł' | 'Ł' => "l",
            'š' | 'Š' | 'ś' => "s",
            'ž' | 'Ž' | 'ź' | 'ż' => "z",
            'ř' | 'Ř' => "r",
            c if c.is_ascii_alphanumeric() => {
                folded.push(c.to_ascii_lowercase());
                continue;
            }
            _ => continue,
        };
        folded.push_str(mapped);
    }
    folded
}

/// 基于字符位置的递归下降解析器
struct Parser<'a> {
    text: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn byte_offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.text.len())
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// 读取下一条记录及其在原文中的字节范围
    fn next_record(&mut self) -> Option<(BibRecord, std::ops::Range<usize>)> {
        loop {
            while self.peek().is_some_and(|c| c != '@') {
                self.pos += 1;
            }
            self.peek()?;
            let start = self.byte_offset();
            self.pos += 1;
            let checkpoint = self.pos;
            match self.record_body() {
                Some(record) => return Some((record, start..self.byte_offset())),
                None => self.pos = checkpoint,
            }
        }
    }

    fn record_body(&mut self) -> Option<BibRecord> {
        let entry_type = self.take_while(|c| c.is_ascii_alphanumeric());
        if entry_type.is_empty() {
            return None;
        }
        self.skip_whitespace();
        let close = match self.peek()? {
            '{' => '}',
            '(' => ')',
            _ => return None,
        };
        self.pos += 1;
        self.skip_whitespace();
        let key = self.take_while(|c| c != ',' && c != close && !c.is_whitespace());
        self.skip_whitespace();

        let mut fields = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek()? {
                ',' => {
                    self.pos += 1;
                }
                c if c == close => {
                    self.pos += 1;
                    break;
                }
                _ => {
                    let name = self.take_while(|c| c != '=' && c != ',' && c != close);
                    let name = name.trim().to_string();
                    if self.peek()? != '=' {
                        return None;
                    }
                    self.pos += 1;
                    self.skip_whitespace();
                    let value = self.value(close)?;
                    if !name.is_empty() {
                        fields.push((name, value));
                    }
                }
            }
        }

        Some(BibRecord {
            entry_type: entry_type.to_lowercase(),
            key,
            fields,
        })
    }

    fn value(&mut self, close: char) -> Option<String> {
        match self.peek()? {
            '{' => {
                self.pos += 1;
                let mut depth = 1;
                let mut value = String::new();
                loop {
                    let c = self.peek()?;
                    self.pos += 1;
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    value.push(c);
                }
                Some(value)
            }
            '"' => {
                self.pos += 1;
                let mut depth = 0;
                let mut value = String::new();
                loop {
                    let c = self.peek()?;
                    self.pos += 1;
                    match c {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        '"' if depth == 0 => break,
                        _ => {}
                    }
                    value.push(c);
                }
                Some(value)
            }
            _ => {
                let value = self.take_while(|c| c != ',' && c != close);
                Some(value.trim().to_string())
            }
        }
    }

    fn take_while<F>(&mut self, predicate: F) -> String
    where
        F: Fn(char) -> bool,
    {
        let mut taken = String::new();
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            taken.push(c);
            self.pos += 1;
        }
        taken
    }
}
