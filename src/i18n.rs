use serde::{Deserialize, Serialize};

/// 论文的写作语言，按ISO 639-1代码序列化
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(try_from = "String", into = "String")]
pub enum TargetLanguage {
    #[default]
    English,
    Chinese,
    German,
    French,
}

const ALL: [TargetLanguage; 4] = [
    TargetLanguage::English,
    TargetLanguage::Chinese,
    TargetLanguage::German,
    TargetLanguage::French,
];

impl TargetLanguage {
    pub fn code(self) -> &'static str {
        match self {
            TargetLanguage::English => "en",
            TargetLanguage::Chinese => "zh",
            TargetLanguage::German => "de",
            TargetLanguage::French => "fr",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TargetLanguage::English => "English",
            TargetLanguage::Chinese => "中文",
            TargetLanguage::German => "Deutsch",
            TargetLanguage::French => "Français",
        }
    }

    /// 追加到每个章节系统提示词末尾的语言要求
    pub fn prompt_instruction(&self) -> &'static str {
        match self {
            TargetLanguage::English => {
                "Write every section in English, in a formal academic register."
            }
            TargetLanguage::Chinese => {
                "Write every section in Simplified Chinese, in a formal academic register. Keep citation keys and LaTeX commands unchanged."
            }
            TargetLanguage::German => {
                "Write every section in German, in a formal academic register. Keep citation keys and LaTeX commands unchanged."
            }
            TargetLanguage::French => {
                "Write every section in French, in a formal academic register. Keep citation keys and LaTeX commands unchanged."
            }
        }
    }
}

impl std::fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for TargetLanguage {
    type Err = String;

    /// 接受语言代码或英文名称，不区分大小写
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ALL.into_iter()
            .find(|language| {
                language.code() == wanted || format!("{:?}", language).to_lowercase() == wanted
            })
            .ok_or_else(|| format!("Unknown target language: {}", s))
    }
}

impl TryFrom<String> for TargetLanguage {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TargetLanguage> for String {
    fn from(language: TargetLanguage) -> Self {
        language.code().to_string()
    }
}
