use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// 随请求发送给模型的图片
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// 例如 image/png
    pub media_type: String,
    /// base64编码后的图片内容
    pub data: String,
}

impl ImageAttachment {
    pub fn from_bytes(media_type: &str, bytes: &[u8]) -> Self {
        Self {
            media_type: media_type.to_string(),
            data: STANDARD.encode(bytes),
        }
    }
}

/// 一次模型调用的输入
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
    /// 输出长度上限，None时使用配置中的max_tokens
    pub max_tokens: Option<u32>,
}

impl ModelRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            images: Vec::new(),
            max_tokens: None,
        }
    }

    pub fn with_images(mut self, images: Vec<ImageAttachment>) -> Self {
        self.images = images;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// 文本部分的总长度（字节）
    pub fn text_len(&self) -> usize {
        self.system_prompt.len() + self.user_prompt.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_attachment_encodes_base64() {
        let image = ImageAttachment::from_bytes("image/png", b"\x89PNG");
        assert_eq!(image.data, "iVBORw==");
    }

    #[test]
    fn test_request_builder() {
        let request = ModelRequest::new("sys", "user").with_max_tokens(512);
        assert_eq!(request.max_tokens, Some(512));
        assert_eq!(request.text_len(), 7);
        assert!(request.images.is_empty());
    }
}
