use crate::config::LLMConfig;
use crate::llm::client::types::ModelRequest;

/// 选择合适的模型：篇幅较小的纯文本请求优先使用高能效模型，失败时回退到高质量模型
pub fn evaluate_befitting_model(
    llm_config: &LLMConfig,
    request: &ModelRequest,
) -> (String, Option<String>) {
    if request.images.is_empty() && request.text_len() <= 32 * 1024 {
        return (
            llm_config.model_efficient.clone(),
            Some(llm_config.model_powerful.clone()),
        );
    }
    (llm_config.model_powerful.clone(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::types::ImageAttachment;

    #[test]
    fn test_small_text_prefers_efficient_model() {
        let config = LLMConfig::default();
        let (model, fallover) = evaluate_befitting_model(&config, &ModelRequest::new("s", "u"));
        assert_eq!(model, config.model_efficient);
        assert_eq!(fallover, Some(config.model_powerful.clone()));
    }

    #[test]
    fn test_images_or_long_prompts_use_powerful_model() {
        let config = LLMConfig::default();
        let with_image = ModelRequest::new("s", "u")
            .with_images(vec![ImageAttachment::from_bytes("image/png", b"x")]);
        assert_eq!(evaluate_befitting_model(&config, &with_image), (config.model_powerful.clone(), None));

        let long = ModelRequest::new("s", "x".repeat(40 * 1024));
        assert_eq!(evaluate_befitting_model(&config, &long).1, None);
    }
}
