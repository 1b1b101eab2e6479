//! 编译与发布

pub mod compiler;
pub mod toolchain;

use crate::generator::assemble::BIB_STEM;
use crate::generator::context::PaperContext;
use crate::generator::error::PaperError;
use crate::generator::outlet::compiler::CompiledPaper;
use crate::generator::outlet::toolchain::DOCUMENT_STEM;
use crate::generator::workflow::PaperRequest;
use crate::storage::artifact_key;

/// 上传后的产物位置
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedArtifacts {
    pub pdf_key: String,
    pub source_key: String,
    /// 参考文献被清空时不上传
    pub bib_key: Option<String>,
    pub pdf_url: String,
    pub source_url: String,
}

/// 上传PDF与源码，返回限时访问链接
pub async fn publish(
    context: &PaperContext,
    request: &PaperRequest,
    paper_id: &str,
    compiled: &CompiledPaper,
) -> Result<PublishedArtifacts, PaperError> {
    let key_for = |file_name: &str| {
        artifact_key(
            &context.config.storage.key_prefix,
            &request.user_id,
            &request.conversation_id,
            paper_id,
            file_name,
        )
    };
    let pdf_key = key_for(&format!("{}.pdf", DOCUMENT_STEM));
    let source_key = key_for(&format!("{}.tex", DOCUMENT_STEM));

    let pdf_bytes = tokio::fs::read(&compiled.pdf_path).await?;
    let storage = &context.storage;
    storage
        .upload(&pdf_key, pdf_bytes, "application/pdf")
        .await
        .map_err(PaperError::Storage)?;
    storage
        .upload(
            &source_key,
            compiled.source.tex.clone().into_bytes(),
            "application/x-tex",
        )
        .await
        .map_err(PaperError::Storage)?;

    let bib_key = if compiled.source.bib.trim().is_empty() {
        None
    } else {
        let key = key_for(&format!("{}.bib", BIB_STEM));
        storage
            .upload(
                &key,
                compiled.source.bib.clone().into_bytes(),
                "application/x-bibtex",
            )
            .await
            .map_err(PaperError::Storage)?;
        Some(key)
    };

    let ttl = context.config.storage.presign_ttl();
    let pdf_url = storage
        .presigned_url(&pdf_key, ttl)
        .await
        .map_err(PaperError::Storage)?;
    let source_url = storage
        .presigned_url(&source_key, ttl)
        .await
        .map_err(PaperError::Storage)?;

    tracing::info!("☁️ 论文已发布: {}", pdf_key);
    Ok(PublishedArtifacts {
        pdf_key,
        source_key,
        bib_key,
        pdf_url,
        source_url,
    })
}
