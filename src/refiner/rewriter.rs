//! Интерфейс внешнего сервиса переписывания текста

use async_trait::async_trait;

/// Сервис, который сокращает текст до заданного числа слов
///
/// `Ok(None)` или пустая строка означают, что сервис ничего не предложил.
/// Ошибки считаются временными и повторяются вызывающей стороной.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, text: &str, max_words: usize) -> anyhow::Result<Option<String>>;
}

/// Сервис, который никогда ничего не предлагает: сразу детерминированное сокращение
pub struct NoopRewriter;

#[async_trait]
impl Rewriter for NoopRewriter {
    async fn rewrite(&self, _text: &str, _max_words: usize) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}
