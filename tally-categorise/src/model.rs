//! The text-generation service seen by the coordinator.

/// A synchronous prompt-in, text-out model. Replies carry no structural guarantee.
///
/// Implementations are shared across worker threads and may block for a long
/// time; an `Err` aborts the whole categorisation run.
pub trait CompletionModel: Send + Sync {
    fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

impl<F> CompletionModel for F
where
    F: Fn(&str) -> anyhow::Result<String> + Send + Sync,
{
    fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self(prompt)
    }
}
