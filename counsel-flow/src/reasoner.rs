use async_trait::async_trait;

/// Interface to the external language-model collaborator.
///
/// The pipeline only ever awaits plain-text completions; prompt construction
/// and output handling stay inside the stages. Implementations may be
/// nondeterministic in content. Structural guarantees are the stages'
/// responsibility, enforced over whatever text comes back.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}
