use async_trait::async_trait;
use counsel_flow::{Profile, Reasoner};
use rig::{
    agent::Agent,
    client::CompletionClient,
    completion::Chat,
    providers::openrouter,
};
use tracing::warn;

const COUNSELOR_PREAMBLE: &str = "You are a study-abroad counseling assistant. \
Answer with a short, concrete piece of advice in plain prose. \
Two to three sentences, no markdown, no lists, no preamble.";

const MAX_NARRATIVE_CHARS: usize = 400;

pub fn get_llm_agent(preamble: &str) -> anyhow::Result<Agent<openrouter::CompletionModel>> {
    let api_key = std::env::var("OPENROUTER_API_KEY")
        .map_err(|_| anyhow::anyhow!("OPENROUTER_API_KEY not set"))?;
    let client = openrouter::Client::new(&api_key);
    Ok(client.agent("openai/gpt-4o-mini").preamble(preamble).build())
}

/// [`Reasoner`] backed by an OpenRouter chat model.
pub struct OpenRouterReasoner;

#[async_trait]
impl Reasoner for OpenRouterReasoner {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let agent = get_llm_agent(COUNSELOR_PREAMBLE)?;
        let reply = agent.chat(prompt, vec![]).await?;
        Ok(reply)
    }
}

/// Ask the reasoner for advisory prose, falling back to the templated text
/// when the call fails or returns nothing. Narrative never changes a stage's
/// structure, so a broken reasoner degrades wording, not the payload.
pub async fn narrative(reasoner: &dyn Reasoner, prompt: &str, fallback: &str) -> String {
    match reasoner.complete(prompt).await {
        Ok(reply) => {
            let reply = reply.trim();
            if reply.is_empty() {
                fallback.to_string()
            } else {
                reply.chars().take(MAX_NARRATIVE_CHARS).collect()
            }
        }
        Err(error) => {
            warn!(error = %error, "reasoning call failed, using templated text");
            fallback.to_string()
        }
    }
}

/// Compact profile rendering embedded into stage prompts.
pub fn profile_summary(profile: &Profile) -> String {
    let mut parts = Vec::new();
    if let Some(institution) = &profile.target_institution {
        parts.push(format!("target institution: {institution}"));
    }
    if let Some(country) = &profile.target_country {
        parts.push(format!("target country: {country}"));
    }
    if let Some(field) = &profile.field_of_study {
        parts.push(format!("field: {field}"));
    }
    if let Some(gpa) = &profile.gpa {
        parts.push(format!("GPA: {}/{}", gpa.value, gpa.scale));
    }
    if !profile.test_scores.is_empty() {
        let scores: Vec<String> = profile
            .test_scores
            .iter()
            .map(|(name, score)| format!("{name} {score}"))
            .collect();
        parts.push(format!("tests: {}", scores.join(", ")));
    }
    if !profile.extracurriculars.is_empty() {
        parts.push(format!(
            "extracurriculars: {}",
            profile.extracurriculars.join("; ")
        ));
    }
    if !profile.internships.is_empty() {
        parts.push(format!("experience: {}", profile.internships.join("; ")));
    }
    if parts.is_empty() {
        return "no structured details provided yet".to_string();
    }
    parts.join("; ")
}
