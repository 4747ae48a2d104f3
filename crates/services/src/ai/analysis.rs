use std::sync::Arc;

use async_trait::async_trait;
use interview_core::analysis::AnalysisContext;
use interview_core::model::{CONVERSATION_PLACEHOLDER, PromptVariant};

use super::{
    AnalysisService, Completion, CompletionRequest, CompletionService, Role, SynthesisService,
};
use crate::error::AiError;

const SEGMENT_PLACEHOLDER: &str = "{business_segment}";

const ANALYSIS_PROMPT: &str = r#"You are supporting a structured knowledge interview in the field: {business_segment}.

Based on the context and the latest question and answer, propose up to three additional questions that cover relevant topics not yet addressed. Review the planned optional questions and remove up to 30 % of them if they are less relevant in this context. Do not repeat or rephrase questions that were already asked, planned or skipped.

Context:
{history}

Latest question: {question}
Latest answer: {answer}
Planned mandatory questions:
{mandatory}
Planned optional questions:
{optional}
Skipped questions:
{skipped}

Answer with a single JSON object and nothing else:
{"concepts": ["..."], "additional_questions": ["...?"], "removed_optional_questions": ["...?"], "notes": "..."}"#;

const DEFAULT_WIKI_PROMPT: &str = r"The following conversation documents professional knowledge in the field: {business_segment}.

{conversation}

Write a wiki page in Markdown that summarizes the essential information, explicit and implicit knowledge, processes and open questions of the conversation. Start with a single '# ' headline naming the topic.";

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders the analysis prompt for `context`.
#[must_use]
pub fn render_analysis_prompt(context: &AnalysisContext) -> String {
    ANALYSIS_PROMPT
        .replace(SEGMENT_PLACEHOLDER, &context.business_segment)
        .replace("{history}", &context.history_text())
        .replace("{question}", &context.current_question)
        .replace("{answer}", &context.answer)
        .replace("{mandatory}", &bullet_list(&context.unanswered_mandatory))
        .replace("{optional}", &bullet_list(&context.unanswered_optional))
        .replace("{skipped}", &bullet_list(&context.skipped))
}

/// Renders a wiki prompt; variants without a body use the built-in prompt.
#[must_use]
pub fn render_wiki_prompt(
    prompt: &PromptVariant,
    business_segment: &str,
    conversation: &str,
) -> String {
    let rendered = match &prompt.body {
        Some(_) => prompt.render(conversation),
        None => DEFAULT_WIKI_PROMPT.replace(CONVERSATION_PLACEHOLDER, conversation),
    };
    rendered.replace(SEGMENT_PLACEHOLDER, business_segment)
}

/// Follow-up analysis through a plain JSON-mode chat completion.
#[derive(Clone)]
pub struct CompletionAnalysis {
    completion: Arc<dyn CompletionService>,
    model: String,
    max_tokens: u32,
}

impl CompletionAnalysis {
    #[must_use]
    pub fn new(completion: Arc<dyn CompletionService>, model: impl Into<String>) -> Self {
        Self {
            completion,
            model: model.into(),
            max_tokens: 500,
        }
    }
}

#[async_trait]
impl AnalysisService for CompletionAnalysis {
    fn provider(&self) -> &str {
        self.completion.provider()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn analyse(&self, context: &AnalysisContext) -> Result<Completion, AiError> {
        self.completion
            .complete(CompletionRequest {
                role: Role::User,
                content: render_analysis_prompt(context),
                model: self.model.clone(),
                max_tokens: self.max_tokens,
                json_mode: true,
            })
            .await
    }
}

/// Wiki synthesis through a plain chat completion.
#[derive(Clone)]
pub struct CompletionSynthesis {
    completion: Arc<dyn CompletionService>,
    model: String,
    max_tokens: u32,
}

impl CompletionSynthesis {
    #[must_use]
    pub fn new(completion: Arc<dyn CompletionService>, model: impl Into<String>) -> Self {
        Self {
            completion,
            model: model.into(),
            max_tokens: 3000,
        }
    }
}

#[async_trait]
impl SynthesisService for CompletionSynthesis {
    fn provider(&self) -> &str {
        self.completion.provider()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn synthesize(
        &self,
        prompt: &PromptVariant,
        business_segment: &str,
        conversation: &str,
    ) -> Result<Completion, AiError> {
        self.completion
            .complete(CompletionRequest {
                role: Role::User,
                content: render_wiki_prompt(prompt, business_segment, conversation),
                model: self.model.clone(),
                max_tokens: self.max_tokens,
                json_mode: false,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use interview_core::model::PromptId;

    use super::*;

    #[test]
    fn analysis_prompt_lists_open_questions() {
        let context = AnalysisContext {
            business_segment: "care".into(),
            current_question: "Role?".into(),
            answer: "Nurse".into(),
            history: vec!["System: Team?\nUser: 5".into()],
            unanswered_mandatory: vec!["Tools?".into()],
            unanswered_optional: vec!["Hobbies?".into()],
            skipped: Vec::new(),
        };

        let prompt = render_analysis_prompt(&context);

        assert!(prompt.contains("field: care"));
        assert!(prompt.contains("Latest answer: Nurse"));
        assert!(prompt.contains("- Tools?"));
        assert!(prompt.contains("- Hobbies?"));
        assert!(prompt.contains("System: Team?\nUser: 5"));
    }

    #[test]
    fn wiki_prompt_substitutes_conversation_and_segment() {
        let custom = PromptVariant {
            id: PromptId::new("a"),
            body: Some("[{business_segment}] {conversation}".into()),
        };
        let remote = PromptVariant {
            id: PromptId::new("1"),
            body: None,
        };

        assert_eq!(render_wiki_prompt(&custom, "care", "talk"), "[care] talk");
        let fallback = render_wiki_prompt(&remote, "care", "talk");
        assert!(fallback.contains("field: care"));
        assert!(fallback.contains("talk"));
    }
}
