use crate::models::{GroundedPrompt, ImagePayload, PipelineOptions, PromptSource, SourceResult};

const GROUNDED_SYSTEM_PROMPT: &str = "You are a focused research assistant. Ground every answer \
in the numbered web sources supplied by the user and use nothing else. Cite sources inline by \
their bracketed index, like [1] or [2][3]. If the sources are insufficient, say you don't know.";

const UNGROUNDED_SYSTEM_PROMPT: &str = "You are a focused research assistant. No web sources \
could be retrieved for this question. Answer from general knowledge, state plainly that no \
sources were available, and do not invent citations.";

const OVER_BUDGET_SYSTEM_PROMPT: &str = "You are a focused research assistant. Web sources were \
retrieved for this question but none fit in the available context. Answer from general \
knowledge, state plainly that the retrieved sources could not be used, and do not invent \
citations.";

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    char_budget: usize,
    answer_word_target: usize,
    cite_degraded_sources: bool,
}

impl From<&PipelineOptions> for PromptAssembler {
    fn from(options: &PipelineOptions) -> Self {
        Self {
            char_budget: options.prompt_char_budget,
            answer_word_target: options.answer_word_target,
            cite_degraded_sources: options.cite_degraded_sources,
        }
    }
}

impl PromptAssembler {
    pub fn new(char_budget: usize, answer_word_target: usize) -> Self {
        Self {
            char_budget,
            answer_word_target,
            cite_degraded_sources: false,
        }
    }

    pub fn with_degraded_sources(mut self, cite: bool) -> Self {
        self.cite_degraded_sources = cite;
        self
    }

    /// Whether `source` may be placed in the prompt at all.
    pub fn is_citable(&self, source: &SourceResult) -> bool {
        source.is_ok() || (self.cite_degraded_sources && source.has_degraded_summary())
    }

    /// Builds the grounded prompt. Pure: equal inputs give byte-identical output.
    ///
    /// Citable sources are numbered from 1 in the order given and added whole
    /// until the next block would push the prompt past the character budget;
    /// that block and every later one are reported in `excluded_for_budget`.
    pub fn assemble(
        &self,
        query: &str,
        sources: &[SourceResult],
        image: Option<&ImagePayload>,
    ) -> GroundedPrompt {
        let question = question_section(query, image.is_some());
        let base_chars = GROUNDED_SYSTEM_PROMPT.chars().count()
            + question.chars().count()
            + "\n\nRelevant context:".chars().count()
            + 2
            + self.directive(sources.len()).chars().count();

        let mut used_chars = base_chars;
        let mut included = Vec::new();
        let mut excluded_for_budget = Vec::new();

        for source in sources.iter().filter(|source| self.is_citable(source)) {
            if !excluded_for_budget.is_empty() {
                excluded_for_budget.push(source.position);
                continue;
            }

            let candidate = PromptSource {
                citation: included.len() + 1,
                position: source.position,
                title: source.title.clone(),
                url: source.url.clone(),
                summary: source.summary.clone().unwrap_or_default(),
            };
            let block_chars = source_block(&candidate).chars().count() + 2;

            if used_chars + block_chars > self.char_budget {
                excluded_for_budget.push(source.position);
            } else {
                used_chars += block_chars;
                included.push(candidate);
            }
        }

        if included.is_empty() {
            let (system, limitation) = if excluded_for_budget.is_empty() {
                (UNGROUNDED_SYSTEM_PROMPT, "No external context was retrieved.")
            } else {
                (
                    OVER_BUDGET_SYSTEM_PROMPT,
                    "Sources were retrieved but too long to include.",
                )
            };
            let user = format!(
                "{question}\n\n{limitation} Answer conservatively and note the limitation.\n\n\
                 Craft a precise, factual response under {} words.",
                self.answer_word_target
            );
            return GroundedPrompt {
                system: system.to_string(),
                user,
                sources: included,
                excluded_for_budget,
            };
        }

        let context = included
            .iter()
            .map(source_block)
            .collect::<Vec<_>>()
            .join("\n\n");
        let user = format!(
            "{question}\n\nRelevant context:\n\n{context}\n\n{}",
            self.directive(included.len())
        );

        GroundedPrompt {
            system: GROUNDED_SYSTEM_PROMPT.to_string(),
            user,
            sources: included,
            excluded_for_budget,
        }
    }

    /// Never longer for fewer sources, so sizing with the full count is an upper bound.
    fn directive(&self, source_count: usize) -> String {
        format!(
            "Craft a precise, factual response under {} words. Place source citations inline, \
             e.g. [1], using only indices 1 to {source_count}.",
            self.answer_word_target
        )
    }
}

fn question_section(query: &str, has_image: bool) -> String {
    if has_image {
        format!(
            "User question: {query}\n\nAn image is attached to this question. Use it together \
             with the sources."
        )
    } else {
        format!("User question: {query}")
    }
}

fn source_block(source: &PromptSource) -> String {
    format!(
        "[{}] {} — {}\n{}",
        source.citation, source.title, source.url, source.summary
    )
}
