//! Prompt construction for the three adversarial roles.
//!
//! The optimist drafts from evidence, the skeptic audits the draft against
//! the same evidence, and the refiner rewrites the draft to drop unsupported
//! claims. Prompts are plain formatted strings; the only external input is
//! the optional skeptic few-shot file.

use serde::Deserialize;
use tracing::warn;

use crate::settings::Strictness;

/// Draft text longer than this is cut before entering the refiner prompt.
const REFINER_DRAFT_CAP: usize = 4000;

/// One few-shot example for the skeptic prompt.
#[derive(Clone, Debug, Deserialize)]
pub struct SkepticExample {
    pub answer: String,
    pub evidence: String,
    /// The exact JSON verdict the skeptic should emit for this example.
    pub audit: String,
}

/// The two examples embedded in every skeptic prompt: one verified, one
/// hallucination.
#[derive(Clone, Debug, Deserialize)]
pub struct SkepticExamples {
    pub verified: SkepticExample,
    pub hallucination: SkepticExample,
}

impl Default for SkepticExamples {
    fn default() -> Self {
        Self {
            verified: SkepticExample {
                answer: "The report was published in 2021 [Source 0].".into(),
                evidence: "[Source 0] (report.txt):\nThe annual report was published in 2021.".into(),
                audit: r#"{"is_verified": true, "reasoning": "The publication year is stated verbatim in Source 0.", "hallucinations": [], "missing_evidence": []}"#.into(),
            },
            hallucination: SkepticExample {
                answer: "The report was published in 2021 and praised by regulators.".into(),
                evidence: "[Source 0] (report.txt):\nThe annual report was published in 2021.".into(),
                audit: r#"{"is_verified": false, "reasoning": "The publication year is supported by Source 0, but no source mentions regulators.", "hallucinations": ["praised by regulators"], "missing_evidence": ["any statement about regulator reactions"]}"#.into(),
            },
        }
    }
}

impl SkepticExamples {
    /// Loads examples from a JSON file when configured; any failure falls
    /// back to the built-in defaults with a warning.
    pub fn load(path: Option<&str>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<SkepticExamples>(&raw) {
                Ok(examples) => examples,
                Err(e) => {
                    warn!(path = path, error = %e, "invalid skeptic examples file, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = path, error = %e, "cannot read skeptic examples file, using defaults");
                Self::default()
            }
        }
    }

    fn render(&self) -> String {
        format!(
            "EXAMPLE 1 (verified answer):\nANSWER: {}\nEVIDENCE:\n{}\nAUDIT:\n{}\n\n\
             EXAMPLE 2 (hallucinated answer):\nANSWER: {}\nEVIDENCE:\n{}\nAUDIT:\n{}",
            self.verified.answer,
            self.verified.evidence,
            self.verified.audit,
            self.hallucination.answer,
            self.hallucination.evidence,
            self.hallucination.audit,
        )
    }
}

/// Builds optimist, skeptic, and refiner prompts.
pub struct PromptBuilder {
    strictness: Strictness,
    examples: SkepticExamples,
}

impl PromptBuilder {
    pub fn new(strictness: Strictness, examples: SkepticExamples) -> Self {
        Self {
            strictness,
            examples,
        }
    }

    /// Optimist draft prompt. `history` is the formatted memory block, shown
    /// only when history pseudo-documents were retained; it is explicitly
    /// non-citable context.
    pub fn optimist(&self, query: &str, evidence: &str, history: Option<&str>) -> String {
        let rules = match self.strictness {
            Strictness::Strict => {
                "RULES:\n\
                 1. Every factual statement MUST cite its source as [Source N].\n\
                 2. Do not combine or infer across sources; each claim needs one direct source.\n\
                 3. Do not use any prior knowledge. If the sources do not contain the answer, say so.\n"
            }
            Strictness::Balanced => {
                "RULES:\n\
                 1. Prefer citing sources as [Source N] for factual statements.\n\
                 2. You may synthesize across sources when they agree.\n\
                 3. When sources conflict, say so explicitly instead of picking one.\n"
            }
        };
        let memory = match history {
            Some(block) if !block.is_empty() => format!(
                "\nConversation History (Memory):\n\
                 The following is prior conversation, NOT evidence. Use it only to resolve\n\
                 pronouns and references in the question. Never cite it as a source.\n{}\n",
                block
            ),
            _ => String::new(),
        };
        format!(
            "You are a careful assistant. Answer the user's question using only the\n\
             evidence below.\n\n{rules}{memory}\nEvidence:\n{evidence}\n\nQuestion: {query}\nAnswer:",
        )
    }

    /// Skeptic audit prompt: assume the answer is wrong until the evidence
    /// proves it, and answer in strict JSON.
    pub fn skeptic(&self, query: &str, proposed_answer: &str, evidence: &str) -> String {
        format!(
            "You are a SKEPTICAL FACT-CHECKER auditing someone else's answer for hallucinations.\n\n\
             CRITICAL RULES:\n\
             1. ASSUME THE ANSWER IS WRONG until proven right by evidence.\n\
             2. Each claim needs DIRECT, EXPLICIT support you could quote - no assumptions or inferences.\n\
             3. If a claim requires connecting multiple sources or reading between the lines, mark it unsupported.\n\
             4. Vague or partial matches count as HALLUCINATION.\n\n\
             {examples}\n\n\
             USER QUERY: {query}\n\n\
             ANSWER TO AUDIT (treat this as potentially flawed):\n{proposed_answer}\n\n\
             VERIFIED EVIDENCE (the ONLY truth source):\n{evidence}\n\n\
             AUDIT PROCESS:\n\
             Step 1: Break the answer into individual factual claims.\n\
             Step 2: For EACH claim, find its EXACT match in the evidence (quote the source number).\n\
             Step 3: If no exact match exists, add the claim to the hallucinations list.\n\
             Step 4: List what evidence would be needed to fully answer the query.\n\n\
             Output ONLY valid JSON:\n\
             {{\n\
                 \"is_verified\": boolean,\n\
                 \"reasoning\": \"string\",\n\
                 \"hallucinations\": [\"unsupported claim\", \"...\"],\n\
                 \"missing_evidence\": [\"what would be needed to verify\"]\n\
             }}\n\n\
             REMEMBER: Being strict protects users from misinformation. When in doubt, mark as hallucination.",
            examples = self.examples.render(),
        )
    }

    /// Refiner prompt: remove the enumerated hallucinations without adding
    /// new facts. An empty hallucination list degrades to a generic accuracy
    /// rewrite.
    pub fn refiner(&self, query: &str, draft: &str, hallucinations: &[String]) -> String {
        let draft = if draft.chars().count() > REFINER_DRAFT_CAP {
            draft.chars().take(REFINER_DRAFT_CAP).collect::<String>()
        } else {
            draft.to_string()
        };
        let instruction = if hallucinations.is_empty() {
            "An auditor flagged this answer as not fully supported. Rewrite it to be more\n\
             accurate: keep only claims the evidence supports."
                .to_string()
        } else {
            let list = hallucinations
                .iter()
                .map(|h| format!("- {}", h))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "An auditor found these unsupported claims in the answer:\n{}\n\n\
                 Rewrite the answer WITHOUT those claims. Keep every claim the auditor did\n\
                 not flag.",
                list
            )
        };
        format!(
            "You are revising a draft answer to remove unsupported claims.\n\n\
             RULES:\n\
             1. Do NOT introduce any new facts.\n\
             2. Preserve verified claims and their [Source N] citations.\n\
             3. Output only the revised answer, no commentary.\n\n\
             QUESTION: {query}\n\n\
             DRAFT ANSWER:\n{draft}\n\n\
             {instruction}\n\nRevised answer:",
        )
    }
}
