//! Council mode: a bounded multi-turn dialogue among two named
//! participants, either adversarial (alternating counterarguments) or
//! consensus (iterating toward a shared answer), with an optional
//! moderator pass (spec §4.H).
//!
//! Dynamic termination compares each turn's embedding against the turn
//! immediately before it (regardless of speaker): adversarial calls that a
//! "stalemate", consensus calls it "convergence". This embedding-distance
//! measure is the spec's unresolved "semantic distance" left for this
//! implementation to fix (see DESIGN.md).

use std::time::Instant;

use orc_cgrag::{cosine_similarity, Embedder};
use orc_inference::Generator;
use orc_kernel::pipeline::StageName;
use orc_kernel::query::{
    CouncilTurn, CouncilVariant, CouncilWinner, ModeratorAnalysis, PersonaConfig, QueryMetadata,
    QueryRequest, QueryResponse,
};
use orc_kernel::model::Tier;
use orc_kernel::OrchestratorResult;
use orc_supervisor::ServerLauncher;

use crate::context::build_prompt;
use crate::deadline::Deadline;
use crate::engine::Engine;

const CONCESSION_PHRASES: &[&str] = &[
    "i agree",
    "you're right",
    "you make a fair point",
    "i concede",
    "that's a valid point",
    "i stand corrected",
];

fn contains_concession_language(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    CONCESSION_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

fn resolve_personas(variant: CouncilVariant, personas: &PersonaConfig) -> (String, String) {
    if let (Some(pro), Some(con)) = (&personas.custom_pro, &personas.custom_con) {
        return (pro.clone(), con.clone());
    }
    if let Some(profile) = &personas.named_profile {
        match profile.as_str() {
            "optimist_pessimist" => return ("Optimist".to_string(), "Pessimist".to_string()),
            "devils_advocate" => return ("Advocate".to_string(), "Devil's Advocate".to_string()),
            _ => {}
        }
    }
    match variant {
        CouncilVariant::Adversarial => ("Proponent".to_string(), "Opponent".to_string()),
        CouncilVariant::Consensus => ("Collaborator A".to_string(), "Collaborator B".to_string()),
    }
}

fn build_council_prompt(
    query: &str,
    context_block: &str,
    turns: &[CouncilTurn],
    persona: &str,
    variant: CouncilVariant,
) -> String {
    let mut out = String::new();
    if !context_block.is_empty() {
        out.push_str(context_block);
        out.push('\n');
    }
    out.push_str(&format!("Topic: {query}\n\n"));

    if turns.is_empty() {
        out.push_str(&format!("You are {persona}. Open the discussion with your position.\n"));
        return out;
    }

    out.push_str("Discussion so far:\n");
    for turn in turns {
        out.push_str(&format!("{}: {}\n\n", turn.persona, turn.content));
    }
    let instruction = match variant {
        CouncilVariant::Adversarial => format!(
            "You are {persona}. Respond to the other side's latest argument and defend your position. \
             If you have genuinely been persuaded, say so plainly."
        ),
        CouncilVariant::Consensus => format!(
            "You are {persona}. Build on the discussion so far and move the group toward a single, \
             shared answer."
        ),
    };
    out.push_str(&instruction);
    out
}

#[allow(clippy::too_many_arguments)]
pub async fn run<L: ServerLauncher, G: Generator, Em: Embedder>(
    engine: &Engine<L, G, Em>,
    query_id: &str,
    request: &QueryRequest,
    variant: CouncilVariant,
    max_turns: u8,
    dynamic_termination: bool,
    personas: &PersonaConfig,
    moderator: bool,
    deadline: &Deadline,
) -> OrchestratorResult<QueryResponse> {
    let start = Instant::now();
    engine.tracker.enter(query_id, StageName::Complexity)?;

    let context = engine.maybe_retrieve_context(query_id, request).await?;
    let context_block = if context.chunks.is_empty() {
        String::new()
    } else {
        build_prompt("", &context)
    };

    let (label_a, label_b) = resolve_personas(variant, personas);

    let mut turns: Vec<CouncilTurn> = Vec::new();
    let mut prev_embedding: Option<Vec<f32>> = None;
    let mut termination_reason = String::new();

    for turn_number in 1..=max_turns {
        if deadline.is_expired() {
            termination_reason = "deadline_exceeded".to_string();
            break;
        }

        let first_speaker = turn_number % 2 == 1;
        let (speaker_id, persona) = if first_speaker {
            ("participant_1".to_string(), label_a.clone())
        } else {
            ("participant_2".to_string(), label_b.clone())
        };

        let prompt = build_council_prompt(&request.query, &context_block, &turns, &persona, variant);
        let (_model_id, text, tokens_used, _tier, _elapsed) = engine
            .generate(query_id, Tier::Powerful, prompt, request, deadline)
            .await?;

        let mut termination: Option<&'static str> = None;
        if variant == CouncilVariant::Adversarial && contains_concession_language(&text) {
            termination = Some("concession");
        }

        if termination.is_none() && dynamic_termination {
            if let Ok(embedding) = engine.retriever.embed(&text).await {
                if let Some(prev) = &prev_embedding {
                    let distance = 1.0 - cosine_similarity(prev, &embedding);
                    if (distance as f64) < engine.settings.council.dynamic_termination_threshold {
                        termination = Some(match variant {
                            CouncilVariant::Adversarial => "stalemate",
                            CouncilVariant::Consensus => "dynamic_convergence",
                        });
                    }
                }
                prev_embedding = Some(embedding);
            }
        }

        turns.push(CouncilTurn {
            turn_number: turn_number as u32,
            speaker_id,
            persona,
            content: text,
            timestamp: chrono::Utc::now(),
            tokens_used,
        });

        if let Some(reason) = termination {
            termination_reason = reason.to_string();
            break;
        }
    }

    if termination_reason.is_empty() {
        termination_reason = "max_turns_reached".to_string();
    }

    let moderator_analysis = if moderator {
        Some(run_moderator_analysis(engine, query_id, request, &turns, deadline).await?)
    } else {
        None
    };

    engine.tracker.enter(query_id, StageName::Response)?;
    engine.tracker.complete(query_id)?;

    let response_text = turns
        .last()
        .map(|t| t.content.clone())
        .unwrap_or_default();

    Ok(QueryResponse {
        id: query_id.to_string(),
        query: request.query.clone(),
        response_text,
        metadata: QueryMetadata::Council {
            turns,
            termination_reason,
            moderator_analysis,
            processing_time_ms: start.elapsed().as_millis() as u64,
        },
    })
}

async fn run_moderator_analysis<L: ServerLauncher, G: Generator, Em: Embedder>(
    engine: &Engine<L, G, Em>,
    query_id: &str,
    request: &QueryRequest,
    turns: &[CouncilTurn],
    deadline: &Deadline,
) -> OrchestratorResult<ModeratorAnalysis> {
    let transcript = turns
        .iter()
        .map(|t| format!("{}: {}", t.persona, t.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    let prompt = format!(
        "Analyze the following debate transcript. Identify argument strength, logical fallacies, \
         rhetorical techniques used, and the key turning points.\n\n{transcript}"
    );
    let (_model_id, analysis_text, _tokens, _tier, _elapsed) = engine
        .generate(query_id, Tier::Powerful, prompt, request, deadline)
        .await?;

    let participant_1_tokens: usize = turns
        .iter()
        .filter(|t| t.speaker_id == "participant_1")
        .map(|t| t.tokens_used)
        .sum();
    let participant_2_tokens: usize = turns
        .iter()
        .filter(|t| t.speaker_id == "participant_2")
        .map(|t| t.tokens_used)
        .sum();
    let overall_winner = Some(match participant_1_tokens.cmp(&participant_2_tokens) {
        std::cmp::Ordering::Greater => CouncilWinner::Pro,
        std::cmp::Ordering::Less => CouncilWinner::Con,
        std::cmp::Ordering::Equal => CouncilWinner::Tie,
    });

    Ok(ModeratorAnalysis {
        argument_strength: analysis_text,
        logical_fallacies: Vec::new(),
        rhetorical_techniques: Vec::new(),
        key_turning_points: Vec::new(),
        overall_winner,
    })
}
