//! Prompt composition: persona system prompt, question presentation,
//! answering instructions and declared memory.

use serde_json::{Value, json};
use survey::{Agent, Answers, Question, QuestionType, Scenario, Survey};
use template::{TemplateContext, TemplateError};
use validation::narrow_options;

/// Dropdowns present at most this many options after narrowing.
const DROPDOWN_PROMPT_OPTIONS: usize = 30;

const DEFAULT_AGENT_INSTRUCTION: &str =
    "You are answering questions as if you were a human. Do not break character.";

const DEFAULT_PERSONA_TEMPLATE: &str = "Your persona has the following traits:\n{{ agent_traits }}";

/// The rendered prompt pair for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompts {
    /// Persona system prompt.
    pub system: String,
    /// Question user prompt, including instructions and memory.
    pub user: String,
    /// The options actually presented, after any narrowing.
    pub presented_options: Vec<String>,
}

/// The template context for a turn: agent traits, scenario fields (nested
/// and bare) and one root per prior answer.
pub fn build_context(agent: &Agent, scenario: &Scenario, answers: &Answers) -> TemplateContext {
    let mut context = TemplateContext::new();

    let mut agent_root = agent.traits_json();
    if let (Value::Object(map), Some(name)) = (&mut agent_root, &agent.name) {
        map.entry("name".to_string()).or_insert_with(|| json!(name));
    }
    context.insert("agent", agent_root);
    context.insert("agent_traits", agent.traits_json());

    context.insert("scenario", scenario.to_json());
    context.insert_flattened(&scenario.to_json());

    for (name, cell) in answers.iter() {
        context.insert(
            name,
            json!({ "answer": cell.answer, "comment": cell.comment }),
        );
    }

    context
}

/// Render both prompts for a question turn.
pub fn render_prompts(
    survey: &Survey,
    question_index: usize,
    question: &Question,
    agent: &Agent,
    scenario: &Scenario,
    answers: &Answers,
) -> Result<RenderedPrompts, TemplateError> {
    let context = build_context(agent, scenario, answers);

    let system = render_system_prompt(agent, &context)?;

    let question_text = template::render(&question.question_text, &context)?;
    let presented_options = presented_options(question, &question_text);

    let mut user = String::new();
    render_memory(survey, question_index, answers, &mut user);

    match &question.question_presentation {
        Some(presentation) => {
            user.push_str(&template::render(presentation, &context)?);
        }
        None => {
            user.push_str(&question_text);
            render_option_block(question, &presented_options, &mut user);
        }
    }

    let instructions = render_instructions(question, &presented_options, &context)?;

    if !instructions.is_empty() {
        user.push_str("\n\n");
        user.push_str(&instructions);
    }

    Ok(RenderedPrompts {
        system,
        user,
        presented_options,
    })
}

fn render_system_prompt(agent: &Agent, context: &TemplateContext) -> Result<String, TemplateError> {
    let mut system = DEFAULT_AGENT_INSTRUCTION.to_string();

    let persona = match &agent.traits_presentation_template {
        Some(custom) => Some(template::render(custom, context)?),
        None if !agent.traits.is_empty() => Some(template::render(DEFAULT_PERSONA_TEMPLATE, context)?),
        None => None,
    };

    if let Some(persona) = persona {
        system.push(' ');
        system.push_str(&persona);
    }

    Ok(system)
}

/// The option set as shown in the prompt. Dropdowns narrow by relevance
/// to the rendered question text; everything else presents verbatim.
fn presented_options(question: &Question, question_text: &str) -> Vec<String> {
    if question.question_type == QuestionType::Dropdown
        && question.question_options.len() > DROPDOWN_PROMPT_OPTIONS
    {
        return narrow_options(&question.question_options, question_text, DROPDOWN_PROMPT_OPTIONS)
            .into_iter()
            .map(|index| question.question_options[index].clone())
            .collect();
    }

    question.question_options.clone()
}

fn render_memory(survey: &Survey, question_index: usize, answers: &Answers, out: &mut String) {
    let memory = survey.memory_for(question_index);

    if memory.is_empty() {
        return;
    }

    out.push_str("Before this question, you were asked:\n");

    for (_, prior) in memory {
        let Some(cell) = answers.get(&prior.question_name) else {
            continue;
        };

        out.push_str("Q: ");
        out.push_str(&prior.question_text);
        out.push_str("\nA: ");
        out.push_str(&value_text(&cell.answer));
        out.push('\n');
    }

    out.push('\n');
}

fn render_option_block(question: &Question, options: &[String], out: &mut String) {
    match question.question_type {
        QuestionType::LinearScale => {
            if let Some((lo, hi)) = question.scale_range {
                out.push_str(&format!("\n\nScale: {lo} to {hi}"));

                for (value, label) in &question.option_labels {
                    out.push_str(&format!("\n{value}: {label}"));
                }
            }
        }
        QuestionType::Matrix => {
            out.push_str("\n\nRows:");
            for row in &question.matrix_rows {
                out.push_str(&format!("\n- {row}"));
            }
            out.push_str("\n\nColumns:");
            for option in options {
                out.push_str(&format!("\n- {option}"));
            }
        }
        _ if !options.is_empty() => {
            out.push_str("\n\nOptions:");
            for option in options {
                out.push_str(&format!("\n- {option}"));
            }
        }
        _ => {}
    }
}

fn render_instructions(
    question: &Question,
    presented_options: &[String],
    context: &TemplateContext,
) -> Result<String, TemplateError> {
    let spec = validation::spec(question.question_type);

    let template_source = question
        .answering_instructions
        .as_deref()
        .unwrap_or(spec.default_instructions);

    if template_source.is_empty() {
        return Ok(String::new());
    }

    // The instruction templates reference the question through their own
    // root, separate from scenario/answer piping.
    let mut context = context.clone();
    context.insert(
        "question",
        json!({
            "question_name": question.question_name,
            "question_options": presented_options,
            "matrix_rows": question.matrix_rows,
            "min_selections": question.min_selections,
            "max_selections": question.max_selections,
            "budget_sum": question.budget_sum,
            "scale_range": question.scale_range,
            "answer_keys": question.answer_keys.keys().collect::<Vec<_>>(),
        }),
    );

    let mut instructions = template::render(template_source, &context)?;

    if !question.include_comment {
        instructions.push_str("\nOmit the \"comment\" field.");
    }

    Ok(instructions)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
