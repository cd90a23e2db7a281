//! Survey data model: typed questions, skip/stop rules, memory plan and
//! the DAG walk contract.
//!
//! A survey is a flat vector of questions plus index-based rule records;
//! questions never point at each other directly. `next()` resolves the
//! successor of a question from the rules and the answers so far, and
//! `memory_for()` resolves the declared conversation history for a
//! question. Both are pure: the same inputs always produce the same step.

mod agent;
mod answers;
mod error;
mod memory;
mod question;
mod rule;
mod scenario;

use std::collections::HashMap;

pub use agent::{Agent, DirectAnswerFn};
pub use answers::{AnswerCell, Answers};
pub use error::SurveyError;
use indexmap::IndexMap;
pub use memory::MemoryPlan;
pub use question::{Question, QuestionType, ValueKind, is_valid_identifier};
pub use rule::{Rule, RuleExpression, RuleTarget};
pub use scenario::{Scenario, ScenarioList};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Sentinel name accepted for rule targets that end the interview.
pub const END: &str = "END";

/// Version tag of the persisted survey document.
pub const DOCUMENT_VERSION: &str = "canvass-survey/1";

/// An ordered set of questions with rules, memory and groups.
///
/// Immutable once handed to the scheduler; the builder-style mutators are
/// only used while assembling it.
#[derive(Debug, Clone, PartialEq)]
pub struct Survey {
    questions: Vec<Question>,
    rules: Vec<Rule>,
    memory_plan: MemoryPlan,
    question_groups: IndexMap<String, (usize, usize)>,
    name_to_index: HashMap<String, usize>,
}

impl Survey {
    /// Build a survey from questions, validating names.
    pub fn new(questions: impl IntoIterator<Item = Question>) -> Result<Self, SurveyError> {
        let questions: Vec<Question> = questions.into_iter().collect();

        if questions.is_empty() {
            return Err(SurveyError::Empty);
        }

        let mut name_to_index = HashMap::with_capacity(questions.len());

        for (index, question) in questions.iter().enumerate() {
            if !is_valid_identifier(&question.question_name) {
                return Err(SurveyError::InvalidQuestionName(question.question_name.clone()));
            }

            if name_to_index.insert(question.question_name.clone(), index).is_some() {
                return Err(SurveyError::DuplicateQuestionName(question.question_name.clone()));
            }
        }

        Ok(Self {
            questions,
            rules: Vec::new(),
            memory_plan: MemoryPlan::new(),
            question_groups: IndexMap::new(),
            name_to_index,
        })
    }

    /// Add a jump rule: when `predicate` holds after answering `from`, the
    /// interview continues at `to` (a question name, or [`END`]).
    ///
    /// Rules added later take precedence over earlier ones with the same
    /// priority.
    pub fn add_rule(&mut self, from: &str, predicate: &str, to: &str) -> Result<&mut Self, SurveyError> {
        self.add_rule_with_priority(from, predicate, to, 0)
    }

    /// [`add_rule`](Self::add_rule) with an explicit priority; higher wins.
    pub fn add_rule_with_priority(
        &mut self,
        from: &str,
        predicate: &str,
        to: &str,
        priority: i32,
    ) -> Result<&mut Self, SurveyError> {
        let from = self.index_of_checked(from)?;

        let to = if to == END {
            RuleTarget::End
        } else {
            RuleTarget::Question(self.index_of_checked(to)?)
        };

        let expression = RuleExpression::parse(predicate)?;
        let seq = self.rules.len();

        self.rules.push(Rule {
            from,
            expression,
            to,
            priority,
            seq,
        });

        Ok(self)
    }

    /// Add a stop rule: when `predicate` holds after answering `from`, the
    /// interview ends.
    pub fn add_stop_rule(&mut self, from: &str, predicate: &str) -> Result<&mut Self, SurveyError> {
        self.add_rule(from, predicate, END)
    }

    /// Declare that `question` sees the `(text, answer)` pair of `prior`
    /// in its prompt. `prior` must come before `question` in source order.
    pub fn add_targeted_memory(&mut self, question: &str, prior: &str) -> Result<&mut Self, SurveyError> {
        let question_index = self.index_of_checked(question)?;
        let prior_index = self.index_of_checked(prior)?;

        if prior_index >= question_index {
            return Err(SurveyError::MemoryCycle {
                question: question.to_string(),
                prior: prior.to_string(),
            });
        }

        self.memory_plan.add(question, prior);
        Ok(self)
    }

    /// Declare that every question sees all questions before it.
    pub fn set_full_memory(&mut self) -> &mut Self {
        for question_index in 1..self.questions.len() {
            for prior_index in 0..question_index {
                self.memory_plan.add(
                    self.questions[question_index].question_name.clone(),
                    self.questions[prior_index].question_name.clone(),
                );
            }
        }

        self
    }

    /// Name a contiguous span of questions, inclusive on both ends.
    pub fn add_question_group(&mut self, name: &str, first: &str, last: &str) -> Result<&mut Self, SurveyError> {
        let start = self.index_of_checked(first)?;
        let end = self.index_of_checked(last)?;

        if start > end {
            return Err(SurveyError::InvalidGroup {
                name: name.to_string(),
                start,
                end,
            });
        }

        self.question_groups.insert(name.to_string(), (start, end));
        Ok(self)
    }

    /// The next step after answering the question at `current`.
    ///
    /// Rules firing from `current` are tested highest-priority first (ties
    /// break toward later insertion); the first whose predicate holds wins.
    /// Absent a match, the next question in source order is chosen; absent
    /// that, the interview ends. Deterministic for identical inputs.
    pub fn next(&self, current: usize, answers: &Answers) -> RuleTarget {
        let mut candidates: Vec<&Rule> = self.rules.iter().filter(|rule| rule.from == current).collect();

        candidates.sort_by_key(|rule| std::cmp::Reverse((rule.priority, rule.seq)));

        for rule in candidates {
            if rule.expression.evaluate(answers) {
                return rule.to;
            }
        }

        if current + 1 < self.questions.len() {
            RuleTarget::Question(current + 1)
        } else {
            RuleTarget::End
        }
    }

    /// The declared memory for the question at `index`: prior questions in
    /// declaration order, as `(index, question)` pairs.
    pub fn memory_for(&self, index: usize) -> Vec<(usize, &Question)> {
        let Some(question) = self.questions.get(index) else {
            return Vec::new();
        };

        self.memory_plan
            .priors(&question.question_name)
            .iter()
            .filter_map(|prior| {
                let prior_index = *self.name_to_index.get(prior)?;
                Some((prior_index, &self.questions[prior_index]))
            })
            .collect()
    }

    /// Index of the first question.
    pub fn first(&self) -> usize {
        0
    }

    /// The question at `index`.
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    /// The question with the given name.
    pub fn question_by_name(&self, name: &str) -> Option<&Question> {
        self.name_to_index.get(name).map(|&index| &self.questions[index])
    }

    /// Index of the question with the given name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// All questions in source order.
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// All rules in insertion order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The memory plan.
    pub fn memory_plan(&self) -> &MemoryPlan {
        &self.memory_plan
    }

    /// Named question groups as inclusive index spans.
    pub fn question_groups(&self) -> &IndexMap<String, (usize, usize)> {
        &self.question_groups
    }

    /// Number of questions.
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Always false; construction rejects empty surveys.
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    fn index_of_checked(&self, name: &str) -> Result<usize, SurveyError> {
        self.name_to_index
            .get(name)
            .copied()
            .ok_or_else(|| SurveyError::UnknownQuestion(name.to_string()))
    }

    fn to_document(&self) -> SurveyDocument {
        SurveyDocument {
            version: DOCUMENT_VERSION.to_string(),
            questions: self.questions.clone(),
            rules: self
                .rules
                .iter()
                .map(|rule| RuleDocument {
                    from: self.questions[rule.from].question_name.clone(),
                    predicate: rule.expression.clone(),
                    to: match rule.to {
                        RuleTarget::End => END.to_string(),
                        RuleTarget::Question(index) => self.questions[index].question_name.clone(),
                    },
                    priority: rule.priority,
                })
                .collect(),
            memory_plan: self
                .memory_plan
                .iter()
                .map(|(question, priors)| (question.to_string(), priors.to_vec()))
                .collect(),
            question_groups: self.question_groups.clone(),
        }
    }

    fn from_document(document: SurveyDocument) -> Result<Self, SurveyError> {
        if document.version != DOCUMENT_VERSION {
            return Err(SurveyError::UnsupportedVersion(document.version));
        }

        let mut survey = Survey::new(document.questions)?;

        for rule in document.rules {
            survey.add_rule_with_priority(&rule.from, rule.predicate.source(), &rule.to, rule.priority)?;
        }

        for (question, priors) in document.memory_plan {
            for prior in priors {
                survey.add_targeted_memory(&question, &prior)?;
            }
        }

        for (name, (start, end)) in document.question_groups {
            if start > end || end >= survey.questions.len() {
                return Err(SurveyError::InvalidGroup { name, start, end });
            }

            survey.question_groups.insert(name, (start, end));
        }

        Ok(survey)
    }
}

#[derive(Serialize, Deserialize)]
struct SurveyDocument {
    version: String,
    questions: Vec<Question>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    rules: Vec<RuleDocument>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    memory_plan: IndexMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    question_groups: IndexMap<String, (usize, usize)>,
}

#[derive(Serialize, Deserialize)]
struct RuleDocument {
    from: String,
    predicate: RuleExpression,
    to: String,
    priority: i32,
}

impl Serialize for Survey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Survey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let document = SurveyDocument::deserialize(deserializer)?;
        Survey::from_document(document).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn three_question_survey() -> Survey {
        Survey::new([
            Question::multiple_choice("q1", "Do you like math?", ["Yes", "No"]),
            Question::free_text("q2", "Why?"),
            Question::free_text("q3", "Anything else?"),
        ])
        .unwrap()
    }

    #[test]
    fn default_flow_is_source_order() {
        let survey = three_question_survey();
        let answers = Answers::new();

        assert_eq!(survey.next(0, &answers), RuleTarget::Question(1));
        assert_eq!(survey.next(1, &answers), RuleTarget::Question(2));
        assert_eq!(survey.next(2, &answers), RuleTarget::End);
    }

    #[test]
    fn stop_rule_ends_the_interview() {
        let mut survey = three_question_survey();
        survey.add_stop_rule("q1", "q1.answer == 'No'").unwrap();

        let mut answers = Answers::new();
        answers.insert("q1", json!("No"), None);
        assert_eq!(survey.next(0, &answers), RuleTarget::End);

        let mut answers = Answers::new();
        answers.insert("q1", json!("Yes"), None);
        assert_eq!(survey.next(0, &answers), RuleTarget::Question(1));
    }

    #[test]
    fn later_rules_win_ties() {
        let mut survey = three_question_survey();
        survey.add_rule("q1", "q1.answer == 'Yes'", "q2").unwrap();
        survey.add_rule("q1", "q1.answer == 'Yes'", "q3").unwrap();

        let mut answers = Answers::new();
        answers.insert("q1", json!("Yes"), None);

        assert_eq!(survey.next(0, &answers), RuleTarget::Question(2));
    }

    #[test]
    fn explicit_priority_beats_insertion_order() {
        let mut survey = three_question_survey();
        survey.add_rule_with_priority("q1", "q1.answer == 'Yes'", "q3", 10).unwrap();
        survey.add_rule("q1", "q1.answer == 'Yes'", "q2").unwrap();

        let mut answers = Answers::new();
        answers.insert("q1", json!("Yes"), None);

        assert_eq!(survey.next(0, &answers), RuleTarget::Question(2));
    }

    #[test]
    fn duplicate_names_rejected() {
        let result = Survey::new([
            Question::free_text("q1", "a"),
            Question::free_text("q1", "b"),
        ]);

        assert_eq!(result.unwrap_err(), SurveyError::DuplicateQuestionName("q1".to_string()));
    }

    #[test]
    fn invalid_names_rejected() {
        let result = Survey::new([Question::free_text("1bad", "a")]);
        assert!(matches!(result.unwrap_err(), SurveyError::InvalidQuestionName(_)));
    }

    #[test]
    fn rule_to_unknown_question_rejected() {
        let mut survey = three_question_survey();
        let error = survey.add_rule("q1", "q1 == 'Yes'", "nope").unwrap_err();

        assert_eq!(error, SurveyError::UnknownQuestion("nope".to_string()));
    }

    #[test]
    fn forward_memory_rejected() {
        let mut survey = three_question_survey();

        let error = survey.add_targeted_memory("q1", "q2").unwrap_err();
        assert!(matches!(error, SurveyError::MemoryCycle { .. }));

        let error = survey.add_targeted_memory("q2", "q2").unwrap_err();
        assert!(matches!(error, SurveyError::MemoryCycle { .. }));
    }

    #[test]
    fn memory_resolves_in_declaration_order() {
        let mut survey = three_question_survey();
        survey.add_targeted_memory("q3", "q2").unwrap();
        survey.add_targeted_memory("q3", "q1").unwrap();

        let memory = survey.memory_for(2);
        let names: Vec<&str> = memory.iter().map(|(_, q)| q.question_name.as_str()).collect();

        assert_eq!(names, vec!["q2", "q1"]);
        assert!(survey.memory_for(0).is_empty());
    }

    #[test]
    fn full_memory_sees_everything_before() {
        let mut survey = three_question_survey();
        survey.set_full_memory();

        assert_eq!(survey.memory_for(2).len(), 2);
        assert_eq!(survey.memory_for(1).len(), 1);
        assert!(survey.memory_for(0).is_empty());
    }

    #[test]
    fn document_round_trip() {
        let mut survey = three_question_survey();
        survey.add_stop_rule("q1", "q1.answer == 'No'").unwrap();
        survey.add_rule_with_priority("q1", "q1.answer == 'Yes'", "q3", 5).unwrap();
        survey.add_targeted_memory("q2", "q1").unwrap();
        survey.add_question_group("intro", "q1", "q2").unwrap();

        let json = serde_json::to_string(&survey).unwrap();
        let back: Survey = serde_json::from_str(&json).unwrap();

        assert_eq!(survey, back);
    }

    #[test]
    fn unsupported_version_rejected() {
        let json = json!({
            "version": "canvass-survey/99",
            "questions": [{ "question_name": "q1", "question_type": "free_text", "question_text": "hi" }],
        });

        let error = serde_json::from_value::<Survey>(json).unwrap_err();
        assert!(error.to_string().contains("Unsupported survey document version"));
    }
}
