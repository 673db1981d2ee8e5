//! The question catalog: every question set rooms can be created for.
//!
//! The catalog is loaded once at startup and shared read-only between
//! rooms; each room holds an `Arc` to the one set it plays.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use quizhall_protocol::{Question, QuestionSet, QuestionSetId};
use serde::Deserialize;

use crate::CatalogError;

/// One set as it appears in a catalog file. The id defaults to the
/// category name.
#[derive(Debug, Deserialize)]
struct SetEntry {
    #[serde(default)]
    id: Option<QuestionSetId>,
    category: String,
    questions: Vec<Question>,
}

/// Read-only lookup of question sets by id, in load order.
#[derive(Debug, Clone, Default)]
pub struct QuestionCatalog {
    sets: Vec<Arc<QuestionSet>>,
    by_id: HashMap<QuestionSetId, usize>,
}

impl QuestionCatalog {
    /// Builds a catalog from already-constructed sets.
    ///
    /// # Errors
    /// [`CatalogError::Invalid`] if a set is empty, an id repeats, or a
    /// question's correct option is not one of its options.
    pub fn new(sets: Vec<QuestionSet>) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for set in sets {
            validate(&set)?;
            if catalog.by_id.contains_key(&set.id) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate question set id {}",
                    set.id
                )));
            }
            catalog.by_id.insert(set.id.clone(), catalog.sets.len());
            catalog.sets.push(Arc::new(set));
        }
        tracing::debug!(sets = catalog.sets.len(), "question catalog loaded");
        Ok(catalog)
    }

    /// Parses a JSON array of sets:
    ///
    /// ```json
    /// [{ "category": "Science",
    ///    "questions": [{ "prompt": "…", "options": ["…"], "correct_option": "…" }] }]
    /// ```
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let entries: Vec<SetEntry> = serde_json::from_str(json)?;
        let sets = entries
            .into_iter()
            .map(|entry| QuestionSet {
                id: entry
                    .id
                    .unwrap_or_else(|| QuestionSetId(entry.category.clone())),
                category: entry.category,
                questions: entry.questions,
            })
            .collect();
        Self::new(sets)
    }

    /// Reads and parses a JSON catalog file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The four sets every server ships with.
    pub fn builtin() -> Self {
        let sets = vec![
            builtin_set(
                "General Knowledge",
                &[
                    ("What is the capital of France?", &["Berlin", "Madrid", "Paris", "Lisbon"], "Paris"),
                    ("Which planet is known as the Red Planet?", &["Earth", "Mars", "Jupiter", "Venus"], "Mars"),
                    (
                        "What is the largest ocean on Earth?",
                        &["Atlantic Ocean", "Indian Ocean", "Pacific Ocean", "Arctic Ocean"],
                        "Pacific Ocean",
                    ),
                ],
            ),
            builtin_set(
                "Science",
                &[
                    ("What is the chemical symbol for water?", &["H2O", "O2", "CO2", "H2"], "H2O"),
                    (
                        "What gas do plants primarily absorb from the atmosphere?",
                        &["Oxygen", "Nitrogen", "Carbon Dioxide", "Hydrogen"],
                        "Carbon Dioxide",
                    ),
                    (
                        "Who developed the theory of relativity?",
                        &["Isaac Newton", "Albert Einstein", "Galileo Galilei", "Nikola Tesla"],
                        "Albert Einstein",
                    ),
                ],
            ),
            builtin_set(
                "History",
                &[
                    (
                        "Who was the first President of the United States?",
                        &["Thomas Jefferson", "Abraham Lincoln", "George Washington", "John Adams"],
                        "George Washington",
                    ),
                    ("In which year did World War II end?", &["1940", "1945", "1950", "1955"], "1945"),
                    (
                        "Which ancient civilization built the pyramids?",
                        &["Romans", "Aztecs", "Egyptians", "Mayans"],
                        "Egyptians",
                    ),
                ],
            ),
            builtin_set(
                "Sports",
                &[
                    ("How many players are on a soccer team?", &["9", "10", "11", "12"], "11"),
                    (
                        "Which sport is known as 'America's pastime'?",
                        &["Football", "Basketball", "Baseball", "Hockey"],
                        "Baseball",
                    ),
                    ("In tennis, what is the term for a score of zero?", &["Love", "Nil", "Zero", "Void"], "Love"),
                ],
            ),
        ];

        let mut catalog = Self::default();
        for set in sets {
            catalog.by_id.insert(set.id.clone(), catalog.sets.len());
            catalog.sets.push(Arc::new(set));
        }
        catalog
    }

    /// Looks up a set by id.
    pub fn get(&self, id: &QuestionSetId) -> Option<Arc<QuestionSet>> {
        self.by_id.get(id).map(|&i| Arc::clone(&self.sets[i]))
    }

    /// Every set, in load order.
    pub fn list(&self) -> Vec<QuestionSet> {
        self.sets.iter().map(|set| QuestionSet::clone(set)).collect()
    }

    /// Number of sets.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Returns `true` if the catalog has no sets.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

type BuiltinQuestion<'a> = (&'a str, &'a [&'a str], &'a str);

fn builtin_set(category: &str, questions: &[BuiltinQuestion<'_>]) -> QuestionSet {
    QuestionSet {
        id: QuestionSetId::from(category),
        category: category.to_string(),
        questions: questions
            .iter()
            .map(|(prompt, options, correct)| Question {
                prompt: prompt.to_string(),
                options: options.iter().map(|o| o.to_string()).collect(),
                correct_option: correct.to_string(),
            })
            .collect(),
    }
}

fn validate(set: &QuestionSet) -> Result<(), CatalogError> {
    if set.is_empty() {
        return Err(CatalogError::Invalid(format!(
            "question set {} has no questions",
            set.id
        )));
    }
    for (i, question) in set.questions.iter().enumerate() {
        if !question.options.contains(&question.correct_option) {
            return Err(CatalogError::Invalid(format!(
                "question {i} of set {}: correct option {:?} is not among its options",
                set.id, question.correct_option
            )));
        }
    }
    Ok(())
}
