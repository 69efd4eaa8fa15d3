// src/session/answers.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::AppError,
    models::{
        activity::ActivityLogEntry,
        answer::{Answer, CodingAnswer, TestCaseResult},
        payload::AutosavePayload,
        question::{Question, QuestionKind},
    },
};

#[derive(Debug, Clone)]
struct Slot {
    id: i64,
    kind: QuestionKind,
    option_count: usize,
}

/// In-memory answers and review marks for one attempt.
///
/// Every mutation bumps `revision`, which autosave uses to tell whether the
/// server copy is behind.
#[derive(Debug, Clone, Default)]
pub struct AnswerStore {
    slots: Vec<Slot>,
    answers: BTreeMap<i64, Answer>,
    marked: BTreeSet<i64>,
    revision: u64,
}

impl AnswerStore {
    pub fn new(questions: &[Question]) -> Self {
        let slots = questions
            .iter()
            .map(|q| Slot {
                id: q.id,
                kind: q.kind,
                option_count: q.options.len(),
            })
            .collect();
        Self {
            slots,
            ..Self::default()
        }
    }

    /// Loads a resumed attempt. Entries for unknown questions or with the
    /// wrong shape are dropped.
    pub fn restore(&mut self, answers: BTreeMap<i64, Answer>, marked: BTreeSet<i64>) {
        for (id, answer) in answers {
            match self.slots.iter().find(|s| s.id == id) {
                Some(slot) if answer.matches(slot.kind) => {
                    self.answers.insert(id, answer);
                }
                _ => tracing::warn!(question_id = id, "Dropping resumed answer"),
            }
        }
        self.marked = marked
            .into_iter()
            .filter(|id| self.slots.iter().any(|s| s.id == *id))
            .collect();
    }

    fn slot(&self, index: usize) -> Result<&Slot, AppError> {
        self.slots
            .get(index)
            .ok_or_else(|| AppError::BadRequest(format!("No question at index {}", index)))
    }

    pub fn select(&mut self, index: usize, option: usize) -> Result<(), AppError> {
        let slot = self.slot(index)?;
        if slot.kind != QuestionKind::Choice {
            return Err(AppError::BadRequest("Not a choice question".to_string()));
        }
        if option >= slot.option_count {
            return Err(AppError::BadRequest(format!("No option {}", option)));
        }
        let id = slot.id;
        self.answers.insert(id, Answer::Choice { option });
        self.revision += 1;
        Ok(())
    }

    /// New code invalidates the previous run outcome.
    pub fn update_code(&mut self, index: usize, code: String, language: String) -> Result<(), AppError> {
        let id = self.coding_slot(index)?;
        self.with_coding(id, |entry| {
            if entry.code != code || entry.language != language {
                entry.passed = None;
                entry.test_results.clear();
            }
            entry.code = code;
            entry.language = language;
        });
        Ok(())
    }

    pub fn record_run(
        &mut self,
        index: usize,
        passed: bool,
        test_results: Vec<TestCaseResult>,
    ) -> Result<(), AppError> {
        let id = self.coding_slot(index)?;
        self.with_coding(id, |entry| {
            entry.passed = Some(passed);
            entry.test_results = test_results;
        });
        Ok(())
    }

    fn coding_slot(&self, index: usize) -> Result<i64, AppError> {
        let slot = self.slot(index)?;
        if slot.kind != QuestionKind::Coding {
            return Err(AppError::BadRequest("Not a coding question".to_string()));
        }
        Ok(slot.id)
    }

    fn with_coding(&mut self, id: i64, update: impl FnOnce(&mut CodingAnswer)) {
        let mut coding = match self.answers.remove(&id) {
            Some(Answer::Coding(coding)) => coding,
            _ => CodingAnswer::default(),
        };
        update(&mut coding);
        self.answers.insert(id, Answer::Coding(coding));
        self.revision += 1;
    }

    /// Returns whether the question is now marked.
    pub fn toggle_mark(&mut self, index: usize) -> Result<bool, AppError> {
        let id = self.slot(index)?.id;
        let marked = if self.marked.remove(&id) {
            false
        } else {
            self.marked.insert(id);
            true
        };
        self.revision += 1;
        Ok(marked)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn answers(&self) -> &BTreeMap<i64, Answer> {
        &self.answers
    }

    pub fn marked(&self) -> &BTreeSet<i64> {
        &self.marked
    }

    pub fn autosave_payload(
        &self,
        exam_id: i64,
        candidate: &str,
        activity_logs: &[ActivityLogEntry],
    ) -> AutosavePayload {
        AutosavePayload {
            exam_id,
            candidate: candidate.to_string(),
            answers: self.answers.clone(),
            marked_for_review: self.marked.clone(),
            activity_logs: activity_logs.to_vec(),
        }
    }

    /// Answers shaped for submission: one entry per attempted question, in the
    /// shape its type expects. Coding answers with no code and no run are skipped.
    pub fn final_answers(&self) -> BTreeMap<i64, Answer> {
        self.slots
            .iter()
            .filter_map(|slot| {
                let answer = self.answers.get(&slot.id)?;
                match (slot.kind, answer) {
                    (QuestionKind::Choice, Answer::Choice { option }) if *option < slot.option_count => {
                        Some((slot.id, answer.clone()))
                    }
                    (QuestionKind::Coding, Answer::Coding(coding))
                        if !coding.code.trim().is_empty() || coding.passed.is_some() =>
                    {
                        Some((slot.id, answer.clone()))
                    }
                    _ => None,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::CodingSpec;

    fn questions() -> Vec<Question> {
        vec![
            Question {
                id: 11,
                kind: QuestionKind::Choice,
                content: "2 + 2".to_string(),
                options: vec!["3".into(), "4".into(), "5".into()],
                coding: None,
            },
            Question {
                id: 12,
                kind: QuestionKind::Coding,
                content: "Reverse a string".to_string(),
                options: vec![],
                coding: Some(CodingSpec::default()),
            },
        ]
    }

    #[test]
    fn test_select_validates_index_and_option() {
        let mut store = AnswerStore::new(&questions());
        assert!(store.select(0, 1).is_ok());
        assert_eq!(store.answers().get(&11), Some(&Answer::Choice { option: 1 }));

        assert!(matches!(store.select(0, 3), Err(AppError::BadRequest(_))));
        assert!(matches!(store.select(1, 0), Err(AppError::BadRequest(_))));
        assert!(matches!(store.select(9, 0), Err(AppError::BadRequest(_))));
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_code_change_resets_run_outcome() {
        let mut store = AnswerStore::new(&questions());
        store
            .update_code(1, "fn main() {}".into(), "rust".into())
            .unwrap();
        store.record_run(1, true, vec![]).unwrap();

        // Same code again keeps the verdict.
        store
            .update_code(1, "fn main() {}".into(), "rust".into())
            .unwrap();
        assert!(matches!(
            store.answers().get(&12),
            Some(Answer::Coding(CodingAnswer { passed: Some(true), .. }))
        ));

        store
            .update_code(1, "fn main() { todo!() }".into(), "rust".into())
            .unwrap();
        assert!(matches!(
            store.answers().get(&12),
            Some(Answer::Coding(CodingAnswer { passed: None, .. }))
        ));
    }

    #[test]
    fn test_toggle_mark() {
        let mut store = AnswerStore::new(&questions());
        assert!(store.toggle_mark(1).unwrap());
        assert!(store.marked().contains(&12));
        assert!(!store.toggle_mark(1).unwrap());
        assert!(store.marked().is_empty());
    }

    #[test]
    fn test_restore_drops_mismatched_entries() {
        let mut store = AnswerStore::new(&questions());
        let mut answers = BTreeMap::new();
        answers.insert(11, Answer::Choice { option: 2 });
        answers.insert(12, Answer::Choice { option: 0 });
        answers.insert(99, Answer::Choice { option: 0 });
        store.restore(answers, [12, 99].into_iter().collect());

        assert_eq!(store.answers().len(), 1);
        assert_eq!(store.marked().iter().copied().collect::<Vec<_>>(), vec![12]);
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_final_answers_skip_empty_code() {
        let mut store = AnswerStore::new(&questions());
        store.select(0, 1).unwrap();
        store.update_code(1, "   ".into(), "python".into()).unwrap();
        assert_eq!(store.final_answers().len(), 1);

        store.record_run(1, false, vec![]).unwrap();
        assert_eq!(store.final_answers().len(), 2);
    }
}
