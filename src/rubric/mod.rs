//! ACE (Answer, Cite, Explain) heuristic scoring of short written responses.
//!
//! Every check is keyword or pattern based. Scores are a starting point for a
//! teacher's review, not a judgement of meaning.

use std::collections::BTreeMap;

use serde::Deserialize;

use tracing::{info, warn};

use crate::error::{Result, ToolError};
use crate::model::{Diagnostic, Period, ReconciledRow, RubricScore, SubmissionStatus};

/// Citation phrases used when the configuration does not supply its own.
pub const DEFAULT_CITE_PHRASES: &[&str] = &[
    "author states",
    "the author says",
    "article states",
    "according to",
    "text states",
    "states that",
    "the text",
    "the article",
    "the passage",
    "passage",
    "paragraph",
    "excerpt",
    "mentions",
];

/// Connectives that introduce an explanation.
pub const DEFAULT_EXPLAIN_PHRASES: &[&str] = &[
    "this shows",
    "this proves",
    "this means",
    "which means",
    "this demonstrates",
    "this explains",
    "therefore",
    "because",
    "which causes",
    "as a result",
    "consequently",
    "validates",
    "supports",
    "connected",
    "since",
    "thus",
    "hence",
];

const QUOTE_MARKS: [char; 3] = ['"', '\u{201C}', '\u{201D}'];
const SENTENCE_ENDS: [char; 3] = ['.', '!', '?'];

/// Length and structure thresholds for the heuristics.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RubricThresholds {
    /// Responses shorter than this (in characters) lose one answer point.
    /// Zero disables the penalty.
    pub short_response_chars: usize,
    /// Minimum length of the clause after a connective for full credit.
    pub min_clause_chars: usize,
    /// Sentences must be longer than this to count as substantive; shorter
    /// ones are fragments, and a response with more fragments than
    /// substantive sentences loses one answer point.
    pub min_sentence_chars: usize,
    /// Substantive sentences needed for full explain credit.
    pub min_substantive_sentences: usize,
}

impl Default for RubricThresholds {
    fn default() -> Self {
        Self {
            short_response_chars: 50,
            min_clause_chars: 20,
            min_sentence_chars: 10,
            min_substantive_sentences: 3,
        }
    }
}

/// Prompt data for one period's assignment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub topic: Option<String>,
    pub question: Option<String>,
    /// One entry per part of the question; each lists terms any of which
    /// shows that part was addressed.
    pub sub_questions: Vec<Vec<String>>,
    pub cite_phrases: Option<Vec<String>>,
    pub explain_phrases: Option<Vec<String>>,
    pub thresholds: Option<RubricThresholds>,
}

/// Rubric settings for a whole run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RubricConfig {
    pub cite_phrases: Vec<String>,
    pub explain_phrases: Vec<String>,
    pub thresholds: RubricThresholds,
    pub prompts: BTreeMap<Period, PromptConfig>,
}

impl Default for RubricConfig {
    fn default() -> Self {
        Self {
            cite_phrases: DEFAULT_CITE_PHRASES.iter().map(|s| s.to_string()).collect(),
            explain_phrases: DEFAULT_EXPLAIN_PHRASES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            thresholds: RubricThresholds::default(),
            prompts: BTreeMap::new(),
        }
    }
}

impl RubricConfig {
    /// Builds the scorer for one period, with per-period overrides applied.
    ///
    /// Fails with [`ToolError::Configuration`] when the period has no prompt,
    /// the prompt lists no usable sub-questions, or no explanation phrases
    /// remain.
    pub fn scorer_for(&self, period: &Period) -> Result<RubricScorer> {
        let prompt = self.prompts.get(period).ok_or_else(|| {
            ToolError::Configuration(format!("no prompt configured for period {period}"))
        })?;

        let sub_questions: Vec<Vec<String>> = prompt
            .sub_questions
            .iter()
            .map(|terms| lowered(terms))
            .collect();
        if sub_questions.is_empty() {
            return Err(ToolError::Configuration(format!(
                "prompt for period {period} lists no sub-questions"
            )));
        }
        if let Some(index) = sub_questions.iter().position(Vec::is_empty) {
            return Err(ToolError::Configuration(format!(
                "sub-question {} for period {period} has no terms",
                index + 1
            )));
        }

        let explain_phrases = lowered(
            prompt
                .explain_phrases
                .as_ref()
                .unwrap_or(&self.explain_phrases),
        );
        if explain_phrases.is_empty() {
            return Err(ToolError::Configuration(format!(
                "no explanation phrases configured for period {period}"
            )));
        }

        Ok(RubricScorer {
            sub_questions,
            cite_phrases: lowered(prompt.cite_phrases.as_ref().unwrap_or(&self.cite_phrases)),
            explain_phrases,
            thresholds: prompt
                .thresholds
                .clone()
                .unwrap_or_else(|| self.thresholds.clone()),
        })
    }

    pub fn topic(&self, period: &Period) -> Option<&str> {
        self.prompts.get(period)?.topic.as_deref()
    }
}

/// Scores every reconciled row in place.
///
/// Non-submitters score zero. A period whose prompt is unusable leaves its
/// rows unscored and yields one [`Diagnostic::Configuration`].
pub fn score_reconciled(rows: &mut [ReconciledRow], config: &RubricConfig) -> Vec<Diagnostic> {
    let mut scorers: BTreeMap<Period, Option<RubricScorer>> = BTreeMap::new();
    let mut diagnostics = Vec::new();

    for row in rows.iter_mut() {
        let period = &row.person.period;
        let scorer = scorers.entry(period.clone()).or_insert_with(|| {
            match config.scorer_for(period) {
                Ok(scorer) => {
                    info!(
                        %period,
                        topic = config.topic(period).unwrap_or_default(),
                        "scoring period"
                    );
                    Some(scorer)
                }
                Err(error) => {
                    warn!(%period, %error, "period not scored");
                    diagnostics.push(Diagnostic::Configuration {
                        period: period.clone(),
                        reason: match error {
                            ToolError::Configuration(reason) => reason,
                            other => other.to_string(),
                        },
                    });
                    None
                }
            }
        });
        let Some(scorer) = scorer else {
            row.score = None;
            continue;
        };
        row.score = Some(match row.status {
            SubmissionStatus::NotSubmitted => RubricScore::zero(),
            SubmissionStatus::Submitted => scorer.score(
                row.submission
                    .as_ref()
                    .and_then(|submission| submission.response())
                    .unwrap_or_default(),
            ),
        });
    }

    diagnostics
}

fn lowered(phrases: &[String]) -> Vec<String> {
    phrases
        .iter()
        .map(|phrase| phrase.trim().to_lowercase())
        .filter(|phrase| !phrase.is_empty())
        .collect()
}

/// Scores responses for one prompt. Stateless: the same text always gets the
/// same score.
#[derive(Debug, Clone)]
pub struct RubricScorer {
    sub_questions: Vec<Vec<String>>,
    cite_phrases: Vec<String>,
    explain_phrases: Vec<String>,
    thresholds: RubricThresholds,
}

impl RubricScorer {
    pub fn score(&self, response: &str) -> RubricScore {
        let text = response.trim();
        if text.is_empty() {
            return RubricScore::zero();
        }
        let lowered = text.to_lowercase();
        RubricScore::new(
            self.answer(text, &lowered),
            self.cite(text, &lowered),
            self.explain(&lowered),
        )
    }

    fn answer(&self, text: &str, lowered: &str) -> u8 {
        let addressed = self
            .sub_questions
            .iter()
            .filter(|terms| terms.iter().any(|term| lowered.contains(term.as_str())))
            .count();
        let score: u8 = match addressed {
            0 => 0,
            n if n == self.sub_questions.len() => 2,
            _ => 1,
        };
        if text.chars().count() < self.thresholds.short_response_chars
            || self.mostly_fragments(text)
        {
            score.saturating_sub(1)
        } else {
            score
        }
    }

    /// More sentence fragments than substantive sentences.
    fn mostly_fragments(&self, text: &str) -> bool {
        let limit = self.thresholds.min_sentence_chars;
        let (mut fragments, mut substantive) = (0, 0);
        for piece in text.split(SENTENCE_ENDS) {
            match piece.trim().chars().count() {
                0 => {}
                n if n < limit => fragments += 1,
                n if n > limit => substantive += 1,
                _ => {}
            }
        }
        substantive > 0 && fragments > substantive
    }

    fn cite(&self, text: &str, lowered: &str) -> u8 {
        let quoted = has_quotation(text);
        let marked = self
            .cite_phrases
            .iter()
            .any(|phrase| phrase_ends(lowered, phrase).next().is_some());
        match (quoted, marked) {
            (true, true) => 2,
            (false, false) => 0,
            _ => 1,
        }
    }

    fn explain(&self, lowered: &str) -> u8 {
        let longest_clause = self
            .explain_phrases
            .iter()
            .flat_map(|phrase| phrase_ends(lowered, phrase))
            .map(|end| clause_chars(&lowered[end..]))
            .max();
        let Some(clause) = longest_clause else {
            return 0;
        };

        let sentences = lowered
            .split(SENTENCE_ENDS)
            .filter(|sentence| sentence.trim().chars().count() > self.thresholds.min_sentence_chars)
            .count();
        if clause >= self.thresholds.min_clause_chars
            && sentences >= self.thresholds.min_substantive_sentences
        {
            2
        } else {
            1
        }
    }
}

/// True when a pair of quote marks encloses non-blank text.
fn has_quotation(text: &str) -> bool {
    let marks: Vec<(usize, usize)> = text
        .char_indices()
        .filter(|(_, ch)| QUOTE_MARKS.contains(ch))
        .map(|(idx, ch)| (idx, idx + ch.len_utf8()))
        .collect();
    marks
        .chunks_exact(2)
        .any(|pair| !text[pair[0].1..pair[1].0].trim().is_empty())
}

/// Byte offsets just past every whole-word occurrence of `phrase`.
fn phrase_ends<'a>(haystack: &'a str, phrase: &'a str) -> impl Iterator<Item = usize> + 'a {
    haystack
        .match_indices(phrase)
        .map(move |(start, _)| (start, start + phrase.len()))
        .filter(move |&(start, end)| {
            let open = haystack[..start]
                .chars()
                .next_back()
                .is_none_or(|ch| !ch.is_alphanumeric());
            let close = haystack[end..]
                .chars()
                .next()
                .is_none_or(|ch| !ch.is_alphanumeric());
            open && close
        })
        .map(|(_, end)| end)
}

fn clause_chars(rest: &str) -> usize {
    rest.split(SENTENCE_ENDS)
        .next()
        .unwrap_or_default()
        .trim()
        .chars()
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotation_needs_enclosed_text() {
        assert!(has_quotation("She said \"magma rises\" today"));
        assert!(has_quotation("\u{201C}Lava flows\u{201D}"));
        assert!(!has_quotation("An empty \"  \" pair"));
        assert!(!has_quotation("A stray \" mark"));
    }

    #[test]
    fn phrases_match_whole_words_only() {
        assert_eq!(phrase_ends("since then", "since").count(), 1);
        assert_eq!(phrase_ends("sincerely yours", "since").count(), 0);
        assert_eq!(phrase_ends("it rained. because", "because").collect::<Vec<_>>(), [18]);
    }
}
