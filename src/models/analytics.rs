// src/models/analytics.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::response::{Demographics, SurveyResponse};
use crate::models::survey::{QuestionType, Survey};

/// Demographic equality filters, straight from the query string.
/// Filtering commutes with aggregation: pre-filtering the response set
/// yields the same report as passing the filter here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsFilter {
    pub department: Option<String>,
    pub position: Option<String>,
    pub experience_level: Option<String>,
    pub employment_type: Option<String>,
}

impl AnalyticsFilter {
    pub fn matches(&self, demographics: &Demographics) -> bool {
        fn ok(filter: &Option<String>, actual: &Option<String>) -> bool {
            match filter {
                Some(wanted) => actual.as_deref() == Some(wanted.as_str()),
                None => true,
            }
        }
        ok(&self.department, &demographics.department)
            && ok(&self.position, &demographics.position)
            && ok(&self.experience_level, &demographics.experience_level)
            && ok(&self.employment_type, &demographics.employment_type)
    }
}

/// Per-question statistics. Which optional fields are present depends on
/// the question type.
#[derive(Debug, PartialEq, Serialize)]
pub struct QuestionStats {
    pub question_id: String,
    pub question_text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,

    /// Count of non-skipped answers among the filtered responses.
    pub total_responses: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,

    /// Bucket per integer value 1..=scale_max; index 0 holds the count of
    /// answers equal to 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_distribution: Option<Vec<u64>>,

    /// Non-empty text answers in response-creation order, unmodified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_responses: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_counts: Option<BTreeMap<String, u64>>,
}

/// Frequency tables over the filtered response set.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct DemographicBreakdown {
    pub departments: BTreeMap<String, u64>,
    pub positions: BTreeMap<String, u64>,
    pub experience_levels: BTreeMap<String, u64>,
    pub employment_types: BTreeMap<String, u64>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub survey_id: i64,

    pub total_responses: usize,

    /// Pooled mean over every individual rating answer of every rating
    /// question (sum over count, not an average of per-question averages).
    pub overall_score: Option<f64>,

    /// One entry per question, in survey order.
    pub questions: Vec<QuestionStats>,

    pub demographics: DemographicBreakdown,

    /// Completed responses per UTC calendar day of `completed_at`.
    pub response_timeline: BTreeMap<String, u64>,
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Numeric view of an answer value, for rating questions.
fn numeric(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Computes per-question statistics, demographic breakdowns and the overall
/// score over the completed responses. Deterministic: depends only on the
/// response set and the survey's question order.
pub fn compute_analytics(
    survey: &Survey,
    responses: &[SurveyResponse],
    filter: &AnalyticsFilter,
) -> AnalyticsReport {
    let filtered: Vec<&SurveyResponse> = responses
        .iter()
        .filter(|r| filter.matches(&r.demographics.0))
        .collect();

    let mut rating_sum = 0.0;
    let mut rating_count = 0u64;

    let mut questions = Vec::with_capacity(survey.questions.0.len());
    for question in &survey.questions.0 {
        // Non-skipped answers to this question, in response-creation order.
        let answers: Vec<&Value> = filtered
            .iter()
            .flat_map(|r| r.answers.0.iter())
            .filter(|a| a.question_id == question.id && !a.skipped)
            .map(|a| &a.value)
            .collect();

        let mut stats = QuestionStats {
            question_id: question.id.clone(),
            question_text: question.text.clone(),
            question_type: question.question_type,
            total_responses: answers.len(),
            average_rating: None,
            rating_distribution: None,
            text_responses: None,
            option_counts: None,
        };

        match question.question_type {
            QuestionType::Rating => {
                let values: Vec<f64> = answers.iter().filter_map(|v| numeric(v)).collect();

                let mut distribution = vec![0u64; question.scale_max.max(1) as usize];
                for v in &values {
                    // Exact integer matches only.
                    if v.fract() == 0.0 && *v >= 1.0 && *v <= question.scale_max as f64 {
                        distribution[(*v as usize) - 1] += 1;
                    }
                }

                if !values.is_empty() {
                    let sum: f64 = values.iter().sum();
                    stats.average_rating = Some(round1(sum / values.len() as f64));
                    rating_sum += sum;
                    rating_count += values.len() as u64;
                }
                stats.rating_distribution = Some(distribution);
            }
            QuestionType::Text => {
                stats.text_responses = Some(
                    answers
                        .iter()
                        .filter_map(|v| v.as_str())
                        .filter(|s| !s.is_empty())
                        .map(|s| s.to_string())
                        .collect(),
                );
            }
            QuestionType::MultipleChoice => {
                let mut counts = BTreeMap::new();
                for choice in answers.iter().filter_map(|v| v.as_str()) {
                    *counts.entry(choice.to_string()).or_insert(0) += 1;
                }
                stats.option_counts = Some(counts);
            }
        }

        questions.push(stats);
    }

    let mut demographics = DemographicBreakdown::default();
    for r in &filtered {
        let d = &r.demographics.0;
        for (slot, table) in [
            (&d.department, &mut demographics.departments),
            (&d.position, &mut demographics.positions),
            (&d.experience_level, &mut demographics.experience_levels),
            (&d.employment_type, &mut demographics.employment_types),
        ] {
            if let Some(v) = slot {
                *table.entry(v.clone()).or_insert(0) += 1;
            }
        }
    }

    let mut response_timeline = BTreeMap::new();
    for r in &filtered {
        if let Some(completed_at) = r.completed_at {
            let day = completed_at.date_naive().format("%Y-%m-%d").to_string();
            *response_timeline.entry(day).or_insert(0) += 1;
        }
    }

    AnalyticsReport {
        survey_id: survey.id,
        total_responses: filtered.len(),
        overall_score: (rating_count > 0).then(|| round1(rating_sum / rating_count as f64)),
        questions,
        demographics,
        response_timeline,
    }
}
