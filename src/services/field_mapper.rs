//! AI 字段映射 - 业务能力层
//!
//! 只负责"理解表单 / 生成文本"能力，不关心页面操作

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AiError, AppResult};
use crate::models::{CvSnapshot, FormField, JobPosting};
use crate::services::ai_provider::AiProvider;

/// 发送给 AI 的 HTML 上限
const MAX_FORM_HTML_CHARS: usize = 60_000;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*\n?|\n?\s*```").expect("valid regex"));

static NOISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script>|<style\b.*?</style>|<svg\b.*?</svg>|<!--.*?-->")
        .expect("valid regex")
});

/// 问题回答
#[derive(Debug, Deserialize)]
struct GeneratedAnswer {
    #[serde(default)]
    answer: String,
}

/// AI 字段映射器
#[derive(Clone)]
pub struct FieldMapper {
    ai: Arc<AiProvider>,
}

impl FieldMapper {
    pub fn new(ai: Arc<AiProvider>) -> Self {
        Self { ai }
    }

    /// 分析表单结构，返回字段列表
    pub async fn analyze_form(&self, html: &str) -> AppResult<Vec<FormField>> {
        let html = compact_html(html);
        debug!("分析表单结构，HTML 长度: {} 字符", html.len());

        let prompt = format!(
            r#"Analyze this job application form HTML and identify what information is needed.

HTML:
{}

Return JSON array of fields:
[
  {{
    "fieldName": "CSS selector for field",
    "label": "human readable label",
    "type": "text|email|tel|textarea|select|file",
    "required": true|false,
    "purpose": "firstName|lastName|email|phone|coverLetter|resume|customQuestion"
  }}
]

Return ONLY valid JSON."#,
            html
        );

        let response = self.ai.generate(&prompt).await?;
        let entries: Vec<serde_json::Value> = parse_json_response(&response)?;
        let total = entries.len();
        let fields: Vec<FormField> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<FormField>(entry.clone()) {
                Ok(field) => Some(field),
                Err(e) => {
                    warn!(
                        "⚠️ 跳过无法解析的字段 {}: {}",
                        crate::logger::truncate_text(&entry.to_string(), 120),
                        e
                    );
                    None
                }
            })
            .collect();
        debug!("AI 识别出 {} 个字段 (返回 {} 项)", fields.len(), total);
        Ok(fields)
    }

    /// 为开放问题生成回答
    pub async fn answer_question(
        &self,
        question: &str,
        cv: &CvSnapshot,
        job_description: &str,
    ) -> AppResult<String> {
        let form_questions = serde_json::json!([{ "question": question, "type": "textarea" }]);
        let prompt = format!(
            r#"You are helping a candidate apply to a job. Generate personalized, professional answers.

CANDIDATE INFO:
{}

JOB DESCRIPTION:
{}

FORM QUESTIONS:
{}

For each question, provide a tailored answer that:
- Connects the candidate's experience to the job requirements
- Is concise (50-200 words per answer)
- Uses specific examples from their CV
- Shows genuine interest in the role

Return JSON array:
[
  {{
    "question": "original question",
    "answer": "your generated answer",
    "fieldType": "textarea|input|select"
  }}
]

Return ONLY valid JSON, no markdown."#,
            serde_json::to_string_pretty(cv).unwrap_or_default(),
            job_description,
            form_questions
        );

        let response = self.ai.generate(&prompt).await?;
        let answers: Vec<GeneratedAnswer> = parse_json_response(&response)?;
        Ok(answers
            .into_iter()
            .next()
            .map(|a| a.answer)
            .unwrap_or_default())
    }

    /// 生成求职信
    pub async fn cover_letter(&self, cv: &CvSnapshot, job: &JobPosting) -> AppResult<String> {
        let recent_experience = cv
            .experience
            .first()
            .map(|e| serde_json::to_string(e).unwrap_or_default())
            .unwrap_or_default();

        let prompt = format!(
            r#"Write a professional cover letter for this job application.

CANDIDATE:
Name: {}
Background: {}
Key Skills: {}
Recent Experience: {}

JOB:
Company: {}
Role: {}
Description: {}

Write a 3-paragraph cover letter (250-300 words):
1. Opening: Why you're excited about this specific role
2. Body: 2-3 relevant achievements that match job requirements
3. Closing: Call to action

Use professional but warm tone. Be specific, not generic.
Return only the letter text, no formatting or labels."#,
            cv.full_name,
            cv.summary.as_deref().unwrap_or_default(),
            cv.skills.join(", "),
            recent_experience,
            job.company_name,
            job.job_title,
            job.description.as_deref().unwrap_or_default()
        );

        Ok(self.ai.generate(&prompt).await?.trim().to_string())
    }
}

/// 去掉 markdown 代码块标记
pub fn clean_json_response(response: &str) -> String {
    FENCE_RE.replace_all(response, "").trim().to_string()
}

fn parse_json_response<T: DeserializeOwned>(response: &str) -> Result<T, AiError> {
    let cleaned = clean_json_response(response);
    serde_json::from_str(&cleaned).map_err(|source| AiError::MalformedJson {
        response: crate::logger::truncate_text(&cleaned, 200),
        source,
    })
}

/// 去掉脚本、样式等与表单无关的内容并限制长度
fn compact_html(html: &str) -> String {
    let stripped = NOISE_RE.replace_all(html, "");
    stripped.chars().take(MAX_FORM_HTML_CHARS).collect()
}
