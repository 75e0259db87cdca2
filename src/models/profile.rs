use serde::{Deserialize, Serialize};

use super::de_lenient_id;

/// 简历快照（入队时冻结）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvSnapshot {
    #[serde(alias = "full_name", alias = "name")]
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: Vec<Experience>,
    #[serde(default)]
    pub education: Vec<Education>,
    /// 简历 PDF 的存储地址
    #[serde(default, alias = "cv_pdf_url", alias = "cvPdfUrl")]
    pub resume_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Experience {
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Education {
    #[serde(default)]
    pub degree: String,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub year: Option<String>,
}

impl CvSnapshot {
    /// 拆分姓名：第一个词为名，其余为姓
    pub fn split_name(&self) -> (String, String) {
        let mut parts = self.full_name.split_whitespace();
        let first = parts.next().unwrap_or_default().to_string();
        let last = parts.collect::<Vec<_>>().join(" ");
        (first, last)
    }

    pub fn phone_or_empty(&self) -> &str {
        self.phone.as_deref().unwrap_or_default()
    }
}

/// 职位信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPosting {
    #[serde(deserialize_with = "de_lenient_id")]
    pub id: String,
    #[serde(alias = "job_title", alias = "title")]
    pub job_title: String,
    #[serde(alias = "company_name", alias = "company")]
    pub company_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, alias = "application_url")]
    pub application_url: Option<String>,
    #[serde(default, alias = "job_url")]
    pub job_url: Option<String>,
}

impl JobPosting {
    /// 优先使用申请链接，没有时退回职位页面
    pub fn apply_url(&self) -> Option<&str> {
        non_empty(&self.application_url).or_else(|| non_empty(&self.job_url))
    }
}

fn non_empty(url: &Option<String>) -> Option<&str> {
    url.as_deref().filter(|u| !u.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_name() {
        let cv = CvSnapshot {
            full_name: "Ada  King Lovelace".to_string(),
            ..Default::default()
        };
        assert_eq!(cv.split_name(), ("Ada".to_string(), "King Lovelace".to_string()));

        let single = CvSnapshot {
            full_name: "Plato".to_string(),
            ..Default::default()
        };
        assert_eq!(single.split_name(), ("Plato".to_string(), String::new()));
    }

    #[test]
    fn test_cv_accepts_database_column_names() {
        let cv: CvSnapshot = serde_json::from_value(serde_json::json!({
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "skills": ["rust", "math"],
            "cv_pdf_url": "https://cdn.example.com/ada.pdf"
        }))
        .unwrap();
        assert_eq!(cv.full_name, "Ada Lovelace");
        assert_eq!(cv.resume_url.as_deref(), Some("https://cdn.example.com/ada.pdf"));
        assert_eq!(cv.phone_or_empty(), "");
    }

    #[test]
    fn test_apply_url_falls_back_to_job_url() {
        let posting: JobPosting = serde_json::from_value(serde_json::json!({
            "id": 3,
            "job_title": "Engineer",
            "company_name": "Acme",
            "application_url": "",
            "job_url": "https://jobs.lever.co/acme/1"
        }))
        .unwrap();
        assert_eq!(posting.id, "3");
        assert_eq!(posting.apply_url(), Some("https://jobs.lever.co/acme/1"));

        let posting = JobPosting {
            job_url: None,
            ..posting
        };
        assert_eq!(posting.apply_url(), None);
    }
}
