// src/backend_client.rs
use crate::error::RagError;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Course detail lookup against the main e-learning backend.
///
/// The orchestrators only ever see "details or no details": a missing course,
/// a non-200, or a `success: false` envelope all collapse to `Ok(None)`.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    async fn fetch_course(&self, course_id: i64) -> Result<Option<CourseDetails>, RagError>;
}

#[derive(Debug, Clone)]
pub struct CourseCatalogClient {
    client: Client,
    base_url: String,
}

/// Backend response envelope: `{ "success": bool, "data": {...} }`.
#[derive(Debug, Deserialize)]
struct CatalogEnvelope {
    #[serde(default)]
    success: bool,
    data: Option<CourseDetails>,
}

/// Course details as served by the backend (camelCase). Aliases accept the
/// snake_case variants some deployments still emit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseDetails {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    #[serde(alias = "difficulty_level")]
    pub difficulty_level: Option<String>,
    #[serde(alias = "price")]
    pub one_time_price: Option<f64>,
    pub currency: Option<Currency>,
    #[serde(alias = "duration_hours")]
    pub estimated_duration_in_hours: Option<f64>,
    pub allows_subscription: Option<bool>,
    pub subscription_price_monthly: Option<f64>,
    pub subscription_price3_months: Option<f64>,
    pub subscription_price6_months: Option<f64>,
    pub instructor: Option<String>,
    pub average_rating: Option<f64>,
    pub enrolled_count: Option<i64>,
    pub tags: Vec<CourseTag>,
    pub modules: Vec<CourseModule>,
}

/// The backend serializes currencies either as a plain code or as an object
/// with a `name` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Currency {
    Named { name: String },
    Code(String),
}

impl Currency {
    pub fn code(&self) -> &str {
        match self {
            Currency::Named { name } => name,
            Currency::Code(code) => code,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CourseTag {
    Named { name: String },
    Plain(String),
}

impl CourseTag {
    pub fn name(&self) -> &str {
        match self {
            CourseTag::Named { name } => name,
            CourseTag::Plain(name) => name,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseModule {
    pub title: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl CourseModule {
    pub fn label(&self) -> Option<&str> {
        self.title.as_deref().or(self.name.as_deref())
    }
}

/// A course in the final recommendation payload, mapped to snake_case fields.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendedCourse {
    pub course_id: i64,
    pub name: String,
    pub description: String,
    pub category: String,
    pub difficulty_level: String,
    pub price: f64,
    pub currency: String,
    pub duration_hours: f64,
}

impl CourseDetails {
    /// Render the course as a context block for the model prompt.
    pub fn context_text(&self) -> String {
        let mut parts = Vec::new();

        parts.push(format!("Course ID: {}", self.id));
        if !self.name.is_empty() {
            parts.push(format!("Course: {}", self.name));
        }
        if !self.description.is_empty() {
            parts.push(format!("Description: {}", self.description));
        }
        if let Some(category) = &self.category {
            parts.push(format!("Category: {}", category));
        }
        if let Some(difficulty) = &self.difficulty_level {
            parts.push(format!("Difficulty: {}", difficulty));
        }
        if let Some(price) = self.one_time_price {
            if price == 0.0 {
                parts.push("Price: Free".to_string());
            } else {
                let currency = self
                    .currency
                    .as_ref()
                    .map(Currency::code)
                    .unwrap_or("USD");
                parts.push(format!("Price: {} {}", price, currency));
            }
        }
        if let Some(duration) = self.estimated_duration_in_hours {
            if duration > 0.0 {
                parts.push(format!("Duration: {} hours", duration));
            }
        }

        let mut subscription = Vec::new();
        if let Some(monthly) = self.subscription_price_monthly {
            subscription.push(format!("Monthly: {}", monthly));
        }
        if let Some(three) = self.subscription_price3_months {
            subscription.push(format!("3-Months: {}", three));
        }
        if let Some(six) = self.subscription_price6_months {
            subscription.push(format!("6-Months: {}", six));
        }
        if !subscription.is_empty() {
            parts.push(format!("Subscription: {}", subscription.join(", ")));
        }

        if let Some(instructor) = &self.instructor {
            parts.push(format!("Instructor: {}", instructor));
        }
        if let Some(rating) = self.average_rating {
            parts.push(format!("Avg Rating: {}", rating));
        }
        if let Some(enrolled) = self.enrolled_count {
            parts.push(format!("Enrolled: {}", enrolled));
        }

        let tag_names: Vec<&str> = self.tags.iter().map(CourseTag::name).collect();
        if !tag_names.is_empty() {
            parts.push(format!("Tags: {}", tag_names.join(", ")));
        }

        if !self.modules.is_empty() {
            parts.push("Modules:".to_string());
            for module in &self.modules {
                if let Some(label) = module.label() {
                    parts.push(format!("  - {}", label));
                }
            }
        }

        parts.join("\n")
    }

    pub fn to_recommended(&self) -> RecommendedCourse {
        RecommendedCourse {
            course_id: self.id,
            name: if self.name.is_empty() {
                "Unknown Course".to_string()
            } else {
                self.name.clone()
            },
            description: self.description.clone(),
            category: self.category.clone().unwrap_or_default(),
            difficulty_level: self.difficulty_level.clone().unwrap_or_default(),
            price: self.one_time_price.unwrap_or(0.0),
            currency: self
                .currency
                .as_ref()
                .map(|c| c.code().to_string())
                .unwrap_or_else(|| "USD".to_string()),
            duration_hours: self.estimated_duration_in_hours.unwrap_or(0.0),
        }
    }
}

impl CourseCatalogClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn retry_config() -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(20)),
            ..Default::default()
        }
    }
}

#[async_trait]
impl CourseCatalog for CourseCatalogClient {
    async fn fetch_course(&self, course_id: i64) -> Result<Option<CourseDetails>, RagError> {
        let url = format!("{}/api/courses/{}", self.base_url, course_id);

        let operation = || async {
            let response = self
                .client
                .get(&url)
                .timeout(FETCH_TIMEOUT)
                .send()
                .await
                .map_err(|e| {
                    if e.is_connect() || e.is_timeout() {
                        tracing::warn!("Catalog fetch for course {} failed (retrying): {}", course_id, e);
                        backoff::Error::transient(RagError::ExternalFetch(e.to_string()))
                    } else {
                        backoff::Error::permanent(RagError::ExternalFetch(e.to_string()))
                    }
                })?;

            let status = response.status();

            // Server-side blips are worth retrying; anything else non-200 is
            // treated as "no data" below.
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(backoff::Error::transient(RagError::ExternalFetch(format!(
                    "backend returned {} for course {}",
                    status, course_id
                ))));
            }

            if !status.is_success() {
                tracing::debug!("Course {} lookup returned {}", course_id, status);
                return Ok(None);
            }

            let envelope: CatalogEnvelope = response.json().await.map_err(|e| {
                backoff::Error::permanent(RagError::ExternalFetch(format!(
                    "invalid catalog response for course {}: {}",
                    course_id, e
                )))
            })?;

            if envelope.success {
                Ok(envelope.data)
            } else {
                tracing::debug!("Backend reported success=false for course {}", course_id);
                Ok(None)
            }
        };

        retry(Self::retry_config(), operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_camel_case_backend_payload() {
        let value = json!({
            "id": 101,
            "name": "Intro to Rust",
            "description": "Ownership and borrowing from scratch",
            "category": "Programming",
            "difficultyLevel": "Beginner",
            "oneTimePrice": 49.0,
            "currency": {"name": "EUR"},
            "estimatedDurationInHours": 12.5,
            "tags": [{"name": "rust"}, "systems"],
            "modules": [{"title": "Getting started"}, {"name": "Lifetimes"}]
        });

        let course: CourseDetails = serde_json::from_value(value).unwrap();
        assert_eq!(course.id, 101);
        assert_eq!(course.difficulty_level.as_deref(), Some("Beginner"));
        assert_eq!(course.currency.as_ref().unwrap().code(), "EUR");
        assert_eq!(course.tags[0].name(), "rust");
        assert_eq!(course.tags[1].name(), "systems");
        assert_eq!(course.modules[1].label(), Some("Lifetimes"));
    }

    #[test]
    fn accepts_snake_case_aliases() {
        let value = json!({
            "id": 7,
            "name": "Watercolor Basics",
            "description": "",
            "difficulty_level": "Intermediate",
            "price": 20.0,
            "duration_hours": 3.0
        });

        let course: CourseDetails = serde_json::from_value(value).unwrap();
        assert_eq!(course.difficulty_level.as_deref(), Some("Intermediate"));
        assert_eq!(course.one_time_price, Some(20.0));
        assert_eq!(course.estimated_duration_in_hours, Some(3.0));
    }

    #[test]
    fn context_text_marks_free_courses() {
        let course = CourseDetails {
            id: 5,
            name: "Open Course".to_string(),
            one_time_price: Some(0.0),
            ..Default::default()
        };

        let text = course.context_text();
        assert!(text.contains("Course ID: 5"));
        assert!(text.contains("Price: Free"));
    }

    #[test]
    fn recommended_mapping_fills_defaults() {
        let course = CourseDetails {
            id: 9,
            name: String::new(),
            ..Default::default()
        };

        let recommended = course.to_recommended();
        assert_eq!(recommended.course_id, 9);
        assert_eq!(recommended.name, "Unknown Course");
        assert_eq!(recommended.currency, "USD");
        assert_eq!(recommended.price, 0.0);
    }
}
