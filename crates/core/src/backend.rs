//! Backend Client Adapter
//!
//! Defines the `SkillBackend` contract the session types talk through, and
//! `HttpBackend`, its implementation over the SkillPath REST API. Every call
//! takes the learner's `LearnerContext` explicitly; nothing about the learner's
//! identity lives in ambient state.

use crate::{
    error::{BackendError, Result},
    models::{
        ErrorBody, LoginPayload, MessageResponse, PathEnvelope, Question, QuizHistory,
        RegisterPayload, ScoreSubmission,
    },
    sse,
};
use async_trait::async_trait;
use futures::Stream;
use reqwest::{
    Client, RequestBuilder, Response, Url,
    header::{ACCEPT, COOKIE, HeaderValue, SET_COOKIE},
};
use serde::de::DeserializeOwned;
use std::{fmt, pin::Pin, time::Duration};
use tracing::{debug, instrument, warn};

/// A stream of assistant text chunks, in arrival order.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// The authenticated identity of one learner, as session cookies.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LearnerContext {
    cookies: Vec<(String, String)>,
}

impl LearnerContext {
    /// A context carrying no credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Builds a context from `name=value` cookie pairs.
    pub fn from_cookies<I, K, V>(cookies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cookies: cookies
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.cookies.is_empty()
    }

    /// The `Cookie` request header value, if any cookies are held.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Records a cookie, replacing any earlier value of the same name.
    fn absorb_set_cookie(&mut self, header: &str) {
        let Some((name, value)) = header
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
        else {
            return;
        };
        let (name, value) = (name.trim().to_string(), value.trim().to_string());
        if name.is_empty() {
            return;
        }
        match self.cookies.iter_mut().find(|(k, _)| *k == name) {
            Some(existing) => existing.1 = value,
            None => self.cookies.push((name, value)),
        }
    }
}

// Cookie values are credentials; keep them out of logs.
impl fmt::Debug for LearnerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.cookies.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("LearnerContext")
            .field("cookies", &names)
            .finish()
    }
}

/// Every backend operation the session layer depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SkillBackend: Send + Sync {
    /// Authenticates and returns the resulting learner context.
    async fn login(&self, email: &str, password: &str) -> Result<LearnerContext>;

    async fn register(&self, username: &str, email: &str, password: &str)
    -> Result<MessageResponse>;

    async fn logout(&self, learner: &LearnerContext) -> Result<MessageResponse>;

    /// Fetches the ordered quiz questions for a skill.
    async fn fetch_questions(&self, learner: &LearnerContext, skill: &str)
    -> Result<Vec<Question>>;

    /// Fetches the learner's current learning path. A 404 means none exists yet.
    async fn fetch_existing_path(&self, learner: &LearnerContext) -> Result<PathEnvelope>;

    /// Submits a finished quiz and receives the generated learning path.
    async fn submit_score(
        &self,
        learner: &LearnerContext,
        submission: &ScoreSubmission,
    ) -> Result<PathEnvelope>;

    async fn fetch_quiz_history(&self, learner: &LearnerContext) -> Result<QuizHistory>;

    async fn complete_step(&self, learner: &LearnerContext, step_id: i64)
    -> Result<MessageResponse>;

    async fn complete_skill(
        &self,
        learner: &LearnerContext,
        skill_id: i64,
    ) -> Result<MessageResponse>;

    /// Opens the incremental assistant response for one user message.
    async fn open_chat_stream(&self, learner: &LearnerContext, message: &str)
    -> Result<ChatStream>;
}

/// `SkillBackend` over HTTP.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpBackend {
    /// Creates a client for the backend rooted at `base_url`.
    ///
    /// `request_timeout` bounds each request/response call. Chat streams are
    /// long-lived and only bounded by the connect timeout.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| BackendError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(BackendError::Transport)?;
        Ok(Self {
            client,
            base_url,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn with_learner(builder: RequestBuilder, learner: &LearnerContext) -> RequestBuilder {
        match learner.cookie_header() {
            Some(cookies) => builder.header(COOKIE, cookies),
            None => builder,
        }
    }

    /// Sends a request and maps non-success statuses to `BackendError::Status`.
    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await.map_err(BackendError::Transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(ErrorBody::into_message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            });
        Err(BackendError::Status { status, message })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let endpoint = response.url().path().to_string();
        let body = response.bytes().await.map_err(BackendError::Transport)?;
        serde_json::from_slice(&body).map_err(|e| BackendError::malformed(&endpoint, e))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        learner: &LearnerContext,
        segments: &[&str],
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        let builder = self.client.get(url).timeout(self.request_timeout);
        let response = self.send(Self::with_learner(builder, learner)).await?;
        Self::decode(response).await
    }

    async fn post_json<B, T>(
        &self,
        learner: &LearnerContext,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T>
    where
        B: serde::Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        let mut builder = self.client.post(url).timeout(self.request_timeout);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = self.send(Self::with_learner(builder, learner)).await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl SkillBackend for HttpBackend {
    #[instrument(skip(self, password))]
    async fn login(&self, email: &str, password: &str) -> Result<LearnerContext> {
        let url = self.endpoint(&["auth", "login"])?;
        let builder = self
            .client
            .post(url)
            .timeout(self.request_timeout)
            .json(&LoginPayload { email, password });
        let response = self.send(builder).await?;

        let mut learner = LearnerContext::anonymous();
        for header in response.headers().get_all(SET_COOKIE) {
            match header.to_str() {
                Ok(value) => learner.absorb_set_cookie(value),
                Err(_) => warn!("Ignoring non-ASCII Set-Cookie header"),
            }
        }
        let ack: MessageResponse = Self::decode(response).await?;
        debug!(message = %ack.message, "Login accepted");

        if !learner.is_authenticated() {
            return Err(BackendError::malformed(
                "/auth/login",
                "login succeeded but no session cookie was set",
            ));
        }
        Ok(learner)
    }

    #[instrument(skip(self, password))]
    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<MessageResponse> {
        let payload = RegisterPayload {
            username,
            email,
            password,
        };
        self.post_json(&LearnerContext::anonymous(), &["auth", "register"], Some(&payload))
            .await
    }

    #[instrument(skip_all)]
    async fn logout(&self, learner: &LearnerContext) -> Result<MessageResponse> {
        self.post_json::<(), _>(learner, &["auth", "logout"], None)
            .await
    }

    #[instrument(skip(self, learner))]
    async fn fetch_questions(
        &self,
        learner: &LearnerContext,
        skill: &str,
    ) -> Result<Vec<Question>> {
        self.get_json(learner, &["api", "generate-quiz", skill]).await
    }

    #[instrument(skip_all)]
    async fn fetch_existing_path(&self, learner: &LearnerContext) -> Result<PathEnvelope> {
        self.get_json(learner, &["api", "get-skill"]).await
    }

    #[instrument(skip(self, learner))]
    async fn submit_score(
        &self,
        learner: &LearnerContext,
        submission: &ScoreSubmission,
    ) -> Result<PathEnvelope> {
        self.post_json(learner, &["api", "submit"], Some(submission))
            .await
    }

    #[instrument(skip_all)]
    async fn fetch_quiz_history(&self, learner: &LearnerContext) -> Result<QuizHistory> {
        self.get_json(learner, &["api", "results-of-quiz"]).await
    }

    #[instrument(skip(self, learner))]
    async fn complete_step(
        &self,
        learner: &LearnerContext,
        step_id: i64,
    ) -> Result<MessageResponse> {
        let id = step_id.to_string();
        self.post_json::<(), _>(learner, &["api", "complete-step", &id], None)
            .await
    }

    #[instrument(skip(self, learner))]
    async fn complete_skill(
        &self,
        learner: &LearnerContext,
        skill_id: i64,
    ) -> Result<MessageResponse> {
        let id = skill_id.to_string();
        self.post_json::<(), _>(learner, &["api", "complete-skill", &id], None)
            .await
    }

    #[instrument(skip_all, fields(len = message.len()))]
    async fn open_chat_stream(
        &self,
        learner: &LearnerContext,
        message: &str,
    ) -> Result<ChatStream> {
        let url = self.endpoint(&["service", "chat-gemini-stream"])?;
        let builder = self
            .client
            .get(url)
            .query(&[("message", message)])
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"));
        let response = self.send(Self::with_learner(builder, learner)).await?;
        debug!("Chat stream opened");
        Ok(Box::pin(sse::chat_chunks(response.bytes_stream())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_skill_segment() {
        let backend = HttpBackend::new("http://localhost:5000", Duration::from_secs(5)).unwrap();
        let url = backend
            .endpoint(&["api", "generate-quiz", "Data Science/C++"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/generate-quiz/Data%20Science%2FC++"
        );
    }

    #[test]
    fn test_endpoint_respects_base_path() {
        let backend =
            HttpBackend::new("http://example.test/skillpath/", Duration::from_secs(5)).unwrap();
        let url = backend.endpoint(&["api", "get-skill"]).unwrap();
        assert_eq!(url.as_str(), "http://example.test/skillpath/api/get-skill");
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        let err = HttpBackend::new("not a url", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, BackendError::InvalidUrl(_)));

        let err = HttpBackend::new("mailto:learner@example.test", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, BackendError::InvalidUrl(_)));
    }

    #[test]
    fn test_learner_context_cookie_handling() {
        let mut learner = LearnerContext::anonymous();
        assert!(!learner.is_authenticated());
        assert_eq!(learner.cookie_header(), None);

        learner.absorb_set_cookie("session=abc; HttpOnly; Path=/");
        learner.absorb_set_cookie("remember_token=7|xyz; Expires=Wed, 01 Jan 2031 00:00:00 GMT");
        learner.absorb_set_cookie("session=def; HttpOnly");
        learner.absorb_set_cookie("garbage");

        assert!(learner.is_authenticated());
        assert_eq!(
            learner.cookie_header().as_deref(),
            Some("session=def; remember_token=7|xyz")
        );
    }

    #[test]
    fn test_learner_context_debug_hides_values() {
        let learner = LearnerContext::from_cookies([("session", "secret-value")]);
        let rendered = format!("{:?}", learner);
        assert!(rendered.contains("session"));
        assert!(!rendered.contains("secret-value"));
    }
}
