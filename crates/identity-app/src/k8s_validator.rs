//! K8s Token Validator (SPEC_FULL.md §4.N): the reference `TokenValidator`
//! (spec.md §4.E) implementation, hitting the orchestrator's TokenReview REST
//! endpoint over `reqwest` — already a teacher dependency, wired here the
//! same way the teacher reaches external HTTP services: a thin client struct
//! holding a shared `reqwest::Client`, request/response types as `serde`
//! structs, errors funneled through one `thiserror` enum.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use identity_core::TokenValidator;
use identity_core::TrustDomain;
use identity_core::error::ValidatorError;
use serde::Deserialize;
use serde::Serialize;

/// Validates bearer tokens against a Kubernetes-style TokenReview API and
/// converts the resulting username into a canonical mesh identity.
///
/// spec.md §4.E reference algorithm: (i) submit the token, (ii) refuse
/// usernames not of the form `system:<type>:<ns>:<name>`, (iii) DNS-1123
/// validate each segment, (iv) convert via [`TrustDomain::identity`].
pub struct K8sTokenValidator {
	client: reqwest::Client,
	token_review_url: String,
	trust_domain: TrustDomain,
	/// Bearer token this service itself authenticates to the API server with.
	service_account_token: Option<String>,
}

impl K8sTokenValidator {
	pub fn new(
		client: reqwest::Client,
		token_review_url: String,
		trust_domain: TrustDomain,
		service_account_token: Option<String>,
	) -> Self {
		Self {
			client,
			token_review_url,
			trust_domain,
			service_account_token,
		}
	}
}

#[derive(Debug, Serialize)]
struct TokenReviewRequest<'a> {
	#[serde(rename = "apiVersion")]
	api_version: &'static str,
	kind: &'static str,
	spec: TokenReviewSpec<'a>,
}

#[derive(Debug, Serialize)]
struct TokenReviewSpec<'a> {
	token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenReviewResponse {
	status: TokenReviewStatus,
}

#[derive(Debug, Deserialize)]
struct TokenReviewStatus {
	#[serde(default)]
	authenticated: bool,
	#[serde(default)]
	user: Option<TokenReviewUser>,
	#[serde(default)]
	error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenReviewUser {
	username: String,
}

#[async_trait]
impl TokenValidator for K8sTokenValidator {
	async fn validate(&self, token: &[u8]) -> Result<String, ValidatorError> {
		let token = std::str::from_utf8(token)
			.map_err(|_| ValidatorError::InvalidToken("token is not valid UTF-8".to_string()))?;

		let mut request = self
			.client
			.post(&self.token_review_url)
			.json(&TokenReviewRequest {
				api_version: "authentication.k8s.io/v1",
				kind: "TokenReview",
				spec: TokenReviewSpec { token },
			});
		if let Some(sa_token) = &self.service_account_token {
			request = request.bearer_auth(sa_token);
		}

		let response = request
			.send()
			.await
			.map_err(|e| ValidatorError::Transient(Arc::new(anyhow!("token review request failed: {e}"))))?;

		if !response.status().is_success() {
			return Err(ValidatorError::Transient(Arc::new(anyhow!(
				"token review returned status {}",
				response.status()
			))));
		}

		let body: TokenReviewResponse = response
			.json()
			.await
			.map_err(|e| ValidatorError::Transient(Arc::new(anyhow!("decoding token review response: {e}"))))?;

		if !body.status.authenticated {
			return Err(ValidatorError::NotAuthenticated);
		}
		if let Some(reason) = body.status.error {
			return Err(ValidatorError::Transient(Arc::new(anyhow!("token review error: {reason}"))));
		}
		let username = body
			.status
			.user
			.ok_or_else(|| ValidatorError::InvalidToken("token review authenticated with no user".to_string()))?
			.username;

		let (ty, ns, name) = parse_service_account_username(&username)?;
		self
			.trust_domain
			.identity(ty, name, ns)
			.map_err(|e| ValidatorError::InvalidToken(e.to_string()))
	}
}

/// Parses `system:<type>:<ns>:<name>`, the Kubernetes service-account
/// username shape. Any other shape is `InvalidToken` per spec.md §4.E.
fn parse_service_account_username(username: &str) -> Result<(&str, &str, &str), ValidatorError> {
	let mut segments = username.splitn(4, ':');
	let (Some("system"), Some(ty), Some(ns), Some(name)) =
		(segments.next(), segments.next(), segments.next(), segments.next())
	else {
		return Err(ValidatorError::InvalidToken(format!(
			"username {username:?} is not of the form system:<type>:<ns>:<name>"
		)));
	};
	Ok((ty, ns, name))
}
