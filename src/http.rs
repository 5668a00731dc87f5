//! Transport primitives for API calls made on behalf of a session.
//!
//! The module exposes the [`Transport`] seam alongside the [`ApiRequest`]/[`ApiResponse`] value
//! types so applications can plug in any HTTP stack. [`ReqwestTransport`] is the built-in
//! implementation; it resolves request paths against the configured API base and captures the
//! `Retry-After` hint so failure classification can surface it.

// crates.io
use serde::de::DeserializeOwned;
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};

/// Future returned by [`Transport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Request/response collaborator the session core sends API calls through.
///
/// Implementations must not follow authentication of their own: the caller attaches the
/// `Authorization` header it wants sent and inspects the returned status itself. Any timeout
/// is the transport's own and surfaces as [`TransportError::Timeout`].
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Executes `request` and returns the raw response, whatever its status.
	fn send(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// HTTP verbs used by API requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Returns the canonical verb.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outgoing API call.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
	/// HTTP verb.
	pub method: Method,
	/// Path (and optional query) relative to the API base.
	pub path: String,
	/// Extra headers, keyed by lowercase name.
	pub headers: BTreeMap<String, String>,
	/// Optional JSON body.
	pub body: Option<serde_json::Value>,
	/// Whether this request is already a replay after renewal.
	pub retried: bool,
}
impl ApiRequest {
	/// Creates a request without body or headers.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			headers: BTreeMap::new(),
			body: None,
			retried: false,
		}
	}

	/// Creates a `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// Creates a `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	/// Creates a `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::Delete, path)
	}

	/// Attaches a JSON body.
	pub fn json(mut self, body: serde_json::Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Attaches a header, replacing any previous value of the same name.
	pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Returns the bearer credential currently attached, if any.
	pub fn bearer(&self) -> Option<&str> {
		self.headers.get("authorization").and_then(|value| value.strip_prefix("Bearer "))
	}

	pub(crate) fn authorize(&mut self, access_token: Option<&str>) {
		match access_token {
			Some(token) => {
				self.headers.insert("authorization".into(), format!("Bearer {token}"));
			},
			None => {
				self.headers.remove("authorization");
			},
		}
	}
}

/// Raw API response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response body bytes.
	pub body: Vec<u8>,
	/// Server-provided retry hint, when present.
	pub retry_after: Option<Duration>,
}
impl ApiResponse {
	/// Creates a response from its status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, body: body.into(), retry_after: None }
	}

	/// Creates a response carrying a JSON body.
	pub fn json_body(status: u16, body: &serde_json::Value) -> Self {
		Self::new(status, body.to_string())
	}

	/// Whether the status is in the 2xx range.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Whether the status reports a missing or expired credential.
	pub fn is_unauthorized(&self) -> bool {
		self.status == 401
	}

	/// Body decoded as UTF-8, lossily.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Decodes the body as `T`, naming the offending path on failure.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| Error::Decode { source, status: Some(self.status) })
	}

	/// Extracts the server's `detail` message.
	///
	/// Accepts both the plain form (`{"detail": "Not found"}`) and the validation form
	/// (`{"detail": [{"msg": "field required", ...}]}`), joining multiple messages with `; `.
	pub fn detail(&self) -> Option<String> {
		let body = serde_json::from_slice::<serde_json::Value>(&self.body).ok()?;

		match body.get("detail")? {
			serde_json::Value::String(message) => Some(message.clone()),
			serde_json::Value::Array(items) => {
				let messages = items
					.iter()
					.filter_map(|item| item.get("msg").and_then(serde_json::Value::as_str))
					.collect::<Vec<_>>();

				if messages.is_empty() { None } else { Some(messages.join("; ")) }
			},
			_ => None,
		}
	}
}

/// [`Transport`] backed by a shared [`ReqwestClient`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	base: Url,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport with a default client.
	pub fn new(base: Url) -> Result<Self, crate::error::ConfigError> {
		Ok(Self::with_client(ReqwestClient::builder().build()?, base))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient, base: Url) -> Self {
		Self { client, base }
	}

	/// API base every request path is resolved against.
	pub fn base(&self) -> &Url {
		&self.base
	}

	fn method(method: Method) -> reqwest::Method {
		match method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
			Method::Put => reqwest::Method::PUT,
			Method::Patch => reqwest::Method::PATCH,
			Method::Delete => reqwest::Method::DELETE,
		}
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let url = self.base.join(&request.path).map_err(|e| TransportError::InvalidRequest {
				message: format!("{} cannot be joined onto {}: {e}", request.path, self.base),
			})?;
			let mut builder = self.client.request(Self::method(request.method), url);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = &request.body {
				builder = builder.json(body);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let retry_after = parse_retry_after(response.headers());
			let body = response.bytes().await?.to_vec();

			Ok(ApiResponse { status, body, retry_after })
		})
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return i64::try_from(secs).ok().map(Duration::seconds);
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
