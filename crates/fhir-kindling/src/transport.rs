use std::time::Duration;

use crate::error::Result;

/// Status and body of a completed GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs blocking GET requests against a FHIR server.
///
/// Implementations attach authentication themselves and report the response
/// status as-is; turning a non-2xx status into an error is up to the caller.
pub trait Transport {
    fn get(&self, url: &str) -> Result<TransportResponse>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str) -> Result<TransportResponse> {
        (**self).get(url)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn get(&self, url: &str) -> Result<TransportResponse> {
        (**self).get(url)
    }
}

/// What HttpTransport needs to set the Authorization header
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
        }
    }
}

/// [`Transport`] backed by a blocking reqwest client.
pub struct HttpTransport {
    http: reqwest::blocking::Client,
    auth: Option<Auth>,
}

impl HttpTransport {
    pub fn new(auth: Option<Auth>) -> Result<Self> {
        Self::with_timeout(auth, None)
    }

    pub fn with_timeout(auth: Option<Auth>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            auth,
        })
    }

    fn request(&self, url: &str) -> reqwest::blocking::RequestBuilder {
        let mut req = self.http.get(url);
        match &self.auth {
            Some(Auth::Basic { username, password }) => {
                req = req.basic_auth(username, Some(password));
            }
            Some(Auth::Bearer { token }) => {
                req = req.bearer_auth(token);
            }
            None => {}
        }
        req.header("Accept", "application/fhir+json")
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<TransportResponse> {
        let resp = self.request(url).send()?;
        let status = resp.status().as_u16();
        let body = resp.text()?;
        tracing::trace!(url, status, bytes = body.len(), "GET completed");
        Ok(TransportResponse { status, body })
    }
}
