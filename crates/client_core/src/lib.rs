use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use shared::{
    error::{ErrorBody, ErrorCode},
    items::{
        Achievement, Education, Extracurricular, Link, OrderedItem, PortfolioProject,
        WorkExperience,
    },
    protocol::{
        ApiResponse, CollectionData, LoginRequest, LoginResponse, ProfileSummary, ProfileUpdate,
        PublicProfile, ReplaceCollectionRequest,
    },
};
use tracing::{debug, info};
use url::Url;

pub mod drag;
pub mod editor;
pub mod error;
pub mod gateway;
pub mod session;

pub use drag::{DragReorderController, DragState};
pub use editor::{CollectionState, OrderedCollectionEditor, PendingSave};
pub use error::{EditorError, PersistError};
pub use gateway::{Acknowledged, PersistenceGateway};
pub use session::{EditingSession, ProfileCollections, SessionItem};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client for the profile API. Also the production
/// [`PersistenceGateway`]: a save is one `PUT /api/profile/collections/{kind}`.
#[derive(Debug, Clone)]
pub struct ProfileClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SavedCollection<T> {
    items: Vec<T>,
    #[serde(default)]
    revision: Option<i64>,
}

impl ProfileClient {
    pub fn new(server_url: &str) -> Result<Self> {
        let mut base_url =
            Url::parse(server_url).with_context(|| format!("invalid server url '{server_url}'"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url,
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Logs in, registering the username with `password` if it is new.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<LoginResponse> {
        let response = self
            .http
            .post(self.endpoint("api/auth/login")?)
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let login: LoginResponse = require_data(read_envelope(response).await?)?;
        info!(user_id = login.user_id.0, "logged in");
        self.token = Some(login.token.clone());
        Ok(login)
    }

    pub async fn profile(&self) -> Result<ProfileSummary> {
        let response = self
            .authorized(self.http.get(self.endpoint("api/profile")?))
            .send()
            .await?;
        require_data(read_envelope(response).await?)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<ProfileSummary> {
        let response = self
            .authorized(self.http.put(self.endpoint("api/profile")?))
            .json(update)
            .send()
            .await?;
        require_data(read_envelope(response).await?)
    }

    pub async fn fetch_collection<T: OrderedItem>(&self) -> Result<CollectionData<T>> {
        let path = format!("api/profile/collections/{}", T::KIND);
        let response = self
            .authorized(self.http.get(self.endpoint(&path)?))
            .send()
            .await?;
        let data: CollectionData<T> = require_data(read_envelope(response).await?)?;
        debug!(
            kind = %T::KIND,
            items = data.items.len(),
            revision = data.revision,
            "fetched collection"
        );
        Ok(data)
    }

    /// Fetches every collection of the signed-in user into a fresh session.
    pub async fn load_session(&self) -> Result<EditingSession> {
        Ok(EditingSession::new(ProfileCollections {
            links: self.fetch_collection::<Link>().await?,
            experiences: self.fetch_collection::<WorkExperience>().await?,
            education: self.fetch_collection::<Education>().await?,
            portfolio: self.fetch_collection::<PortfolioProject>().await?,
            achievements: self.fetch_collection::<Achievement>().await?,
            extracurriculars: self.fetch_collection::<Extracurricular>().await?,
        }))
    }

    pub async fn public_profile(&self, username: &str) -> Result<PublicProfile> {
        let mut url = self.endpoint("api/u/")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("server url cannot carry a path"))?
            .pop_if_empty()
            .push(username);
        let response = self.http.get(url).send().await?;
        require_data(read_envelope(response).await?)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid endpoint path '{path}'"))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl PersistenceGateway for ProfileClient {
    async fn replace_all<T: OrderedItem>(
        &self,
        items: Vec<T>,
        expected_revision: Option<i64>,
    ) -> Result<Acknowledged<T>, PersistError> {
        let kind = T::KIND;
        let request = ReplaceCollectionRequest {
            items,
            expected_revision,
        };
        let body = request
            .to_wire(kind)
            .map_err(|e| PersistError::Transport(format!("failed to encode {kind}: {e}")))?;
        let url = self
            .endpoint(&format!("api/profile/collections/{kind}"))
            .map_err(|e| PersistError::Transport(e.to_string()))?;

        let response = self
            .authorized(self.http.put(url))
            .json(&body)
            .send()
            .await
            .map_err(|e| PersistError::Transport(e.to_string()))?;
        let saved: Option<SavedCollection<T>> = read_envelope(response).await?;

        Ok(match saved {
            Some(saved) => Acknowledged {
                items: saved.items,
                revision: saved.revision,
            },
            None => Acknowledged {
                items: request.items,
                revision: None,
            },
        })
    }
}

/// Unwraps the `{ success, message?, data? }` envelope, turning error bodies
/// into [`PersistError::Rejected`].
async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<Option<T>, PersistError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| PersistError::Transport(e.to_string()))?;

    if !status.is_success() {
        return Err(match serde_json::from_slice::<ErrorBody>(&bytes) {
            Ok(body) => PersistError::Rejected {
                code: body.error.code,
                message: body.error.message,
            },
            Err(_) => PersistError::Transport(format!("server responded with HTTP {status}")),
        });
    }

    let envelope: ApiResponse<T> = serde_json::from_slice(&bytes)
        .map_err(|e| PersistError::Transport(format!("unreadable response: {e}")))?;
    if !envelope.success {
        return Err(PersistError::Rejected {
            code: ErrorCode::Internal,
            message: envelope
                .message
                .unwrap_or_else(|| "request was not successful".into()),
        });
    }
    Ok(envelope.data)
}

fn require_data<T>(data: Option<T>) -> Result<T> {
    data.ok_or_else(|| anyhow!("response carried no data"))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
