//! `reqwest` implementation of [`ChatApi`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use crate::{
    domain::{ApiError, ChatApi, Message, Role, RoomId, SeenMarker, UserId},
    infrastructure::dto::{
        conversion::seen_marker_from_snapshot,
        http::{EnsureRoomRequest, LastSeenResponse},
        websocket::MessageDto,
    },
};

/// REST client scoped to one signed-in identity.
///
/// Admins talk to `/api/admin/...`, customers to `/api/public/...`. Mark-read and
/// last-seen exist only on the admin side; for customers they resolve to no-ops.
#[derive(Clone)]
pub struct HttpChatApi {
    client: Client,
    base_url: String,
    token: String,
    role: Role,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, role: Role) -> Self {
        Self::with_client(Client::new(), base_url, token, role)
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
        role: Role,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            token: token.into(),
            role,
        }
    }

    fn scope(&self) -> &'static str {
        match self.role {
            Role::Admin => "admin",
            Role::Customer => "public",
        }
    }

    /// `<base>/api/<segments...>`, each segment percent-encoded
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let invalid = |reason: String| {
            ApiError::Request(format!("invalid base URL '{}': {}", self.base_url, reason))
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot be a base".to_string()))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response, ApiError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, ApiError> {
        let response = self.send(self.client.get(url.clone()), url).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn ensure_room(&self, customer_id: &UserId, customer_name: &str) -> Result<(), ApiError> {
        let url = self.url(&["public", "rooms"])?;
        let body = EnsureRoomRequest {
            customer_id: customer_id.as_str(),
            customer_name,
        };
        self.send(self.client.post(url.clone()).json(&body), &url).await?;
        tracing::debug!("Ensured room for '{}'", customer_id);
        Ok(())
    }

    async fn fetch_history(&self, room_id: &RoomId) -> Result<Vec<Message>, ApiError> {
        let url = self.url(&[self.scope(), "rooms", room_id.as_str(), "messages"])?;
        let dtos: Vec<MessageDto> = self.get_json(&url).await?;

        let total = dtos.len();
        let messages: Vec<Message> = dtos
            .into_iter()
            .filter_map(|dto| match Message::try_from(dto) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!("Skipping invalid history entry in '{}': {}", room_id, e);
                    None
                }
            })
            .collect();
        tracing::debug!(
            "Fetched {}/{} history message(s) for '{}'",
            messages.len(),
            total,
            room_id
        );
        Ok(messages)
    }

    async fn mark_read(&self, room_id: &RoomId) -> Result<(), ApiError> {
        if self.role != Role::Admin {
            return Ok(());
        }
        let url = self.url(&["admin", "rooms", room_id.as_str(), "mark-read"])?;
        self.send(self.client.post(url.clone()), &url).await?;
        Ok(())
    }

    async fn fetch_last_seen(&self, room_id: &RoomId) -> Result<Option<SeenMarker>, ApiError> {
        if self.role != Role::Admin {
            return Ok(None);
        }
        let url = self.url(&["admin", "rooms", room_id.as_str(), "last-seen"])?;
        let response: Option<LastSeenResponse> = self.get_json(&url).await?;

        response
            .map(|snapshot| seen_marker_from_snapshot(snapshot, room_id, self.role.counterpart()))
            .transpose()
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}
