use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::IgdbConfig;
use crate::types::{GameMetadata, ProviderKind};

use super::{MetadataProvider, ProviderError, decode_json};

const TWITCH_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const IGDB_GAMES_URL: &str = "https://api.igdb.com/v4/games";
const IGDB_IMAGE_BASE: &str = "https://images.igdb.com/igdb/image/upload";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
/// Tokens are refreshed this long before Twitch says they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const DETAIL_FIELDS: &str = "name,summary,first_release_date,cover.image_id,\
artworks.image_id,screenshots.image_id,platforms.name,\
involved_companies.company.name,involved_companies.developer,involved_companies.publisher";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: u64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IgdbGame {
    name: Option<String>,
    summary: Option<String>,
    first_release_date: Option<i64>,
    cover: Option<ImageRef>,
    artworks: Vec<ImageRef>,
    screenshots: Vec<ImageRef>,
    platforms: Vec<NamedRef>,
    involved_companies: Vec<InvolvedCompany>,
}

#[derive(Debug, Deserialize)]
struct ImageRef {
    image_id: String,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct InvolvedCompany {
    company: NamedRef,
    #[serde(default)]
    developer: bool,
    #[serde(default)]
    publisher: bool,
}

/// IGDB client authenticated with Twitch client credentials.
///
/// The app access token is fetched lazily and reused until shortly before it
/// expires; a 401 from IGDB drops it so the next call re-authenticates.
pub struct IgdbProvider {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for IgdbProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IgdbProvider")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl IgdbProvider {
    pub fn new(config: &IgdbConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            client_id: config.client_id.trim().to_string(),
            client_secret: config.client_secret.trim().to_string(),
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.expires_at
        {
            return Ok(token.value.clone());
        }

        let response = self
            .http
            .post(TWITCH_TOKEN_URL)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;
        let token: TokenResponse = decode_json(ProviderKind::Igdb, response).await?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!(expires_in = token.expires_in, "obtained IGDB access token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn query_games<T>(&self, body: String) -> Result<Vec<T>, ProviderError>
    where
        T: serde::de::DeserializeOwned,
    {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(IGDB_GAMES_URL)
            .header("Client-ID", &self.client_id)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .body(body)
            .send()
            .await?;

        let result = decode_json(ProviderKind::Igdb, response).await;
        if matches!(result, Err(ProviderError::InvalidCredentials)) {
            warn!("IGDB rejected the access token; it will be refreshed");
            self.token.lock().await.take();
        }
        result
    }
}

#[async_trait]
impl MetadataProvider for IgdbProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Igdb
    }

    async fn search_by_name(&self, name: &str) -> Result<Option<String>, ProviderError> {
        let hits: Vec<SearchHit> = self.query_games(search_query(name)).await?;
        let found = best_match(&hits, name);
        debug!(query = name, igdb_id = ?found, "igdb search");
        Ok(found)
    }

    async fn fetch_details(&self, provider_id: &str) -> Result<GameMetadata, ProviderError> {
        let id: u64 = provider_id
            .trim()
            .parse()
            .map_err(|_| ProviderError::ParseError(format!("invalid IGDB id '{provider_id}'")))?;
        let body = format!("fields {DETAIL_FIELDS}; where id = {id}; limit 1;");
        let mut games: Vec<IgdbGame> = self.query_games(body).await?;
        match games.pop() {
            Some(game) => Ok(metadata_from_game(game)),
            None => Err(ProviderError::NotFound),
        }
    }
}

fn search_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("search \"{escaped}\"; fields id,name; limit 10;")
}

fn best_match(hits: &[SearchHit], name: &str) -> Option<String> {
    hits.iter()
        .find(|hit| hit.name.trim().eq_ignore_ascii_case(name.trim()))
        .or_else(|| hits.first())
        .map(|hit| hit.id.to_string())
}

fn image_url(size: &str, image: &ImageRef) -> String {
    format!("{IGDB_IMAGE_BASE}/{size}/{}.jpg", image.image_id)
}

fn metadata_from_game(game: IgdbGame) -> GameMetadata {
    let company = |pick: fn(&InvolvedCompany) -> bool| {
        game.involved_companies
            .iter()
            .find(|involved| pick(involved))
            .map(|involved| involved.company.name.clone())
    };
    let developer = company(|involved| involved.developer);
    let publisher = company(|involved| involved.publisher);

    let release_date = game
        .first_release_date
        .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
        .map(|at| at.format("%Y-%m-%d").to_string());

    GameMetadata {
        title: game.name,
        description: game.summary,
        developer,
        publisher,
        release_date,
        cover_image: game
            .cover
            .as_ref()
            .map(|cover| image_url("t_cover_big", cover)),
        banner_image: game.artworks.first().map(|art| image_url("t_1080p", art)),
        screenshots: Some(
            game.screenshots
                .iter()
                .map(|shot| image_url("t_screenshot_big", shot))
                .collect(),
        ),
        platforms: Some(game.platforms.into_iter().map(|p| p.name).collect()),
    }
}
