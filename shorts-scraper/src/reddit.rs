//! Reddit listing client
//!
//! Reads the `hot`, `rising` and `top` (day) listings of a subreddit and
//! keeps self posts created inside the requested window. Without OAuth
//! credentials the public `.json` listings are used; with them an
//! application-only token is fetched and `oauth.reddit.com` is queried.

use crate::source::{ContentSource, SourceError};
use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use shorts_common::config::ScraperConfig;
use shorts_common::Item;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const PUBLIC_BASE_URL: &str = "https://www.reddit.com";
const OAUTH_BASE_URL: &str = "https://oauth.reddit.com";
const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const LISTING_LIMIT: &str = "100";

/// Listings read per subreddit, with their extra query parameters
const LISTINGS: [(&str, &[(&str, &str)]); 3] = [
    ("hot", &[]),
    ("rising", &[]),
    ("top", &[("t", "day")]),
];

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: Post,
}

/// Subset of a Reddit submission used by the scraper
#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub is_self: bool,
    pub created_utc: f64,
    #[serde(default)]
    pub link_flair_text: Option<String>,
}

impl Post {
    /// Title and body as markdown; the bare title when there is no body
    pub fn format_content(&self) -> String {
        let title = self.title.trim();
        let body = self.selftext.trim();
        if body.is_empty() {
            title.to_string()
        } else {
            format!("# {}\n\n{}", title, body)
        }
    }

    fn into_item(self, community: &str) -> Item {
        let content = self.format_content();
        let tag = self.link_flair_text.filter(|f| !f.trim().is_empty());
        Item::new(self.id, community, content, self.created_utc as i64, tag)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct Credentials {
    client_id: String,
    client_secret: String,
}

/// Reddit API client
pub struct RedditClient {
    http_client: reqwest::Client,
    rate_limiter: RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
    credentials: Option<Credentials>,
    token: Mutex<Option<(String, Instant)>>,
}

impl RedditClient {
    pub fn new(config: &ScraperConfig) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SourceError::NetworkError(e.to_string()))?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second));

        let credentials = match (&config.client_id, &config.client_secret) {
            (Some(id), Some(secret)) => Some(Credentials {
                client_id: id.clone(),
                client_secret: secret.clone(),
            }),
            _ => None,
        };

        if credentials.is_some() {
            info!("Reddit client using application-only OAuth");
        } else {
            info!("Reddit client using public listings (read-only, no credentials)");
        }

        Ok(Self {
            http_client,
            rate_limiter,
            credentials,
            token: Mutex::new(None),
        })
    }

    /// Current bearer token, refreshed one minute before expiry
    async fn bearer_token(&self, credentials: &Credentials) -> Result<String, SourceError> {
        let mut token = self.token.lock().await;

        if let Some((value, expires_at)) = token.as_ref() {
            if Instant::now() < *expires_at {
                return Ok(value.clone());
            }
        }

        self.rate_limiter.until_ready().await;
        let response = self
            .http_client
            .post(TOKEN_URL)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| SourceError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::AuthError(format!("token endpoint returned {}", status)));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| SourceError::ParseError(e.to_string()))?;

        let lifetime = Duration::from_secs(parsed.expires_in.saturating_sub(60));
        *token = Some((parsed.access_token.clone(), Instant::now() + lifetime));
        debug!("Obtained Reddit access token (valid {:?})", lifetime);

        Ok(parsed.access_token)
    }

    async fn fetch_listing(
        &self,
        community: &str,
        listing: &str,
        extra: &[(&str, &str)],
    ) -> Result<Vec<Post>, SourceError> {
        let request = match &self.credentials {
            Some(credentials) => {
                let token = self.bearer_token(credentials).await?;
                self.http_client
                    .get(format!("{}/r/{}/{}", OAUTH_BASE_URL, community, listing))
                    .bearer_auth(token)
            }
            None => self
                .http_client
                .get(format!("{}/r/{}/{}.json", PUBLIC_BASE_URL, community, listing)),
        };

        self.rate_limiter.until_ready().await;
        debug!(community = %community, listing = %listing, "Querying Reddit listing");

        let response = request
            .query(&[("limit", LISTING_LIMIT), ("raw_json", "1")])
            .query(extra)
            .send()
            .await
            .map_err(|e| SourceError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SourceError::ApiError(status.as_u16(), error_text));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::NetworkError(e.to_string()))?;

        parse_listing(&body)
    }
}

/// Decode a listing response body into posts
pub fn parse_listing(body: &str) -> Result<Vec<Post>, SourceError> {
    let listing: Listing =
        serde_json::from_str(body).map_err(|e| SourceError::ParseError(e.to_string()))?;
    Ok(listing.data.children.into_iter().map(|c| c.data).collect())
}

/// Keep self posts created at or after `cutoff` (epoch seconds)
pub fn select_posts(posts: Vec<Post>, community: &str, cutoff: i64) -> Vec<Item> {
    posts
        .into_iter()
        .filter(|p| {
            if (p.created_utc as i64) < cutoff {
                return false;
            }
            if !p.is_self {
                debug!("Skipped: {} - link post", p.id);
                return false;
            }
            true
        })
        .map(|p| p.into_item(community))
        .collect()
}

/// Merge per-listing results for one community
///
/// Returns the selected items and the number of posts read. Failed listings
/// are logged and skipped; the community fails only when every listing did.
fn combine_listings(
    outcomes: Vec<(&str, Result<Vec<Post>, SourceError>)>,
    community: &str,
    cutoff: i64,
) -> Result<(Vec<Item>, usize), SourceError> {
    let mut items = Vec::new();
    let mut processed = 0usize;
    let mut succeeded = 0usize;
    let mut last_error = None;

    for (listing, outcome) in outcomes {
        match outcome {
            Ok(posts) => {
                succeeded += 1;
                processed += posts.len();
                let selected = select_posts(posts, community, cutoff);
                debug!("r/{} {}: {} candidate stories", community, listing, selected.len());
                items.extend(selected);
            }
            Err(e) => {
                warn!("Failed to read r/{} {}: {}", community, listing, e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if succeeded == 0 => Err(e),
        _ => Ok((items, processed)),
    }
}

#[async_trait]
impl ContentSource for RedditClient {
    fn name(&self) -> &'static str {
        "reddit"
    }

    async fn fetch(&self, community: &str, window: Duration) -> Result<Vec<Item>, SourceError> {
        let cutoff = Utc::now().timestamp() - window.as_secs() as i64;
        info!("Scraping r/{} for stories from last {:?}", community, window);

        let mut outcomes = Vec::with_capacity(LISTINGS.len());
        for (listing, extra) in LISTINGS {
            outcomes.push((listing, self.fetch_listing(community, listing, extra).await));
        }
        let (items, processed) = combine_listings(outcomes, community, cutoff)?;

        info!(
            "Found {} candidate stories from r/{} (processed {} posts)",
            items.len(),
            community,
            processed
        );
        Ok(items)
    }
}
