//! Playtime API client and the per-record playtime aggregation.

use crate::error::Result;
use crate::store::Credentials;
use reqwest::header::COOKIE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

#[derive(Debug)]
pub struct SteamClient {
    client: Client,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OwnedGamesResponse {
    pub response: OwnedGames,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct OwnedGames {
    #[serde(default)]
    pub games: Vec<OwnedGame>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OwnedGame {
    pub appid: u64,
    pub playtime_forever: u64,
}

/// Cumulative minutes played per product id, keyed the way app ids are
/// stored on purchase records.
#[derive(Debug, Default)]
pub struct PlaytimeTable {
    minutes: HashMap<String, u64>,
}

impl PlaytimeTable {
    pub fn new(games: Vec<OwnedGame>) -> Self {
        let minutes = games
            .into_iter()
            .map(|game| (game.appid.to_string(), game.playtime_forever))
            .collect();
        Self { minutes }
    }

    /// Sum the playtime of a comma-joined app id set. Ids the API never
    /// returned count as zero.
    pub fn total_minutes(&self, appids: &str) -> u64 {
        appids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| self.minutes.get(id).copied().unwrap_or(0))
            .sum()
    }
}

impl SteamClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch the account's owned games with the stored bearer token and
    /// the account id derived from the session cookies.
    pub async fn owned_games(&self, creds: &Credentials) -> Result<PlaytimeTable> {
        let steam_id = creds.steam_id()?;
        let url = format!(
            "https://api.steampowered.com/IPlayerService/GetOwnedGames/v0001/?access_token={}&steamid={}&format=json",
            creds.access_token, steam_id
        );
        let response: OwnedGamesResponse = self
            .client
            .get(&url)
            .header(COOKIE, creds.cookie_header())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!(
            "Fetched playtime for {} owned games",
            response.response.games.len()
        );
        Ok(PlaytimeTable::new(response.response.games))
    }
}
