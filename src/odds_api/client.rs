use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use url::Url;

use super::provider::OddsProvider;
use crate::db::models::{Market, PropRow, Side};

const SPORT_KEY: &str = "basketball_nba";

/// Player-prop odds from The Odds API v4.
/// Docs: <https://the-odds-api.com/liveapi/guides/v4/>
pub struct OddsApiClient {
    http: Client,
    base_url: String,
    api_key: String,
    regions: String,
    /// player_name → team, to work out who each player is facing
    roster: HashMap<String, String>,
}

impl OddsApiClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        regions: &str,
        roster: HashMap<String, String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(OddsApiClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            regions: regions.to_string(),
            roster,
        })
    }

    fn url(&self, path: &str, extra: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .with_context(|| format!("Invalid Odds API URL: {}{}", self.base_url, path))?;
        url.query_pairs_mut()
            .append_pair("apiKey", &self.api_key)
            .extend_pairs(extra);
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> Result<serde_json::Value> {
        debug!("GET {}{}", url.origin().ascii_serialization(), url.path());
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .context("Odds API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Odds API error {}: {}", status, body);
        }

        if let Some(remaining) = resp.headers().get("x-requests-remaining") {
            debug!("Odds API requests remaining: {:?}", remaining);
        }

        resp.json().await.context("Failed to parse Odds API response")
    }

    async fn list_event_ids(&self) -> Result<Vec<String>> {
        let url = self.url(&format!("/v4/sports/{}/events", SPORT_KEY), &[])?;
        let raw = self.get_json(url).await?;
        Ok(raw
            .as_array()
            .map(|events| {
                events
                    .iter()
                    .filter_map(|ev| ev["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl OddsProvider for OddsApiClient {
    fn name(&self) -> &str {
        "TheOddsAPI"
    }

    async fn fetch_player_props(&self, markets: &[Market]) -> Result<Vec<PropRow>> {
        let market_keys: Vec<&str> = markets.iter().map(|m| m.as_str()).collect();
        let market_param = market_keys.join(",");

        let event_ids = self.list_event_ids().await?;
        info!("Odds API lists {} upcoming events", event_ids.len());

        let mut rows = Vec::new();
        for event_id in &event_ids {
            let url = self.url(
                &format!("/v4/sports/{}/events/{}/odds", SPORT_KEY, event_id),
                &[
                    ("regions", self.regions.as_str()),
                    ("markets", market_param.as_str()),
                    ("oddsFormat", "american"),
                ],
            )?;
            match self.get_json(url).await {
                Ok(raw) => rows.extend(parse_event_odds(&raw, &self.roster)),
                Err(e) => warn!("Skipping event {}: {}", event_id, e),
            }
        }

        info!(
            "Fetched {} prop offers for [{}] across {} events",
            rows.len(),
            market_param,
            event_ids.len()
        );
        Ok(rows)
    }
}

/// Flatten one event-odds payload into prop rows. Outcomes that are not a
/// recognised market/side, or whose player cannot be placed on one of the
/// two teams, are dropped.
fn parse_event_odds(raw: &serde_json::Value, roster: &HashMap<String, String>) -> Vec<PropRow> {
    let (home, away) = match (raw["home_team"].as_str(), raw["away_team"].as_str()) {
        (Some(h), Some(a)) => (h, a),
        _ => return vec![],
    };
    let bookmakers = match raw["bookmakers"].as_array() {
        Some(b) => b,
        None => return vec![],
    };

    let mut rows = Vec::new();
    for book in bookmakers {
        let bookmaker = book["key"].as_str().unwrap_or("unknown");
        for market in book["markets"].as_array().into_iter().flatten() {
            let Some(prop_type) = market["key"].as_str().and_then(Market::from_key) else {
                continue;
            };
            for outcome in market["outcomes"].as_array().into_iter().flatten() {
                let Some((side, player_name, points, price)) = parse_outcome(outcome) else {
                    continue;
                };

                let defensive_matchup = match roster.get(player_name).map(String::as_str) {
                    Some(team) if team == home => away,
                    Some(team) if team == away => home,
                    _ => {
                        debug!("Cannot place {} in {} vs {}", player_name, away, home);
                        continue;
                    }
                };

                rows.push(PropRow {
                    player_name: player_name.to_string(),
                    prop_type,
                    defensive_matchup: defensive_matchup.to_string(),
                    points,
                    price,
                    side,
                    bookmaker: bookmaker.to_string(),
                });
            }
        }
    }
    rows
}

/// (side, player, line, American price) from one outcome object
fn parse_outcome(outcome: &serde_json::Value) -> Option<(Side, &str, f64, i32)> {
    let side = Side::from_label(outcome["name"].as_str()?)?;
    let player_name = outcome["description"].as_str()?;
    let points = outcome["point"].as_f64()?;
    let price = i32::try_from(outcome["price"].as_i64()?).ok()?;
    Some((side, player_name, points, price))
}
