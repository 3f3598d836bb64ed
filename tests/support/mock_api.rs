use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use futures::future::BoxFuture;
use matchpull::api::{Account, ApiToken, LeagueEntry, Summoner};
use matchpull::{ExtractError, Region, UpstreamApi};
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};

/// Where a player's ranked entry is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Returned by the per-summoner endpoint.
    Direct,
    /// Summoner lookups omit the summoner id; match participants carry it.
    HiddenId,
    /// Only the paginated league listing contains the entry.
    ListingOnly,
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub endpoint: &'static str,
    pub credential: String,
    pub at: Instant,
    pub failed: bool,
    pub stalled: bool,
}

#[derive(Clone)]
struct Player {
    canonical: String,
    game_name: String,
    tag_line: String,
    region: Region,
    matches: Vec<String>,
    rank: Option<(LeagueEntry, Visibility)>,
}

#[derive(Default)]
struct World {
    players: Vec<Player>,
    calls: Vec<CallRecord>,
    calls_per_credential: HashMap<String, usize>,
    /// (credential, nth call by that credential) -> injected failure.
    injections: HashMap<(String, usize), ExtractError>,
    /// endpoint -> extra delay for the next call to it, by any credential.
    stalls: HashMap<&'static str, Duration>,
}

impl World {
    fn player(&self, canonical: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.canonical == canonical)
    }

    /// Decodes an id scoped to `label`'s namespace: `<label>.<prefix><canonical>`.
    fn scoped(
        &self,
        endpoint: &'static str,
        label: &str,
        scoped: &str,
        prefix: &str,
    ) -> Result<&Player> {
        let Some((owner, rest)) = scoped.split_once('.') else {
            return Err(ExtractError::NotFound { endpoint }.into());
        };
        if owner != label {
            return Err(ExtractError::IdentityNamespaceMismatch { endpoint }.into());
        }
        rest.strip_prefix(prefix)
            .and_then(|canonical| self.player(canonical))
            .ok_or_else(|| ExtractError::NotFound { endpoint }.into())
    }
}

fn scoped_entry(entry: &LeagueEntry, label: &str, canonical: &str) -> LeagueEntry {
    LeagueEntry {
        puuid: Some(format!("{label}.{canonical}")),
        summoner_id: Some(format!("{label}.sid-{canonical}")),
        ..entry.clone()
    }
}

/// In-memory upstream with per-credential identity namespaces, fixed call
/// latency, and scripted failures.
#[derive(Clone)]
pub struct MockRiotApi {
    world: Arc<Mutex<World>>,
    latency: Duration,
    page_size: usize,
}

impl Default for MockRiotApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRiotApi {
    pub fn new() -> Self {
        Self {
            world: Arc::new(Mutex::new(World::default())),
            latency: Duration::ZERO,
            page_size: 3,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, World> {
        self.world.lock().expect("mock world poisoned")
    }

    /// Adds a player with `match_count` matches and returns its canonical id.
    pub fn add_player(&self, game_name: &str, tag_line: &str, region: Region, match_count: usize) -> String {
        let canonical = format!("puuid-{}", game_name.to_ascii_lowercase().replace(' ', "-"));
        let matches = (0..match_count)
            .map(|idx| format!("{}_{}_{idx}", region.platform().to_ascii_uppercase(), canonical))
            .collect();
        self.lock().players.push(Player {
            canonical: canonical.clone(),
            game_name: game_name.to_owned(),
            tag_line: tag_line.to_owned(),
            region,
            matches,
            rank: None,
        });
        canonical
    }

    pub fn set_rank(&self, canonical: &str, queue: &str, tier: &str, visibility: Visibility) {
        let mut world = self.lock();
        let player = world
            .players
            .iter_mut()
            .find(|p| p.canonical == canonical)
            .expect("player should be registered");
        player.rank = Some((
            LeagueEntry {
                queue_type: queue.to_owned(),
                tier: tier.to_owned(),
                rank: "I".to_owned(),
                league_points: 1_024,
                wins: 200,
                losses: 150,
                summoner_id: None,
                puuid: None,
            },
            visibility,
        ));
    }

    pub fn namespace_puuid(&self, label: &str, canonical: &str) -> String {
        format!("{label}.{canonical}")
    }

    /// Makes the `nth` call (1-based) issued by `credential` fail with `err`.
    pub fn inject(&self, credential: &str, nth: usize, err: ExtractError) {
        self.lock()
            .injections
            .insert((credential.to_owned(), nth), err);
    }

    /// Holds the next call to `endpoint` for `delay` on top of the latency.
    pub fn stall_next(&self, endpoint: &'static str, delay: Duration) {
        self.lock().stalls.insert(endpoint, delay);
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.lock().calls.clone()
    }

    pub fn calls_by(&self, credential: &str) -> Vec<CallRecord> {
        self.calls()
            .into_iter()
            .filter(|call| call.credential == credential)
            .collect()
    }

    fn serve<'a, T, F>(
        &'a self,
        endpoint: &'static str,
        token: &'a ApiToken,
        answer: F,
    ) -> BoxFuture<'a, Result<T>>
    where
        T: Send + 'a,
        F: FnOnce(&World, &str) -> Result<T> + Send + 'a,
    {
        Box::pin(async move {
            let label = token.label();
            let (injected, stall) = {
                let mut world = self.lock();
                let count = world
                    .calls_per_credential
                    .entry(label.to_owned())
                    .or_default();
                *count += 1;
                let nth = *count;
                let injected = world.injections.remove(&(label.to_owned(), nth));
                let stall = world.stalls.remove(endpoint);
                world.calls.push(CallRecord {
                    endpoint,
                    credential: label.to_owned(),
                    at: Instant::now(),
                    failed: injected.is_some(),
                    stalled: stall.is_some(),
                });
                (injected, stall)
            };

            let delay = self.latency + stall.unwrap_or_default();
            if !delay.is_zero() {
                sleep(delay).await;
            }
            if let Some(err) = injected {
                return Err(err.into());
            }

            let world = self.lock();
            answer(&world, label)
        })
    }
}

impl UpstreamApi for MockRiotApi {
    fn account_by_riot_id<'a>(
        &'a self,
        token: &'a ApiToken,
        _region: Region,
        game_name: &'a str,
        tag_line: &'a str,
    ) -> BoxFuture<'a, Result<Account>> {
        let endpoint = "account_by_riot_id";
        self.serve(endpoint, token, move |world, label| {
            let player = world
                .players
                .iter()
                .find(|p| {
                    p.game_name.eq_ignore_ascii_case(game_name)
                        && p.tag_line.eq_ignore_ascii_case(tag_line)
                })
                .ok_or(ExtractError::NotFound { endpoint })?;
            Ok(Account {
                puuid: format!("{label}.{}", player.canonical),
                game_name: Some(player.game_name.clone()),
                tag_line: Some(player.tag_line.clone()),
            })
        })
    }

    fn summoner_by_puuid<'a>(
        &'a self,
        token: &'a ApiToken,
        _region: Region,
        puuid: &'a str,
    ) -> BoxFuture<'a, Result<Summoner>> {
        let endpoint = "summoner_by_puuid";
        self.serve(endpoint, token, move |world, label| {
            let player = world.scoped(endpoint, label, puuid, "")?;
            let hidden = matches!(player.rank, Some((_, Visibility::HiddenId)));
            Ok(Summoner {
                id: (!hidden).then(|| format!("{label}.sid-{}", player.canonical)),
                puuid: puuid.to_owned(),
                summoner_level: 412,
                profile_icon_id: Some(6),
            })
        })
    }

    fn match_ids<'a>(
        &'a self,
        token: &'a ApiToken,
        _region: Region,
        puuid: &'a str,
        start: u32,
        count: u32,
    ) -> BoxFuture<'a, Result<Vec<String>>> {
        let endpoint = "match_ids";
        self.serve(endpoint, token, move |world, label| {
            let player = world.scoped(endpoint, label, puuid, "")?;
            Ok(player
                .matches
                .iter()
                .skip(start as usize)
                .take(count as usize)
                .cloned()
                .collect())
        })
    }

    fn match_detail<'a>(
        &'a self,
        token: &'a ApiToken,
        _region: Region,
        match_id: &'a str,
    ) -> BoxFuture<'a, Result<Value>> {
        let endpoint = "match_detail";
        self.serve(endpoint, token, move |world, label| {
            let participants: Vec<Value> = world
                .players
                .iter()
                .filter(|p| p.matches.iter().any(|id| id == match_id))
                .map(|p| {
                    json!({
                        "puuid": format!("{label}.{}", p.canonical),
                        "summonerId": format!("{label}.sid-{}", p.canonical),
                        "riotIdGameName": p.game_name,
                        "riotIdTagline": p.tag_line,
                    })
                })
                .collect();
            if participants.is_empty() {
                return Err(ExtractError::NotFound { endpoint }.into());
            }
            Ok(json!({
                "metadata": { "matchId": match_id },
                "info": { "gameMode": "CLASSIC", "participants": participants },
            }))
        })
    }

    fn league_entries<'a>(
        &'a self,
        token: &'a ApiToken,
        _region: Region,
        summoner_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<LeagueEntry>>> {
        let endpoint = "league_entries";
        self.serve(endpoint, token, move |world, label| {
            let player = world.scoped(endpoint, label, summoner_id, "sid-")?;
            Ok(match &player.rank {
                Some((entry, Visibility::Direct | Visibility::HiddenId)) => {
                    vec![scoped_entry(entry, label, &player.canonical)]
                }
                _ => Vec::new(),
            })
        })
    }

    fn league_page<'a>(
        &'a self,
        token: &'a ApiToken,
        region: Region,
        queue: &'a str,
        tier: &'a str,
        division: &'a str,
        page: u32,
    ) -> BoxFuture<'a, Result<Vec<LeagueEntry>>> {
        let page_size = self.page_size;
        self.serve("league_page", token, move |world, label| {
            let mut listing: Vec<LeagueEntry> = world
                .players
                .iter()
                .filter(|p| p.region == region)
                .filter_map(|p| {
                    let (entry, _) = p.rank.as_ref()?;
                    (entry.queue_type == queue && entry.tier == tier && entry.rank == division)
                        .then(|| scoped_entry(entry, label, &p.canonical))
                })
                .collect();
            listing.sort_by(|a, b| a.puuid.cmp(&b.puuid));
            let skip = (page.max(1) as usize - 1) * page_size;
            Ok(listing.into_iter().skip(skip).take(page_size).collect())
        })
    }
}
