//! In-memory upstream used by unit tests. Models per-credential identity
//! namespaces: a subject's puuid as seen by credential `x` is `x.<canonical>`.

use crate::api::types::{Account, ApiToken, LeagueEntry, Summoner};
use crate::api::UpstreamApi;
use crate::error::ExtractError;
use crate::routing::Region;
use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RankVisibility {
    /// Returned by the per-summoner endpoint.
    Direct,
    /// Summoner lookups omit the id; only match participants carry it.
    RecoveredOnly,
    /// Per-summoner endpoint returns nothing; only the league listing has it.
    SweepOnly,
}

#[derive(Debug, Clone)]
pub(crate) struct ApiCall {
    pub endpoint: &'static str,
    pub credential: String,
    pub at: Instant,
}

#[derive(Debug, Clone)]
struct Player {
    canonical: String,
    game_name: String,
    tag_line: String,
    region: Region,
    matches: Vec<String>,
    entry: Option<(LeagueEntry, RankVisibility)>,
}

#[derive(Default)]
struct World {
    players: Vec<Player>,
    failures: HashMap<&'static str, VecDeque<ExtractError>>,
    calls: Vec<ApiCall>,
}

pub(crate) struct ScriptedApi {
    world: Mutex<World>,
    page_size: usize,
}

impl ScriptedApi {
    pub(crate) fn new() -> Self {
        Self {
            world: Mutex::new(World::default()),
            page_size: 2,
        }
    }

    /// Registers a player with `match_count` matches; returns the canonical id.
    pub(crate) fn add_player(
        &self,
        game_name: &str,
        tag_line: &str,
        region: Region,
        match_count: usize,
    ) -> String {
        let canonical = format!("puuid-{}", game_name.to_ascii_lowercase());
        let matches = (0..match_count)
            .map(|idx| format!("{}_{}_{idx}", region.platform().to_uppercase(), game_name))
            .collect();
        self.world.lock().unwrap().players.push(Player {
            canonical: canonical.clone(),
            game_name: game_name.to_owned(),
            tag_line: tag_line.to_owned(),
            region,
            matches,
            entry: None,
        });
        canonical
    }

    pub(crate) fn set_rank(&self, canonical: &str, tier: &str, visibility: RankVisibility) {
        self.set_entry(canonical, "RANKED_SOLO_5x5", tier, visibility);
    }

    pub(crate) fn set_entry(
        &self,
        canonical: &str,
        queue: &str,
        tier: &str,
        visibility: RankVisibility,
    ) {
        let mut world = self.world.lock().unwrap();
        let player = world
            .players
            .iter_mut()
            .find(|p| p.canonical == canonical)
            .expect("player registered");
        player.entry = Some((
            LeagueEntry {
                queue_type: queue.to_owned(),
                tier: tier.to_owned(),
                rank: "I".to_owned(),
                league_points: 900,
                wins: 120,
                losses: 80,
                summoner_id: None,
                puuid: None,
            },
            visibility,
        ));
    }

    pub(crate) fn namespace_puuid(&self, label: &str, canonical: &str) -> String {
        format!("{label}.{canonical}")
    }

    pub(crate) fn summoner_id(&self, label: &str, canonical: &str) -> String {
        format!("{label}.sid-{canonical}")
    }

    pub(crate) fn fail_next(&self, endpoint: &'static str, err: ExtractError) {
        self.world
            .lock()
            .unwrap()
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(err);
    }

    pub(crate) fn calls(&self) -> Vec<ApiCall> {
        self.world.lock().unwrap().calls.clone()
    }

    pub(crate) fn calls_to(&self, endpoint: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.endpoint == endpoint)
            .count()
    }

    fn begin(&self, endpoint: &'static str, token: &ApiToken) -> Result<std::sync::MutexGuard<'_, World>> {
        let mut world = self.world.lock().unwrap();
        world.calls.push(ApiCall {
            endpoint,
            credential: token.label().to_owned(),
            at: Instant::now(),
        });
        if let Some(err) = world.failures.get_mut(endpoint).and_then(VecDeque::pop_front) {
            return Err(err.into());
        }
        Ok(world)
    }

    fn decode<'w>(
        world: &'w World,
        endpoint: &'static str,
        token: &ApiToken,
        scoped: &str,
        prefix: &str,
    ) -> Result<&'w Player> {
        let (label, rest) = scoped
            .split_once('.')
            .ok_or(ExtractError::NotFound { endpoint })?;
        if label != token.label() {
            return Err(ExtractError::IdentityNamespaceMismatch { endpoint }.into());
        }
        let canonical = rest
            .strip_prefix(prefix)
            .ok_or(ExtractError::NotFound { endpoint })?;
        world
            .players
            .iter()
            .find(|p| p.canonical == canonical)
            .ok_or_else(|| ExtractError::NotFound { endpoint }.into())
    }
}

fn scoped_entry(entry: &LeagueEntry, label: &str, canonical: &str) -> LeagueEntry {
    let mut entry = entry.clone();
    entry.puuid = Some(format!("{label}.{canonical}"));
    entry.summoner_id = Some(format!("{label}.sid-{canonical}"));
    entry
}

impl UpstreamApi for ScriptedApi {
    fn account_by_riot_id<'a>(
        &'a self,
        token: &'a ApiToken,
        _region: Region,
        game_name: &'a str,
        tag_line: &'a str,
    ) -> BoxFuture<'a, Result<Account>> {
        Box::pin(async move {
            let endpoint = "account_by_riot_id";
            let world = self.begin(endpoint, token)?;
            let player = world
                .players
                .iter()
                .find(|p| {
                    p.game_name.eq_ignore_ascii_case(game_name)
                        && p.tag_line.eq_ignore_ascii_case(tag_line)
                })
                .ok_or(ExtractError::NotFound { endpoint })?;
            Ok(Account {
                puuid: format!("{}.{}", token.label(), player.canonical),
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
        Box::pin(async move {
            let endpoint = "summoner_by_puuid";
            let world = self.begin(endpoint, token)?;
            let player = Self::decode(&world, endpoint, token, puuid, "")?;
            let hides_id = matches!(player.entry, Some((_, RankVisibility::RecoveredOnly)));
            Ok(Summoner {
                id: (!hides_id).then(|| format!("{}.sid-{}", token.label(), player.canonical)),
                puuid: puuid.to_owned(),
                summoner_level: 30,
                profile_icon_id: Some(1),
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
        Box::pin(async move {
            let endpoint = "match_ids";
            let world = self.begin(endpoint, token)?;
            let player = Self::decode(&world, endpoint, token, puuid, "")?;
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
        Box::pin(async move {
            let endpoint = "match_detail";
            let world = self.begin(endpoint, token)?;
            let participants: Vec<Value> = world
                .players
                .iter()
                .filter(|p| p.matches.iter().any(|id| id == match_id))
                .map(|p| {
                    json!({
                        "puuid": format!("{}.{}", token.label(), p.canonical),
                        "summonerId": format!("{}.sid-{}", token.label(), p.canonical),
                        "riotIdGameName": p.game_name,
                    })
                })
                .collect();
            if participants.is_empty() {
                return Err(ExtractError::NotFound { endpoint }.into());
            }
            Ok(json!({
                "metadata": { "matchId": match_id },
                "info": { "participants": participants },
            }))
        })
    }

    fn league_entries<'a>(
        &'a self,
        token: &'a ApiToken,
        _region: Region,
        summoner_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<LeagueEntry>>> {
        Box::pin(async move {
            let endpoint = "league_entries";
            let world = self.begin(endpoint, token)?;
            let player = Self::decode(&world, endpoint, token, summoner_id, "sid-")?;
            Ok(match &player.entry {
                Some((entry, RankVisibility::Direct | RankVisibility::RecoveredOnly)) => {
                    vec![scoped_entry(entry, token.label(), &player.canonical)]
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
        Box::pin(async move {
            let world = self.begin("league_page", token)?;
            let mut listing: Vec<LeagueEntry> = world
                .players
                .iter()
                .filter(|p| p.region == region)
                .filter_map(|p| {
                    p.entry.as_ref().and_then(|(entry, _)| {
                        (entry.queue_type == queue && entry.tier == tier && entry.rank == division)
                            .then(|| scoped_entry(entry, token.label(), &p.canonical))
                    })
                })
                .collect();
            listing.sort_by(|a, b| a.puuid.cmp(&b.puuid));
            let skip = (page.max(1) as usize - 1) * self.page_size;
            Ok(listing.into_iter().skip(skip).take(self.page_size).collect())
        })
    }
}
