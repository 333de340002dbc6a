//! Deployment tier: the set of regions and fleet-wide aggregation over them.

use crate::error::RegistryError;
use crate::policy::AvailabilityPolicy;
use crate::region::{DisconnectedServer, Region, RemovedServer, ReportOutcome, ServerSummary};
use crate::server::Server;
use crate::snapshot::{GameInfo, ServerReport, ServerStatus};
use crate::types::{is_valid_region, ConnectionId, DeploymentTier};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub type RegionMap<T> = BTreeMap<String, T>;

/// All regions of one deployment tier.
///
/// Regions are created lazily from the allow-list and kept in first-use order.
#[derive(Debug)]
pub struct Environment {
    tier: DeploymentTier,
    policy: AvailabilityPolicy,
    regions: Vec<Region>,
    index: HashMap<String, usize>,
}

impl Environment {
    pub fn new(tier: DeploymentTier, policy: AvailabilityPolicy) -> Self {
        Self {
            tier,
            policy,
            regions: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn tier(&self) -> DeploymentTier {
        self.tier
    }

    pub fn policy(&self) -> &AvailabilityPolicy {
        &self.policy
    }

    pub fn is_development(&self) -> bool {
        self.policy.development_mode
    }

    pub fn set_target_revision(&mut self, revision: Option<String>) {
        self.policy.target_revision = revision;
    }

    /// Returns the region, creating it on first use.
    ///
    /// Identifiers outside the allow-list are rejected and never created.
    pub fn get_region(&mut self, id: &str) -> Result<&mut Region, RegistryError> {
        if let Some(&i) = self.index.get(id) {
            return Ok(&mut self.regions[i]);
        }
        if !is_valid_region(id) {
            return Err(RegistryError::UnknownRegion(id.to_string()));
        }
        debug!(region = id, tier = %self.tier, "Creating region");
        let i = self.regions.len();
        self.index.insert(id.to_string(), i);
        self.regions.push(Region::new(id));
        Ok(&mut self.regions[i])
    }

    /// Read-only lookup; never creates.
    pub fn region(&self, id: &str) -> Option<&Region> {
        self.index.get(id).map(|&i| &self.regions[i])
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn server(&self, region: &str, host: &str) -> Option<&Server> {
        self.region(region)?.server(host)
    }

    pub fn server_mut(&mut self, region: &str, host: &str) -> Result<&mut Server, RegistryError> {
        let region_ref = match self.index.get(region) {
            Some(&i) => &mut self.regions[i],
            None if is_valid_region(region) => {
                return Err(RegistryError::UnknownServer {
                    region: region.to_string(),
                    host: host.to_string(),
                })
            }
            None => return Err(RegistryError::UnknownRegion(region.to_string())),
        };
        region_ref
            .server_mut(host)
            .ok_or_else(|| RegistryError::UnknownServer {
                region: region.to_string(),
                host: host.to_string(),
            })
    }

    /// Upserts a state report into the region it names.
    ///
    /// A host lives in one region at a time. A report naming a host that is
    /// still registered in another region is rejected; the host can move only
    /// after its old entry is removed on disconnect.
    pub fn apply_report(
        &mut self,
        report: ServerReport,
        connection: Option<ConnectionId>,
    ) -> Result<ReportOutcome, RegistryError> {
        if let Some(existing) = self
            .regions
            .iter()
            .find(|region| region.id() != report.region && region.server(&report.host).is_some())
        {
            return Err(RegistryError::RegisteredElsewhere {
                region: existing.id().to_string(),
                host: report.host,
            });
        }
        let region = self.get_region(&report.region)?;
        Ok(region.apply_report(report, connection))
    }

    pub fn remove_server(&mut self, region: &str, host: &str) -> Option<RemovedServer> {
        let i = *self.index.get(region)?;
        self.regions[i].remove_server(host)
    }

    /// Resolves the region and runs first-fit selection under the current policy.
    pub fn request_game(
        &mut self,
        region: &str,
        mode: Option<&str>,
        uid: Option<&str>,
    ) -> Result<String, RegistryError> {
        let policy = self.policy.clone();
        self.get_region(region)?.route_player(uid, mode, &policy)
    }

    /// Full fleet scan for the server hosting `game_id`. First match wins.
    pub fn find_sector(&self, game_id: &str) -> Option<&Server> {
        self.regions
            .iter()
            .flat_map(Region::servers)
            .find(|server| server.has_game(game_id))
    }

    pub fn find_game_host(&self, game_id: &str) -> Option<String> {
        self.find_sector(game_id).map(|server| server.host().to_string())
    }

    pub fn servers_by_region(&self) -> RegionMap<BTreeMap<String, ServerSummary>> {
        self.regions
            .iter()
            .map(|region| (region.id().to_string(), region.servers_summary()))
            .collect()
    }

    /// Region -> `{ <first host>: true }`, empty for a region without servers.
    pub fn one_server_by_region(&self) -> RegionMap<BTreeMap<String, bool>> {
        self.regions
            .iter()
            .map(|region| {
                let entry = region
                    .first_server_host()
                    .map(|host| (host.to_string(), true))
                    .into_iter()
                    .collect();
                (region.id().to_string(), entry)
            })
            .collect()
    }

    pub fn socket_ids(&self) -> Vec<ConnectionId> {
        self.regions.iter().flat_map(Region::socket_ids).collect()
    }

    pub fn total_online_count(&self) -> u32 {
        self.regions
            .iter()
            .map(Region::player_count)
            .fold(0, u32::saturating_add)
    }

    pub fn online_count_by_region(&self) -> RegionMap<u32> {
        self.regions
            .iter()
            .map(|region| (region.id().to_string(), region.player_count()))
            .collect()
    }

    /// Every non-private game fleet-wide, merged into one map.
    pub fn public_games(&self) -> BTreeMap<String, GameInfo> {
        self.regions
            .iter()
            .flat_map(Region::servers)
            .flat_map(Server::public_games)
            .map(|(id, game)| (id.clone(), game.clone()))
            .collect()
    }

    pub fn server_status(&self) -> RegionMap<BTreeMap<String, ServerStatus>> {
        self.regions
            .iter()
            .map(|region| {
                let statuses = region
                    .servers()
                    .map(|server| (server.host().to_string(), server.status()))
                    .collect();
                (region.id().to_string(), statuses)
            })
            .collect()
    }

    pub fn disconnected_servers(&self) -> RegionMap<BTreeMap<String, DisconnectedServer>> {
        self.regions
            .iter()
            .map(|region| (region.id().to_string(), region.disconnected_servers().clone()))
            .collect()
    }

    pub fn disconnected_server_count(&self) -> usize {
        self.regions
            .iter()
            .map(|region| region.disconnected_servers().len())
            .sum()
    }

    /// Drops a player connection from every region's chat subscribers.
    pub fn remove_socket_everywhere(&mut self, connection: ConnectionId) {
        for region in &mut self.regions {
            region.remove_socket(connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::new(
            DeploymentTier::Production,
            AvailabilityPolicy::default().with_target_revision("r1"),
        )
    }

    fn report(host: &str, region: &str, players: u32) -> ServerReport {
        let mut report = ServerReport::new(host, region);
        report.memory = 100.0;
        report.player_count = players;
        report.revision = Some("r1".into());
        report
    }

    #[test]
    fn unknown_region_is_never_created() {
        let mut env = env();
        assert_eq!(
            env.get_region("xyz").unwrap_err(),
            RegistryError::UnknownRegion("xyz".into())
        );
        assert!(env.region("xyz").is_none());
        assert_eq!(env.request_game("xyz", None, None).unwrap_err().reason(), "invalid region");
        assert_eq!(env.regions().count(), 0);
    }

    #[test]
    fn request_game_end_to_end() {
        let mut env = env();
        assert_eq!(
            env.request_game("nyc1", Some("ffa"), None).unwrap_err().reason(),
            "servers full"
        );

        env.apply_report(report("h1", "nyc1", 0), None).unwrap();
        assert_eq!(env.request_game("nyc1", Some("ffa"), None).unwrap(), "h1");

        let mut hot = report("h1", "nyc1", 0);
        hot.memory = 900.0;
        env.apply_report(hot, None).unwrap();
        assert!(env.request_game("nyc1", Some("ffa"), None).is_err());
    }

    #[test]
    fn target_revision_change_is_seen_by_next_selection() {
        let mut env = env();
        env.apply_report(report("h1", "nyc1", 0), None).unwrap();
        env.set_target_revision(Some("r2".into()));
        assert!(env.request_game("nyc1", None, None).is_err());
        env.set_target_revision(None);
        assert!(env.request_game("nyc1", None, None).is_ok());
    }

    #[test]
    fn aggregations_tolerate_empty_regions() {
        let mut env = env();
        env.get_region("lon1").unwrap();
        env.apply_report(report("h1", "nyc1", 3), None).unwrap();
        env.apply_report(report("h2", "nyc1", 2), None).unwrap();

        let one = env.one_server_by_region();
        assert!(one["lon1"].is_empty());
        assert_eq!(one["nyc1"].keys().collect::<Vec<_>>(), vec!["h1"]);

        assert_eq!(env.total_online_count(), 5);
        assert_eq!(env.online_count_by_region()["lon1"], 0);
        assert_eq!(env.servers_by_region()["nyc1"].len(), 2);
        assert!(env.server_status()["lon1"].is_empty());
    }

    #[test]
    fn find_sector_scans_every_region() {
        let mut env = env();
        env.apply_report(report("h1", "nyc1", 0), None).unwrap();
        let mut with_game = report("h2", "ams3", 0);
        with_game.games.insert("g42".into(), GameInfo::private());
        with_game.games.insert("g7".into(), GameInfo::public());
        env.apply_report(with_game, None).unwrap();

        assert_eq!(env.find_game_host("g42").as_deref(), Some("h2"));
        assert!(env.find_sector("missing").is_none());

        let games = env.public_games();
        assert_eq!(games.keys().collect::<Vec<_>>(), vec!["g7"]);
    }

    #[test]
    fn server_mut_distinguishes_region_and_host_errors() {
        let mut env = env();
        env.apply_report(report("h1", "nyc1", 0), None).unwrap();
        assert!(env.server_mut("nyc1", "h1").is_ok());
        assert_eq!(env.server_mut("nyc1", "h9").unwrap_err().reason(), "server not found");
        assert_eq!(env.server_mut("xyz", "h1").unwrap_err().reason(), "invalid region");
    }

    #[test]
    fn sockets_are_removed_from_every_region() {
        let mut env = env();
        let conn = ConnectionId::new();
        env.get_region("nyc1").unwrap().add_socket(conn);
        env.get_region("sfo1").unwrap().add_socket(conn);
        assert_eq!(env.socket_ids().len(), 2);

        env.remove_socket_everywhere(conn);
        assert!(env.socket_ids().is_empty());
    }

    #[test]
    fn disconnect_archive_is_exposed() {
        let mut env = env();
        env.apply_report(report("h1", "nyc1", 4), None).unwrap();
        let removed = env.remove_server("nyc1", "h1").unwrap();
        assert!(removed.archived);
        assert_eq!(env.disconnected_server_count(), 1);
        assert!(env.disconnected_servers()["nyc1"].contains_key("h1"));
    }

    #[test]
    fn host_lives_in_one_region_at_a_time() {
        let mut env = env();
        env.apply_report(report("h1", "nyc1", 0), Some(ConnectionId::new()))
            .unwrap();

        let err = env
            .apply_report(report("h1", "sfo1", 0), Some(ConnectionId::new()))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::RegisteredElsewhere {
                region: "nyc1".into(),
                host: "h1".into(),
            }
        );
        assert_eq!(err.reason(), "server registered in another region");
        assert!(env.server("nyc1", "h1").is_some());
        assert!(env.server("sfo1", "h1").is_none());

        // Once the old entry is gone the host may register elsewhere.
        env.remove_server("nyc1", "h1").unwrap();
        assert_eq!(
            env.apply_report(report("h1", "sfo1", 0), None).unwrap(),
            ReportOutcome::Registered
        );
    }

    #[test]
    fn online_totals_saturate() {
        let mut env = env();
        env.apply_report(report("h1", "nyc1", u32::MAX), None).unwrap();
        env.apply_report(report("h2", "ams3", 1), None).unwrap();
        assert_eq!(env.total_online_count(), u32::MAX);
        assert_eq!(env.online_count_by_region()["ams3"], 1);
    }
}
