// src/pipeline/jobs.rs

//! Harvest and maintenance jobs, one per command.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use super::harvest::{HarvestSummary, Harvester};
use super::retry::RetryPolicy;
use crate::error::{AppError, Result};
use crate::models::{
    AccountKind, Config, Corpus, RecordKind, RelationsKind, RemapTable, StaffKind, SubjectKind,
};
use crate::services::{
    AccountSource, ApiClient, MonthSource, RelationsSource, StaffSource, SubjectSource, UnitSource,
};
use crate::storage::{CorpusStore, LocalStorage};
use crate::utils::progress::{NoProgress, Progress};
use crate::utils::{Month, Selection};

/// Persisted datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Anime,
    Persons,
    Relations,
    Users,
}

impl Dataset {
    pub const ALL: [Dataset; 4] = [
        Dataset::Anime,
        Dataset::Persons,
        Dataset::Relations,
        Dataset::Users,
    ];
}

impl FromStr for Dataset {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anime" | "subjects" | "catalog" => Ok(Dataset::Anime),
            "persons" | "staff" | "subject_persons" => Ok(Dataset::Persons),
            "relations" | "subject_relations" => Ok(Dataset::Relations),
            "users" | "user" | "accounts" => Ok(Dataset::Users),
            other => Err(AppError::validation(format!("unknown dataset '{other}'"))),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dataset::Anime => "anime",
            Dataset::Persons => "subject_persons",
            Dataset::Relations => "subject_relations",
            Dataset::Users => "user",
        })
    }
}

/// Size of one persisted dataset.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    pub dataset: Dataset,
    pub path: PathBuf,
    pub entries: usize,
    /// Surrogate ids are exactly `1..=entries`
    pub dense: bool,
}

/// What an account maintenance pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub accounts: usize,
    /// Accounts removed because every list was empty
    pub pruned: Vec<u64>,
    /// Accounts whose surrogate id changed
    pub renumbered: usize,
}

/// Shared context for every job.
pub struct Jobs {
    config: Arc<Config>,
    api: Arc<ApiClient>,
    storage: LocalStorage,
    progress: Arc<dyn Progress>,
}

impl Jobs {
    pub fn new(config: Arc<Config>, api: Arc<ApiClient>, storage: LocalStorage) -> Self {
        Self {
            config,
            api,
            storage,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    fn subject_kind(&self) -> Arc<SubjectKind> {
        Arc::new(SubjectKind::new(self.config.harvest.subject_type))
    }

    async fn load<K: RecordKind>(&self, kind: K) -> Result<Corpus<K>> {
        self.storage.load_corpus(Arc::new(kind)).await
    }

    /// Immutable catalog snapshot for dependent kinds.
    async fn catalog_snapshot(&self) -> Result<Arc<RemapTable>> {
        let catalog = self.storage.load_corpus(self.subject_kind()).await?;
        if catalog.is_empty() {
            return Err(AppError::config(
                "catalog corpus is empty; harvest subjects first",
            ));
        }
        Ok(Arc::new(RemapTable::project(&catalog)))
    }

    async fn harvest<S: UnitSource>(
        &self,
        source: S,
        corpus: &mut Corpus<S::Kind>,
        units: Vec<S::Unit>,
        attempts: u8,
        concurrency: usize,
        catalog: Option<Arc<RemapTable>>,
    ) -> Result<HarvestSummary> {
        let mut harvester = Harvester::new(Arc::new(source), &self.storage)
            .concurrency(concurrency)
            .retry(RetryPolicy::new(attempts))
            .chunk_size(self.config.harvest.chunk_size)
            .progress(Arc::clone(&self.progress));
        if let Some(catalog) = catalog {
            harvester = harvester.catalog(catalog);
        }

        let summary = harvester.run(corpus, units).await?;
        self.storage
            .save_remap(corpus.kind(), &RemapTable::project(corpus))
            .await?;
        log::info!("{summary}");
        Ok(summary)
    }

    /// Catalog entries by id; `all` re-harvests every stored entry.
    pub async fn harvest_subjects(&self, selection: &Selection) -> Result<HarvestSummary> {
        let mut catalog = self.storage.load_corpus(self.subject_kind()).await?;
        let units = match selection {
            Selection::Ids(ids) => ids.clone(),
            Selection::All => sorted(catalog.keys()),
            Selection::Empty => {
                return Err(AppError::validation("'empty' only applies to users"));
            }
        };

        let source = SubjectSource::new(Arc::clone(&self.api));
        self.harvest(
            source,
            &mut catalog,
            units,
            self.config.retry.catalog,
            self.config.harvest.concurrency(),
            None,
        )
        .await
    }

    /// Catalog entries by air month.
    pub async fn harvest_months(&self, months: Vec<Month>) -> Result<HarvestSummary> {
        let mut catalog = self.storage.load_corpus(self.subject_kind()).await?;
        let source = MonthSource::new(Arc::clone(&self.api), self.config.harvest.subject_type);
        self.harvest(
            source,
            &mut catalog,
            months,
            self.config.retry.catalog,
            self.config.harvest.concurrency(),
            None,
        )
        .await
    }

    /// Staff lists; `all` covers every catalog entry.
    pub async fn harvest_staff(&self, selection: &Selection) -> Result<HarvestSummary> {
        let catalog = self.catalog_snapshot().await?;
        let units = dependent_units(selection, &catalog)?;
        let mut corpus = self.load(StaffKind).await?;
        let source = StaffSource::new(Arc::clone(&self.api));
        self.harvest(
            source,
            &mut corpus,
            units,
            self.config.retry.staff,
            self.config.harvest.concurrency(),
            Some(catalog),
        )
        .await
    }

    /// Related subjects; `all` covers every catalog entry.
    pub async fn harvest_relations(&self, selection: &Selection) -> Result<HarvestSummary> {
        let catalog = self.catalog_snapshot().await?;
        let units = dependent_units(selection, &catalog)?;
        let mut corpus = self.load(RelationsKind).await?;
        let source = RelationsSource::new(Arc::clone(&self.api));
        self.harvest(
            source,
            &mut corpus,
            units,
            self.config.retry.relations,
            self.config.harvest.concurrency(),
            Some(catalog),
        )
        .await
    }

    /// Account collections.
    ///
    /// `existing_only` restricts an id list to accounts already stored.
    pub async fn harvest_accounts(
        &self,
        selection: &Selection,
        existing_only: bool,
    ) -> Result<HarvestSummary> {
        let catalog = self.catalog_snapshot().await?;
        let mut accounts = self.load(AccountKind).await?;

        let units = match selection {
            Selection::All => sorted(accounts.keys()),
            Selection::Empty => sorted(accounts.empty_keys()),
            Selection::Ids(ids) if existing_only => {
                let known: HashSet<u64> = accounts.keys().into_iter().collect();
                let units: Vec<u64> = ids.iter().copied().filter(|id| known.contains(id)).collect();
                if units.len() < ids.len() {
                    log::info!(
                        "user: {} requested ids are not stored yet and were left out",
                        ids.len() - units.len()
                    );
                }
                units
            }
            Selection::Ids(ids) => ids.clone(),
        };

        let names = accounts
            .entries()
            .iter()
            .filter_map(|entry| {
                entry
                    .record
                    .name
                    .clone()
                    .map(|name| (entry.record.user_id, name))
            })
            .collect();
        let source = AccountSource::new(Arc::clone(&self.api), self.config.harvest.subject_type)
            .with_names(names);

        self.harvest(
            source,
            &mut accounts,
            units,
            self.config.retry.collections,
            self.config.harvest.collection_concurrency,
            Some(catalog),
        )
        .await
    }

    /// Rewrite the remap table of a dataset from its corpus.
    pub async fn remap(&self, dataset: Dataset) -> Result<usize> {
        match dataset {
            Dataset::Anime => self.remap_kind(self.subject_kind()).await,
            Dataset::Persons => self.remap_kind(Arc::new(StaffKind)).await,
            Dataset::Relations => self.remap_kind(Arc::new(RelationsKind)).await,
            Dataset::Users => self.remap_kind(Arc::new(AccountKind)).await,
        }
    }

    async fn remap_kind<K: RecordKind>(&self, kind: Arc<K>) -> Result<usize> {
        let corpus = self.storage.load_corpus(kind).await?;
        let table = RemapTable::project(&corpus);
        self.storage.save_remap(corpus.kind(), &table).await?;
        Ok(table.len())
    }

    /// Renumber the catalog `1..=N` by natural key, then re-resolve every
    /// dependent dataset against the new ids.
    pub async fn renumber(&self) -> Result<usize> {
        let mut catalog = self.storage.load_corpus(self.subject_kind()).await?;
        let changed = catalog.renumber();
        self.storage.save_corpus(&catalog).await?;

        let table = RemapTable::project(&catalog);
        self.storage.save_remap(catalog.kind(), &table).await?;
        log::info!(
            "anime: {} entries renumbered, {} ids changed",
            catalog.len(),
            changed
        );

        self.relink_dependent(StaffKind, &table).await?;
        self.relink_dependent(RelationsKind, &table).await?;
        self.relink_dependent(AccountKind, &table).await?;
        Ok(changed)
    }

    async fn relink_dependent<K: RecordKind>(&self, kind: K, catalog: &RemapTable) -> Result<()> {
        let mut corpus = self.load(kind).await?;
        if corpus.is_empty() {
            return Ok(());
        }

        let removed = corpus.relink(catalog);
        if !removed.is_empty() {
            log::info!(
                "{}: {} entries no longer in the catalog were removed",
                corpus.kind().dataset(),
                removed.len()
            );
            corpus.renumber();
        }

        self.storage.save_corpus(&corpus).await?;
        self.storage
            .save_remap(corpus.kind(), &RemapTable::project(&corpus))
            .await
    }

    /// Re-resolve accounts, drop empty ones and renumber.
    pub async fn maintain_accounts(&self) -> Result<MaintenanceReport> {
        let catalog = self.catalog_snapshot().await?;
        let mut accounts = self.load(AccountKind).await?;

        accounts.relink(&catalog);
        let pruned = accounts.prune_empty();
        for user_id in &pruned {
            log::info!("user: {user_id} has no collections left, removed");
        }
        let renumbered = accounts.renumber();

        self.storage.save_corpus(&accounts).await?;
        self.storage
            .save_remap(accounts.kind(), &RemapTable::project(&accounts))
            .await?;

        Ok(MaintenanceReport {
            accounts: accounts.len(),
            pruned,
            renumbered,
        })
    }

    /// Corpus sizes of every dataset.
    pub async fn info(&self) -> Result<Vec<DatasetInfo>> {
        let mut infos = Vec::with_capacity(Dataset::ALL.len());
        for dataset in Dataset::ALL {
            let info = match dataset {
                Dataset::Anime => self.describe(dataset, self.subject_kind()).await?,
                Dataset::Persons => self.describe(dataset, Arc::new(StaffKind)).await?,
                Dataset::Relations => self.describe(dataset, Arc::new(RelationsKind)).await?,
                Dataset::Users => self.describe(dataset, Arc::new(AccountKind)).await?,
            };
            infos.push(info);
        }
        Ok(infos)
    }

    async fn describe<K: RecordKind>(&self, dataset: Dataset, kind: Arc<K>) -> Result<DatasetInfo> {
        let corpus = self.storage.load_corpus(kind).await?;
        Ok(DatasetInfo {
            dataset,
            path: self.storage.corpus_path(&dataset.to_string()),
            entries: corpus.len(),
            dense: corpus.is_dense(),
        })
    }
}

fn sorted(mut keys: Vec<u64>) -> Vec<u64> {
    keys.sort_unstable();
    keys
}

fn dependent_units(selection: &Selection, catalog: &RemapTable) -> Result<Vec<u64>> {
    match selection {
        Selection::Ids(ids) => Ok(ids.clone()),
        Selection::All => Ok(catalog.rows().map(|(_, key)| key).collect()),
        Selection::Empty => Err(AppError::validation("'empty' only applies to users")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use url::Url;

    use super::*;
    use crate::models::Subject;
    use crate::services::testing::{Reply, ScriptedTransport};

    fn subject_body(id: u64, rank: u32) -> Reply {
        Reply::ok(
            serde_json::json!({ "id": id, "type": 2, "name": format!("s{id}"), "rating": { "rank": rank } })
                .to_string(),
        )
    }

    fn jobs(dir: &std::path::Path, transport: ScriptedTransport) -> Jobs {
        jobs_over(dir, Arc::new(transport))
    }

    fn jobs_over(dir: &std::path::Path, transport: Arc<ScriptedTransport>) -> Jobs {
        let api = ApiClient::new(transport, Url::parse("https://api.example.test/v0/").unwrap())
            .with_site(Url::parse("https://site.example.test/").unwrap())
            .with_paging(40, Duration::ZERO);
        let mut config = Config::default();
        config.harvest.max_concurrent = 2;
        config.harvest.chunk_size = 2;
        Jobs::new(Arc::new(config), Arc::new(api), LocalStorage::new(dir))
    }

    fn catalog_transport() -> ScriptedTransport {
        ScriptedTransport::new()
            .route("/v0/subjects/30", vec![subject_body(30, 1)])
            .route("/v0/subjects/10", vec![subject_body(10, 2)])
            .route("/v0/subjects/20", vec![subject_body(20, 0)])
            .route("/v0/subjects/40", vec![subject_body(41, 5)])
            .route(
                "/v0/subjects/30/persons",
                vec![Reply::ok(r#"[{"id": 1, "name": "director", "relation": "监督"}]"#)],
            )
            .route("/v0/subjects/10/persons", vec![Reply::ok("[]")])
    }

    #[tokio::test]
    async fn subjects_then_staff_resolve_through_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(dir.path(), catalog_transport());

        let summary = jobs
            .harvest_subjects(&Selection::Ids(vec![30, 10, 20, 40, 50]))
            .await
            .unwrap();
        assert_eq!(summary.inserted(), 2);
        assert_eq!(summary.rejected(), 2);
        assert_eq!(summary.skipped(), 1);

        let remap = std::fs::read_to_string(dir.path().join("anime_remap.csv")).unwrap();
        assert!(remap.starts_with("project_id,original_id\n"));
        assert_eq!(remap.lines().count(), 3);

        let staff = jobs.harvest_staff(&Selection::All).await.unwrap();
        assert_eq!(staff.inserted(), 2);

        let corpus = jobs.load(StaffKind).await.unwrap();
        let catalog = jobs.storage.load_corpus(jobs.subject_kind()).await.unwrap();
        for entry in corpus.entries() {
            let subject = catalog.get(entry.record.id).unwrap();
            assert_eq!(entry.record.subject_project_id, subject.project_id);
        }

        let skipped = std::fs::read_to_string(dir.path().join("logs/skipped_anime.csv")).unwrap();
        assert_eq!(skipped.lines().count(), 4);
    }

    #[tokio::test]
    async fn renumber_relinks_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(dir.path(), catalog_transport());

        jobs.harvest_subjects(&Selection::Ids(vec![30])).await.unwrap();
        jobs.harvest_subjects(&Selection::Ids(vec![10])).await.unwrap();
        jobs.harvest_staff(&Selection::Ids(vec![30, 10])).await.unwrap();

        // 30 was allocated first; sorting by key swaps the two ids.
        assert_eq!(jobs.renumber().await.unwrap(), 2);

        let staff = jobs.load(StaffKind).await.unwrap();
        assert_eq!(staff.get(10).unwrap().record.subject_project_id, 1);
        assert_eq!(staff.get(30).unwrap().record.subject_project_id, 2);
        assert_eq!(jobs.remap(Dataset::Persons).await.unwrap(), 2);

        let infos = jobs.info().await.unwrap();
        let sizes: Vec<(Dataset, usize, bool)> = infos
            .iter()
            .map(|info| (info.dataset, info.entries, info.dense))
            .collect();
        assert_eq!(
            sizes,
            [
                (Dataset::Anime, 2, true),
                (Dataset::Persons, 2, true),
                (Dataset::Relations, 0, true),
                (Dataset::Users, 0, true),
            ]
        );
    }

    fn with_account(
        mut transport: ScriptedTransport,
        segment: &str,
        collect: &str,
    ) -> ScriptedTransport {
        for code in 1..=5u8 {
            let body = if code == 2 { collect } else { r#"{"data": []}"# };
            let target = format!(
                "/v0/users/{segment}/collections?subject_type=2&type={code}&limit=40&offset=0"
            );
            transport = transport.route(&target, vec![Reply::ok(body)]);
        }
        transport
    }

    fn requests_to(transport: &ScriptedTransport, target: &str) -> usize {
        transport.requests().iter().filter(|r| *r == target).count()
    }

    #[tokio::test]
    async fn relations_resolve_through_catalog_and_reject_dangling() {
        let transport = catalog_transport()
            .route(
                "/v0/subjects/30/subjects",
                vec![Reply::ok(r#"[{"id": 10, "relation": "前传"}]"#)],
            )
            .route("/v0/subjects/10/subjects", vec![Reply::ok("[]")])
            .route("/v0/subjects/99/subjects", vec![Reply::ok("[]")]);
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(dir.path(), transport);

        jobs.harvest_subjects(&Selection::Ids(vec![30, 10]))
            .await
            .unwrap();
        let summary = jobs
            .harvest_relations(&Selection::Ids(vec![30, 10, 99]))
            .await
            .unwrap();

        assert_eq!(summary.inserted(), 2);
        assert_eq!(summary.rejected(), 1);

        let relations = jobs.load(RelationsKind).await.unwrap();
        let record = &relations.get(30).unwrap().record;
        assert_eq!(record.subject_project_id, 2);
        assert_eq!(record.relations[0].id, 10);
        assert!(relations.get(99).is_none());

        let remap =
            std::fs::read_to_string(dir.path().join("subject_relations_remap.csv")).unwrap();
        assert_eq!(remap, "project_id,original_id\n1,10\n2,30\n");
    }

    #[tokio::test]
    async fn accounts_store_usernames_and_honour_selections() {
        let mut transport = catalog_transport()
            .route("/user/7", vec![Reply::Redirect("/user/sai".into())]);
        transport = with_account(
            transport,
            "sai",
            r#"{"data": [{"subject_id": 10, "type": 2, "rate": 8}, {"subject_id": 99, "type": 2}]}"#,
        );
        transport = with_account(transport, "8", r#"{"data": []}"#);
        let transport = Arc::new(transport);
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs_over(dir.path(), transport.clone());

        jobs.harvest_subjects(&Selection::Ids(vec![30, 10]))
            .await
            .unwrap();

        let first = jobs
            .harvest_accounts(&Selection::Ids(vec![7, 8]), false)
            .await
            .unwrap();
        assert_eq!(first.inserted(), 2);

        let accounts = jobs.load(AccountKind).await.unwrap();
        let sai = &accounts.get(7).unwrap().record;
        assert_eq!(sai.name.as_deref(), Some("sai"));
        assert_eq!(sai.collect.len(), 1);
        assert_eq!(sai.collect[0].project_id, 1);
        assert_eq!(accounts.get(8).unwrap().record.name, None);

        let empty = jobs
            .harvest_accounts(&Selection::Empty, false)
            .await
            .unwrap();
        assert_eq!(empty.attempted(), 1);
        assert_eq!(requests_to(&transport, "/user/8"), 2);

        let known = jobs
            .harvest_accounts(&Selection::Ids(vec![7, 9]), true)
            .await
            .unwrap();
        assert_eq!(known.attempted(), 1);
        assert_eq!(known.unchanged(), 1);

        jobs.harvest_accounts(&Selection::All, false).await.unwrap();
        assert_eq!(requests_to(&transport, "/user/7"), 1);
        assert_eq!(jobs.load(AccountKind).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn maintenance_prunes_emptied_accounts_and_renumbers() {
        let mut transport = catalog_transport();
        transport = with_account(transport, "7", r#"{"data": [{"subject_id": 30, "type": 2}]}"#);
        transport = with_account(transport, "8", r#"{"data": []}"#);
        transport = with_account(transport, "5", r#"{"data": [{"subject_id": 10, "type": 2}]}"#);
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(dir.path(), transport);

        jobs.harvest_subjects(&Selection::Ids(vec![30, 10]))
            .await
            .unwrap();
        // Chunks of two: 7 and 8 are allocated before 5.
        jobs.harvest_accounts(&Selection::Ids(vec![8, 7, 5]), false)
            .await
            .unwrap();
        let accounts = jobs.load(AccountKind).await.unwrap();
        assert_eq!(accounts.get(5).unwrap().project_id, 3);

        let mut catalog = Corpus::new(jobs.subject_kind());
        catalog.merge(
            serde_json::from_value::<Subject>(serde_json::json!({
                "id": 10, "type": 2, "name": "s10", "rating": { "rank": 2 }
            }))
            .unwrap(),
        );
        jobs.storage.save_corpus(&catalog).await.unwrap();

        let mut report = jobs.maintain_accounts().await.unwrap();
        report.pruned.sort_unstable();
        assert_eq!(
            report,
            MaintenanceReport {
                accounts: 1,
                pruned: vec![7, 8],
                renumbered: 1,
            }
        );

        let accounts = jobs.load(AccountKind).await.unwrap();
        assert!(accounts.is_dense());
        assert_eq!(accounts.get(5).unwrap().record.collect[0].project_id, 1);
        let remap = std::fs::read_to_string(dir.path().join("user_remap.csv")).unwrap();
        assert_eq!(remap, "project_id,user_id\n1,5\n");
    }

    #[tokio::test]
    async fn dependents_require_a_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = jobs(dir.path(), ScriptedTransport::new());
        let err = jobs.harvest_staff(&Selection::All).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn dataset_names_parse() {
        assert_eq!("staff".parse::<Dataset>().unwrap(), Dataset::Persons);
        assert_eq!(Dataset::Users.to_string(), "user");
        assert!("books".parse::<Dataset>().is_err());
    }
}
