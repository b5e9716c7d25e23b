//! Integration tests for larder
//!
//! These wire configuration, the refresher and the stores together the way
//! the binary does.

use larder_config::parse_config;
use larder_refresh::{
    DEFAULT_FETCH_TIMEOUT, EnsureOutcome, PeriodicResourceRefresher, RefresherOptions,
    ResourceRegistry, UrlFetcher,
};
use larder_store::{
    Access, FlushOutcome, KeyedHandleCache, OwnerToken, RecordCodec, RecordStore, SqliteFactory,
    Store, StoreResult,
};
use larder_util::{ChannelKey, RecordId, Vars, standard_vars, substitute};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;

fn config_for(data_dir: &Path, source: &Path) -> String {
    let url = url::Url::from_file_path(source).unwrap();
    format!(
        r##"
config_version = 1

[service]
data_dir = "{}"
max_concurrent_fetches = 2
channel_specific = true

[channels."#Shared"]
channel_specific = false

[[resources]]
name = "motd"
url = "{}"
refresh_seconds = 3600
"##,
        data_dir.display(),
        url
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_configured_resource_is_fetched() {
    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("motd.txt");
    fs::write(&source, "Welcome to $channel, today is $monthname").unwrap();

    let data_dir = tempfile::tempdir().unwrap();
    let settings = parse_config(&config_for(data_dir.path(), &source)).unwrap();

    let refresher = PeriodicResourceRefresher::new(
        RefresherOptions::from(&settings.service),
        ResourceRegistry::from_specs(&settings.resources).unwrap(),
        Arc::new(UrlFetcher::new(DEFAULT_FETCH_TIMEOUT).unwrap()),
        Handle::current(),
    )
    .unwrap();
    refresher.wait_idle().await;

    assert_eq!(refresher.ensure_fresh("motd").unwrap(), EnsureOutcome::Fresh);
    let local = refresher.local_path("motd").unwrap();
    let template = fs::read_to_string(local).unwrap();

    let now = chrono::Local::now();
    let mut vars = standard_vars(now);
    let mut extra = Vars::new();
    extra.insert("channel", "#rust");
    vars.extend(extra);

    let text = substitute(&vars, &template);
    assert_eq!(
        text,
        format!("Welcome to #rust, today is {}", now.format("%b"))
    );
}

#[test]
fn test_channel_overrides_pick_database_placement() {
    let data_dir = tempfile::tempdir().unwrap();
    let source = data_dir.path().join("unused");
    let settings = parse_config(&config_for(data_dir.path(), &source)).unwrap();

    let owner = OwnerToken::new();
    let data_dir_setting = settings.service.data_dir.clone();
    let factory = SqliteFactory::new(&data_dir_setting, "Seen")
        .with_placement(move |c| settings.channel_specific(c));
    let cache = KeyedHandleCache::new(factory, &owner);

    let rust = cache
        .get(&ChannelKey::new("#Rust"), Access::Owner(&owner))
        .unwrap();
    rust.put("jemfinch", b"hello").unwrap();
    let shared = cache
        .get(&ChannelKey::new("#shared"), Access::Owner(&owner))
        .unwrap();
    shared.put("jemfinch", b"hi").unwrap();

    cache.close_all(&owner).unwrap();

    assert!(data_dir.path().join("#rust").join("Seen.db").exists());
    assert!(data_dir.path().join("Seen.db").exists());
    assert!(!data_dir.path().join("#shared").exists());
}

/// Karma as `channel,name,score`
struct KarmaCodec;

impl RecordCodec for KarmaCodec {
    type Value = i64;

    fn deserialize(&self, _: &ChannelKey, _: &RecordId, fields: &[String]) -> StoreResult<i64> {
        fields
            .first()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| larder_store::StoreError::Serialization(format!("{:?}", fields)))
    }

    fn serialize(&self, value: &i64) -> StoreResult<Vec<String>> {
        Ok(vec![value.to_string()])
    }
}

#[test]
fn test_record_file_survives_bad_lines() {
    let data_dir = tempfile::tempdir().unwrap();
    let path = data_dir.path().join("Karma.csv");
    fs::write(
        &path,
        "#rust,rustacean,12\n#rust,ferris,not-a-number\n#Python,guido,7\n",
    )
    .unwrap();

    let mut store = RecordStore::open(&path, KarmaCodec);
    assert_eq!(store.len(), 2);
    assert_eq!(
        store.get(&ChannelKey::new("#python"), &RecordId::parse("guido")),
        Some(&7)
    );

    *store
        .get_mut(&ChannelKey::new("#rust"), &RecordId::parse("rustacean"))
        .unwrap() += 1;
    assert_eq!(store.close().unwrap(), FlushOutcome::Written(2));
    assert!(store.is_empty());

    let reopened = RecordStore::open(&path, KarmaCodec);
    assert_eq!(
        reopened.get(&ChannelKey::new("#RUST"), &RecordId::parse("rustacean")),
        Some(&13)
    );
    assert!(!reopened.contains(&ChannelKey::new("#rust"), &RecordId::parse("ferris")));
}
