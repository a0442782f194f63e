mod common;

use common::Scratch;
use planetarypy::config::Config;
use planetarypy::ctx::CtxConfig;
use planetarypy::pds::index_key::IndexKey;
use planetarypy::planetary::Planetary;
use planetarypy::planetary_errors::PlanetaryError;

#[test]
fn test_first_run_init() {
    let scratch = Scratch::new();
    assert!(matches!(
        Config::load(&scratch.config_path()),
        Err(PlanetaryError::ConfigurationMissing(_))
    ));

    let config = Config::init(&scratch.config_path(), &scratch.storage()).unwrap();
    assert!(scratch.storage().is_dir());
    assert_eq!(config.storage_root(), scratch.storage());

    let planetary = Planetary::with_config(Config::load(&scratch.config_path()).unwrap());
    assert_eq!(planetary.find_missions(), vec!["cassini", "lro", "mro"]);
    assert_eq!(
        planetary.find_instruments("mro"),
        vec!["crism", "ctx", "hirise"]
    );
    assert_eq!(
        planetary.find_indexes("mro.hirise"),
        vec!["dtm", "edr", "rdr"]
    );

    let hirise = IndexKey::parse("mro.hirise.edr").unwrap();
    assert_eq!(
        planetary.config().index_config(&hirise).unwrap().url,
        "https://hirise-pds.lpl.arizona.edu/PDS/INDEX/EDRCUMINDEX.LBL"
    );

    let ctx = CtxConfig::from_config(planetary.config()).unwrap();
    assert_eq!(ctx.edr_root, scratch.storage().join("mro/ctx/edr"));
    assert!(ctx.edr_url.ends_with("/mro/mars_reconnaissance_orbiter/ctx"));
}

#[test]
fn test_init_keeps_user_entries() {
    let scratch = Scratch::new();
    std::fs::write(
        scratch.config_path(),
        "[missions.mro.hirise.indexes.edr]\nurl = \"https://mirror/EDRCUMINDEX.LBL\"\ntimestamp = \"2023-05-06T07:08:09\"\n",
    )
    .unwrap();

    let config = Config::init(&scratch.config_path(), &scratch.storage()).unwrap();
    assert_eq!(
        config.get_str("mro.hirise.indexes.edr.url", ""),
        "https://mirror/EDRCUMINDEX.LBL"
    );
    assert_eq!(
        config.get_str("mro.hirise.indexes.edr.timestamp", ""),
        "2023-05-06T07:08:09"
    );
    assert_eq!(
        config.get_str("mro.hirise.indexes.rdr.url", ""),
        "https://hirise-pds.lpl.arizona.edu/PDS/INDEX/RDRCUMINDEX.LBL"
    );
}

#[test]
fn test_set_value_is_persisted() {
    let scratch = Scratch::new();
    let mut config = scratch.config("");
    config
        .set_value("missions.mro.ctx.indexes.edr.timestamp", "2024-02-03T04:05:06", true)
        .unwrap();
    config.set_value("missions.mro.ctx.proc_with_volume", true, false).unwrap();

    let reloaded = Config::load(&scratch.config_path()).unwrap();
    assert_eq!(
        reloaded.get_str("mro.ctx.indexes.edr.timestamp", ""),
        "2024-02-03T04:05:06"
    );
    // not saved
    assert!(!reloaded.get_bool("mro.ctx.proc_with_volume", false));
    assert!(config.get_bool("mro.ctx.proc_with_volume", false));
}
