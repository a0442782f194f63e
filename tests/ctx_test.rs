mod common;

use std::sync::Arc;

use common::{HttpFixture, Scratch, CTX_PIDS};
use planetarypy::ctx::collection::CtxCollection;
use planetarypy::ctx::edr::{CtxEdr, EdrOptions};
use planetarypy::ctx::product::{Ctx, CtxOptions};
use planetarypy::ctx::EdrIndex;
use planetarypy::planetary::Planetary;

const EDR_BYTES: &[u8] = b"PDS_VERSION_ID = PDS3\r\nEND\r\n\x00\x01\x02\x03";

/// A planetary instance whose CTX EDR index is stored locally and whose EDR URL points
/// to `edr_url`.
fn planetary(scratch: &Scratch, edr_url: &str) -> Planetary {
    scratch.place_ctx_index();
    let config = scratch.config(&format!(
        r#"[missions.mro.ctx]
calib_extension = ".cal.cub"
proc_with_pid_folder = true

[missions.mro.ctx.datalevels.edr]
url = "{edr_url}"
root = ""
with_pid_folder = true
with_volume = true

[missions.mro.ctx.indexes.edr]
url = ""
timestamp = "2024-01-01T00:00:00"
"#
    ));
    Planetary::with_config(config)
}

fn edr_index(planetary: &mut Planetary) -> Arc<EdrIndex> {
    planetary.ctx_edr_index(false, false).unwrap()
}

#[test]
fn test_product_paths() {
    let scratch = Scratch::new();
    let mut planetary = planetary(&scratch, "https://host/ctx");
    let index = edr_index(&mut planetary);
    let config = planetary.ctx_config().unwrap();

    let ctx = Ctx::new("P01_001473_1901", index, &config, CtxOptions::default()).unwrap();
    assert_eq!(ctx.pid(), CTX_PIDS[1]);
    assert_eq!(ctx.volume(), "mrox_0001");
    assert_eq!(
        ctx.source_path(),
        scratch
            .storage()
            .join(format!("mro/ctx/edr/mrox_0001/{0}/{0}.IMG", CTX_PIDS[1]))
    );
    assert_eq!(
        ctx.cal_path(),
        scratch
            .storage()
            .join(format!("mro/ctx/edr/{0}/{0}.cal.cub", CTX_PIDS[1]))
    );
    assert_eq!(
        ctx.url(),
        format!("https://host/ctx/mrox_0001/data/{}.IMG", CTX_PIDS[1])
    );
    assert_eq!(ctx.spatial_summing().unwrap(), 2);
    assert_eq!(ctx.data_quality().unwrap(), "ERROR");
}

#[test]
fn test_edr_download() {
    let scratch = Scratch::new();
    let path = format!("/ctx/mrox_0002/data/{}.IMG", CTX_PIDS[2]);
    let server = HttpFixture::start(&[(path.as_str(), EDR_BYTES)], "Wed, 21 Oct 2015 07:28:00 GMT");
    let mut planetary = planetary(&scratch, &server.url("ctx"));
    let index = edr_index(&mut planetary);
    let config = planetary.ctx_config().unwrap();

    let edr = CtxEdr::new(CTX_PIDS[2], index, &config, EdrOptions::default()).unwrap();
    assert!(edr.download(false).unwrap());
    assert_eq!(std::fs::read(edr.source_path()).unwrap(), EDR_BYTES);
    assert!(!edr.download(false).unwrap());
    assert_eq!(server.get_requests(), 1);
    assert!(edr.download(true).unwrap());
    assert_eq!(server.get_requests(), 2);
}

#[test]
fn test_collection_download() {
    let scratch = Scratch::new();
    let files: Vec<(String, &[u8])> = CTX_PIDS
        .iter()
        .map(|pid| {
            let volume = if pid.starts_with("P02") { "mrox_0002" } else { "mrox_0001" };
            (format!("/ctx/{volume}/data/{pid}.IMG"), EDR_BYTES)
        })
        .collect();
    let served: Vec<(&str, &[u8])> = files.iter().map(|(p, b)| (p.as_str(), *b)).collect();
    let server = HttpFixture::start(&served, "Wed, 21 Oct 2015 07:28:00 GMT");
    let mut planetary = planetary(&scratch, &server.url("ctx"));
    let index = edr_index(&mut planetary);
    let config = planetary.ctx_config().unwrap();

    let collection = CtxCollection::by_month("P01", None, index, config);
    let collection = collection.unwrap().with_filter_error(true);
    assert_eq!(collection.product_ids(), vec![CTX_PIDS[0]]);

    let results = collection.download_collection(false).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, CTX_PIDS[0]);
    assert_eq!(results[0].1, Ok(true));
    assert!(collection.edr_exist_check().unwrap()[0].1);
}

#[test]
fn test_calibrate_collection_reports_per_item() {
    let scratch = Scratch::new();
    let mut planetary = planetary(&scratch, "https://host/ctx");
    let index = edr_index(&mut planetary);
    let config = planetary.ctx_config().unwrap();

    let collection = CtxCollection::by_volume("0001", index, config);
    // one product is already calibrated, the other has nothing to calibrate from
    let done = collection.ctx(CTX_PIDS[0]).unwrap();
    common::write_file(&done.cal_path(), b"cube");

    let results = collection.calibrate_collection(false).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0], (CTX_PIDS[0].to_string(), Ok(())));
    assert!(results[1].1.is_err());
    assert_eq!(
        collection.calib_exist_check().unwrap(),
        vec![
            (CTX_PIDS[0].to_string(), true),
            (CTX_PIDS[1].to_string(), false)
        ]
    );
}

#[test]
fn test_proc_root_override() {
    let scratch = Scratch::new();
    let mut planetary = planetary(&scratch, "https://host/ctx");
    let index = edr_index(&mut planetary);
    let config = planetary.ctx_config().unwrap();
    let options = CtxOptions {
        source_dir: Some(scratch.root.join("raw")),
        proc_root: Some(scratch.root.join("proc")),
        ..Default::default()
    };
    let ctx = Ctx::new(CTX_PIDS[0], index, &config, options).unwrap();
    assert_eq!(
        ctx.cub_path(),
        scratch
            .root
            .join(format!("proc/{0}/{0}.cub", CTX_PIDS[0]))
    );
    assert!(ctx
        .source_path()
        .starts_with(scratch.root.join("raw/mrox_0001")));
}
