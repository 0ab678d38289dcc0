use lopdf::{dictionary, Document, Object, Stream};
use seller_bulk::{
    client::{
        documents::{document_grouping, OrderRow, ShippingDocumentAction},
        http::DashboardApi,
    },
    config::Config,
    executor::ExecutorOptions,
    pipeline::{self, RunRequest},
    report::BatchReport,
};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn immediate() -> ExecutorOptions {
    ExecutorOptions {
        reset_after: Duration::ZERO,
        call_interval: Duration::ZERO,
    }
}

fn label_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            let content = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
            Object::Reference(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content,
            }))
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as u32,
        }),
    );
    let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog);
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn order(sn: &str, shop_id: u64, shop: &str, carrier: &str) -> OrderRow {
    OrderRow {
        order_sn: sn.to_string(),
        shop_id,
        shop_name: Some(shop.to_string()),
        shipping_carrier: Some(carrier.to_string()),
        package_number: None,
        tracking_number: None,
    }
}

fn config_in(dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.output.out_dir = dir.to_string_lossy().into_owned();
    cfg
}

async fn mount_label(server: &MockServer, shop_id: &str, carrier: &str, pages: usize) {
    Mock::given(method("GET"))
        .and(path("/api/shipping-document/view"))
        .and(query_param("shopId", shop_id))
        .and(query_param("carrier", carrier))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(label_pdf(pages)),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn documents_run_writes_merged_labels_and_retries_only_failures() {
    let server = MockServer::start().await;
    mount_label(&server, "42", "SPX", 1).await;
    mount_label(&server, "42", "JNE", 2).await;
    Mock::given(method("GET"))
        .and(path("/api/shipping-document/view"))
        .and(query_param("shopId", "7"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "failed_to_get_pdf",
            "message": "label not ready"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());
    let rows = vec![
        order("SN1", 42, "Toko Maju", "SPX"),
        order("SN2", 42, "Toko Maju", "JNE"),
        order("SN3", 7, "Toko Tujuh", "SPX"),
    ];
    let raw = serde_json::to_vec(&rows).unwrap();
    let items = || rows.iter().cloned().map(OrderRow::into_work_item).collect::<Vec<_>>();
    let action = || {
        ShippingDocumentAction::new(
            DashboardApi::with_client(reqwest::Client::new(), &server.uri()),
            "THERMAL_AIR_WAYBILL",
        )
    };

    let req = RunRequest {
        cfg: &cfg,
        raw_input: &raw,
        retry_from: None,
        out_override: None,
    };
    let first = action();
    let run = pipeline::prepare(&req, &first, items()).unwrap();
    let summary = pipeline::execute(&req, run, first, document_grouping(), &immediate())
        .await
        .unwrap();

    assert_eq!(summary.run_dir, dir.path().join(&summary.run_id));
    assert_eq!((summary.report.total_success, summary.report.total_failed), (2, 1));

    let names: Vec<_> = summary
        .documents
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["001-toko-maju.pdf"]);
    let merged = Document::load(&summary.documents[0]).unwrap();
    assert_eq!(merged.get_pages().len(), 3);

    let updates: Vec<serde_json::Value> =
        serde_json::from_slice(&std::fs::read(summary.run_dir.join("updates.json")).unwrap()).unwrap();
    let updated: Vec<_> = updates.iter().map(|u| u["id"].as_str().unwrap()).collect();
    assert_eq!(updated, vec!["SN1", "SN2"]);

    let index: serde_json::Value =
        serde_json::from_slice(&std::fs::read(summary.run_dir.join("index.json")).unwrap()).unwrap();
    assert_eq!(index["documents"], json!(["001-toko-maju.pdf"]));

    let report_path = summary.run_dir.join("report.json");
    let retry_req = RunRequest {
        cfg: &cfg,
        raw_input: &raw,
        retry_from: Some(report_path.as_path()),
        out_override: None,
    };
    let retry = pipeline::prepare(&retry_req, &action(), items()).unwrap();
    let ids: Vec<_> = retry.items.iter().map(|it| it.id().to_string()).collect();
    assert_eq!(ids, vec!["SN3"]);
    assert_ne!(retry.run_id, summary.run_id);
}

#[tokio::test]
async fn retry_report_of_another_action_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_in(dir.path());

    let foreign = BatchReport::new(
        "accept-cancellations",
        "2026-01-01T00:00:00Z".into(),
        "2026-01-01T00:00:01Z".into(),
        Vec::new(),
        Vec::new(),
    );
    let report_path = dir.path().join("report.json");
    std::fs::write(&report_path, serde_json::to_string(&foreign).unwrap()).unwrap();

    let req = RunRequest {
        cfg: &cfg,
        raw_input: b"[]",
        retry_from: Some(report_path.as_path()),
        out_override: None,
    };
    let action = ShippingDocumentAction::new(
        DashboardApi::with_client(reqwest::Client::new(), "http://127.0.0.1:9"),
        "THERMAL_AIR_WAYBILL",
    );
    let items = vec![order("SN1", 42, "Toko Maju", "SPX").into_work_item()];

    let err = pipeline::prepare(&req, &action, items).err().unwrap();
    assert!(err.to_string().contains("belongs to accept-cancellations"));
}
