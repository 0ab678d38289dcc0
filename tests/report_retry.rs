use seller_bulk::{
    failures::FailureRecord,
    report::{BatchReport, GroupReport},
    work::WorkItem,
};

fn sample_report() -> BatchReport {
    BatchReport::new(
        "print-documents",
        "2026-01-01T00:00:00Z".into(),
        "2026-01-01T00:00:05Z".into(),
        vec![
            GroupReport { label: "Toko Satu".into(), success: 2, failed: 1 },
            GroupReport { label: "Toko Dua".into(), success: 0, failed: 1 },
        ],
        vec![
            FailureRecord {
                id: "SN3".into(),
                group_label: "Toko Satu".into(),
                call_label: "Toko Satu / SPX".into(),
                reason: "label not ready".into(),
                detail: None,
            },
            FailureRecord {
                id: "SN4".into(),
                group_label: "Toko Dua".into(),
                call_label: "Toko Dua / J&T".into(),
                reason: "status 500".into(),
                detail: None,
            },
        ],
    )
}

#[test]
fn totals_come_from_group_rows() {
    let r = sample_report();
    assert_eq!(r.total_success, 2);
    assert_eq!(r.total_failed, 2);
    assert!(r.has_failures());
}

#[test]
fn saved_report_drives_a_retry_list() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    std::fs::write(&path, serde_json::to_string_pretty(&sample_report()).unwrap()).unwrap();

    let loaded = BatchReport::load(&path).unwrap();
    let items: Vec<_> = ["SN1", "SN2", "SN3", "SN4"]
        .iter()
        .map(|id| WorkItem::new(*id, ()))
        .collect();
    let retry: Vec<_> = loaded
        .retry_items(&items)
        .iter()
        .map(|it| it.id().to_string())
        .collect();
    assert_eq!(retry, vec!["SN3", "SN4"]);
}

#[test]
fn table_lists_groups_and_failures() {
    let table = sample_report().render_table();
    assert!(table.contains("Toko Satu"));
    assert!(table.contains("total"));
    assert!(table.contains("failed (2):"));
    assert!(table.contains("SN4  [Toko Dua / J&T]  status 500"));
}
