use seller_bulk::{
    client::documents::{document_grouping, OrderRow},
    grouping::{describe, partition, GroupingStrategy, KeyExtractor, UNKNOWN_KEY},
    work::WorkItem,
};

fn order(sn: &str, shop_id: u64, shop_name: &str, carrier: Option<&str>) -> WorkItem<OrderRow> {
    OrderRow {
        order_sn: sn.to_string(),
        shop_id,
        shop_name: Some(shop_name.to_string()),
        shipping_carrier: carrier.map(str::to_string),
        package_number: None,
        tracking_number: None,
    }
    .into_work_item()
}

fn mixed_orders() -> Vec<WorkItem<OrderRow>> {
    vec![
        order("SN1", 2, "Toko Dua", Some("J&T")),
        order("SN2", 1, "Toko Satu", Some("SPX")),
        order("SN3", 2, "Toko Dua", None),
        order("SN4", 2, "Toko Dua", Some("J&T")),
        order("SN5", 1, "Toko Satu", Some("SPX")),
        order("SN6", 3, "Toko Tiga", Some("")),
    ]
}

#[test]
fn groups_keep_first_seen_order_and_every_item() {
    let groups = document_grouping().plan(mixed_orders());

    let labels: Vec<_> = groups.iter().map(|g| g.label.as_str()).collect();
    assert_eq!(labels, vec!["Toko Dua", "Toko Satu", "Toko Tiga"]);

    let total: usize = groups.iter().map(|g| g.len()).sum();
    assert_eq!(total, 6);

    let dua = &groups[0];
    let calls: Vec<_> = dua.calls.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(calls, vec!["Toko Dua / J&T", "Toko Dua / unknown"]);
    let jnt: Vec<_> = dua.calls[0].items.iter().map(|it| it.id()).collect();
    assert_eq!(jnt, vec!["SN1", "SN4"]);
}

#[test]
fn missing_attributes_land_in_the_sentinel_group() {
    let groups = document_grouping().plan(mixed_orders());
    let tiga = groups.iter().find(|g| g.label == "Toko Tiga").unwrap();
    assert_eq!(tiga.calls[0].key, UNKNOWN_KEY);

    let bare = vec![WorkItem::new("x", ()), WorkItem::new("y", ()).with_attr("shop", "7")];
    let buckets = partition(bare, &[KeyExtractor::attr("shop")]);
    let keys: Vec<_> = buckets.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec![UNKNOWN_KEY, "7"]);
}

#[test]
fn grouping_is_deterministic() {
    let a = describe(&document_grouping().plan(mixed_orders()));
    let b = describe(&document_grouping().plan(mixed_orders()));
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn empty_input_plans_nothing() {
    let groups = document_grouping().plan(Vec::<WorkItem<OrderRow>>::new());
    assert!(groups.is_empty());
}

#[test]
fn composite_keys_and_per_item_calls() {
    let items: Vec<_> = (0..4)
        .map(|i| {
            WorkItem::new(format!("i{i}"), ())
                .with_attr("shop", if i % 2 == 0 { "a" } else { "b" })
                .with_attr("sale", "9")
        })
        .collect();

    let strategy = GroupingStrategy::by(vec![KeyExtractor::attr("shop"), KeyExtractor::attr("sale")])
        .split_by(vec![KeyExtractor::ItemId]);
    let groups = strategy.plan(items);

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].key, "a/9");
    assert_eq!(groups[0].calls.len(), 2);
    assert!(groups.iter().all(|g| g.calls.iter().all(|c| c.items.len() == 1)));
}

#[test]
fn keys_containing_the_separator_stay_apart() {
    let items = vec![
        WorkItem::new("x", ()).with_attr("shop", "a/b").with_attr("sale", "c"),
        WorkItem::new("y", ()).with_attr("shop", "a").with_attr("sale", "b/c"),
    ];
    let buckets = partition(items, &[KeyExtractor::attr("shop"), KeyExtractor::attr("sale")]);

    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].1[0].id(), "x");
    assert_eq!(buckets[1].1[0].id(), "y");
}
