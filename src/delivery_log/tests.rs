use super::*;
use crate::testing::test_pool;

fn record(targets: &[&str], summary: DeliverySummary) -> NewDeliveryRecord {
    NewDeliveryRecord {
        owners: Vec::new(),
        targets: targets.iter().map(|t| t.to_string()).collect(),
        title: Some("Hi".to_string()),
        body: "Body".to_string(),
        summary,
    }
}

#[tokio::test]
async fn test_append_stores_joined_targets_and_results() {
    let log = DeliveryLog::new(test_pool().await);

    let summary = DeliverySummary::from_outcomes(vec![
        TargetOutcome::sent("m1"),
        TargetOutcome::failed("UNREGISTERED"),
    ]);
    let mut new = record(&["t1", "t2"], summary.clone());
    new.owners = vec!["alice".to_string(), "bob".to_string()];

    let entry = log.append(new).await.unwrap();
    assert_eq!(entry.targets, "t1, t2");
    assert_eq!(entry.owners, "alice, bob");
    assert_eq!(entry.success_count, 1);
    assert_eq!(entry.failure_count, 1);
    assert_eq!(entry.results, summary.results);

    let stored = log.list_recent(10).await.unwrap();
    assert_eq!(stored, vec![entry]);
}

#[tokio::test]
async fn test_append_rejects_inconsistent_counts() {
    let log = DeliveryLog::new(test_pool().await);

    let summary = DeliverySummary {
        success_count: 2,
        failure_count: 0,
        results: vec![TargetOutcome::sent("m1")],
    };
    let err = log.append(record(&["t1"], summary)).await.unwrap_err();
    assert!(matches!(err, DeliveryLogError::InvalidRecord(_)));
    assert_eq!(log.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_list_recent_is_newest_first_and_limited() {
    let log = DeliveryLog::new(test_pool().await);

    for target in ["a", "b", "c"] {
        log.append(record(
            &[target],
            DeliverySummary::from_outcomes(vec![TargetOutcome::sent(target)]),
        ))
        .await
        .unwrap();
    }

    let recent = log.list_recent(2).await.unwrap();
    let targets: Vec<&str> = recent.iter().map(|e| e.targets.as_str()).collect();
    assert_eq!(targets, vec!["c", "b"]);
    assert_eq!(log.count().await.unwrap(), 3);
}
