//! End-to-end scenarios against a real `gearmand` on `127.0.0.1:4730`.
//! Ignored by default; run with `cargo test -- --ignored` against a
//! running server.

use gearman_rs::{create_client, create_worker, TaskEvent};

#[tokio::test]
#[ignore]
async fn submit_and_work_round_trips_the_payload() {
    let worker = create_worker("127.0.0.1", 4730).await.expect("worker connects");
    worker
        .register("echo-test", |job| async move {
            let workload = job.workload().clone();
            job.complete(workload).expect("complete sends");
        })
        .await
        .expect("register succeeds");

    let client = create_client("127.0.0.1", 4730).await.expect("client connects");
    let mut task = client.submit("echo-test", "TestData").await.expect("submit succeeds");

    let event = task.next_event().await.expect("task yields an event");
    match event {
        TaskEvent::Complete(data) => assert_eq!(&data[..], b"TestData"),
        other => panic!("expected Complete, got {other:?}"),
    }

    client.wait().await;
}

#[tokio::test]
#[ignore]
async fn background_jobs_resolve_without_delivering_events() {
    let worker = create_worker("127.0.0.1", 4730).await.expect("worker connects");
    worker
        .register("bg-test", |job| async move {
            job.complete(job.workload().clone()).expect("complete sends");
        })
        .await
        .expect("register succeeds");

    let client = create_client("127.0.0.1", 4730).await.expect("client connects");
    let mut task = client.submit_background("bg-test", "TestData").await.expect("submit succeeds");
    assert!(!task.handle().is_empty());

    // Give the worker a moment to process, then confirm no event ever
    // arrives for a background submission.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let result = tokio::time::timeout(std::time::Duration::from_millis(50), task.next_event()).await;
    assert!(result.is_err() || result.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn duplicate_unique_id_is_rejected_until_the_first_completes() {
    let worker = create_worker("127.0.0.1", 4730).await.expect("worker connects");
    worker
        .register("dup-test", |job| async move {
            job.complete(job.workload().clone()).expect("complete sends");
        })
        .await
        .expect("register succeeds");

    let client = create_client("127.0.0.1", 4730).await.expect("client connects");
    let mut first = client.submit_with("dup-test", "A", gearman_rs::Priority::Normal, "u1").await.expect("first submit ok");

    let second = client.submit_with("dup-test", "A2", gearman_rs::Priority::Normal, "u1").await;
    assert!(matches!(second, Err(gearman_rs::GearmanError::DuplicateJob { .. })));

    let _ = first.next_event().await;

    let third = client.submit_with("dup-test", "A3", gearman_rs::Priority::Normal, "u1").await;
    assert!(third.is_ok(), "unique id is free again once the first task is finalized");
}

#[tokio::test]
#[ignore]
async fn higher_priority_job_completes_before_an_earlier_low_priority_one() {
    let worker = create_worker("127.0.0.1", 4730).await.expect("worker connects");
    worker
        .register("prio-test", |job| async move {
            job.complete(job.workload().clone()).expect("complete sends");
        })
        .await
        .expect("register succeeds");

    let client = create_client("127.0.0.1", 4730).await.expect("client connects");
    let mut low = client
        .submit_with("prio-test", "L", gearman_rs::Priority::Low, "pL")
        .await
        .expect("low priority submit ok");
    let mut high = client
        .submit_with("prio-test", "H", gearman_rs::Priority::High, "pH")
        .await
        .expect("high priority submit ok");

    match high.next_event().await.expect("high task yields an event") {
        TaskEvent::Complete(data) => assert_eq!(&data[..], b"H"),
        other => panic!("expected Complete, got {other:?}"),
    }
    match low.next_event().await.expect("low task yields an event") {
        TaskEvent::Complete(data) => assert_eq!(&data[..], b"L"),
        other => panic!("expected Complete, got {other:?}"),
    }
}

#[tokio::test]
#[ignore]
async fn intermediate_data_is_observed_before_completion() {
    let worker = create_worker("127.0.0.1", 4730).await.expect("worker connects");
    worker
        .register("progress-test", |job| async move {
            job.send_data("x").expect("data sends");
            job.complete("y").expect("complete sends");
        })
        .await
        .expect("register succeeds");

    let client = create_client("127.0.0.1", 4730).await.expect("client connects");
    let mut task = client.submit("progress-test", "whatever").await.expect("submit succeeds");

    match task.next_event().await.expect("task yields a data event") {
        TaskEvent::Data(data) => assert_eq!(&data[..], b"x"),
        other => panic!("expected Data, got {other:?}"),
    }
    match task.next_event().await.expect("task yields a complete event") {
        TaskEvent::Complete(data) => assert_eq!(&data[..], b"y"),
        other => panic!("expected Complete, got {other:?}"),
    }
}

#[tokio::test]
#[ignore]
async fn exception_option_changes_a_failed_job_into_an_exception_event() {
    let worker = create_worker("127.0.0.1", 4730).await.expect("worker connects");
    worker
        .register("exc-test", |job| async move {
            job.exception("Reason").expect("exception sends");
        })
        .await
        .expect("register succeeds");

    let client = create_client("127.0.0.1", 4730).await.expect("client connects");
    client.set_option("exceptions").await.expect("set_option succeeds");

    let mut task = client.submit("exc-test", "whatever").await.expect("submit succeeds");
    match task.next_event().await.expect("task yields an event") {
        TaskEvent::Exception(data) => assert_eq!(&data[..], b"Reason"),
        other => panic!("expected Exception, got {other:?}"),
    }
}
