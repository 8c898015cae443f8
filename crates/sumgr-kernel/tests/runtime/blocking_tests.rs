use super::*;

#[tokio::test]
async fn run_blocking_should_return_value() {
    let result = run_blocking("sum", || Ok::<_, AppError>(1 + 2))
        .await
        .expect("run blocking success");
    assert_eq!(result, 3);
}

#[tokio::test]
async fn run_blocking_should_pass_through_inner_error() {
    let result = run_blocking::<(), _>("inner_error", || {
        Err(AppError::service_unavailable("service not bound"))
    })
    .await;

    let error = result.expect_err("expect inner error");
    assert_eq!(error.code, sumgr_contracts::SERVICE_UNAVAILABLE_CODE);
}

#[tokio::test]
async fn run_blocking_should_map_panic_error() {
    let result = run_blocking::<(), _>("panic_case", || panic!("panic in blocking job")).await;
    let error = result.expect_err("expect panic mapping");
    assert_eq!(error.code, "blocking_task_panicked");
    assert_eq!(error.context_value("blockingTask"), Some("panic_case"));
}

#[tokio::test]
async fn dropped_caller_should_not_stop_blocking_job() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    let finished = Arc::new(AtomicBool::new(false));
    let job_flag = finished.clone();
    let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
    let future = run_blocking("detached", move || {
        let _ = started_tx.send(());
        std::thread::sleep(std::time::Duration::from_millis(50));
        job_flag.store(true, Ordering::SeqCst);
        Ok(())
    });

    let _ = tokio::time::timeout(std::time::Duration::from_millis(5), future).await;
    started_rx
        .recv_timeout(std::time::Duration::from_secs(2))
        .expect("job started");
    for _ in 0..100 {
        if finished.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(finished.load(Ordering::SeqCst));
}
