use std::sync::Arc;

use sproc_middleware::prelude::*;
use sproc_middleware::test_utils::{FakeConnectionFactory, FakeScript};

fn one_row() -> FakeScript {
    FakeScript::rows(&["value"], vec![vec![RowValues::Int(42)]])
}

#[tokio::test]
async fn closed_channel_does_not_mask_the_result() -> Result<(), SprocDbError> {
    let (sink, rx) = ChannelTelemetrySink::channel();
    drop(rx);
    let exec = StoredProcedureExecutor::new(FakeConnectionFactory::new(one_row()), sink);

    let mut call = ProcedureCall::new("dbo.Answer");
    let value = exec
        .execute_scalar(&mut call, |row| row.get_i64("value"), &CancellationToken::new())
        .await?;
    assert_eq!(value, Some(42));
    Ok(())
}

#[tokio::test]
async fn channel_sink_delivers_records_to_a_consumer() -> Result<(), SprocDbError> {
    let (sink, mut rx) = ChannelTelemetrySink::channel();
    let exec = StoredProcedureExecutor::new(
        FakeConnectionFactory::new(one_row().fail_execute("50000", "raised")),
        sink,
    );

    let mut call = ProcedureCall::new("dbo.Answer");
    let _ = exec
        .execute_no_result(&mut call, &CancellationToken::new())
        .await;

    let record = rx
        .recv()
        .await
        .ok_or_else(|| SprocDbError::mapping("no telemetry received"))?;
    assert_eq!(record.name, "dbo.Answer");
    assert_eq!(record.result_code.as_deref(), Some("50000"));
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn concurrent_calls_share_one_sink() -> Result<(), SprocDbError> {
    let sink = CollectingTelemetrySink::new();
    let exec = StoredProcedureExecutor::new(FakeConnectionFactory::new(one_row()), sink.clone());
    let cancel = CancellationToken::new();

    let mut a = ProcedureCall::new("dbo.A");
    let mut b = ProcedureCall::new("dbo.B");
    let mut c = ProcedureCall::new("dbo.C");
    let (ra, rb, rc) = tokio::join!(
        exec.execute_scalar(&mut a, |row| row.get_i64(0), &cancel),
        exec.execute_set(&mut b, |row| row.get_i64(0), &cancel),
        exec.execute_no_result(&mut c, &cancel),
    );
    assert_eq!(ra?, Some(42));
    assert_eq!(rb?, vec![42]);
    rc?;

    let mut names: Vec<String> = sink.records().into_iter().map(|r| r.name).collect();
    names.sort();
    assert_eq!(names, ["dbo.A", "dbo.B", "dbo.C"]);
    assert_eq!(exec.factory().stats().created(), 3);
    Ok(())
}

#[tokio::test]
async fn json_lines_sink_writes_one_object_per_call() -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(JsonLinesTelemetrySink::new(Vec::<u8>::new()));
    let exec = StoredProcedureExecutor::new(FakeConnectionFactory::new(one_row()), Arc::clone(&sink));

    for name in ["dbo.First", "dbo.Second"] {
        let mut call = ProcedureCall::new(name);
        exec.execute_no_result(&mut call, &CancellationToken::new())
            .await?;
    }
    drop(exec);

    let sink = Arc::try_unwrap(sink).map_err(|_| "sink still shared")?;
    let text = String::from_utf8(sink.into_inner())?;
    let records: Vec<DependencyTelemetry> = text
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].name, "dbo.Second");
    assert!(records.iter().all(|r| r.success));
    Ok(())
}

#[tokio::test]
async fn tracing_sink_accepts_records() -> Result<(), SprocDbError> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("sproc_middleware=debug"))
        .with_test_writer()
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let exec = StoredProcedureExecutor::new(FakeConnectionFactory::new(one_row()), TracingTelemetrySink);
    let mut call = ProcedureCall::new("dbo.Answer");
    let value = exec
        .execute_scalar(&mut call, |row| row.get_i64(0), &CancellationToken::new())
        .await?;
    assert_eq!(value, Some(42));
    Ok(())
}
