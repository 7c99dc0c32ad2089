use sproc_middleware::prelude::*;
use sproc_middleware::test_utils::{FakeConnectionFactory, FakeScript};

#[derive(Debug)]
struct Customer {
    id: i64,
    name: String,
}

fn customers_page() -> FakeScript {
    FakeScript::rows(
        &["CustomerId", "Name"],
        vec![
            vec![RowValues::Int(26), RowValues::Text("Contoso".into())],
            vec![RowValues::Int(27), RowValues::Text("Fabrikam".into())],
        ],
    )
    .with_output("PTotalRecord", RowValues::Int(311))
}

#[tokio::test]
async fn paged_query_returns_rows_and_total() -> Result<(), SprocDbError> {
    let sink = CollectingTelemetrySink::new();
    let exec = StoredProcedureExecutor::with_config(
        FakeConnectionFactory::new(customers_page()),
        sink.clone(),
        ExecutorConfig::default().with_dependency_type("MySQL"),
    )?;

    let mut call = ProcedureCall::new("CustomerGetAll")
        .param(ProcParam::output("PTotalRecord", ParamType::Int))
        .param(ProcParam::input("POffset", RowValues::Int(25)))
        .param(ProcParam::input("PPageSize", RowValues::Int(2)));

    let page = exec
        .execute_set(
            &mut call,
            |row| {
                Ok(Customer {
                    id: row.get_i64("customerid")?,
                    name: row.get_str("Name")?.to_string(),
                })
            },
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, 26);
    assert_eq!(page[1].name, "Fabrikam");
    assert_eq!(call.output("PTotalRecord").and_then(RowValues::as_int), Some(&311));
    assert_eq!(call.output("@ptotalrecord"), Some(&RowValues::Int(311)));

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].dependency_type, "MySQL");
    Ok(())
}

#[tokio::test]
async fn outputs_are_left_untouched_when_the_call_fails() {
    let exec = StoredProcedureExecutor::new(
        FakeConnectionFactory::new(customers_page().fail_on_row(1, "1205", "deadlock victim")),
        NoopTelemetrySink,
    );
    let mut call = ProcedureCall::new("CustomerGetAll")
        .param(ProcParam::output("PTotalRecord", ParamType::Int));

    let result = exec
        .execute_set(&mut call, |row| row.get_i64(0), &CancellationToken::new())
        .await;
    assert!(result.is_err());
    assert_eq!(call.output("PTotalRecord"), Some(&RowValues::Null));
}

#[tokio::test]
async fn input_output_parameters_are_overwritten() -> Result<(), SprocDbError> {
    let script = FakeScript::empty().with_output("counter", RowValues::Int(8));
    let exec = StoredProcedureExecutor::new(FakeConnectionFactory::new(script), NoopTelemetrySink);
    let mut call = ProcedureCall::new("dbo.Bump")
        .param(ProcParam::input_output("counter", RowValues::Int(7)))
        .param(ProcParam::input("step", RowValues::Int(1)));

    exec.execute_no_result(&mut call, &CancellationToken::new())
        .await?;

    assert_eq!(call.output("counter"), Some(&RowValues::Int(8)));
    // inputs are never outputs
    assert_eq!(call.output("step"), None);
    Ok(())
}

#[tokio::test]
async fn unknown_output_names_are_ignored() -> Result<(), SprocDbError> {
    let script = FakeScript::empty()
        .with_output("total", RowValues::Int(3))
        .with_output("unexpected", RowValues::Text("x".into()));
    let exec = StoredProcedureExecutor::new(FakeConnectionFactory::new(script), NoopTelemetrySink);
    let mut call = ProcedureCall::new("dbo.Count").param(ProcParam::output("total", ParamType::BigInt));

    exec.execute_no_result(&mut call, &CancellationToken::new())
        .await?;

    assert_eq!(call.output("total"), Some(&RowValues::Int(3)));
    assert_eq!(call.parameters().len(), 1);
    Ok(())
}
