#![cfg(feature = "postgres")]

//! Runs against a live server when `TESTING_PG_URL` is set, e.g.
//! `host=localhost user=testuser password=... dbname=testing`.

use sproc_middleware::prelude::*;

const SETUP: &str = r"
CREATE OR REPLACE FUNCTION sproc_users_page(p_offset int, p_page_size int)
RETURNS TABLE (id int, email text) LANGUAGE sql AS $$
    SELECT g, 'user' || g || '@example.com'
    FROM generate_series(1, 40) AS g
    ORDER BY g OFFSET p_offset LIMIT p_page_size
$$;
CREATE OR REPLACE FUNCTION sproc_open_ended()
RETURNS TABLE (ends_at timestamp) LANGUAGE sql AS $$
    SELECT 'infinity'::timestamp
$$;
CREATE OR REPLACE PROCEDURE sproc_count_users(IN p_min int, INOUT p_total int DEFAULT NULL)
LANGUAGE plpgsql AS $$
BEGIN
    p_total := 40 - p_min;
END
$$;
";

fn factory() -> Result<Option<PostgresConnectionFactory>, SprocDbError> {
    match std::env::var("TESTING_PG_URL") {
        Ok(url) => PostgresConnectionFactory::from_connection_string(&url).map(Some),
        Err(_) => Ok(None),
    }
}

async fn setup(factory: &PostgresConnectionFactory) -> Result<(), Box<dyn std::error::Error>> {
    let (client, connection) = factory.config().connect(tokio_postgres::NoTls).await?;
    let driver = tokio::spawn(connection);
    client.batch_execute(SETUP).await?;
    drop(client);
    driver.await??;
    Ok(())
}

#[test]
fn postgres_procedures_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let Some(factory) = factory()? else {
        eprintln!("TESTING_PG_URL not set; skipping");
        return Ok(());
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        setup(&factory).await?;
        let sink = CollectingTelemetrySink::new();
        let exec = StoredProcedureExecutor::new(factory, sink.clone());
        let cancel = CancellationToken::new();

        let mut page = ProcedureCall::new("sproc_users_page")
            .param(ProcParam::input("p_offset", RowValues::Int(10)))
            .param(ProcParam::input("p_page_size", RowValues::Int(5)));
        let ids = exec
            .execute_set(&mut page, |row| row.get_i64("id"), &cancel)
            .await?;
        assert_eq!(ids, vec![11, 12, 13, 14, 15]);

        let first = exec
            .execute_scalar(&mut page, |row| Ok(row.get_str("email")?.to_string()), &cancel)
            .await?;
        assert_eq!(first.as_deref(), Some("user11@example.com"));

        let mut count = ProcedureCall::new("sproc_count_users")
            .param(ProcParam::input("p_min", RowValues::Int(15)))
            .param(ProcParam::input_output("p_total", RowValues::Null).with_type(ParamType::Int));
        exec.execute_no_result(&mut count, &cancel).await?;
        assert_eq!(count.output("p_total"), Some(&RowValues::Int(25)));

        let mut missing = ProcedureCall::new("sproc_does_not_exist");
        let err = exec
            .execute_no_result(&mut missing, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.result_code().as_deref(), Some("42883"));

        // chrono cannot represent an infinite timestamp
        let mut open_ended = ProcedureCall::new("sproc_open_ended");
        let err = exec
            .execute_scalar(&mut open_ended, |row| Ok(row.get(0).cloned()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SprocDbError::MappingError(ref m) if m.contains("ends_at")));

        let records = sink.records();
        assert_eq!(records.len(), 5);
        assert!(records[..3].iter().all(|r| r.success));
        assert_eq!(records[3].result_code.as_deref(), Some("42883"));
        assert!(!records[4].success);
        assert_eq!(records[4].result_code, None);
        assert!(records.iter().all(|r| r.dependency_type == "PostgreSQL"));
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
