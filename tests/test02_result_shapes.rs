use sproc_middleware::prelude::*;
use sproc_middleware::test_utils::{FakeConnectionFactory, FakeScript};

#[derive(Debug, PartialEq)]
struct User {
    id: i64,
    email: String,
    nickname: Option<String>,
}

fn map_user(row: &ProcRow) -> Result<User, SprocDbError> {
    Ok(User {
        id: row.get_i64("Id")?,
        email: row.get_str("Email")?.to_string(),
        nickname: row.get_optional_str("Nickname")?.map(str::to_string),
    })
}

fn page(rows: usize) -> FakeScript {
    let rows = (0..rows)
        .map(|i| {
            let id = i64::try_from(i).unwrap_or_default();
            vec![
                RowValues::Int(id),
                RowValues::Text(format!("user{i}@example.com")),
                if i % 2 == 0 {
                    RowValues::Null
                } else {
                    RowValues::Text(format!("u{i}"))
                },
            ]
        })
        .collect();
    FakeScript::rows(&["Id", "Email", "Nickname"], rows)
}

#[test]
fn set_preserves_cursor_order() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let factory = FakeConnectionFactory::new(page(25));
        let exec = StoredProcedureExecutor::new(factory, NoopTelemetrySink);
        let mut call = ProcedureCall::new("GetUsersPage")
            .param(ProcParam::input("offset", RowValues::Int(0)))
            .param(ProcParam::input("pageSize", RowValues::Int(25)));

        let users = exec
            .execute_set(&mut call, map_user, &CancellationToken::new())
            .await?;
        assert_eq!(users.len(), 25);
        assert!(users.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(users[0].nickname, None);
        assert_eq!(users[1].nickname.as_deref(), Some("u1"));
        assert_eq!(exec.factory().stats().rows_read(), 25);
        Ok::<(), SprocDbError>(())
    })?;
    Ok(())
}

#[tokio::test]
async fn empty_set_is_an_empty_vec() -> Result<(), SprocDbError> {
    let exec = StoredProcedureExecutor::new(FakeConnectionFactory::new(page(0)), NoopTelemetrySink);
    let mut call = ProcedureCall::new("GetUsersPage");
    let users = exec
        .execute_set(&mut call, map_user, &CancellationToken::new())
        .await?;
    assert!(users.is_empty());
    Ok(())
}

#[tokio::test]
async fn scalar_reads_only_the_first_row() -> Result<(), SprocDbError> {
    let exec = StoredProcedureExecutor::new(FakeConnectionFactory::new(page(3)), NoopTelemetrySink);
    let mut call = ProcedureCall::new("GetUserByEmail")
        .param(ProcParam::input("email", RowValues::Text("user0@example.com".into())));

    let mut mapped = 0;
    let user = exec
        .execute_scalar(
            &mut call,
            |row| {
                mapped += 1;
                map_user(row)
            },
            &CancellationToken::new(),
        )
        .await?;
    assert_eq!(user.map(|u| u.id), Some(0));
    assert_eq!(mapped, 1);

    let stats = exec.factory().stats();
    assert_eq!(stats.rows_read(), 1);
    assert_eq!(stats.cursors_released(), 1);
    Ok(())
}

#[tokio::test]
async fn scalar_with_no_rows_is_none() -> Result<(), SprocDbError> {
    let sink = CollectingTelemetrySink::new();
    let exec = StoredProcedureExecutor::new(FakeConnectionFactory::new(page(0)), sink.clone());
    let mut call = ProcedureCall::new("GetUserByEmail");

    let user = exec
        .execute_scalar(&mut call, map_user, &CancellationToken::new())
        .await?;
    assert_eq!(user, None);
    assert!(sink.records()[0].success);
    Ok(())
}

#[tokio::test]
async fn no_result_call_sends_parameters_in_order() -> Result<(), SprocDbError> {
    let factory = FakeConnectionFactory::new(FakeScript::empty().with_rows_affected(3));
    let exec = StoredProcedureExecutor::new(factory, NoopTelemetrySink);
    let mut call = ProcedureCall::new("dbo.DeactivateUsers")
        .timeout_secs(5)
        .params([
            ProcParam::input("@since", RowValues::Text("2024-01-01".into())),
            ProcParam::input("dryRun", RowValues::Bool(false)),
        ]);

    exec.execute_no_result(&mut call, &CancellationToken::new())
        .await?;

    let command = exec
        .factory()
        .stats()
        .last_command()
        .ok_or_else(|| SprocDbError::mapping("no command recorded"))?;
    let names: Vec<&str> = command.params().iter().map(ProcParam::name).collect();
    assert_eq!(names, ["since", "dryRun"]);
    assert_eq!(command.timeout_secs(), 5);
    Ok(())
}

#[tokio::test]
async fn every_connection_is_closed_and_every_cursor_released() -> Result<(), SprocDbError> {
    let exec = StoredProcedureExecutor::new(FakeConnectionFactory::new(page(4)), NoopTelemetrySink);
    let cancel = CancellationToken::new();

    for _ in 0..3 {
        let mut call = ProcedureCall::new("GetUsersPage");
        exec.execute_set(&mut call, map_user, &cancel).await?;
        exec.execute_scalar(&mut call, map_user, &cancel).await?;
        exec.execute_no_result(&mut call, &cancel).await?;
    }
    let _ = exec
        .execute_set(
            &mut ProcedureCall::new("GetUsersPage"),
            |_| Err::<User, _>(SprocDbError::mapping("boom")),
            &cancel,
        )
        .await;

    let stats = exec.factory().stats();
    assert_eq!(stats.created(), 10);
    assert_eq!(stats.close_calls(), 10);
    assert_eq!(stats.cursors_opened(), 7);
    assert_eq!(stats.cursors_released(), 7);
    Ok(())
}
