use railsql_core::config::{AppConfig, WarehouseConfig};
use railsql_core::warehouse::{QueryExecutor, TRACKED_TABLES};
use railsql_db::warehouse::STATEMENT_TIMEOUT_MESSAGE;
use railsql_db::{connect_warehouse, Warehouse, WarehouseError};
use serde_json::json;

type ContractResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

fn demo_config() -> WarehouseConfig {
    AppConfig::default().warehouse
}

async fn seeded(config: WarehouseConfig) -> ContractResult<Warehouse> {
    let warehouse = connect_warehouse(&config).await.map_err(|error| error.to_string())?;
    warehouse.seed_demo().await.map_err(|error| error.to_string())?;
    Ok(warehouse)
}

#[tokio::test]
async fn seeding_creates_every_tracked_table() -> ContractResult {
    let config = demo_config();
    let warehouse = connect_warehouse(&config).await.map_err(|error| error.to_string())?;

    let empty = warehouse.introspect().await.map_err(|error| error.to_string())?;
    require!(empty.tables.is_empty(), "fresh warehouse should have no tables: {empty:?}");

    let summary = warehouse.seed_demo().await.map_err(|error| error.to_string())?;
    require!(summary.arrivals == 24, "arrivals seeded: {}", summary.arrivals);
    require!(summary.station == 5, "stations seeded: {}", summary.station);

    let catalog = warehouse.introspect().await.map_err(|error| error.to_string())?;
    require!(catalog.missing_tables().is_empty(), "missing: {:?}", catalog.missing_tables());
    require!(catalog.tables.len() == TRACKED_TABLES.len(), "tables: {:?}", catalog.tables);

    let arrivals = catalog.table("arrivals").ok_or("arrivals should be described")?;
    require!(
        arrivals.columns
            == ["time", "eva", "trainid", "plannedarrival", "arrivalminutes", "arrivalstatus"],
        "arrival columns: {:?}",
        arrivals.columns
    );
    Ok(())
}

#[tokio::test]
async fn reseeding_replaces_rows_instead_of_duplicating() -> ContractResult {
    let warehouse = seeded(demo_config()).await?;
    let again = warehouse.seed_demo().await.map_err(|error| error.to_string())?;

    let rows = warehouse
        .execute("SELECT COUNT(*) AS n FROM oebb.arrivals")
        .await
        .map_err(|error| error.message)?;
    require!(rows[0]["n"] == json!(again.arrivals), "row count after reseed: {rows:?}");
    Ok(())
}

#[tokio::test]
async fn dry_run_query_returns_ten_rows() -> ContractResult {
    let warehouse = seeded(demo_config()).await?;

    let rows = warehouse
        .execute("SELECT * FROM oebb.arrivals LIMIT 10")
        .await
        .map_err(|error| error.message)?;

    require!(rows.len() == 10, "expected 10 rows, got {}", rows.len());
    require!(rows[0].contains_key("arrivalminutes"), "columns: {:?}", rows[0].keys());
    Ok(())
}

#[tokio::test]
async fn statement_groups_concatenate_rows_in_order() -> ContractResult {
    let warehouse = seeded(demo_config()).await?;

    let rows = warehouse
        .execute(
            "SELECT name FROM oebb.station WHERE eva = 8103000; \
             SELECT category AS name FROM oebb.trainnames WHERE trainid = 'IC 690';",
        )
        .await
        .map_err(|error| error.message)?;

    require!(
        rows.iter().map(|row| row["name"].clone()).collect::<Vec<_>>()
            == vec![json!("Wien Hbf"), json!("IC")],
        "rows: {rows:?}"
    );
    Ok(())
}

#[tokio::test]
async fn values_keep_their_json_types() -> ContractResult {
    let warehouse = seeded(demo_config()).await?;

    let rows = warehouse
        .execute(
            "SELECT eva, latitude, name, NULL AS missing FROM oebb.station WHERE eva = 8100173",
        )
        .await
        .map_err(|error| error.message)?;

    require!(rows.len() == 1, "rows: {rows:?}");
    require!(rows[0]["eva"] == json!(8100173), "eva: {}", rows[0]["eva"]);
    require!(rows[0]["latitude"] == json!(47.0722), "latitude: {}", rows[0]["latitude"]);
    require!(rows[0]["name"] == json!("Graz Hbf"), "name: {}", rows[0]["name"]);
    require!(rows[0]["missing"].is_null(), "missing: {}", rows[0]["missing"]);
    Ok(())
}

#[tokio::test]
async fn columns_keep_their_select_order() -> ContractResult {
    let warehouse = seeded(demo_config()).await?;

    let rows = warehouse
        .execute("SELECT 1 AS zeta, 2 AS alpha, 3 AS mid")
        .await
        .map_err(|error| error.message)?;

    let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    require!(keys == ["zeta", "alpha", "mid"], "keys: {keys:?}");

    let rendered = serde_json::to_string(&rows[0]).map_err(|error| error.to_string())?;
    require!(rendered == r#"{"zeta":1,"alpha":2,"mid":3}"#, "rendered: {rendered}");
    Ok(())
}

#[tokio::test]
async fn repeated_column_names_are_not_collapsed() -> ContractResult {
    let warehouse = seeded(demo_config()).await?;

    let rows = warehouse
        .execute(
            "SELECT a.eva, d.eva, d.eva FROM oebb.arrivals a \
             JOIN oebb.departures d ON d.eva = a.eva LIMIT 1",
        )
        .await
        .map_err(|error| error.message)?;

    require!(rows.len() == 1, "rows: {rows:?}");
    let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    require!(keys == ["eva", "eva_2", "eva_3"], "keys: {keys:?}");
    require!(rows[0]["eva"] == rows[0]["eva_2"], "row: {:?}", rows[0]);
    Ok(())
}

#[tokio::test]
async fn no_matching_rows_is_an_empty_result() -> ContractResult {
    let warehouse = seeded(demo_config()).await?;

    let rows = warehouse
        .execute("SELECT * FROM oebb.arrivals WHERE eva = -1")
        .await
        .map_err(|error| error.message)?;

    require!(rows.is_empty(), "expected no rows, got {rows:?}");
    Ok(())
}

#[tokio::test]
async fn malformed_sql_is_an_execution_error() -> ContractResult {
    let warehouse = seeded(demo_config()).await?;

    let error = match warehouse.execute("SELEC * FROM oebb.arrivals").await {
        Ok(rows) => return Err(format!("malformed sql should fail, got {rows:?}")),
        Err(error) => error,
    };
    require!(error.message.contains("syntax error"), "message: {}", error.message);

    let error = match warehouse.execute("SELECT * FROM oebb.nowhere").await {
        Ok(rows) => return Err(format!("unknown table should fail, got {rows:?}")),
        Err(error) => error,
    };
    require!(error.message.contains("no such table"), "message: {}", error.message);
    Ok(())
}

#[tokio::test]
async fn slow_statements_hit_the_statement_timeout() -> ContractResult {
    let mut config = demo_config();
    config.statement_timeout_ms = 1;
    let warehouse = seeded(config).await?;

    let result = warehouse
        .execute(
            "WITH RECURSIVE counter(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM counter \
             WHERE n < 20000000) SELECT COUNT(*) AS n FROM counter",
        )
        .await;

    match result {
        Ok(rows) => Err(format!("slow query should time out, got {rows:?}")),
        Err(error) => {
            require!(error.message == STATEMENT_TIMEOUT_MESSAGE, "message: {}", error.message);
            Ok(())
        }
    }
}

#[tokio::test]
async fn generated_writes_are_rolled_back() -> ContractResult {
    let warehouse = seeded(demo_config()).await?;

    let rows = warehouse
        .execute(
            "INSERT INTO oebb.holidays (date, name) VALUES ('2025-12-25', 'Christtag'); \
             SELECT COUNT(*) AS n FROM oebb.holidays",
        )
        .await
        .map_err(|error| error.message)?;
    require!(rows.len() == 1 && rows[0]["n"] == json!(5), "rows inside the group: {rows:?}");

    let after = warehouse
        .execute("SELECT COUNT(*) AS n FROM oebb.holidays")
        .await
        .map_err(|error| error.message)?;
    require!(after[0]["n"] == json!(4), "holidays after rollback: {after:?}");
    Ok(())
}

#[tokio::test]
async fn unsafe_schema_names_and_unknown_urls_are_rejected() -> ContractResult {
    let mut config = demo_config();
    config.schema = "oebb; DROP TABLE x".to_string();
    require!(
        matches!(connect_warehouse(&config).await, Err(WarehouseError::InvalidSchema(_))),
        "schema with punctuation should be rejected"
    );

    let mut config = demo_config();
    config.url = "mysql://localhost/oebb".to_string();
    require!(
        matches!(connect_warehouse(&config).await, Err(WarehouseError::UnsupportedUrl(_))),
        "mysql url should be rejected"
    );
    Ok(())
}
