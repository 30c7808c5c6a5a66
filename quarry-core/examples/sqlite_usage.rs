use quarry_core::{col, cond, raw, select, DatabaseConfig, Engine, Value};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Person {
    id: i64,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Quarry SQLite - Usage Example ===\n");

    let config = DatabaseConfig::sqlite(":memory:").with_diagnostics(true);
    let mut engine = Engine::new(config)?;

    engine
        .query(
            "CREATE TABLE person (id INTEGER PRIMARY KEY, name TEXT, team_id INTEGER)",
            &[],
            0,
            0,
        )
        .await;
    engine
        .query("CREATE TABLE team (id INTEGER PRIMARY KEY, label TEXT)", &[], 0, 0)
        .await;
    engine
        .query("INSERT INTO team (id, label) VALUES (1, 'red'), (2, 'blue')", &[], 0, 0)
        .await;
    for (id, name) in ["Ada", "Brian", "Cleo", "Dmitri", "Eve"].iter().enumerate() {
        let values = [
            Value::I64(id as i64 + 1),
            Value::from(*name),
            Value::I64(id as i64 % 2 + 1),
        ];
        engine
            .query("INSERT INTO person (id, name, team_id) VALUES (?, ?, ?)", &values, 0, 0)
            .await;
    }

    // Pagination spliced by the dialect
    let page = select(["id", "name"])
        .from("person")
        .order_by("id")
        .offset(1)
        .limit(2);
    println!("1. Paginated SELECT:\n{}\n", page.build()?);
    if let Some(rows) = page.get(&mut engine).await {
        let people: Vec<Person> = rows.deserialize()?;
        println!("   Rows: {:?}\n", people);
    }

    // Conditions, joins and aliases
    let joined = select(vec![col("p.name"), col("t.label").as_alias("team")])
        .from(("person", "p"))
        .left_join(("team", "t"))
        .on(vec![raw("t.id = p.team_id")])
        .where_(vec![cond("p.id", vec![1, 2, 3]), raw("OR"), cond("p.name", "E%")])
        .and(("t.label", "red"))
        .order_by_desc("p.name");
    println!("2. JOIN with conditions:\n{}", joined.build()?);
    println!("   Parameters: {:?}", joined.bound_values());
    println!("   Rows: {:?}\n", joined.all(&mut engine).await);

    // Aggregate helpers
    let everyone = select("*").from("person").order_by("id");
    println!("3. Helpers:");
    println!("   count: {:?}", everyone.count(&mut engine).await);
    println!("   first: {:?}", everyone.first(&mut engine, 1).await);
    println!("   last 2: {:?}", everyone.last(&mut engine, 2).await);
    println!("   rand: {:?}", everyone.rand(&mut engine).await);

    if let Some(stats) = engine.stats() {
        println!("\n4. Diagnostics of the last statement:");
        println!("   {}", serde_json::to_string_pretty(stats)?);
    }

    // Failures are reported through last_error()
    let broken = select("*").from("missing_table");
    if broken.get(&mut engine).await.is_none() {
        println!("\n5. Failed query: {:?}", engine.last_error());
    }

    println!("\nTables: {:?}", engine.list_tables().await);
    engine.close().await;
    Ok(())
}
