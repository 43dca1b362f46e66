//! A short tour: create a small graph, query it, survive a reopen.
//!
//! Run with `cargo run --example tour`.

use nendb::{Database, DbConfig, Direction, Result};

fn main() -> Result<()> {
    let dir = std::env::temp_dir().join("nendb-tour");
    let config = DbConfig::with_data_dir(&dir);

    let db = Database::init(config.clone())?;
    db.register_kind("User", 1);
    db.register_edge_label("KNOWS", 1);

    db.execute("CREATE (ada:User {id: 1, name: 'ada'})-[:KNOWS]->(alan:User {id: 2, name: 'alan'})")?;
    db.execute("MERGE (grace:User {id: 3, name: 'grace'})")?;
    db.execute("MATCH (a:User {id: 2}) CREATE (a)-[:KNOWS]->(b:User {id: 4, name: 'kurt'})")?;
    db.sync()?;

    let rows = db.execute(
        "MATCH (a:User)-[:KNOWS]->(b:User) RETURN a.name, b.name ORDER BY a.name",
    )?;
    println!("{:?}", rows.columns);
    for row in rows.rows() {
        println!("{row:?}");
    }

    for edge in db.neighbors(2, Direction::Both, None) {
        println!("edge {} -> {} (label {})", edge.from, edge.to, edge.label);
    }

    let stats = db.get_stats();
    println!(
        "nodes {}/{}, wal entries {}",
        stats.memory.nodes.used, stats.memory.nodes.capacity, stats.wal.entries_written
    );

    drop(db);
    let db = Database::open(config)?;
    let count = db.execute("MATCH (n) RETURN count(*)")?;
    println!("after reopen: {:?}", count.rows().next());
    Ok(())
}
