// src/client/demo.rs

//! The external-consistency walkthrough run by `cortado --client <config>`.
//!
//! One clerk writes through three different replica groups and reads the table back
//! through the first; every statement must be visible regardless of which group served it.

use super::clerk::Clerk;
use super::config::ClientConfig;
use super::router::ReplicaGroup;
use super::transport::Transport;
use crate::core::CortadoError;
use crate::core::types::{ResultSet, Statement};
use anyhow::{Context, Result};
use tracing::info;

/// Loads the client config, runs the scenario over groups `g1`, `g2` and `g3`, and
/// prints the final result set.
pub async fn run(config_path: &str) -> Result<()> {
    let config = ClientConfig::from_file(config_path).await?;
    let clerk = Clerk::new(&config).context("Failed to create clerk")?;
    let g1 = config.group("g1")?;
    let g2 = config.group("g2")?;
    let g3 = config.group("g3")?;

    info!(
        "Running courses scenario as client {} over {} encoding.",
        clerk.client_id(),
        config.encoding
    );
    let rows = courses_scenario(&clerk, &g1, &g2, &g3).await?;
    print!("{rows}");
    Ok(())
}

/// Opens a session on `g1`, spreads writes over all three groups, reads everything
/// back from `g1` and closes the session on `g3`.
pub async fn courses_scenario<T: Transport>(
    clerk: &Clerk<T>,
    g1: &ReplicaGroup,
    g2: &ReplicaGroup,
    g3: &ReplicaGroup,
) -> Result<ResultSet, CortadoError> {
    let mut conn = clerk.open_connection(g1).await?;

    let writes = [
        (g2, "CREATE TABLE IF NOT EXISTS courses (id text, name text)"),
        (g3, "DELETE FROM courses"),
        (g1, "INSERT INTO courses values('6.831', 'UID')"),
        (g2, "INSERT INTO courses values('6.830', 'Databases')"),
        (g1, "INSERT INTO courses values('6.824', 'Distributed Systems')"),
    ];
    for (group, sql) in writes {
        clerk.execute_sql(group, &mut conn, Statement::new(sql)).await?;
    }

    let rows = clerk
        .execute_sql(g1, &mut conn, Statement::new("SELECT * FROM courses"))
        .await?;
    clerk.close_connection(g3, &mut conn).await?;
    Ok(rows)
}
