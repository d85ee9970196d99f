//! Ports command - list serial ports

use anyhow::{Context, Result};
use scale_serial::ConnectionManager;

use crate::output::{OutputContext, PortRow};

/// List the ports the configured transport can select
pub async fn ports(manager: &ConnectionManager, ctx: &OutputContext) -> Result<()> {
    if !manager.is_supported() {
        ctx.warn("Serial ports are not supported in this environment");
        return Ok(());
    }

    let ports = manager
        .provider()
        .list_ports()
        .await
        .context("Failed to list serial ports")?;

    let rows: Vec<PortRow> = ports.into_iter().map(PortRow::from).collect();
    ctx.print(&rows);
    Ok(())
}
