//! Monitor command - live readings from the scale

use anyhow::{Context, Result};
use scale_serial::{ConnectionManager, ConnectionState, Reading};

use crate::output::{csv_rows, OutputContext, OutputFormat, ReadingRow};

/// Connect and print readings until Ctrl+C, the reading limit or a fatal
/// transport error
pub async fn monitor(
    manager: &ConnectionManager,
    count: Option<usize>,
    ctx: &OutputContext,
) -> Result<()> {
    ctx.info(&format!(
        "Connecting to scale at {} baud...",
        manager.baud_rate()
    ));
    manager
        .connect()
        .await
        .context("Failed to connect to scale")?;

    let port = manager.port_name().await.unwrap_or_default();
    ctx.success(&format!("Connected to {}", port));
    ctx.info("Press Ctrl+C to stop");

    let mut readings = manager.subscribe_readings();
    let mut states = manager.subscribe_state();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    // For CSV, print header once
    if ctx.format == OutputFormat::Csv {
        print!("{}", csv_rows::<ReadingRow>(&[], true));
    }

    let mut printed = 0usize;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = readings.changed() => {
                if changed.is_err() {
                    break;
                }
                let reading = readings.borrow_and_update().clone();
                if let Some(reading) = reading {
                    print_reading(&reading, ctx);
                    printed += 1;
                    if count.is_some_and(|limit| printed >= limit) {
                        break;
                    }
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                if let ConnectionState::Error(reason) = state {
                    ctx.error(&format!(
                        "Scale connection lost ({}): {}",
                        reason,
                        manager.error().unwrap_or_default()
                    ));
                    break;
                }
            }
        }
    }

    ctx.info("\nDisconnecting...");
    manager.disconnect().await;
    match manager.error() {
        Some(error) => ctx.warn(&format!("Disconnected with errors: {}", error)),
        None => ctx.success("Disconnected"),
    }

    Ok(())
}

/// Print a reading in the appropriate format
fn print_reading(reading: &Reading, ctx: &OutputContext) {
    match ctx.format {
        OutputFormat::Table => {
            // Simple inline display for streaming
            let row = ReadingRow::from(reading);
            println!(
                "[{}] {} {}  ({})",
                row.timestamp, row.value, row.unit, row.raw_frame
            );
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string(reading) {
                println!("{}", json);
            }
        }
        OutputFormat::Csv => {
            print!("{}", csv_rows(&[ReadingRow::from(reading)], false));
        }
    }
}
