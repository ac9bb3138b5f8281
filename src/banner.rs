//! Terminal summaries printed by the admin CLI.

use alloy::primitives::Address;
use term_table::row::Row;
use term_table::table_cell::{Alignment as CellAlignment, TableCell};
use term_table::{Table, TableStyle};

use crate::tx::{TransactionRecord, TxStatus};

fn header_row(text: impl ToString) -> Row {
    Row::new(vec![TableCell::builder(text.to_string())
        .col_span(2)
        .alignment(CellAlignment::Center)
        .build()])
}

fn field_row(label: &str, value: impl ToString) -> Row {
    Row::new(vec![
        TableCell::builder(label)
            .alignment(CellAlignment::Right)
            .build(),
        TableCell::builder(value.to_string())
            .alignment(CellAlignment::Left)
            .build(),
    ])
}

/// Election status banner: contract, endpoint, phase and winner.
pub fn election_status(
    contract: Address,
    rpc_url: &str,
    active: bool,
    winner: Option<Address>,
) -> String {
    let mut table = Table::new();
    table.style = TableStyle::extended();

    table.add_row(header_row("🗳  DPoS ELECTION 🗳"));
    table.add_row(field_row("Contract", contract));
    table.add_row(field_row("RPC URL", rpc_url));
    table.add_row(field_row(
        "Election",
        if active { "🟢 Active" } else { "⚪ Inactive" },
    ));
    table.add_row(field_row(
        "Winner",
        winner.map_or_else(|| "-".to_string(), |w| w.to_string()),
    ));

    table.render()
}

pub fn transaction(record: &TransactionRecord) -> String {
    let mut table = Table::new();
    table.style = TableStyle::extended();

    let header = match record.status() {
        TxStatus::Pending => "⏳ PENDING ⏳",
        TxStatus::Confirmed => "✅ CONFIRMED ✅",
        TxStatus::Failed { .. } => "❌ REVERTED ❌",
        TxStatus::Dropped { .. } => "⌛ DROPPED ⌛",
    };
    table.add_row(header_row(header));
    table.add_row(field_row("Method", record.label()));
    table.add_row(field_row("Tx hash", format!("{:?}", record.id())));
    if let Some(sender) = record.sender() {
        table.add_row(field_row("Sender", sender));
    }
    if let Some(result) = record.result() {
        if let Some(block) = result.block_number {
            table.add_row(field_row("Block", block));
        }
        table.add_row(field_row("Gas used", result.gas_used));
        table.add_row(field_row("Events", result.events.len()));
    }
    if let Some(reason) = record.reason() {
        table.add_row(field_row("Reason", reason));
    }
    table.add_row(field_row("Checks", record.checks()));

    table.render()
}
