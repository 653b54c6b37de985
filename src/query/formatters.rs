use crate::balance::BalanceSummary;
use crate::history::Transaction;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

pub fn format_transactions(transactions: &[Transaction], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_transactions_table(transactions),
        OutputFormat::Json => format_transactions_json(transactions),
        OutputFormat::Csv => format_transactions_csv(transactions),
    }
}

fn format_transactions_table(transactions: &[Transaction]) -> String {
    if transactions.is_empty() {
        return "No transactions found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            "Transaction",
            "From",
            "To",
            "Amount",
            "Date & Time",
            "Vault",
            "Block",
        ]);

    for txn in transactions {
        table.add_row(vec![
            Cell::new(&txn.transaction_id),
            Cell::new(&txn.from),
            Cell::new(&txn.to),
            Cell::new(&txn.amount),
            Cell::new(&txn.date),
            Cell::new(txn.vault),
            Cell::new(txn.block_number),
        ]);
    }

    table.to_string()
}

fn format_transactions_json(transactions: &[Transaction]) -> String {
    let json_transactions: Vec<_> = transactions
        .iter()
        .map(|txn| {
            json!({
                "transaction_id": txn.transaction_id,
                "from": txn.from,
                "to": txn.to,
                "amount": txn.amount,
                "date": txn.date,
                "block_number": txn.block_number,
                "vault": txn.vault.to_string(),
            })
        })
        .collect();

    serde_json::to_string_pretty(&json_transactions).unwrap_or_else(|_| "[]".to_string())
}

fn format_transactions_csv(transactions: &[Transaction]) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record([
        "transaction_id",
        "from",
        "to",
        "amount",
        "date",
        "block_number",
        "vault",
    ]);

    for txn in transactions {
        let _ = wtr.write_record([
            &txn.transaction_id,
            &txn.from,
            &txn.to,
            &txn.amount,
            &txn.date,
            &txn.block_number.to_string(),
            &txn.vault.to_string(),
        ]);
    }

    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_summary(summary: &BalanceSummary, format: &OutputFormat) -> String {
    let token_display = if summary.balance_loading {
        "Loading...".to_string()
    } else {
        // Display-rounded the way the dashboard shows it.
        format!(
            "{:.4}",
            summary.total_token_balance.parse::<f64>().unwrap_or(0.0)
        )
    };
    let usd_display = if summary.balance_loading {
        "Loading USD value...".to_string()
    } else {
        format!("${}", summary.total_balance_usd)
    };
    let decimals_display = summary
        .decimals
        .map_or("N/A".to_string(), |decimals| decimals.to_string());

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Metric", "Value"]);

            table.add_row(vec![Cell::new("Nest Balance"), Cell::new(&token_display)]);
            table.add_row(vec![Cell::new("USD Value"), Cell::new(&usd_display)]);
            table.add_row(vec![
                Cell::new("Raw Balance"),
                Cell::new(summary.total_raw_balance.to_string()),
            ]);
            table.add_row(vec![Cell::new("Decimals"), Cell::new(&decimals_display)]);

            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "total_token_balance": summary.total_token_balance,
            "total_balance_usd": summary.total_balance_usd,
            "total_raw_balance": summary.total_raw_balance.to_string(),
            "decimals": summary.decimals,
            "balance_loading": summary.balance_loading,
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            let _ = wtr.write_record(["total_token_balance", &summary.total_token_balance]);
            let _ = wtr.write_record(["total_balance_usd", &summary.total_balance_usd]);
            let _ = wtr.write_record([
                "total_raw_balance",
                &summary.total_raw_balance.to_string(),
            ]);
            let _ = wtr.write_record(["decimals", &decimals_display]);
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}
