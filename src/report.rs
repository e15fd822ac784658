//! Spreadsheet report: one row per purchase record, a per-row
//! hours-per-dollar formula, and an overall summary cell.

use crate::clients::steam::PlaytimeTable;
use crate::error::{ReportError, Result};
use crate::scrapers::wizard::PurchaseRecord;
use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;
use tracing::info;

const HEADERS: [&str; 9] = [
    "Name",
    "Price",
    "Purchase Date",
    "Transaction ID",
    "Gift?",
    "App IDs",
    "Total Playtime (minutes)",
    "Info Tags",
    "Hours per Dollar",
];

const COL_NAME: u16 = 0;
const COL_PRICE: u16 = 1;
const COL_DATE: u16 = 2;
const COL_TRANSID: u16 = 3;
const COL_GIFT: u16 = 4;
const COL_APPIDS: u16 = 5;
const COL_PLAYTIME: u16 = 6;
const COL_TAGS: u16 = 7;
const COL_HOURS_PER_DOLLAR: u16 = 8;
const COL_SUMMARY: u16 = 10;

pub fn write_report(
    records: &[PurchaseRecord],
    playtime: &PlaytimeTable,
    path: &Path,
) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Steam")?;

    for (col, header) in HEADERS.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }

    let currency = Format::new().set_num_format("$0.00");

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        worksheet.write_string(row, COL_NAME, &record.primary_name)?;
        worksheet.write_number_with_format(row, COL_PRICE, parse_price(&record.value)?, &currency)?;
        worksheet.write_string(row, COL_DATE, &record.purchase_date)?;
        // Kept as a string: the ids routinely exceed what an f64 cell
        // can hold losslessly, and nothing computes on this column.
        worksheet.write_string(row, COL_TRANSID, &record.transaction_id)?;
        worksheet.write_boolean(row, COL_GIFT, record.is_gift)?;
        worksheet.write_string(row, COL_APPIDS, &record.appids)?;
        worksheet.write_number(
            row,
            COL_PLAYTIME,
            playtime.total_minutes(&record.appids) as f64,
        )?;
        worksheet.write_string(row, COL_TAGS, &record.info_tags)?;
        let sheet_row = row + 1;
        worksheet.write_formula(
            row,
            COL_HOURS_PER_DOLLAR,
            format!("=(G{sheet_row}/60)/B{sheet_row}").as_str(),
        )?;
    }

    worksheet.write_string(0, COL_SUMMARY, "Overall hours per dollar")?;
    worksheet.write_formula(1, COL_SUMMARY, "=(SUM(G:G)/60)/SUM(B:B)")?;

    worksheet.set_column_width(COL_NAME, 55)?;
    worksheet.set_column_width(COL_PLAYTIME, 22)?;
    worksheet.set_column_width(COL_HOURS_PER_DOLLAR, 18)?;
    worksheet.set_column_hidden(COL_DATE)?;
    worksheet.set_column_hidden(COL_TRANSID)?;
    worksheet.set_column_hidden(COL_APPIDS)?;

    workbook.save(path).map_err(|source| ReportError::ReportSave {
        path: path.display().to_string(),
        source,
    })?;

    info!("Report saved to {}", path.display());
    Ok(())
}

/// Parse a currency-formatted price string like `$10.99` or `$1,299.00`.
pub fn parse_price(raw: &str) -> Result<f64> {
    raw.trim()
        .trim_start_matches('$')
        .replace(',', "")
        .parse::<f64>()
        .map_err(|_| ReportError::Parse(format!("unparseable price: {raw:?}")))
}

/// The same aggregate the summary formula computes, for logging.
pub fn overall_hours_per_dollar(records: &[PurchaseRecord], playtime: &PlaytimeTable) -> f64 {
    let total_hours: f64 = records
        .iter()
        .map(|r| playtime.total_minutes(&r.appids) as f64 / 60.0)
        .sum();
    let total_price: f64 = records
        .iter()
        .filter_map(|r| parse_price(&r.value).ok())
        .sum();
    if total_price == 0.0 {
        0.0
    } else {
        total_hours / total_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::steam::OwnedGame;

    fn record(value: &str, appids: &str) -> PurchaseRecord {
        PurchaseRecord {
            primary_name: "Game".to_string(),
            value: value.to_string(),
            purchase_date: "Jan 5, 2020".to_string(),
            transaction_id: "555".to_string(),
            appids: appids.to_string(),
            is_gift: false,
            info_tags: String::new(),
        }
    }

    fn playtime() -> PlaytimeTable {
        PlaytimeTable::new(vec![
            OwnedGame {
                appid: 100,
                playtime_forever: 120,
            },
            OwnedGame {
                appid: 200,
                playtime_forever: 0,
            },
            OwnedGame {
                appid: 300,
                playtime_forever: 600,
            },
        ])
    }

    #[test]
    fn prices_parse_with_currency_noise() {
        assert_eq!(parse_price("$10.00").unwrap(), 10.0);
        assert_eq!(parse_price(" $1,299.50 ").unwrap(), 1299.5);
        assert!(parse_price("free").is_err());
    }

    #[test]
    fn overall_aggregate_matches_the_summary_formula() {
        let records = vec![record("$10.00", "100,200"), record("$5.00", "300")];
        let expected = ((120.0 + 0.0) / 60.0 + 600.0 / 60.0) / (10.00 + 5.00);
        assert_eq!(overall_hours_per_dollar(&records, &playtime()), expected);
    }

    #[test]
    fn report_writes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("purchases.xlsx");
        let records = vec![record("$10.00", "100,200"), record("$5.00", "300")];
        write_report(&records, &playtime(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn transaction_ids_beyond_f64_precision_still_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("purchases.xlsx");
        let mut long_id = record("$10.00", "100");
        long_id.transaction_id = "12345678901234567890".to_string();
        write_report(&[long_id], &playtime(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn unparseable_price_fails_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("purchases.xlsx");
        let records = vec![record("free", "100")];
        assert!(write_report(&records, &playtime(), &path).is_err());
    }
}
