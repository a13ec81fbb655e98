//! Report output (console tables and CSV files)

use anyhow::{Context, Result};
use csv::Writer;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

use crate::constants;
use crate::reports::ReportEnvelope;
use crate::yearly::YearlyReport;

#[derive(Tabled)]
struct DayRow {
    #[tabled(rename = "Day")]
    day: u32,
    #[tabled(rename = "Sales")]
    sales: u64,
    #[tabled(rename = "Amount")]
    amount: String,
}

#[derive(Tabled)]
struct ItemRow {
    #[tabled(rename = "Item")]
    envato_id: u64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Sales")]
    sales: u64,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Share")]
    percentage: String,
}

#[derive(Tabled)]
struct MonthRow {
    #[tabled(rename = "Month")]
    month: u32,
    #[tabled(rename = "Sales")]
    sales: u64,
    #[tabled(rename = "Amount")]
    amount: String,
}

/// Render the daily series and item ranking of a monthly report
pub fn monthly_tables(envelope: &ReportEnvelope) -> String {
    let days = envelope.monthly.iter().map(|(day, totals)| DayRow {
        day: *day,
        sales: totals.sales,
        amount: format!("{:.2}", totals.amount),
    });
    let items = envelope.items.iter().map(|item| ItemRow {
        envato_id: item.envato_id,
        name: item.name.clone(),
        sales: item.sales,
        amount: format!("{:.2}", item.amount),
        percentage: format!("{}%", item.percentage),
    });

    format!("{}\n\n{}", Table::new(days), Table::new(items))
}

/// Render the per-month rows of a yearly report
pub fn yearly_table(report: &YearlyReport) -> String {
    let months = report.yearly.iter().map(|(month, summary)| MonthRow {
        month: *month,
        sales: summary.sales,
        amount: format!("{:.2}", summary.amount),
    });

    Table::new(months).to_string()
}

/// Print a monthly report summary to stdout
pub fn print_monthly(envelope: &ReportEnvelope) {
    if envelope.sales.is_empty() {
        println!("No sales in this window.");
        return;
    }

    println!("{}", monthly_tables(envelope));
    println!("\n=============================================");
    println!("Sales:    {}", envelope.totals.sales);
    println!("Earnings: ${:.2}", envelope.totals.earnings);
    println!("=============================================");
}

/// Print a yearly report summary to stdout
pub fn print_yearly(year: i32, report: &YearlyReport) {
    if report.yearly.is_empty() {
        println!("No earnings history for {}.", year);
        return;
    }

    println!("{}\n", yearly_table(report));
    println!("=============================================");
    println!("{} Sales:    {}", year, report.totals.sales);
    println!("{} Earnings: ${:.2}", year, report.totals.earnings);
    println!("=============================================");
}

/// Write sales.csv, daily.csv and items.csv into `output_dir`
pub fn write_csv(output_dir: &Path, envelope: &ReportEnvelope) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let sales_path = output_dir.join(constants::SALES_CSV_FILENAME);
    let mut wtr = Writer::from_path(&sales_path)?;
    wtr.write_record(["Date", "Order_ID", "Item_ID", "Item_Name", "Net_Amount"])?;
    for sale in &envelope.sales {
        wtr.write_record([
            &sale.date.format("%Y-%m-%d").to_string(),
            &sale.order_id.map(|id| id.to_string()).unwrap_or_default(),
            &sale.item_id.to_string(),
            &sale.name,
            &format!("{:.2}", sale.amount),
        ])?;
    }
    wtr.flush()?;

    let daily_path = output_dir.join(constants::DAILY_CSV_FILENAME);
    let mut wtr = Writer::from_path(&daily_path)?;
    wtr.write_record(["Day", "Sales", "Amount"])?;
    for (day, totals) in &envelope.monthly {
        wtr.write_record([
            &day.to_string(),
            &totals.sales.to_string(),
            &format!("{:.2}", totals.amount),
        ])?;
    }
    wtr.flush()?;

    let items_path = output_dir.join(constants::ITEMS_CSV_FILENAME);
    let mut wtr = Writer::from_path(&items_path)?;
    wtr.write_record(["Item_ID", "Item_Name", "Sales", "Amount", "Percentage"])?;
    for item in &envelope.items {
        wtr.write_record([
            &item.envato_id.to_string(),
            &item.name,
            &item.sales.to_string(),
            &format!("{:.2}", item.amount),
            &item.percentage.to_string(),
        ])?;
    }
    wtr.flush()?;

    Ok(vec![sales_path, daily_path, items_path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::SaleRecord;
    use crate::yearly::{MonthSummary, YearTotals};
    use chrono::NaiveDate;

    fn envelope() -> ReportEnvelope {
        let sale = |day: u32, order_id: u64, item_id: u64, amount: f64, name: &str| SaleRecord {
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            day,
            order_id: Some(order_id),
            item_id,
            amount,
            name: name.to_string(),
        };
        ReportEnvelope::from_sales(vec![
            sale(2, 11, 100, 17.5, "Flat Admin, Dark"),
            sale(9, 12, 200, 20.0, "Landing Kit"),
        ])
    }

    #[test]
    fn test_write_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("march");

        let paths = write_csv(&out, &envelope()).unwrap();
        assert_eq!(paths.len(), 3);

        let sales = std::fs::read_to_string(out.join(constants::SALES_CSV_FILENAME)).unwrap();
        let lines: Vec<&str> = sales.lines().collect();
        assert_eq!(lines[0], "Date,Order_ID,Item_ID,Item_Name,Net_Amount");
        assert_eq!(lines[1], "2024-03-02,11,100,\"Flat Admin, Dark\",17.50");
        assert_eq!(lines.len(), 3);

        let daily = std::fs::read_to_string(out.join(constants::DAILY_CSV_FILENAME)).unwrap();
        // Header plus every day of March
        assert_eq!(daily.lines().count(), 32);
        assert!(daily.contains("\n9,1,20.00\n"));

        let items = std::fs::read_to_string(out.join(constants::ITEMS_CSV_FILENAME)).unwrap();
        let lines: Vec<&str> = items.lines().collect();
        assert_eq!(lines[1], "200,Landing Kit,1,20.00,53");
        assert_eq!(lines[2], "100,\"Flat Admin, Dark\",1,17.50,46");
    }

    #[test]
    fn test_monthly_tables_render() {
        let rendered = monthly_tables(&envelope());
        assert!(rendered.contains("Landing Kit"));
        assert!(rendered.contains("53%"));
        assert!(rendered.contains("17.50"));
    }

    #[test]
    fn test_yearly_table_render() {
        let mut report = YearlyReport {
            totals: YearTotals {
                sales: 3,
                earnings: 42.0,
            },
            ..Default::default()
        };
        report.yearly.insert(
            4,
            MonthSummary {
                sales: 3,
                amount: 42.0,
            },
        );

        let rendered = yearly_table(&report);
        assert!(rendered.contains("Month"));
        assert!(rendered.contains("42.00"));
    }
}
