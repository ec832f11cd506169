//! The downloadable fulfillment report: an xlsx workbook with one row per
//! result plus a summary sheet.

use crate::types::{Report, ReportStats};
use chrono::SecondsFormat;
use rust_xlsxwriter::{DocProperties, Format, Workbook, Worksheet, XlsxError};
use thiserror::Error;

pub const CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const FILE_EXTENSION: &str = "xlsx";

pub const REPORT_SHEET: &str = "Fulfillment Report";
pub const SUMMARY_SHEET: &str = "Summary";

const HEADER: [&str; 7] = [
    "Order Number",
    "Tracking Number",
    "Tracking Company",
    "Status",
    "Details",
    "Fulfillment ID",
    "Generated At",
];
const COLUMN_WIDTHS: [f64; 7] = [15.0, 25.0, 15.0, 10.0, 40.0, 35.0, 25.0];

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Could not write report: {0}")]
    Xlsx(#[from] XlsxError),
}

/// Renders the report workbook. The workbook's creation time is the
/// report's generation time, so the bytes depend on the report alone.
pub fn render(report: &Report) -> Result<Vec<u8>, RenderError> {
    let generated_at = report
        .generated_at
        .to_rfc3339_opts(SecondsFormat::Millis, true);
    let bold = Format::new().set_bold();

    let mut workbook = Workbook::new();
    workbook.set_properties(&DocProperties::new().set_creation_datetime(&report.generated_at));

    write_results(workbook.add_worksheet(), report, &generated_at, &bold)?;
    write_summary(
        workbook.add_worksheet(),
        &summarize(report),
        &generated_at,
        &bold,
    )?;

    Ok(workbook.save_to_buffer()?)
}

fn write_results(
    sheet: &mut Worksheet,
    report: &Report,
    generated_at: &str,
    bold: &Format,
) -> Result<(), XlsxError> {
    sheet.set_name(REPORT_SHEET)?;

    for (col, (title, width)) in HEADER.iter().zip(COLUMN_WIDTHS).enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, bold)?;
        sheet.set_column_width(col as u16, width)?;
    }

    for (index, result) in report.results.iter().enumerate() {
        let row = index as u32 + 1;
        let cells = [
            result.order_number.as_str(),
            result.tracking_number.as_str(),
            result.tracking_company.as_str(),
            if result.is_success() { "Success" } else { "Failed" },
            result.detail(),
            result.fulfillment_id().unwrap_or(""),
            generated_at,
        ];

        for (col, value) in cells.into_iter().enumerate() {
            sheet.write_string(row, col as u16, value)?;
        }
    }

    Ok(())
}

fn write_summary(
    sheet: &mut Worksheet,
    stats: &ReportStats,
    generated_at: &str,
    bold: &Format,
) -> Result<(), XlsxError> {
    sheet.set_name(SUMMARY_SHEET)?;
    sheet.set_column_width(0, 20)?;
    sheet.set_column_width(1, 30)?;

    sheet.write_string_with_format(0, 0, "Fulfillment Report Summary", bold)?;
    sheet.write_string(2, 0, "Total Orders")?;
    sheet.write_number(2, 1, stats.total as f64)?;
    sheet.write_string(3, 0, "Successful")?;
    sheet.write_number(3, 1, stats.success as f64)?;
    sheet.write_string(4, 0, "Failed")?;
    sheet.write_number(4, 1, stats.failed as f64)?;
    sheet.write_string(5, 0, "Success Rate")?;
    sheet.write_string(5, 1, success_rate(stats))?;
    sheet.write_string(7, 0, "Generated At")?;
    sheet.write_string(7, 1, generated_at)?;

    Ok(())
}

/// Share of successful results as a percentage with one decimal.
pub fn success_rate(stats: &ReportStats) -> String {
    if stats.total == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", stats.success as f64 * 100.0 / stats.total as f64)
}

pub fn summarize(report: &Report) -> ReportStats {
    let success = report.results.iter().filter(|r| r.is_success()).count();

    ReportStats {
        total: report.results.len(),
        success,
        failed: report.results.len() - success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FulfillmentResult, OrderIntentRecord};
    use calamine::{Data, Range, Reader, Xlsx};
    use chrono::{TimeZone, Utc};
    use std::io::Cursor;

    fn report() -> Report {
        let shipped = OrderIntentRecord::new("#1025", "RX123456789IN", "India Post", None);
        let quoted = OrderIntentRecord::new("SO, \"1026\"", "EE2", "DHL", None);
        let missing = OrderIntentRecord::new("1027", "", "India Post", None);

        Report {
            tenant: "test-shop.myshopify.com".into(),
            generated_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap(),
            results: vec![
                FulfillmentResult::success(&shipped, "SUCCESS", "gid://shopify/Fulfillment/1"),
                FulfillmentResult::failure(&quoted, "Cannot fulfill - order status: CLOSED, ON_HOLD"),
                FulfillmentResult::failure(&missing, "Missing Order Number or Tracking Number"),
            ],
        }
    }

    fn open(bytes: Vec<u8>) -> Xlsx<Cursor<Vec<u8>>> {
        Xlsx::new(Cursor::new(bytes)).unwrap()
    }

    /// Cell text, with unwritten cells read as empty.
    fn text(range: &Range<Data>, row: u32, col: u32) -> String {
        match range.get_value((row, col)) {
            None | Some(Data::Empty) => String::new(),
            Some(Data::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    #[test]
    fn test_render_reparses() {
        let report = report();
        let mut workbook = open(render(&report).unwrap());
        assert_eq!(workbook.sheet_names(), vec![REPORT_SHEET, SUMMARY_SHEET]);

        let rows = workbook.worksheet_range(REPORT_SHEET).unwrap();
        assert_eq!(rows.height(), report.results.len() + 1);
        for (col, title) in HEADER.iter().enumerate() {
            assert_eq!(text(&rows, 0, col as u32), *title);
        }

        for (index, result) in report.results.iter().enumerate() {
            let row = index as u32 + 1;
            assert_eq!(text(&rows, row, 0), result.order_number);
            assert_eq!(text(&rows, row, 1), result.tracking_number);
            assert_eq!(text(&rows, row, 2), result.tracking_company);
            assert_eq!(
                text(&rows, row, 3),
                if result.is_success() { "Success" } else { "Failed" }
            );
            assert_eq!(text(&rows, row, 4), result.detail());
            assert_eq!(text(&rows, row, 5), result.fulfillment_id().unwrap_or(""));
            assert_eq!(text(&rows, row, 6), "2025-03-01T12:30:00.000Z");
        }
    }

    #[test]
    fn test_summary_sheet() {
        let mut workbook = open(render(&report()).unwrap());
        let summary = workbook.worksheet_range(SUMMARY_SHEET).unwrap();

        assert_eq!(text(&summary, 0, 0), "Fulfillment Report Summary");
        assert_eq!(text(&summary, 2, 0), "Total Orders");
        assert_eq!(summary.get_value((2, 1)), Some(&Data::Float(3.0)));
        assert_eq!(summary.get_value((3, 1)), Some(&Data::Float(1.0)));
        assert_eq!(summary.get_value((4, 1)), Some(&Data::Float(2.0)));
        assert_eq!(text(&summary, 5, 0), "Success Rate");
        assert_eq!(text(&summary, 5, 1), "33.3%");
        assert_eq!(text(&summary, 7, 1), "2025-03-01T12:30:00.000Z");
    }

    #[test]
    fn test_render_is_deterministic() {
        let report = report();
        assert_eq!(render(&report).unwrap(), render(&report).unwrap());
    }

    #[test]
    fn test_summarize() {
        let stats = summarize(&report());
        assert_eq!(
            stats,
            ReportStats {
                total: 3,
                success: 1,
                failed: 2
            }
        );
        assert_eq!(success_rate(&stats), "33.3%");
        assert_eq!(
            success_rate(&ReportStats {
                total: 0,
                success: 0,
                failed: 0
            }),
            "0.0%"
        );
    }
}
