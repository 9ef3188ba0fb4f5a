use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Pdf,
    Excel,
    Screen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    None,
    Product,
    Client,
    Category,
    Date,
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(a: NaiveDate, b: NaiveDate) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Narrowing applied to the sold lines on top of the date range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportFilters {
    /// Inclusive bounds on the unit price of a sold line.
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
    /// Username, compared case-insensitively.
    pub customer: Option<String>,
    /// Category slug or name, compared case-insensitively.
    pub category: Option<String>,
}

impl ReportFilters {
    pub fn is_empty(&self) -> bool {
        self.price_min.is_none()
            && self.price_max.is_none()
            && self.customer.is_none()
            && self.category.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportParams {
    /// `None` means all time.
    pub range: Option<DateRange>,
    pub period_text: String,
    pub group_by: GroupBy,
    pub format: ReportFormat,
    pub filters: ReportFilters,
    /// Neither a period nor an output format was recognized in the prompt.
    pub used_defaults: bool,
    /// One human-readable line per recognized element.
    pub interpretation: Vec<String>,
    /// Hints for the elements the prompt left out.
    pub suggestions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub prompt: Option<String>,
}

/// One sold line of a completed order, the raw input of every report.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReportLine {
    pub order_id: i32,
    pub completed_at: DateTime<Utc>,
    pub customer: String,
    pub product_name: String,
    pub category_name: String,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportCell {
    Text(String),
    Integer(i64),
    Money(Decimal),
}

impl ReportCell {
    pub fn display(&self) -> String {
        match self {
            ReportCell::Text(s) => s.clone(),
            ReportCell::Integer(n) => n.to_string(),
            ReportCell::Money(m) => format!("${:.2}", m.round_dp(2)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTotals {
    pub orders: i64,
    pub units: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTable {
    pub title: String,
    pub period: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<ReportCell>>,
    pub totals: ReportTotals,
}

#[derive(Debug, Serialize)]
pub struct ScreenReportResponse {
    pub prompt: String,
    pub params: ReportParams,
    pub report: ReportTable,
}
